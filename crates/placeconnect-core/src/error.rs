use thiserror::Error;

/// Input rejected before anything is sent to the backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("Message must be at most {max} characters")]
    MessageTooLong { max: usize },

    #[error("Please enter a username")]
    EmptyUsername,

    #[error("Username must be at least {min} characters")]
    UsernameTooShort { min: usize },

    #[error("Username must be at most {max} characters")]
    UsernameTooLong { max: usize },

    #[error("Email is required")]
    EmailRequired,

    #[error("Password is required")]
    PasswordRequired,

    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Please enter a place name")]
    EmptyPlaceName,

    #[error("Place name must be at most {max} characters")]
    PlaceNameTooLong { max: usize },

    #[error("Description must be at most {max} characters")]
    BioTooLong { max: usize },

    #[error("Please upload an image for the place")]
    MissingImage,

    #[error("Please select how long the place should last")]
    MissingDuration,

    #[error("End time must be in the future")]
    EndTimeInPast,

    #[error("End time is too far in the future")]
    EndTimeOutOfRange,

    #[error("Please enter a name")]
    EmptyProfileName,

    #[error("Name must be at most {max} characters")]
    ProfileNameTooLong { max: usize },

    #[error("Please select an image file")]
    NotAnImage,

    #[error("Please select an image or video file")]
    UnsupportedMedia,

    #[error("File is empty")]
    EmptyFile,

    #[error("File must be under {limit_mb}MB")]
    FileTooLarge { limit_mb: usize },
}

/// A friendship transition that is not allowed from the current state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FriendshipError {
    #[error("You cannot send a friend request to yourself")]
    SelfRequest,

    #[error("A friendship or pending request already exists")]
    AlreadyExists,

    #[error("No friendship exists between these users")]
    NotFound,

    #[error("Only the recipient can accept a friend request")]
    NotAddressee,

    #[error("Only the sender can cancel a friend request")]
    NotRequester,

    #[error("You are not part of this friendship")]
    NotAParty,

    #[error("The request is not pending")]
    NotPending,

    #[error("You are not friends")]
    NotAccepted,
}
