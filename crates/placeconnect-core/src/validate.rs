use chrono::{DateTime, TimeZone, Utc};

use crate::error::ValidationError;
use crate::expiry::ExpiryChoice;

pub const MAX_MESSAGE_LEN: usize = 500;
pub const MIN_USERNAME_LEN: usize = 2;
pub const MAX_USERNAME_LEN: usize = 20;
pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_PLACE_NAME_LEN: usize = 100;
pub const MAX_BIO_LEN: usize = 300;
pub const MAX_PROFILE_NAME_LEN: usize = 50;

/// 5 MB cap for avatars and place images
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
/// 10 MB cap for media posted in chat
pub const MAX_MEDIA_BYTES: usize = 10 * 1024 * 1024;

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Trimmed chat message text.
pub fn chat_message(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    if char_len(trimmed) > MAX_MESSAGE_LEN {
        return Err(ValidationError::MessageTooLong { max: MAX_MESSAGE_LEN });
    }
    Ok(trimmed.to_string())
}

/// Trimmed display name for a guest.
pub fn guest_name(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyUsername);
    }
    let len = char_len(trimmed);
    if len < MIN_USERNAME_LEN {
        return Err(ValidationError::UsernameTooShort { min: MIN_USERNAME_LEN });
    }
    if len > MAX_USERNAME_LEN {
        return Err(ValidationError::UsernameTooLong { max: MAX_USERNAME_LEN });
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, Default)]
pub struct SignUpForm {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub name: String,
}

impl SignUpForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.email.trim().is_empty() {
            return Err(ValidationError::EmailRequired);
        }
        if self.password.is_empty() {
            return Err(ValidationError::PasswordRequired);
        }
        if char_len(&self.password) < MIN_PASSWORD_LEN {
            return Err(ValidationError::PasswordTooShort { min: MIN_PASSWORD_LEN });
        }
        if self.password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }
        Ok(())
    }

    /// Name stored in the new account's metadata: the one typed in, else the
    /// local part of the email.
    pub fn display_name(&self) -> String {
        let name = self.name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
        let email = self.email.trim();
        email.split('@').next().unwrap_or(email).to_string()
    }
}

pub fn sign_in(email: &str, password: &str) -> Result<(), ValidationError> {
    if email.trim().is_empty() {
        return Err(ValidationError::EmailRequired);
    }
    if password.is_empty() {
        return Err(ValidationError::PasswordRequired);
    }
    Ok(())
}

/// Fields of the create-place form.
#[derive(Debug, Clone, Default)]
pub struct PlaceForm {
    pub name: String,
    pub bio: String,
    pub has_image: bool,
    pub temporary: bool,
    pub expiry: Option<ExpiryChoice>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidPlace {
    pub name: String,
    pub bio: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PlaceForm {
    pub fn validate<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<ValidPlace, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyPlaceName);
        }
        if char_len(name) > MAX_PLACE_NAME_LEN {
            return Err(ValidationError::PlaceNameTooLong { max: MAX_PLACE_NAME_LEN });
        }
        let bio = self.bio.trim();
        if char_len(bio) > MAX_BIO_LEN {
            return Err(ValidationError::BioTooLong { max: MAX_BIO_LEN });
        }
        if !self.has_image {
            return Err(ValidationError::MissingImage);
        }

        let expires_at = if self.temporary {
            let choice = self.expiry.ok_or(ValidationError::MissingDuration)?;
            Some(choice.resolve(now)?)
        } else {
            None
        };

        Ok(ValidPlace {
            name: name.to_string(),
            bio: (!bio.is_empty()).then(|| bio.to_string()),
            expires_at,
        })
    }
}

pub fn profile_name(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyProfileName);
    }
    if char_len(trimmed) > MAX_PROFILE_NAME_LEN {
        return Err(ValidationError::ProfileNameTooLong { max: MAX_PROFILE_NAME_LEN });
    }
    Ok(trimmed.to_string())
}

/// Avatars and place images.
pub fn image_upload(mime_type: &str, len: usize) -> Result<(), ValidationError> {
    if !mime_type.starts_with("image/") {
        return Err(ValidationError::NotAnImage);
    }
    check_size(len, MAX_IMAGE_BYTES)
}

/// Images or videos posted in a chat room.
pub fn chat_media(mime_type: &str, len: usize) -> Result<(), ValidationError> {
    if !mime_type.starts_with("image/") && !mime_type.starts_with("video/") {
        return Err(ValidationError::UnsupportedMedia);
    }
    check_size(len, MAX_MEDIA_BYTES)
}

fn check_size(len: usize, limit: usize) -> Result<(), ValidationError> {
    if len == 0 {
        return Err(ValidationError::EmptyFile);
    }
    if len > limit {
        return Err(ValidationError::FileTooLarge {
            limit_mb: limit / (1024 * 1024),
        });
    }
    Ok(())
}

/// Extension of an uploaded file name, `bin` when it has none.
pub fn file_extension(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext,
        _ => "bin",
    }
}
