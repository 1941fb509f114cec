use placeconnect_core::{FriendshipError, ValidationError};
use thiserror::Error;

/// A request to the hosted backend failed. Nothing is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not signed in")]
    Unauthenticated,

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Request failed: {0}")]
    Request(String),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Friendship(#[from] FriendshipError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Sign in to {0}")]
    SignInRequired(&'static str),

    #[error("Not allowed: {0}")]
    NotAllowed(&'static str),

    #[error("Local store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl ClientError {
    /// Input problems that the form shows inline; everything else is a
    /// request failure shown next to the control.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
