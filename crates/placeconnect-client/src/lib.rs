//! Screen-level state for the PlaceConnect client, written against the
//! [`Backend`] facade of the hosted platform.

pub mod backend;
pub mod chat;
pub mod config;
pub mod error;
pub mod friends;
pub mod map;
pub mod memory;
pub mod preview;
pub mod profile;
pub mod session;

pub use backend::{Backend, Subscription};
pub use config::ClientConfig;
pub use error::{BackendError, ClientError};
pub use memory::MemoryBackend;

/// A file picked by the user, before upload.
#[derive(Debug, Clone)]
pub struct PickedFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: bytes::Bytes,
}
