//! Client-side state logic: folding realtime changes into local collections,
//! hiding expired places, presence rooms, friendship rules and input checks.

pub mod activity;
pub mod error;
pub mod expiry;
pub mod friendship;
pub mod presence;
pub mod profile_cache;
pub mod reactions;
pub mod reconcile;
pub mod validate;

pub use error::{FriendshipError, ValidationError};
