#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use placeconnect_client::PickedFile;
use placeconnect_types::models::{Identity, Place, Profile};

pub fn place(name: &str) -> Place {
    Place {
        id: Uuid::new_v4(),
        name: name.to_string(),
        kind: "cafe".to_string(),
        latitude: 41.7151,
        longitude: 44.8271,
        address: None,
        description: None,
        bio: None,
        image_url: None,
        activity_level: 0,
        last_activity: None,
        is_temporary: false,
        expires_at: None,
        created_by: None,
        created_at: Utc::now(),
    }
}

pub fn temporary_place(name: &str, expires_at: DateTime<Utc>) -> Place {
    Place {
        is_temporary: true,
        expires_at: Some(expires_at),
        ..place(name)
    }
}

pub fn profile(id: Uuid, name: &str) -> Profile {
    let now = Utc::now();
    Profile {
        id,
        full_name: Some(name.to_string()),
        avatar_url: None,
        email: Some(format!("{}@example.com", name.to_lowercase())),
        created_at: now,
        updated_at: now,
    }
}

pub fn user(id: Uuid, name: &str) -> Identity {
    Identity::User {
        id,
        display_name: name.to_string(),
    }
}

pub fn guest(name: &str) -> Identity {
    Identity::Guest {
        display_name: name.to_string(),
    }
}

pub fn png(name: &str) -> PickedFile {
    PickedFile {
        file_name: name.to_string(),
        mime_type: "image/png".to_string(),
        bytes: Bytes::from_static(b"\x89PNG\r\n\x1a\nfake"),
    }
}

/// Fail the test instead of hanging when an expected event never comes.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out waiting for an update")
}
