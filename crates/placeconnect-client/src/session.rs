use std::sync::Arc;

use tracing::{info, warn};

use placeconnect_core::validate;
use placeconnect_store::Store;
use placeconnect_types::api::ProfileUpsert;
use placeconnect_types::models::{AuthUser, Identity, Profile};

use crate::backend::Backend;
use crate::error::ClientError;

/// Who the app is acting as: a signed-in account, a named guest, or nobody
/// yet (the name prompt is showing).
pub struct SessionController<B> {
    backend: B,
    store: Arc<Store>,
    identity: Option<Identity>,
}

/// Display name of an authenticated user, from the richest metadata available.
pub fn display_name_of(user: &AuthUser) -> String {
    let meta = &user.metadata;
    [
        meta.full_name.as_deref(),
        meta.name.as_deref(),
        meta.preferred_username.as_deref(),
        user.email.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|s| !s.is_empty())
    .unwrap_or("User")
    .to_string()
}

impl<B: Backend> SessionController<B> {
    pub fn new(backend: B, store: Arc<Store>) -> Self {
        Self {
            backend,
            store,
            identity: None,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// True when there is neither a session nor a stored guest name.
    pub fn needs_prompt(&self) -> bool {
        self.identity.is_none()
    }

    pub fn is_guest(&self) -> bool {
        matches!(self.identity, Some(Identity::Guest { .. }))
    }

    /// Pick up the guest name saved on this device, if any.
    pub fn restore_guest(&mut self) -> Result<Option<&Identity>, ClientError> {
        self.identity = self
            .store
            .guest_name()?
            .map(|display_name| Identity::Guest { display_name });
        Ok(self.identity.as_ref())
    }

    /// A session was established: act as that user and refresh their profile.
    pub async fn sign_in(&mut self, user: &AuthUser) -> Result<Profile, ClientError> {
        let display_name = display_name_of(user);
        let meta = &user.metadata;

        let profile = self
            .backend
            .upsert_profile(ProfileUpsert {
                id: user.id,
                full_name: meta.full_name.clone().or_else(|| meta.name.clone()),
                avatar_url: meta.avatar_url.clone(),
                email: user.email.clone(),
            })
            .await?;

        info!("Signed in as {} ({})", display_name, user.id);
        self.identity = Some(Identity::User {
            id: user.id,
            display_name: profile.full_name.clone().unwrap_or(display_name),
        });
        Ok(profile)
    }

    /// Continue without an account under `name`, remembered on this device.
    pub fn continue_as_guest(&mut self, name: &str) -> Result<&Identity, ClientError> {
        let display_name = validate::guest_name(name)?;
        self.store.set_guest_name(&display_name)?;
        info!("Continuing as guest {}", display_name);
        Ok(&*self.identity.insert(Identity::Guest { display_name }))
    }

    /// Drop the session and fall back to the stored guest name, if any.
    pub fn sign_out(&mut self) -> Result<Option<&Identity>, ClientError> {
        if let Some(Identity::User { id, .. }) = &self.identity {
            info!("Signed out {}", id);
        }
        let restored = self.restore_guest().map(|identity| identity.is_some());
        if let Err(e) = restored {
            warn!("Could not read stored guest name: {}", e);
            self.identity = None;
        }
        Ok(self.identity.as_ref())
    }

    /// Forget the stored guest name and show the prompt again.
    pub fn forget_guest(&mut self) -> Result<(), ClientError> {
        self.store.clear_guest_name()?;
        if self.is_guest() {
            self.identity = None;
        }
        Ok(())
    }
}
