use std::sync::Arc;

use anyhow::Result;

use super::storage::KeyValueStore;

/// Entry holding the raw bearer token
pub const TOKEN_KEY: &str = "auth_token";

/// Entry holding the JSON profile `{"username": .., "roles": [..]}`
pub const USER_KEY: &str = "auth_user";

/// The two persisted credential entries on top of a storage backend.
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn token(&self) -> Result<Option<String>> {
        self.backend.get(TOKEN_KEY)
    }

    /// Raw profile entry, unparsed
    pub fn profile(&self) -> Result<Option<String>> {
        self.backend.get(USER_KEY)
    }

    /// Write the token, then the profile.
    pub fn store(&self, token: &str, profile_json: &str) -> Result<()> {
        self.backend.set(TOKEN_KEY, token)?;
        self.backend.set(USER_KEY, profile_json)?;
        Ok(())
    }

    /// Remove both entries. The second removal is attempted even if the
    /// first fails; the first error is returned.
    pub fn clear(&self) -> Result<()> {
        let token_result = self.backend.remove(TOKEN_KEY);
        let user_result = self.backend.remove(USER_KEY);
        token_result.and(user_result)
    }
}
