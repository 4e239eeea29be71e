//! Client configuration management.
//!
//! This module handles loading and saving the client configuration, which
//! includes the backend URL, the credential storage backend, extra public
//! endpoints, and the last used username.
//!
//! Configuration is stored at `~/.config/ai-insight/config.json`. Environment
//! variables (`INSIGHT_API_URL`, `INSIGHT_STORAGE`) override the file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::client::REQUEST_TIMEOUT_SECS;
use crate::api::{ApiClient, EndpointRules, ReqwestTransport};
use crate::auth::{CredentialStore, FileStore, KeyValueStore, KeyringStore, MemoryStore, SessionManager};

/// Application name used for config/data directory paths and the keychain service
pub const APP_NAME: &str = "ai-insight";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_BASE_URL: &str = "http://localhost:8080";

pub const ENV_API_URL: &str = "INSIGHT_API_URL";
pub const ENV_STORAGE: &str = "INSIGHT_STORAGE";

/// Where the token and profile entries live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

impl StorageBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => Some(StorageBackend::File),
            "keyring" => Some(StorageBackend::Keyring),
            "memory" => Some(StorageBackend::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub storage: StorageBackend,
    pub extra_public_endpoints: Vec<String>,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            storage: StorageBackend::default(),
            extra_public_endpoints: Vec::new(),
            last_username: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply `INSIGHT_*` environment overrides
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.base_url = url.trim().to_string();
        }
        if let Some(value) = lookup(ENV_STORAGE) {
            match StorageBackend::parse(&value) {
                Some(storage) => self.storage = storage,
                None => warn!(value = %value, "Unknown {} value, keeping {:?}", ENV_STORAGE, self.storage),
            }
        }
        self
    }

    /// Directory holding the file-backed credential entries
    pub fn credentials_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME).join("credentials"))
    }

    pub fn credential_store(&self) -> Result<CredentialStore> {
        let backend: Arc<dyn KeyValueStore> = match self.storage {
            StorageBackend::File => Arc::new(FileStore::new(self.credentials_dir()?)),
            StorageBackend::Keyring => Arc::new(KeyringStore::new(APP_NAME)),
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
        };
        Ok(CredentialStore::new(backend))
    }

    pub fn endpoint_rules(&self) -> EndpointRules {
        EndpointRules::default().with_public(self.extra_public_endpoints.iter().cloned())
    }

    /// Build an API client for `session` from this configuration
    pub fn api_client(&self, session: Arc<SessionManager>) -> Result<ApiClient> {
        let transport = ReqwestTransport::new(Duration::from_secs(self.request_timeout_secs))
            .context("Failed to build HTTP client")?;
        Ok(ApiClient::with_transport(&self.base_url, session, Arc::new(transport))
            .with_rules(self.endpoint_rules()))
    }
}
