//! Connection configuration.
//!
//! A `VaultConfig` names the node to talk to and the identity to talk to it
//! as. It is immutable once a session is built from it; connecting to a
//! different node means building a new session.
//!
//! The default location is `~/.config/vault-session/config.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/credential directory paths
const APP_NAME: &str = "vault-session";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// The signer may need its own round trip to a wallet.
const DEFAULT_SIGNER_TIMEOUT_SECS: u64 = 60;

const NODE_URL_ENV: &str = "VAULT_NODE_URL";
const OWNER_DID_ENV: &str = "VAULT_OWNER_DID";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub node_url: String,
    pub owner_did: String,
    pub store_dir: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub signer_timeout_secs: u64,
    pub verify_challenge: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            node_url: String::new(),
            owner_did: String::new(),
            store_dir: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            signer_timeout_secs: DEFAULT_SIGNER_TIMEOUT_SECS,
            verify_challenge: true,
        }
    }
}

impl VaultConfig {
    pub fn new(node_url: impl Into<String>, owner_did: impl Into<String>) -> Self {
        Self {
            node_url: node_url.into(),
            owner_did: owner_did.into(),
            ..Default::default()
        }
    }

    /// Load from the default location, falling back to defaults if absent.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// `VAULT_NODE_URL` and `VAULT_OWNER_DID` win over file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(NODE_URL_ENV) {
            self.node_url = url;
        }
        if let Ok(did) = std::env::var(OWNER_DID_ENV) {
            self.owner_did = did;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.owner_did.trim().is_empty() {
            anyhow::bail!("owner_did must be set");
        }
        let url = reqwest::Url::parse(&self.node_url)
            .with_context(|| format!("Invalid node_url: {:?}", self.node_url))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!("node_url must be http or https, got {}", url.scheme());
        }
        if self.request_timeout_secs == 0 || self.signer_timeout_secs == 0 {
            anyhow::bail!("timeouts must be greater than zero");
        }
        Ok(())
    }

    /// Node URL with any trailing slash removed, ready for path joining.
    pub fn base_url(&self) -> &str {
        self.node_url.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn signer_timeout(&self) -> Duration {
        Duration::from_secs(self.signer_timeout_secs)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for file-backed credential records.
    pub fn store_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.store_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
