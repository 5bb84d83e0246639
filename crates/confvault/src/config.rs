//! Client configuration
//!
//! Configuration sources, lowest precedence first:
//! - ~/.config/confvault/config.yaml
//! - VAULT_ADDR, VAULT_TOKEN, VAULT_CACERT, VAULT_CLIENT_CERT, VAULT_CLIENT_KEY,
//!   CONFVAULT_KV_VERSION
//! - command-line flags (applied by the binary)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::mount::KvVersion;

pub const ENV_ADDR: &str = "VAULT_ADDR";
pub const ENV_TOKEN: &str = "VAULT_TOKEN";
pub const ENV_CA_CERT: &str = "VAULT_CACERT";
pub const ENV_CLIENT_CERT: &str = "VAULT_CLIENT_CERT";
pub const ENV_CLIENT_KEY: &str = "VAULT_CLIENT_KEY";
pub const ENV_KV_VERSION: &str = "CONFVAULT_KV_VERSION";

/// Connection and behavior settings for a KV client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Secret store endpoint, e.g. https://vault.example.com:8200
    pub address: Option<String>,

    /// Auth token sent with every request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// PEM bundle used to verify the server
    pub ca_cert: Option<PathBuf>,

    /// PEM client certificate for mutual TLS
    pub client_cert: Option<PathBuf>,

    /// PEM private key matching `client_cert`
    pub client_key: Option<PathBuf>,

    /// Force this KV version instead of the one the backend reports
    pub kv_version: Option<KvVersion>,

    /// Version assumed when the backend has no mount introspection route
    pub fallback_version: KvVersion,

    /// Reuse mount answers across calls. Faster, but a remount or engine
    /// upgrade goes unnoticed until `invalidate_mounts` is called.
    pub cache_mount_info: bool,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: None,
            token: None,
            ca_cert: None,
            client_cert: None,
            client_key: None,
            kv_version: None,
            fallback_version: KvVersion::V1,
            cache_mount_info: false,
            timeout_secs: 30,
        }
    }
}

impl ClientConfig {
    /// Load from the default location, then apply the environment
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load from a specific file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {:?}", path))?;
        Ok(config)
    }

    /// Save to a specific file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overlay values from environment variables, read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(address) = lookup(ENV_ADDR) {
            self.address = Some(address);
        }
        if let Some(token) = lookup(ENV_TOKEN) {
            self.token = Some(token);
        }
        if let Some(ca_cert) = lookup(ENV_CA_CERT) {
            self.ca_cert = Some(PathBuf::from(ca_cert));
        }
        if let Some(cert) = lookup(ENV_CLIENT_CERT) {
            self.client_cert = Some(PathBuf::from(cert));
        }
        if let Some(key) = lookup(ENV_CLIENT_KEY) {
            self.client_key = Some(PathBuf::from(key));
        }
        if let Some(version) = lookup(ENV_KV_VERSION) {
            let version = version
                .parse::<KvVersion>()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("Invalid {}", ENV_KV_VERSION))?;
            self.kv_version = Some(version);
        }

        Ok(())
    }

    /// Default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("confvault")
            .join("config.yaml")
    }
}
