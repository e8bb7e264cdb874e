//! EcoFlow API client configuration.
//!
//! Credentials come from the EcoFlow developer portal. Configuration can be
//! read from the environment or from a YAML file:
//!
//! ```yaml
//! access_key: "Fp4SvIprYSDPXtYJidEtUAd1o"
//! secret_key: "WIbFEKre0s6sLnh4ei7SPUeYnptHG6V"
//! base_url: "https://api-e.ecoflow.com"   # optional
//! inverter_sns: ["HW51ZEH4SF4E0001"]      # optional, discovered if empty
//! plug_sns: ["HW52ZDH4SF7D0001"]          # optional, discovered if empty
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::Error;
use crate::{API_BASE_URL, DEFAULT_TIMEOUT_SECS};

/// Connection settings for [`EcoFlowClient`](crate::EcoFlowClient).
#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    /// Developer access key
    pub access_key: String,

    /// Developer secret key
    pub secret_key: String,

    /// API host (default: `https://api.ecoflow.com`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Micro-inverter serial numbers; discovered from the device list when empty
    #[serde(default)]
    pub inverter_sns: Vec<String>,

    /// Smart plug serial numbers; discovered from the device list when empty
    #[serde(default)]
    pub plug_sns: Vec<String>,
}

fn default_base_url() -> String {
    API_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("inverter_sns", &self.inverter_sns)
            .field("plug_sns", &self.plug_sns)
            .finish()
    }
}

impl ClientConfig {
    /// Create a config with the default host and device discovery.
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            base_url: default_base_url(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            inverter_sns: Vec::new(),
            plug_sns: Vec::new(),
        }
    }

    /// Read the config from environment variables.
    ///
    /// - `ECOFLOW_ACCESS_KEY`, `ECOFLOW_SECRET_KEY` (required)
    /// - `ECOFLOW_BASE_URL` (optional)
    /// - `ECOFLOW_INVERTER_SN`, `ECOFLOW_PLUG_SN` (optional, comma separated)
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConfigured`] if a key is missing or empty.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let access_key = lookup("ECOFLOW_ACCESS_KEY").unwrap_or_default();
        let secret_key = lookup("ECOFLOW_SECRET_KEY").unwrap_or_default();

        let mut config = Self::new(access_key, secret_key);
        if let Some(base_url) = lookup("ECOFLOW_BASE_URL").filter(|s| !s.is_empty()) {
            config.base_url = base_url;
        }
        config.inverter_sns = split_list(lookup("ECOFLOW_INVERTER_SN"));
        config.plug_sns = split_list(lookup("ECOFLOW_PLUG_SN"));

        config.validate()?;
        Ok(config)
    }

    /// Load the config from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse the config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("Invalid config YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Set a custom base URL (useful for testing).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Pin the micro-inverters instead of discovering them.
    #[must_use]
    pub fn with_inverters<I, S>(mut self, sns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inverter_sns = sns.into_iter().map(Into::into).collect();
        self
    }

    /// Pin the smart plugs instead of discovering them.
    #[must_use]
    pub fn with_plugs<I, S>(mut self, sns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.plug_sns = sns.into_iter().map(Into::into).collect();
        self
    }

    fn validate(&self) -> Result<(), Error> {
        if self.access_key.trim().is_empty() {
            return Err(Error::NotConfigured("ECOFLOW_ACCESS_KEY"));
        }
        if self.secret_key.trim().is_empty() {
            return Err(Error::NotConfigured("ECOFLOW_SECRET_KEY"));
        }
        if self.base_url.trim().is_empty() {
            return Err(Error::Config("base_url cannot be empty".to_string()));
        }
        Ok(())
    }
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
