//! Engine configuration with defaults, validation, and tilde expansion.

use std::path::PathBuf;
use std::time::Duration;

use labdesk_api::remote::{default_api_target, RemoteLabApiConfig};

/// Configuration for one workstation session.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Backend endpoint, e.g. `http://127.0.0.1:50061`.
    pub api_target: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Directory for persisted workstation state (label preferences).
    pub data_dir: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let remote = RemoteLabApiConfig::default();
        Self {
            api_target: default_api_target(),
            connect_timeout: remote.connect_timeout,
            request_timeout: remote.request_timeout,
            data_dir: home_dir()
                .join(".local/share/labdesk")
                .display()
                .to_string(),
        }
    }
}

impl EngineConfig {
    /// Validates the configuration, returning an error message on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.api_target.trim().is_empty() {
            return Err("api_target is required".into());
        }
        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be greater than 0".into());
        }
        if self.request_timeout < self.connect_timeout {
            return Err("request_timeout must be at least connect_timeout".into());
        }
        if self.data_dir.trim().is_empty() {
            return Err("data_dir is required".into());
        }
        Ok(())
    }

    /// Expands a leading `~` in `data_dir`.
    pub fn expand_paths(&mut self) {
        self.data_dir = expand_tilde(&self.data_dir);
    }

    pub fn data_dir_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn remote_config(&self) -> RemoteLabApiConfig {
        RemoteLabApiConfig {
            target: self.api_target.clone(),
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
        }
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> String {
    if path.is_empty() {
        return path.to_string();
    }
    if path == "~" {
        return home_dir().display().to_string();
    }
    if let Some(rest) = path.strip_prefix("~/") {
        return home_dir().join(rest).display().to_string();
    }
    path.to_string()
}

fn home_dir() -> PathBuf {
    #[allow(deprecated)]
    std::env::home_dir().unwrap_or_else(|| PathBuf::from("/"))
}
