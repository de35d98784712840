//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::{Config, StorageBackend};

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.guard.max_url_length == 0 {
            return Err(ConfigError::ValidationError(
                "guard.max_url_length must be > 0".into(),
            ));
        }
        if self.fetch.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "fetch.timeout_ms must be > 0".into(),
            ));
        }
        if self.fetch.max_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "fetch.max_bytes must be > 0".into(),
            ));
        }
        if self.fetch.max_redirects > 20 {
            return Err(ConfigError::ValidationError(
                "fetch.max_redirects must be <= 20".into(),
            ));
        }
        if self.fetch.user_agent.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "fetch.user_agent must not be empty".into(),
            ));
        }
        if self.storage.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "storage.timeout_ms must be > 0".into(),
            ));
        }
        if self.storage.backend == StorageBackend::Filesystem
            && self.storage.filesystem.public_base_url.trim().is_empty()
        {
            return Err(ConfigError::ValidationError(
                "storage.filesystem.public_base_url must not be empty".into(),
            ));
        }
        if self.response.asset_max_age_secs == 0 {
            return Err(ConfigError::ValidationError(
                "response.asset_max_age_secs must be > 0".into(),
            ));
        }
        for path in &self.guard.proxy_paths {
            if !path.starts_with('/') {
                return Err(ConfigError::ValidationError(format!(
                    "guard.proxy_paths entries must start with '/': {path}"
                )));
            }
        }
        Ok(())
    }
}
