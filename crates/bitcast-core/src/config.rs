//! Client configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::SIGN_IN_CHALLENGE;
use crate::error::ConfigError;
use crate::feed::filter::DEFAULT_PAGE_SIZE;
use crate::scroll::DEFAULT_THRESHOLD_PX;

/// Name of the session database inside the data directory
pub const SESSION_DB_FILE: &str = "session.redb";

/// Settings for a [`BitcastClient`](crate::BitcastClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the Bitcast API, without trailing slash
    pub api_base_url: String,
    /// Directory holding the session database
    pub data_dir: PathBuf,
    /// Posts per page
    pub page_size: u32,
    /// Distance from the bottom (px) that triggers the next page
    pub scroll_threshold_px: f64,
    /// Text signed at sign-in
    pub challenge: String,
    /// Timeout applied to every HTTP request
    pub request_timeout_secs: u64,
    /// Capacity of the feed update channel
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:4000/api".to_string(),
            data_dir: PathBuf::from(".bitcast"),
            page_size: DEFAULT_PAGE_SIZE,
            scroll_threshold_px: DEFAULT_THRESHOLD_PX,
            challenge: SIGN_IN_CHALLENGE.to_string(),
            request_timeout_secs: 30,
            event_capacity: 256,
        }
    }
}

impl ClientConfig {
    pub fn with_data_dir(mut self, data_dir: impl AsRef<Path>) -> Self {
        self.data_dir = data_dir.as_ref().to_path_buf();
        self
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn session_db_path(&self) -> PathBuf {
        self.data_dir.join(SESSION_DB_FILE)
    }

    pub fn auth_endpoint(&self) -> String {
        format!("{}/auth", self.base())
    }

    pub fn posts_endpoint(&self) -> String {
        format!("{}/posts", self.base())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn base(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }

    /// Reject settings the client cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.api_base_url).map_err(|e| {
            ConfigError::InvalidBaseUrl {
                url: self.api_base_url.clone(),
                reason: e.to_string(),
            }
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                url: self.api_base_url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        if self.page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        if self.scroll_threshold_px.is_nan() || self.scroll_threshold_px <= 0.0 {
            return Err(ConfigError::InvalidScrollThreshold(self.scroll_threshold_px));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::ZeroEventCapacity);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::default();
        config.validate().unwrap();
        assert_eq!(config.page_size, 10);
        assert_eq!(config.challenge, "Sign into Bitcast App");
    }

    #[test]
    fn test_endpoints_trim_trailing_slash() {
        let config = ClientConfig::default().with_api_base_url("https://api.bitcast.app/api/");
        assert_eq!(config.auth_endpoint(), "https://api.bitcast.app/api/auth");
        assert_eq!(config.posts_endpoint(), "https://api.bitcast.app/api/posts");
    }

    #[test]
    fn test_session_db_path() {
        let config = ClientConfig::default().with_data_dir("/tmp/bitcast");
        assert_eq!(
            config.session_db_path(),
            PathBuf::from("/tmp/bitcast/session.redb")
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_url = ClientConfig::default().with_api_base_url("not a url");
        assert!(matches!(
            bad_url.validate(),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));

        let ftp = ClientConfig::default().with_api_base_url("ftp://example.com");
        assert!(matches!(ftp.validate(), Err(ConfigError::InvalidBaseUrl { .. })));

        let config = ClientConfig {
            page_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroPageSize));

        let config = ClientConfig {
            scroll_threshold_px: 0.0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidScrollThreshold(0.0))
        );

        let config = ClientConfig {
            event_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroEventCapacity));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"api_base_url":"https://example.com/api"}"#).unwrap();
        assert_eq!(config.api_base_url, "https://example.com/api");
        assert_eq!(config.page_size, 10);
    }
}
