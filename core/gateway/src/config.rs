//! Gateway configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use drivegate_common::{Error, Result, Secret};
use drivegate_drive::gdrive::auth::{AuthConfig, DEFAULT_EXPIRY_MARGIN_SECS, GOOGLE_TOKEN_URL};
use drivegate_drive::gdrive::client::{DriveEndpoints, DRIVE_API_BASE, DRIVE_UPLOAD_BASE};

/// Environment variable overriding `client_id`.
pub const ENV_CLIENT_ID: &str = "DRIVEGATE_CLIENT_ID";
/// Environment variable overriding `client_secret`.
pub const ENV_CLIENT_SECRET: &str = "DRIVEGATE_CLIENT_SECRET";
/// Environment variable overriding `refresh_token`.
pub const ENV_REFRESH_TOKEN: &str = "DRIVEGATE_REFRESH_TOKEN";

fn default_root_id() -> String {
    "root".to_string()
}

fn default_token_url() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

fn default_api_base() -> String {
    DRIVE_API_BASE.to_string()
}

fn default_upload_base() -> String {
    DRIVE_UPLOAD_BASE.to_string()
}

fn default_token_margin_secs() -> u64 {
    DEFAULT_EXPIRY_MARGIN_SECS
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_listing_concurrency() -> usize {
    4
}

fn default_user_agent() -> String {
    concat!("DriveGate/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Configuration for a gateway instance.
///
/// Loaded from a JSON file; every field except the credentials has a
/// default. The credentials can also come from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// OAuth2 client ID.
    #[serde(default)]
    pub client_id: String,
    /// OAuth2 client secret.
    #[serde(default)]
    pub client_secret: Secret,
    /// Long-lived refresh token for the single account served.
    #[serde(default)]
    pub refresh_token: Secret,
    /// ID of the folder that `/` maps to.
    #[serde(default = "default_root_id")]
    pub root_id: String,
    /// OAuth2 token endpoint.
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// Drive metadata API base.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Drive upload API base.
    #[serde(default = "default_upload_base")]
    pub upload_base: String,
    /// Seconds subtracted from every advertised token lifetime.
    #[serde(default = "default_token_margin_secs")]
    pub token_margin_secs: u64,
    /// Timeout for metadata calls, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Children probed concurrently when building a full listing.
    #[serde(default = "default_listing_concurrency")]
    pub listing_concurrency: usize,
    /// Externally visible base URL used in listings. Falls back to the
    /// request's `Host` header.
    #[serde(default)]
    pub public_url: Option<Url>,
    /// User agent sent upstream.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: Secret::default(),
            refresh_token: Secret::default(),
            root_id: default_root_id(),
            token_url: default_token_url(),
            api_base: default_api_base(),
            upload_base: default_upload_base(),
            token_margin_secs: default_token_margin_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            listing_concurrency: default_listing_concurrency(),
            public_url: None,
            user_agent: default_user_agent(),
        }
    }
}

impl GatewayConfig {
    /// Load, apply environment overrides and validate.
    ///
    /// # Errors
    /// - File unreadable or not valid JSON
    /// - Validation failure
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut config: Self = serde_json::from_str(&raw).map_err(|e| {
            Error::Config(format!("Invalid configuration in {}: {}", path.display(), e))
        })?;

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Replace credentials with values from `lookup` where present.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup(ENV_CLIENT_ID).filter(|v| !v.is_empty()) {
            self.client_id = value;
        }
        if let Some(value) = lookup(ENV_CLIENT_SECRET).filter(|v| !v.is_empty()) {
            self.client_secret = Secret::new(value);
        }
        if let Some(value) = lookup(ENV_REFRESH_TOKEN).filter(|v| !v.is_empty()) {
            self.refresh_token = Secret::new(value);
        }
    }

    /// Check the configuration for obvious mistakes.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            return Err(Error::Config("client_id is required".to_string()));
        }
        if self.client_secret.is_empty() {
            return Err(Error::Config("client_secret is required".to_string()));
        }
        if self.refresh_token.is_empty() {
            return Err(Error::Config("refresh_token is required".to_string()));
        }
        if self.root_id.is_empty() {
            return Err(Error::Config("root_id cannot be empty".to_string()));
        }
        for (field, value) in [
            ("token_url", &self.token_url),
            ("api_base", &self.api_base),
            ("upload_base", &self.upload_base),
        ] {
            Url::parse(value)
                .map_err(|e| Error::Config(format!("{} is not a valid URL: {}", field, e)))?;
        }
        if self.listing_concurrency == 0 {
            return Err(Error::Config(
                "listing_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Credential used for the refresh-token grant.
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            refresh_token: self.refresh_token.clone(),
            token_url: self.token_url.clone(),
        }
    }

    /// Endpoints for the Drive client.
    pub fn endpoints(&self) -> DriveEndpoints {
        DriveEndpoints {
            api_base: self.api_base.trim_end_matches('/').to_string(),
            upload_base: self.upload_base.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            user_agent: self.user_agent.clone(),
        }
    }

    /// Safety margin for token expiry.
    pub fn token_margin(&self) -> Duration {
        Duration::from_secs(self.token_margin_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_minimal_config_applies_defaults() {
        let file = write_config(
            r#"{"client_id": "id", "client_secret": "secret", "refresh_token": "1//rt"}"#,
        );

        let config = GatewayConfig::load(file.path()).unwrap();

        assert_eq!(config.root_id, "root");
        assert_eq!(config.token_url, GOOGLE_TOKEN_URL);
        assert_eq!(config.api_base, DRIVE_API_BASE);
        assert_eq!(config.token_margin_secs, 100);
        assert_eq!(config.listing_concurrency, 4);
        assert_eq!(config.refresh_token.expose(), "1//rt");
        assert!(config.public_url.is_none());
    }

    #[test]
    fn test_load_rejects_missing_credentials() {
        let file = write_config(r#"{"client_id": "id"}"#);
        let err = GatewayConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let file = write_config("{ not json");
        assert!(matches!(
            GatewayConfig::load(file.path()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides_credentials() {
        let mut config = GatewayConfig {
            client_id: "file-id".to_string(),
            ..GatewayConfig::default()
        };
        let env: HashMap<&str, &str> = [
            (ENV_CLIENT_SECRET, "env-secret"),
            (ENV_REFRESH_TOKEN, "env-refresh"),
            (ENV_CLIENT_ID, ""),
        ]
        .into_iter()
        .collect();

        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.client_id, "file-id");
        assert_eq!(config.client_secret.expose(), "env-secret");
        assert_eq!(config.refresh_token.expose(), "env-refresh");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency_and_bad_urls() {
        let base = GatewayConfig {
            client_id: "id".to_string(),
            client_secret: Secret::new("secret"),
            refresh_token: Secret::new("rt"),
            ..GatewayConfig::default()
        };

        let zero = GatewayConfig {
            listing_concurrency: 0,
            ..base.clone()
        };
        assert!(zero.validate().is_err());

        let bad_url = GatewayConfig {
            api_base: "drive api".to_string(),
            ..base.clone()
        };
        assert!(bad_url.validate().is_err());

        assert!(base.validate().is_ok());
    }

    #[test]
    fn test_endpoints_trim_trailing_slash() {
        let config = GatewayConfig {
            api_base: "http://localhost:8081/drive/v3/".to_string(),
            request_timeout_secs: 5,
            ..GatewayConfig::default()
        };

        let endpoints = config.endpoints();
        assert_eq!(endpoints.api_base, "http://localhost:8081/drive/v3");
        assert_eq!(endpoints.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_debug_output_hides_secrets() {
        let config = GatewayConfig {
            client_secret: Secret::new("hunter2"),
            refresh_token: Secret::new("1//refresh"),
            ..GatewayConfig::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("1//refresh"));
    }
}
