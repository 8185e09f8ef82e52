//! OAuth2 credential exchange and access token caching for Google Drive.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oauth2::{
    basic::BasicClient, reqwest, AuthType, ClientId, ClientSecret, RefreshToken, TokenResponse,
    TokenUrl,
};
use std::sync::Arc;
use tokio::sync::RwLock;

use drivegate_common::{Error, Result, Secret};

/// OAuth2 token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Lifetime assumed when the token endpoint does not advertise one.
const DEFAULT_TOKEN_LIFETIME: std::time::Duration = std::time::Duration::from_secs(3600);

/// Default safety margin subtracted from the advertised lifetime.
pub const DEFAULT_EXPIRY_MARGIN_SECS: u64 = 100;

/// A cached bearer token with its expiry instant.
#[derive(Debug, Clone)]
pub struct CredentialSession {
    /// Access token for API requests.
    pub access_token: String,
    /// Instant after which the token must not be used.
    pub expires_at: DateTime<Utc>,
}

impl CredentialSession {
    /// Check if the session can still be used at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Check if the session can still be used.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

/// Token returned by a credential exchange.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Fresh access token.
    pub access_token: String,
    /// Advertised lifetime, if the endpoint sent one.
    pub expires_in: Option<std::time::Duration>,
}

/// Exchanges the long-lived credential for a short-lived access token.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Perform one credential exchange.
    async fn exchange(&self) -> Result<IssuedToken>;
}

/// Fixed credential used for the refresh-token grant.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// OAuth2 client ID.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: Secret,
    /// Long-lived refresh token.
    pub refresh_token: Secret,
    /// Token endpoint.
    pub token_url: String,
}

/// Refresh-token grant against a real OAuth2 endpoint.
pub struct OAuthExchanger {
    config: AuthConfig,
    http: reqwest::Client,
}

impl OAuthExchanger {
    /// Create a new exchanger.
    ///
    /// # Errors
    /// - Invalid token URL
    /// - HTTP client construction failure
    pub fn new(config: AuthConfig) -> Result<Self> {
        TokenUrl::new(config.token_url.clone())
            .map_err(|e| Error::InvalidInput(format!("Invalid token URL: {}", e)))?;

        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }
}

#[async_trait]
impl TokenExchanger for OAuthExchanger {
    async fn exchange(&self) -> Result<IssuedToken> {
        let token_url = TokenUrl::new(self.config.token_url.clone())
            .map_err(|e| Error::InvalidInput(format!("Invalid token URL: {}", e)))?;

        let client = BasicClient::new(ClientId::new(self.config.client_id.clone()))
            .set_client_secret(ClientSecret::new(
                self.config.client_secret.expose().to_string(),
            ))
            .set_auth_type(AuthType::RequestBody)
            .set_token_uri(token_url);

        let refresh_token = RefreshToken::new(self.config.refresh_token.expose().to_string());
        let token_result = client
            .exchange_refresh_token(&refresh_token)
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Authentication(format!("Token refresh failed: {}", e)))?;

        let access_token = token_result.access_token().secret().clone();
        if access_token.is_empty() {
            return Err(Error::Authentication(
                "Token endpoint returned an empty access token".to_string(),
            ));
        }

        Ok(IssuedToken {
            access_token,
            expires_in: token_result.expires_in(),
        })
    }
}

/// Token manager that refreshes the access token only when it expired.
pub struct TokenManager {
    exchanger: Arc<dyn TokenExchanger>,
    margin: Duration,
    session: RwLock<Option<CredentialSession>>,
}

impl TokenManager {
    /// Create a token manager with no cached session.
    ///
    /// `margin` is subtracted from every advertised token lifetime so that
    /// tokens are dropped before they can expire mid-flight.
    pub fn new(exchanger: Arc<dyn TokenExchanger>, margin: std::time::Duration) -> Self {
        Self {
            exchanger,
            margin: Duration::from_std(margin).unwrap_or(Duration::MAX),
            session: RwLock::new(None),
        }
    }

    /// Get a valid access token, exchanging credentials if necessary.
    ///
    /// # Postconditions
    /// - Returns a token whose session is valid at call time
    ///
    /// # Errors
    /// - `Error::Authentication` if the exchange failed; the cached
    ///   session is left empty
    pub async fn get_access_token(&self) -> Result<String> {
        {
            let session = self.session.read().await;
            if let Some(current) = session.as_ref().filter(|s| s.is_valid()) {
                return Ok(current.access_token.clone());
            }
        }

        let mut session = self.session.write().await;

        // Another caller may have refreshed while we waited for the lock
        if let Some(current) = session.as_ref().filter(|s| s.is_valid()) {
            return Ok(current.access_token.clone());
        }

        *session = None;
        tracing::info!("Refreshing expired access token");

        let issued = self.exchanger.exchange().await.map_err(|e| {
            tracing::warn!(error = %e, "Credential exchange failed");
            match e {
                Error::Authentication(_) => e,
                other => Error::Authentication(other.to_string()),
            }
        })?;

        let now = Utc::now();
        let lifetime = issued.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME);
        let expires_at = Duration::from_std(lifetime)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .and_then(|expiry| expiry.checked_sub_signed(self.margin))
            .ok_or_else(|| {
                Error::Authentication(format!(
                    "Token expiry out of range for a {}s lifetime",
                    lifetime.as_secs()
                ))
            })?;

        if expires_at <= now {
            tracing::warn!(
                lifetime_secs = lifetime.as_secs(),
                margin_secs = self.margin.num_seconds(),
                "Token lifetime does not exceed the expiry margin"
            );
        }

        let fresh = CredentialSession {
            access_token: issued.access_token,
            expires_at,
        };

        tracing::debug!(expires_at = %fresh.expires_at, "Access token refreshed");

        let token = fresh.access_token.clone();
        *session = Some(fresh);
        Ok(token)
    }

    /// Get a snapshot of the cached session.
    pub async fn session(&self) -> Option<CredentialSession> {
        self.session.read().await.clone()
    }

    /// Replace the cached session (e.g., to warm-start from a known token).
    pub async fn update_session(&self, session: CredentialSession) {
        *self.session.write().await = Some(session);
    }
}
