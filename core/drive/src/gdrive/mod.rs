//! Google Drive remote store for DriveGate.
//!
//! This module provides the production `RemoteStore` with:
//! - OAuth2 refresh-token exchange and access token caching
//! - Name lookups, folder creation and paginated listings
//! - Resumable upload session negotiation
//! - Streaming downloads and deletes passed through unchanged

pub mod auth;
pub mod client;

pub use auth::{
    AuthConfig, CredentialSession, IssuedToken, OAuthExchanger, TokenExchanger, TokenManager,
};
pub use client::{DriveClient, DriveEndpoints};
