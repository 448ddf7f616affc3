//! Error types for Socialcast

use thiserror::Error;

use crate::types::SocialPlatform;

pub type Result<T> = std::result::Result<T, SocialcastError>;

#[derive(Error, Debug)]
pub enum SocialcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Authorization error: {0}")]
    OAuth(#[from] OAuthError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("No credentials configured for {0}")]
    PlatformNotConfigured(SocialPlatform),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Failures of the connect flow, from initiation through callback completion.
#[derive(Error, Debug)]
pub enum OAuthError {
    #[error("callback state missing, expired, or already used")]
    InvalidState,

    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("no authenticated user could be resolved for the callback")]
    UnauthenticatedCallback,

    #[error("provider denied the authorization: {0}")]
    ProviderDenied(String),

    #[error("no code verifier held for a PKCE flow")]
    MissingCodeVerifier,

    #[error("{platform} does not support {operation}")]
    NotSupported {
        platform: SocialPlatform,
        operation: &'static str,
    },

    #[error("state token could not be issued: {0}")]
    StateSigning(String),
}

impl OAuthError {
    /// Short machine-readable reason, safe to hand to a browser redirect.
    pub fn reason_slug(&self) -> &'static str {
        match self {
            OAuthError::InvalidState => "invalid_state",
            OAuthError::TokenExchangeFailed(_) => "exchange_failed",
            OAuthError::UnauthenticatedCallback => "unauthenticated",
            OAuthError::ProviderDenied(_) => "provider_denied",
            OAuthError::MissingCodeVerifier => "missing_verifier",
            OAuthError::NotSupported { .. } => "not_supported",
            OAuthError::StateSigning(_) => "internal",
        }
    }
}

/// Failures of publish/fetch operations against a connected account.
#[derive(Error, Debug, Clone)]
pub enum PublishError {
    #[error("no connected {0} account")]
    NotConnected(SocialPlatform),

    #[error("no adapter is registered for {0}")]
    UnsupportedPlatform(SocialPlatform),

    #[error("{platform} no longer accepts the stored credential, reconnect required")]
    ReconnectRequired { platform: SocialPlatform },

    #[error("{platform} authentication failed: {reason}")]
    Authentication {
        platform: SocialPlatform,
        reason: String,
    },

    #[error("{platform} rejected the content: {reason}")]
    Validation {
        platform: SocialPlatform,
        reason: String,
    },

    #[error("{platform} request failed: {reason}")]
    Transient {
        platform: SocialPlatform,
        reason: String,
    },
}

impl PublishError {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PublishError::Transient { .. })
    }
}
