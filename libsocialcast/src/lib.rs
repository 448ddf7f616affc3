//! Socialcast - social credential and publishing gateway
//!
//! Core library for linking a dashboard user's external social accounts
//! (authorization-code flows, PKCE variants, or static bot credentials) and
//! publishing through them behind one platform-neutral interface.

pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod oauth;
pub mod platforms;
pub mod state_token;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, SocialcastError};
pub use gateway::PublishGateway;
pub use oauth::{CallbackParams, OAuthOrchestrator};
pub use platforms::PlatformRegistry;
pub use state_token::StateSigner;
pub use store::AccountStore;
pub use types::{ConnectedAccount, PendingAuthorization, PostContent, SocialPlatform};
