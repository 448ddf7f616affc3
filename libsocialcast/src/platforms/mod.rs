//! Platform adapters
//!
//! One adapter per social platform, all behind [`SocialPlatformClient`], so
//! the orchestrator and the publish gateway never branch on a concrete
//! provider. Connect flows differ per platform (authorization code, code with
//! PKCE, or a static bot credential plus a registered destination); publish
//! shapes differ even more (two-step media upload, multipart video upload,
//! JSON share payloads, bot calls). All of that stays inside the adapter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::config::Config;
use crate::error::{ConfigError, OAuthError, PublishError, Result};
use crate::types::{
    ConnectedAccount, PendingAuthorization, PostContent, PublishOutcome, PublishedItem,
    RemoteIdentity, SocialPlatform, TokenGrant,
};

pub mod linkedin;
pub mod mock;
pub mod telegram;
pub mod twitter;
pub mod youtube;

/// Where a completing callback learns which local user initiated the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// The live authenticated session presented with the callback request.
    Session,
    /// A signed claim embedded in the `state` parameter at initiation time,
    /// for providers whose redirect may arrive without a surviving session.
    SignedState,
}

/// Capability surface every platform adapter provides.
#[async_trait]
pub trait SocialPlatformClient: Send + Sync {
    fn platform(&self) -> SocialPlatform;

    /// Whether connecting runs an authorization-code flow at all. Static
    /// credential platforms register a destination instead.
    fn supports_oauth(&self) -> bool {
        true
    }

    fn uses_pkce(&self) -> bool {
        false
    }

    fn identity_source(&self) -> IdentitySource {
        IdentitySource::Session
    }

    fn character_limit(&self) -> Option<usize>;

    /// Whether a stored account row is ready for publish/fetch. The default
    /// wants a non-empty access token; static-credential adapters override.
    fn account_ready(&self, account: &ConnectedAccount) -> bool {
        account.has_access_token()
    }

    /// Check content before any network traffic happens.
    fn validate_content(&self, content: &PostContent) -> Result<()> {
        if content.text.trim().is_empty() && content.media.is_empty() {
            return Err(PublishError::Validation {
                platform: self.platform(),
                reason: "content cannot be empty".to_string(),
            }
            .into());
        }
        if let Some(limit) = self.character_limit() {
            let count = content.text.chars().count();
            if count > limit {
                return Err(PublishError::Validation {
                    platform: self.platform(),
                    reason: format!("text exceeds the {limit} character limit (got {count})"),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Provider authorization URL for a persisted attempt.
    fn authorize_url(&self, pending: &PendingAuthorization) -> Result<Url>;

    /// Exchange a callback code for tokens. PKCE adapters must refuse to make
    /// any network call when the attempt holds no verifier.
    async fn exchange_code(
        &self,
        code: &str,
        pending: &PendingAuthorization,
    ) -> Result<TokenGrant>;

    async fn refresh(&self, _account: &ConnectedAccount) -> Result<TokenGrant> {
        Err(OAuthError::NotSupported {
            platform: self.platform(),
            operation: "token refresh",
        }
        .into())
    }

    /// Fetch the remote identity behind a fresh grant. Callers treat failures
    /// here as enrichment failures, not connect failures.
    async fn fetch_identity(&self, grant: &TokenGrant) -> Result<RemoteIdentity>;

    /// Resolve a manually registered destination (static-credential
    /// platforms). The returned identity is stored in place of OAuth output.
    async fn resolve_manual_target(&self, _target: &str) -> Result<RemoteIdentity> {
        Err(OAuthError::NotSupported {
            platform: self.platform(),
            operation: "manual registration",
        }
        .into())
    }

    async fn publish(
        &self,
        account: &ConnectedAccount,
        content: &PostContent,
    ) -> Result<PublishOutcome>;

    async fn fetch_recent(&self, account: &ConnectedAccount) -> Result<Vec<PublishedItem>>;
}

// ============================================================================
// Registry
// ============================================================================

/// The set of adapters enabled by configuration.
#[derive(Default)]
pub struct PlatformRegistry {
    clients: HashMap<SocialPlatform, Arc<dyn SocialPlatformClient>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, client: Arc<dyn SocialPlatformClient>) {
        self.clients.insert(client.platform(), client);
    }

    pub fn get(&self, platform: SocialPlatform) -> Option<Arc<dyn SocialPlatformClient>> {
        self.clients.get(&platform).cloned()
    }

    pub fn platforms(&self) -> Vec<SocialPlatform> {
        let mut platforms: Vec<_> = self.clients.keys().copied().collect();
        platforms.sort_by_key(|p| p.as_str());
        platforms
    }

    /// Build adapters for every configured platform, sharing one HTTP client.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = http_client(Duration::from_secs(config.server.provider_timeout_secs))?;
        let mut registry = Self::new();

        if let Some(cfg) = &config.linkedin {
            registry.register(Arc::new(linkedin::LinkedinClient::new(
                cfg.clone(),
                http.clone(),
            )));
        }
        if let Some(cfg) = &config.twitter {
            registry.register(Arc::new(twitter::TwitterClient::new(
                cfg.clone(),
                http.clone(),
            )));
        }
        if let Some(cfg) = &config.youtube {
            registry.register(Arc::new(youtube::YoutubeClient::new(
                cfg.clone(),
                http.clone(),
            )));
        }
        if let Some(cfg) = &config.telegram {
            registry.register(Arc::new(telegram::TelegramClient::new(
                cfg.clone(),
                http.clone(),
            )));
        }

        Ok(registry)
    }
}

// ============================================================================
// Shared HTTP plumbing
// ============================================================================

/// Provider HTTP client with a bounded total timeout, so an unreachable
/// provider cannot stall a request indefinitely.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()).into())
}

/// Map a provider network error onto the publish taxonomy.
pub(crate) fn network_error(platform: SocialPlatform, err: reqwest::Error) -> PublishError {
    PublishError::Transient {
        platform,
        reason: format!("network error: {err}"),
    }
}

/// Classify a non-success provider response and log its body server-side.
/// The returned reason carries the status, never the body.
pub(crate) async fn fail_from_response(
    platform: SocialPlatform,
    response: reqwest::Response,
    context: &'static str,
) -> PublishError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(
        platform = %platform,
        context,
        status = %status,
        body = %truncate(&body, 512),
        "provider call failed"
    );

    match status.as_u16() {
        401 | 403 => PublishError::Authentication {
            platform,
            reason: format!("{context}: HTTP {status}"),
        },
        429 => PublishError::Transient {
            platform,
            reason: format!("{context}: rate limited"),
        },
        400 | 404 | 413 | 422 => PublishError::Validation {
            platform,
            reason: format!("{context}: HTTP {status}"),
        },
        _ => PublishError::Transient {
            platform,
            reason: format!("{context}: HTTP {status}"),
        },
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
