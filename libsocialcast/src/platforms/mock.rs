//! Mock adapter for testing
//!
//! A scriptable [`SocialPlatformClient`] so orchestrator and gateway logic
//! can be exercised without credentials or network access. Lives in `src/`
//! rather than behind `#[cfg(test)]` so integration tests can use it too.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use url::Url;

use crate::error::{OAuthError, PublishError, Result};
use crate::platforms::{IdentitySource, SocialPlatformClient};
use crate::types::{
    ConnectedAccount, PendingAuthorization, PostContent, PublishOutcome, PublishedItem,
    RemoteIdentity, SocialPlatform, TokenGrant,
};

/// Behavior knobs and call recorders for [`MockPlatform`].
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub platform: SocialPlatform,
    pub supports_oauth: bool,
    pub uses_pkce: bool,
    pub identity_source: IdentitySource,

    /// Grant returned by a successful exchange or refresh.
    pub grant: TokenGrant,
    pub exchange_succeeds: bool,
    pub refresh_succeeds: bool,
    /// `None` makes the post-exchange profile fetch fail.
    pub identity: Option<RemoteIdentity>,
    /// Error returned by publish instead of an outcome.
    pub publish_error: Option<PublishError>,
    pub recent_items: Vec<PublishedItem>,

    pub exchange_call_count: Arc<Mutex<usize>>,
    pub refresh_call_count: Arc<Mutex<usize>>,
    pub publish_call_count: Arc<Mutex<usize>>,
    pub published_texts: Arc<Mutex<Vec<String>>>,
}

impl MockConfig {
    pub fn new(platform: SocialPlatform) -> Self {
        Self {
            platform,
            supports_oauth: true,
            uses_pkce: false,
            identity_source: IdentitySource::Session,
            grant: TokenGrant {
                access_token: "mock-access-token".to_string(),
                refresh_token: Some("mock-refresh-token".to_string()),
                expires_in: Some(3600),
            },
            exchange_succeeds: true,
            refresh_succeeds: true,
            identity: Some(RemoteIdentity {
                platform_user_id: "mock-remote-id".to_string(),
                display_name: Some("Mock Account".to_string()),
                extras: serde_json::Map::new(),
            }),
            publish_error: None,
            recent_items: Vec::new(),
            exchange_call_count: Arc::new(Mutex::new(0)),
            refresh_call_count: Arc::new(Mutex::new(0)),
            publish_call_count: Arc::new(Mutex::new(0)),
            published_texts: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

pub struct MockPlatform {
    config: MockConfig,
}

impl MockPlatform {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// An adapter where every operation succeeds.
    pub fn success(platform: SocialPlatform) -> Self {
        Self::new(MockConfig::new(platform))
    }

    /// A PKCE adapter (exchange demands the stored verifier).
    pub fn pkce(platform: SocialPlatform) -> Self {
        let mut config = MockConfig::new(platform);
        config.uses_pkce = true;
        Self::new(config)
    }

    /// An adapter whose identity arrives through the signed state payload.
    pub fn signed_state(platform: SocialPlatform) -> Self {
        let mut config = MockConfig::new(platform);
        config.identity_source = IdentitySource::SignedState;
        Self::new(config)
    }

    /// An adapter whose token exchange fails.
    pub fn exchange_failure(platform: SocialPlatform) -> Self {
        let mut config = MockConfig::new(platform);
        config.exchange_succeeds = false;
        Self::new(config)
    }

    /// An adapter whose publish fails with the given error.
    pub fn publish_failure(platform: SocialPlatform, error: PublishError) -> Self {
        let mut config = MockConfig::new(platform);
        config.publish_error = Some(error);
        Self::new(config)
    }

    /// An adapter whose post-exchange profile fetch fails.
    pub fn without_identity(platform: SocialPlatform) -> Self {
        let mut config = MockConfig::new(platform);
        config.identity = None;
        Self::new(config)
    }

    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    pub fn exchange_call_count(&self) -> usize {
        *self.config.exchange_call_count.lock().unwrap()
    }

    pub fn refresh_call_count(&self) -> usize {
        *self.config.refresh_call_count.lock().unwrap()
    }

    pub fn publish_call_count(&self) -> usize {
        *self.config.publish_call_count.lock().unwrap()
    }

    pub fn published_texts(&self) -> Vec<String> {
        self.config.published_texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SocialPlatformClient for MockPlatform {
    fn platform(&self) -> SocialPlatform {
        self.config.platform
    }

    fn supports_oauth(&self) -> bool {
        self.config.supports_oauth
    }

    fn uses_pkce(&self) -> bool {
        self.config.uses_pkce
    }

    fn identity_source(&self) -> IdentitySource {
        self.config.identity_source
    }

    fn character_limit(&self) -> Option<usize> {
        None
    }

    fn authorize_url(&self, pending: &PendingAuthorization) -> Result<Url> {
        let mut url = Url::parse("https://provider.example/oauth/authorize")
            .map_err(|e| crate::error::SocialcastError::InvalidInput(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("state", &pending.state);
        if self.config.uses_pkce {
            let verifier = pending
                .code_verifier
                .as_deref()
                .ok_or(OAuthError::MissingCodeVerifier)?;
            url.query_pairs_mut()
                .append_pair(
                    "code_challenge",
                    &crate::state_token::PkcePair::challenge_of(verifier),
                )
                .append_pair("code_challenge_method", "S256");
        }
        Ok(url)
    }

    async fn exchange_code(
        &self,
        _code: &str,
        pending: &PendingAuthorization,
    ) -> Result<TokenGrant> {
        // The verifier check precedes the (counted) exchange call, mirroring
        // the real PKCE adapters: no verifier, no token traffic.
        if self.config.uses_pkce && pending.code_verifier.is_none() {
            return Err(OAuthError::MissingCodeVerifier.into());
        }

        *self.config.exchange_call_count.lock().unwrap() += 1;

        if self.config.exchange_succeeds {
            Ok(self.config.grant.clone())
        } else {
            Err(OAuthError::TokenExchangeFailed("mock exchange refused".to_string()).into())
        }
    }

    async fn refresh(&self, _account: &ConnectedAccount) -> Result<TokenGrant> {
        *self.config.refresh_call_count.lock().unwrap() += 1;

        if self.config.refresh_succeeds {
            Ok(self.config.grant.clone())
        } else {
            Err(PublishError::Authentication {
                platform: self.config.platform,
                reason: "mock refresh refused".to_string(),
            }
            .into())
        }
    }

    async fn fetch_identity(&self, _grant: &TokenGrant) -> Result<RemoteIdentity> {
        self.config.identity.clone().ok_or_else(|| {
            PublishError::Transient {
                platform: self.config.platform,
                reason: "mock profile endpoint unavailable".to_string(),
            }
            .into()
        })
    }

    async fn publish(
        &self,
        _account: &ConnectedAccount,
        content: &PostContent,
    ) -> Result<PublishOutcome> {
        self.validate_content(content)?;

        *self.config.publish_call_count.lock().unwrap() += 1;

        if let Some(error) = &self.config.publish_error {
            return Err(error.clone().into());
        }

        self.config
            .published_texts
            .lock()
            .unwrap()
            .push(content.text.clone());

        let post_id = format!("mock-{}", uuid::Uuid::new_v4());
        Ok(PublishOutcome {
            platform: self.config.platform,
            post_id: post_id.clone(),
            payload: serde_json::json!({ "id": post_id }),
        })
    }

    async fn fetch_recent(&self, _account: &ConnectedAccount) -> Result<Vec<PublishedItem>> {
        Ok(self.config.recent_items.clone())
    }
}
