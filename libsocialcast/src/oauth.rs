//! Connect-flow orchestration
//!
//! Drives every authorization attempt generically: `begin` issues state and
//! PKCE material, persists the attempt, and hands back the provider URL;
//! `complete` claims the attempt (exactly once, through the store), exchanges
//! the code through the adapter, resolves who initiated the flow, and lands a
//! connected account. `register_manual` is the connect variant for platforms
//! with a fixed process-wide credential instead of an OAuth handshake.
//!
//! Ordering between the two halves of a flow is carried entirely by the
//! stored attempt row, correlated by the `state` value. A callback whose
//! state is unknown, expired, or already claimed fails closed.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::error::{ConfigError, OAuthError, Result};
use crate::platforms::{IdentitySource, PlatformRegistry};
use crate::state_token::{random_state, PkcePair, StateSigner};
use crate::store::AccountStore;
use crate::types::{
    ConnectedAccount, PendingAuthorization, RemoteIdentity, SocialPlatform,
    PENDING_AUTHORIZATION_TTL_SECS,
};

/// Query parameters a provider sends back to the callback endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

pub struct OAuthOrchestrator {
    store: AccountStore,
    registry: Arc<PlatformRegistry>,
    signer: StateSigner,
}

impl OAuthOrchestrator {
    pub fn new(store: AccountStore, registry: Arc<PlatformRegistry>, signer: StateSigner) -> Self {
        Self {
            store,
            registry,
            signer,
        }
    }

    /// Start a connect flow: persist the attempt, return the provider URL.
    pub async fn begin(&self, user_id: &str, platform: SocialPlatform) -> Result<Url> {
        let adapter = self
            .registry
            .get(platform)
            .ok_or(ConfigError::PlatformNotConfigured(platform))?;

        if !adapter.supports_oauth() {
            return Err(OAuthError::NotSupported {
                platform,
                operation: "authorization-code connect",
            }
            .into());
        }

        let code_verifier = adapter.uses_pkce().then(|| PkcePair::generate().verifier);

        let state = match adapter.identity_source() {
            IdentitySource::SignedState => {
                self.signer
                    .issue(user_id, platform, PENDING_AUTHORIZATION_TTL_SECS)?
            }
            IdentitySource::Session => random_state(),
        };

        let pending = PendingAuthorization::new(
            platform,
            Some(user_id.to_string()),
            state,
            code_verifier,
        );
        self.store.put_pending(&pending).await?;

        let url = adapter.authorize_url(&pending)?;
        info!(user_id, platform = %platform, "authorization flow initiated");
        Ok(url)
    }

    /// Finish a connect flow from the provider's callback.
    ///
    /// `session_user` is whatever identity the front door resolved for the
    /// callback request; platforms that carry identity in the signed state
    /// ignore it entirely.
    pub async fn complete(
        &self,
        params: CallbackParams,
        session_user: Option<&str>,
    ) -> Result<ConnectedAccount> {
        // A provider-reported denial short-circuits before any token traffic.
        // The attempt is still burned so the state cannot be replayed later.
        if let Some(denial) = params.error.as_deref().filter(|e| !e.is_empty()) {
            if let Some(state) = params.state.as_deref() {
                let _ = self.store.take_pending(state).await;
            }
            return Err(OAuthError::ProviderDenied(denial.to_string()).into());
        }

        let state = params
            .state
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(OAuthError::InvalidState)?;

        // Claiming deletes the row, so a replayed redirect cannot match.
        let pending = self
            .store
            .take_pending(state)
            .await?
            .ok_or(OAuthError::InvalidState)?;

        let adapter = self
            .registry
            .get(pending.platform)
            .ok_or(ConfigError::PlatformNotConfigured(pending.platform))?;

        let user_id = match adapter.identity_source() {
            IdentitySource::SignedState => {
                // Verify the signature before trusting the embedded claim.
                self.signer.verify(state)?.sub
            }
            IdentitySource::Session => {
                let session = session_user.ok_or(OAuthError::UnauthenticatedCallback)?;
                // Tokens must never land on a different account than the one
                // that started the flow.
                if pending.user_id.as_deref().is_some_and(|u| u != session) {
                    return Err(OAuthError::InvalidState.into());
                }
                session.to_string()
            }
        };

        let code = params
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| OAuthError::ProviderDenied("missing authorization code".to_string()))?;

        let grant = adapter.exchange_code(code, &pending).await?;

        // Identity enrichment is best-effort: connectivity and profile data
        // are independent concerns, and the tokens are already good.
        let identity = match adapter.fetch_identity(&grant).await {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!(platform = %pending.platform, error = %e, "profile fetch failed after token exchange");
                None
            }
        };

        let now = chrono::Utc::now().timestamp();
        let mut account = ConnectedAccount::new(user_id, pending.platform);
        account.access_token = Some(grant.access_token.clone());
        account.refresh_token = grant.refresh_token.clone();
        account.token_expires_at = grant.expires_at(now);
        if let Some(identity) = identity {
            apply_identity(&mut account, identity);
        }

        self.store.upsert(&account).await?;
        info!(
            user_id = %account.user_id,
            platform = %account.platform,
            "account connected"
        );
        Ok(account)
    }

    /// Connect variant for static-credential platforms: no handshake, just a
    /// verified destination registered against the account.
    pub async fn register_manual(
        &self,
        user_id: &str,
        platform: SocialPlatform,
        target: &str,
    ) -> Result<ConnectedAccount> {
        let adapter = self
            .registry
            .get(platform)
            .ok_or(ConfigError::PlatformNotConfigured(platform))?;

        let identity = adapter.resolve_manual_target(target).await?;

        let mut account = ConnectedAccount::new(user_id, platform);
        apply_identity(&mut account, identity);
        self.store.upsert(&account).await?;

        info!(user_id, platform = %platform, "destination registered");
        Ok(account)
    }
}

fn apply_identity(account: &mut ConnectedAccount, identity: RemoteIdentity) {
    account.platform_user_id = Some(identity.platform_user_id);
    account.display_name = identity.display_name;
    for (key, value) in identity.extras {
        account.metadata.insert(key, value);
    }
}
