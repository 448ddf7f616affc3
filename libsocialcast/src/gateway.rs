//! Publish gateway
//!
//! The single entry point callers use to post or read through a connected
//! account. Resolves the stored credential, proactively refreshes a token
//! about to expire (one attempt, never a loop), delegates to the platform
//! adapter, and translates adapter failures into the caller-facing taxonomy.
//! Provider result payloads pass through unchanged.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{PublishError, Result, SocialcastError};
use crate::platforms::{PlatformRegistry, SocialPlatformClient};
use crate::store::AccountStore;
use crate::types::{
    AccountStatus, ConnectedAccount, PostContent, PublishOutcome, PublishedItem, SocialPlatform,
};

/// Refresh when the stored token expires within this many seconds.
const REFRESH_MARGIN_SECS: i64 = 60;

pub struct PublishGateway {
    store: AccountStore,
    registry: Arc<PlatformRegistry>,
}

impl PublishGateway {
    pub fn new(store: AccountStore, registry: Arc<PlatformRegistry>) -> Self {
        Self { store, registry }
    }

    /// Post `content` as the caller's connected account on `platform`.
    pub async fn publish(
        &self,
        user_id: &str,
        platform: SocialPlatform,
        content: PostContent,
    ) -> Result<PublishOutcome> {
        let (adapter, account) = self.resolve(user_id, platform).await?;
        let account = self.refresh_if_expiring(&adapter, account).await?;

        // Run the provider call on its own task: once submitted, most
        // platforms cannot cancel a post, so a disconnecting caller must not
        // abort it mid-flight. The result is simply discarded with the
        // response if nobody is left to read it.
        let task_adapter = adapter.clone();
        let handle =
            tokio::spawn(async move { task_adapter.publish(&account, &content).await });
        let result = handle.await.map_err(|e| PublishError::Transient {
            platform,
            reason: format!("publish task failed: {e}"),
        })?;

        match translate_auth_failure(result, platform) {
            Ok(outcome) => {
                info!(user_id, platform = %platform, post_id = %outcome.post_id, "published");
                Ok(outcome)
            }
            Err(e) => Err(e),
        }
    }

    /// The connected account's recent published items, normalized.
    pub async fn fetch_recent(
        &self,
        user_id: &str,
        platform: SocialPlatform,
    ) -> Result<Vec<PublishedItem>> {
        let (adapter, account) = self.resolve(user_id, platform).await?;
        let account = self.refresh_if_expiring(&adapter, account).await?;

        translate_auth_failure(adapter.fetch_recent(&account).await, platform)
    }

    /// Connection status per platform for the caller's dashboard.
    pub async fn accounts(&self, user_id: &str) -> Result<Vec<AccountStatus>> {
        let stored = self.store.list(user_id).await?;

        let mut statuses: Vec<AccountStatus> = stored
            .iter()
            .map(|account| {
                let connected = match self.registry.get(account.platform) {
                    Some(adapter) => adapter.account_ready(account),
                    None => account.has_access_token(),
                };
                AccountStatus {
                    platform: account.platform,
                    connected,
                    platform_user_id: account.platform_user_id.clone(),
                    display_name: account.display_name.clone(),
                }
            })
            .collect();

        // Platforms that are configured but not linked yet still show up.
        for platform in self.registry.platforms() {
            if !statuses.iter().any(|s| s.platform == platform) {
                statuses.push(AccountStatus {
                    platform,
                    connected: false,
                    platform_user_id: None,
                    display_name: None,
                });
            }
        }
        statuses.sort_by_key(|s| s.platform.as_str());

        Ok(statuses)
    }

    /// Remove the stored link. Zero rows removed is success, not an error.
    pub async fn disconnect(&self, user_id: &str, platform: SocialPlatform) -> Result<u64> {
        let removed = self.store.delete(user_id, platform).await?;
        info!(user_id, platform = %platform, removed, "account disconnected");
        Ok(removed)
    }

    async fn resolve(
        &self,
        user_id: &str,
        platform: SocialPlatform,
    ) -> Result<(Arc<dyn SocialPlatformClient>, ConnectedAccount)> {
        let adapter = self
            .registry
            .get(platform)
            .ok_or(PublishError::UnsupportedPlatform(platform))?;

        let account = self
            .store
            .get(user_id, platform)
            .await?
            .ok_or(PublishError::NotConnected(platform))?;

        if !adapter.account_ready(&account) {
            return Err(PublishError::NotConnected(platform).into());
        }

        Ok((adapter, account))
    }

    /// Proactive refresh policy: one attempt, just before expiry, only when a
    /// refresh token exists. A failed refresh is a reconnect signal, not
    /// something to retry against a possibly revoked grant.
    async fn refresh_if_expiring(
        &self,
        adapter: &Arc<dyn SocialPlatformClient>,
        account: ConnectedAccount,
    ) -> Result<ConnectedAccount> {
        let now = chrono::Utc::now().timestamp();
        let expiring = account
            .token_expires_at
            .is_some_and(|t| t - now < REFRESH_MARGIN_SECS);
        let has_refresh = account
            .refresh_token
            .as_deref()
            .is_some_and(|t| !t.is_empty());

        if !expiring || !has_refresh {
            return Ok(account);
        }

        match adapter.refresh(&account).await {
            Ok(grant) => {
                let mut updated = account;
                updated.access_token = Some(grant.access_token.clone());
                // Providers that rotate refresh tokens send a new one; the
                // rest keep the stored token valid.
                if grant.refresh_token.is_some() {
                    updated.refresh_token = grant.refresh_token.clone();
                }
                updated.token_expires_at = grant.expires_at(now);
                updated.updated_at = now;
                self.store.upsert(&updated).await?;
                info!(user_id = %updated.user_id, platform = %updated.platform, "token refreshed");
                Ok(updated)
            }
            Err(e) => {
                warn!(platform = %account.platform, error = %e, "token refresh failed");
                Err(PublishError::ReconnectRequired {
                    platform: account.platform,
                }
                .into())
            }
        }
    }
}

/// An authentication failure from an adapter means the stored grant is no
/// longer good; the caller has to re-run the connect flow. No retry here.
fn translate_auth_failure<T>(result: Result<T>, platform: SocialPlatform) -> Result<T> {
    match result {
        Err(SocialcastError::Publish(PublishError::Authentication { reason, .. })) => {
            warn!(platform = %platform, reason = %reason, "stored credential rejected");
            Err(PublishError::ReconnectRequired { platform }.into())
        }
        other => other,
    }
}
