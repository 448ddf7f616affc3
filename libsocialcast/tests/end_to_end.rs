//! Full journey tests: connect, publish, list, disconnect.

use std::sync::Arc;

use libsocialcast::error::{OAuthError, PublishError, SocialcastError};
use libsocialcast::oauth::CallbackParams;
use libsocialcast::platforms::mock::MockPlatform;
use libsocialcast::platforms::PlatformRegistry;
use libsocialcast::state_token::StateSigner;
use libsocialcast::types::{PostContent, SocialPlatform};
use libsocialcast::{AccountStore, OAuthOrchestrator, PublishGateway};

struct Harness {
    orchestrator: OAuthOrchestrator,
    gateway: PublishGateway,
    store: AccountStore,
}

async fn harness(mock: MockPlatform) -> Harness {
    let store = AccountStore::in_memory().await.unwrap();
    let mut registry = PlatformRegistry::new();
    registry.register(Arc::new(mock));
    let registry = Arc::new(registry);

    Harness {
        orchestrator: OAuthOrchestrator::new(
            store.clone(),
            registry.clone(),
            StateSigner::new("e2e-state-secret"),
        ),
        gateway: PublishGateway::new(store.clone(), registry),
        store,
    }
}

fn state_of(url: &url::Url) -> String {
    url.query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

fn callback(code: &str, state: &str) -> CallbackParams {
    CallbackParams {
        code: Some(code.to_string()),
        state: Some(state.to_string()),
        error: None,
    }
}

#[tokio::test]
async fn connect_publish_disconnect_journey() {
    let h = harness(MockPlatform::pkce(SocialPlatform::Twitter)).await;

    // Connect.
    let url = h
        .orchestrator
        .begin("user-1", SocialPlatform::Twitter)
        .await
        .unwrap();
    let state = state_of(&url);
    let account = h
        .orchestrator
        .complete(callback("auth-code", &state), Some("user-1"))
        .await
        .unwrap();
    assert!(account.has_access_token());

    // Publish through the freshly connected account.
    let outcome = h
        .gateway
        .publish(
            "user-1",
            SocialPlatform::Twitter,
            PostContent::text_only("first post"),
        )
        .await
        .unwrap();
    assert!(!outcome.post_id.is_empty());

    // The dashboard listing shows the link.
    let statuses = h.gateway.accounts("user-1").await.unwrap();
    let twitter = statuses
        .iter()
        .find(|s| s.platform == SocialPlatform::Twitter)
        .unwrap();
    assert!(twitter.connected);

    // Disconnect is idempotent: one row, then zero, both successful.
    assert_eq!(
        h.gateway
            .disconnect("user-1", SocialPlatform::Twitter)
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        h.gateway
            .disconnect("user-1", SocialPlatform::Twitter)
            .await
            .unwrap(),
        0
    );

    // And publishing afterwards finds nothing.
    let result = h
        .gateway
        .publish(
            "user-1",
            SocialPlatform::Twitter,
            PostContent::text_only("ghost"),
        )
        .await;
    assert!(matches!(
        result,
        Err(SocialcastError::Publish(PublishError::NotConnected(_)))
    ));
}

#[tokio::test]
async fn replayed_callback_cannot_reconnect() {
    let h = harness(MockPlatform::success(SocialPlatform::Linkedin)).await;

    let url = h
        .orchestrator
        .begin("user-1", SocialPlatform::Linkedin)
        .await
        .unwrap();
    let state = state_of(&url);

    h.orchestrator
        .complete(callback("code", &state), Some("user-1"))
        .await
        .unwrap();

    // Duplicate redirect, same state: rejected, account untouched.
    let replay = h
        .orchestrator
        .complete(callback("code", &state), Some("user-1"))
        .await;
    assert!(matches!(
        replay,
        Err(SocialcastError::OAuth(OAuthError::InvalidState))
    ));
    assert_eq!(h.store.list("user-1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn second_connect_overwrites_first() {
    let h = harness(MockPlatform::success(SocialPlatform::Linkedin)).await;

    for _ in 0..2 {
        let url = h
            .orchestrator
            .begin("user-1", SocialPlatform::Linkedin)
            .await
            .unwrap();
        let state = state_of(&url);
        h.orchestrator
            .complete(callback("code", &state), Some("user-1"))
            .await
            .unwrap();
    }

    let accounts = h.store.list("user-1").await.unwrap();
    assert_eq!(accounts.len(), 1);
}

#[tokio::test]
async fn signed_state_flow_survives_missing_session() {
    let h = harness(MockPlatform::signed_state(SocialPlatform::Youtube)).await;

    let url = h
        .orchestrator
        .begin("user-9", SocialPlatform::Youtube)
        .await
        .unwrap();
    let state = state_of(&url);

    // The redirect came back with no session cookie at all.
    let account = h
        .orchestrator
        .complete(callback("code", &state), None)
        .await
        .unwrap();
    assert_eq!(account.user_id, "user-9");
}
