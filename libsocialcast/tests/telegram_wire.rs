//! Wire-level tests for the Telegram bot adapter and the manual-registration
//! connect path, against a local mock bot API.

use std::sync::Arc;

use mockito::Matcher;

use libsocialcast::config::TelegramConfig;
use libsocialcast::error::{PublishError, SocialcastError};
use libsocialcast::platforms::telegram::TelegramClient;
use libsocialcast::platforms::PlatformRegistry;
use libsocialcast::state_token::StateSigner;
use libsocialcast::types::{PostContent, SocialPlatform};
use libsocialcast::{AccountStore, OAuthOrchestrator, PublishGateway};

const BOT_TOKEN: &str = "12345:bot-token";

async fn harness(server: &mockito::Server) -> (OAuthOrchestrator, PublishGateway, AccountStore) {
    let store = AccountStore::in_memory().await.unwrap();
    let client = TelegramClient::new(
        TelegramConfig {
            bot_token: BOT_TOKEN.to_string(),
        },
        reqwest::Client::new(),
    )
    .with_base(server.url());

    let mut registry = PlatformRegistry::new();
    registry.register(Arc::new(client));
    let registry = Arc::new(registry);

    (
        OAuthOrchestrator::new(
            store.clone(),
            registry.clone(),
            StateSigner::new("tg-test-secret"),
        ),
        PublishGateway::new(store.clone(), registry),
        store,
    )
}

#[tokio::test]
async fn register_chat_then_send_message() {
    let mut server = mockito::Server::new_async().await;

    let get_chat = server
        .mock("GET", format!("/bot{BOT_TOKEN}/getChat").as_str())
        .match_query(Matcher::UrlEncoded("chat_id".into(), "@my_channel".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"ok":true,"result":{"id":-1001234,"title":"My Channel","type":"channel"}}"#,
        )
        .create_async()
        .await;

    let send_message = server
        .mock("POST", format!("/bot{BOT_TOKEN}/sendMessage").as_str())
        .match_body(Matcher::PartialJson(serde_json::json!({
            "chat_id": "-1001234",
            "text": "hello channel",
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok":true,"result":{"message_id":42}}"#)
        .create_async()
        .await;

    let (orchestrator, gateway, store) = harness(&server).await;

    // Connecting is a verified registration, not an OAuth handshake.
    let account = orchestrator
        .register_manual("u1", SocialPlatform::Telegram, "@my_channel")
        .await
        .unwrap();
    get_chat.assert_async().await;

    assert_eq!(account.platform_user_id.as_deref(), Some("-1001234"));
    assert_eq!(account.display_name.as_deref(), Some("My Channel"));
    // Registered accounts carry no token; the bot credential never lands in
    // the store.
    assert!(!account.has_access_token());
    let stored = store
        .get("u1", SocialPlatform::Telegram)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.metadata["chat_type"], serde_json::json!("channel"));

    let outcome = gateway
        .publish(
            "u1",
            SocialPlatform::Telegram,
            PostContent::text_only("hello channel"),
        )
        .await
        .unwrap();
    send_message.assert_async().await;
    assert_eq!(outcome.post_id, "42");
}

#[tokio::test]
async fn unknown_chat_fails_registration() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("GET", format!("/bot{BOT_TOKEN}/getChat").as_str())
        .match_query(Matcher::Any)
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#)
        .create_async()
        .await;

    let (orchestrator, _gateway, store) = harness(&server).await;

    let result = orchestrator
        .register_manual("u1", SocialPlatform::Telegram, "@nope")
        .await;
    assert!(matches!(
        result,
        Err(SocialcastError::Publish(PublishError::Validation { .. }))
    ));
    assert!(store
        .get("u1", SocialPlatform::Telegram)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn publish_before_registration_is_not_connected() {
    let server = mockito::Server::new_async().await;
    let (_orchestrator, gateway, _store) = harness(&server).await;

    let result = gateway
        .publish(
            "u1",
            SocialPlatform::Telegram,
            PostContent::text_only("early"),
        )
        .await;
    assert!(matches!(
        result,
        Err(SocialcastError::Publish(PublishError::NotConnected(_)))
    ));
}

#[tokio::test]
async fn bot_api_denial_maps_to_authentication() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("POST", format!("/bot{BOT_TOKEN}/sendMessage").as_str())
        .with_status(403)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was kicked from the channel"}"#,
        )
        .create_async()
        .await;

    let (_orchestrator, gateway, store) = harness(&server).await;

    let mut account =
        libsocialcast::types::ConnectedAccount::new("u1", SocialPlatform::Telegram);
    account.platform_user_id = Some("-1001234".to_string());
    store.upsert(&account).await.unwrap();

    // The gateway turns the adapter's authentication failure into the
    // reconnect signal.
    let result = gateway
        .publish("u1", SocialPlatform::Telegram, PostContent::text_only("x"))
        .await;
    assert!(matches!(
        result,
        Err(SocialcastError::Publish(PublishError::ReconnectRequired { .. }))
    ));
}
