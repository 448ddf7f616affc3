//! Integration tests for the HTTP surface: a real server on an ephemeral
//! port, driven with reqwest, with a scripted mock adapter behind it.

use std::net::SocketAddr;
use std::sync::Arc;

use libsocialcast::platforms::mock::MockPlatform;
use libsocialcast::platforms::PlatformRegistry;
use libsocialcast::state_token::StateSigner;
use libsocialcast::types::SocialPlatform;
use libsocialcast::{AccountStore, OAuthOrchestrator, PublishGateway};
use socialcast_server::routes::{build_router, AppState};
use socialcast_server::session::SessionResolver;

const SESSION_SECRET: &str = "http-test-session-secret";
const FRONTEND: &str = "http://frontend.example/dashboard";

async fn start_test_server(mock: MockPlatform) -> (SocketAddr, SessionResolver) {
    let store = AccountStore::in_memory().await.unwrap();
    let mut registry = PlatformRegistry::new();
    registry.register(Arc::new(mock));
    let registry = Arc::new(registry);

    let sessions = SessionResolver::new(SESSION_SECRET);
    let state = AppState {
        orchestrator: Arc::new(OAuthOrchestrator::new(
            store.clone(),
            registry.clone(),
            StateSigner::new("http-test-state-secret"),
        )),
        gateway: Arc::new(PublishGateway::new(store, registry)),
        sessions: sessions.clone(),
        frontend_base_url: FRONTEND.to_string(),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, sessions)
}

/// Client that surfaces redirects instead of following them.
fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

fn location(resp: &reqwest::Response) -> String {
    resp.headers()
        .get("location")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

fn state_from_location(loc: &str) -> String {
    let url = url::Url::parse(loc).unwrap();
    url.query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

#[tokio::test]
async fn health_endpoint_returns_json() {
    let (addr, _) = start_test_server(MockPlatform::success(SocialPlatform::Linkedin)).await;

    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn connect_requires_authentication() {
    let (addr, _) = start_test_server(MockPlatform::success(SocialPlatform::Linkedin)).await;

    let resp = client()
        .get(format!("http://{addr}/api/social/linkedin/connect"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn connect_redirects_to_provider() {
    let (addr, sessions) =
        start_test_server(MockPlatform::success(SocialPlatform::Linkedin)).await;
    let token = sessions.issue("user-1", 600).unwrap();

    let resp = client()
        .get(format!("http://{addr}/api/social/linkedin/connect"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 307);
    let loc = location(&resp);
    assert!(loc.starts_with("https://provider.example/oauth/authorize"));
    assert!(!state_from_location(&loc).is_empty());
}

#[tokio::test]
async fn full_connect_flow_lands_on_frontend() {
    let (addr, sessions) =
        start_test_server(MockPlatform::success(SocialPlatform::Linkedin)).await;
    let token = sessions.issue("user-1", 600).unwrap();
    let http = client();

    let resp = http
        .get(format!("http://{addr}/api/social/linkedin/connect"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let state = state_from_location(&location(&resp));

    // Provider redirects back with code and state.
    let resp = http
        .get(format!(
            "http://{addr}/api/social/linkedin/callback?code=good-code&state={state}"
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 307);
    let loc = location(&resp);
    assert!(loc.starts_with(FRONTEND));
    assert!(loc.contains("social=connected"));
    assert!(loc.contains("platform=linkedin"));

    // The account listing reflects the new link.
    let resp = http
        .get(format!("http://{addr}/api/social/accounts"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let json: serde_json::Value = resp.json().await.unwrap();
    let linkedin = json["accounts"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["platform"] == "linkedin")
        .unwrap();
    assert_eq!(linkedin["connected"], true);

    // A replayed callback is turned away with the CSRF reason.
    let resp = http
        .get(format!(
            "http://{addr}/api/social/linkedin/callback?code=good-code&state={state}"
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert!(location(&resp).contains("reason=invalid_state"));
}

#[tokio::test]
async fn provider_denial_redirects_with_reason() {
    let (addr, sessions) =
        start_test_server(MockPlatform::success(SocialPlatform::Linkedin)).await;
    let token = sessions.issue("user-1", 600).unwrap();

    let resp = client()
        .get(format!(
            "http://{addr}/api/social/linkedin/callback?error=access_denied&state=whatever"
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 307);
    assert!(location(&resp).contains("social=error"));
    assert!(location(&resp).contains("reason=provider_denied"));
}

#[tokio::test]
async fn publish_multipart_roundtrip() {
    let mock = MockPlatform::success(SocialPlatform::Linkedin);
    let published = mock.config().published_texts.clone();
    let (addr, sessions) = start_test_server(mock).await;
    let token = sessions.issue("user-1", 600).unwrap();
    let http = client();

    // Connect first.
    let resp = http
        .get(format!("http://{addr}/api/social/linkedin/connect"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let state = state_from_location(&location(&resp));
    http.get(format!(
        "http://{addr}/api/social/linkedin/callback?code=c&state={state}"
    ))
    .bearer_auth(&token)
    .send()
    .await
    .unwrap();

    let form = reqwest::multipart::Form::new().text("text", "published over http");
    let resp = http
        .post(format!("http://{addr}/api/social/linkedin/publish"))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["success"], true);
    assert!(json["post_id"].as_str().unwrap().starts_with("mock-"));
    assert_eq!(
        *published.lock().unwrap(),
        vec!["published over http".to_string()]
    );
}

#[tokio::test]
async fn publish_without_connection_is_rejected_cleanly() {
    let (addr, sessions) =
        start_test_server(MockPlatform::success(SocialPlatform::Linkedin)).await;
    let token = sessions.issue("user-1", 600).unwrap();

    let form = reqwest::multipart::Form::new().text("text", "nope");
    let resp = client()
        .post(format!("http://{addr}/api/social/linkedin/publish"))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("no connected"));
}

#[tokio::test]
async fn disconnect_is_idempotent_over_http() {
    let (addr, sessions) =
        start_test_server(MockPlatform::success(SocialPlatform::Linkedin)).await;
    let token = sessions.issue("user-1", 600).unwrap();
    let http = client();

    let resp = http
        .get(format!("http://{addr}/api/social/linkedin/connect"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let state = state_from_location(&location(&resp));
    http.get(format!(
        "http://{addr}/api/social/linkedin/callback?code=c&state={state}"
    ))
    .bearer_auth(&token)
    .send()
    .await
    .unwrap();

    let resp = http
        .delete(format!("http://{addr}/api/social/linkedin"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["removed"], 1);

    let resp = http
        .delete(format!("http://{addr}/api/social/linkedin"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["removed"], 0);
}

#[tokio::test]
async fn unknown_platform_is_not_found() {
    let (addr, sessions) =
        start_test_server(MockPlatform::success(SocialPlatform::Linkedin)).await;
    let token = sessions.issue("user-1", 600).unwrap();

    let resp = client()
        .get(format!("http://{addr}/api/social/myspace/connect"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
