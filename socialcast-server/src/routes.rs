//! HTTP surface of the gateway.
//!
//! Thin handlers over the orchestrator and the publish gateway: they resolve
//! the session, parse the platform path segment, and translate library errors
//! into status codes. Callback handlers never answer with JSON or provider
//! detail; they always redirect back to the frontend with a short reason.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
    routing::{delete, get, post},
    Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, warn};

use libsocialcast::error::{ConfigError, OAuthError, PublishError, SocialcastError};
use libsocialcast::oauth::CallbackParams;
use libsocialcast::types::{MediaAttachment, MediaMimeType, PostContent, SocialPlatform};
use libsocialcast::{OAuthOrchestrator, PublishGateway};

use crate::session::SessionResolver;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<OAuthOrchestrator>,
    pub gateway: Arc<PublishGateway>,
    pub sessions: SessionResolver,
    pub frontend_base_url: String,
}

/// Build the gateway router (shared between production startup and tests).
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/social/accounts", get(accounts))
        .route("/api/social/telegram/connect", post(register_telegram))
        .route("/api/social/{platform}/connect", get(connect))
        .route("/api/social/{platform}/callback", get(callback))
        .route("/api/social/{platform}", delete(disconnect))
        .route("/api/social/{platform}/publish", post(publish))
        .route("/api/social/{platform}/recent", get(recent))
        .layer(cors)
        .with_state(state)
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn connect(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let platform = match parse_platform(&platform) {
        Ok(p) => p,
        Err(response) => return response,
    };
    let user = match require_user(&state, &headers, &jar) {
        Ok(user) => user,
        Err(response) => return response,
    };

    match state.orchestrator.begin(&user, platform).await {
        Ok(url) => Redirect::temporary(url.as_str()).into_response(),
        Err(e) => error_response(e),
    }
}

async fn callback(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    if parse_platform(&platform).is_err() {
        return redirect_with_error(&state, "unknown_platform");
    }
    let session_user = state.sessions.resolve(&headers, &jar);

    match state
        .orchestrator
        .complete(params, session_user.as_deref())
        .await
    {
        Ok(account) => Redirect::temporary(&format!(
            "{}?social=connected&platform={}",
            state.frontend_base_url, account.platform
        ))
        .into_response(),
        Err(e) => {
            warn!(platform = %platform, error = %e, "connect callback failed");
            let reason = match &e {
                SocialcastError::OAuth(oauth) => oauth.reason_slug(),
                _ => "internal",
            };
            redirect_with_error(&state, reason)
        }
    }
}

async fn disconnect(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let platform = match parse_platform(&platform) {
        Ok(p) => p,
        Err(response) => return response,
    };
    let user = match require_user(&state, &headers, &jar) {
        Ok(user) => user,
        Err(response) => return response,
    };

    match state.gateway.disconnect(&user, platform).await {
        Ok(removed) => Json(json!({ "success": true, "removed": removed })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn publish(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    jar: CookieJar,
    multipart: Multipart,
) -> Response {
    let platform = match parse_platform(&platform) {
        Ok(p) => p,
        Err(response) => return response,
    };
    let user = match require_user(&state, &headers, &jar) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let content = match read_post_content(multipart).await {
        Ok(content) => content,
        Err(response) => return response,
    };

    match state.gateway.publish(&user, platform, content).await {
        Ok(outcome) => Json(json!({
            "success": true,
            "post_id": outcome.post_id,
            "result": outcome.payload,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn recent(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let platform = match parse_platform(&platform) {
        Ok(p) => p,
        Err(response) => return response,
    };
    let user = match require_user(&state, &headers, &jar) {
        Ok(user) => user,
        Err(response) => return response,
    };

    match state.gateway.fetch_recent(&user, platform).await {
        Ok(items) => Json(json!({ "items": items })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn accounts(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let user = match require_user(&state, &headers, &jar) {
        Ok(user) => user,
        Err(response) => return response,
    };

    match state.gateway.accounts(&user).await {
        Ok(statuses) => Json(json!({ "accounts": statuses })).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
struct TelegramConnectRequest {
    chat_id: String,
}

async fn register_telegram(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    body: Json<TelegramConnectRequest>,
) -> Response {
    let user = match require_user(&state, &headers, &jar) {
        Ok(user) => user,
        Err(response) => return response,
    };

    match state
        .orchestrator
        .register_manual(&user, SocialPlatform::Telegram, &body.chat_id)
        .await
    {
        Ok(account) => Json(json!({
            "success": true,
            "platform": account.platform,
            "platform_user_id": account.platform_user_id,
            "display_name": account.display_name,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

// ── Request plumbing ─────────────────────────────────────────────────────────

fn parse_platform(raw: &str) -> Result<SocialPlatform, Response> {
    SocialPlatform::from_str(raw).map_err(|_| {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": format!("unknown platform '{raw}'") })),
        )
            .into_response()
    })
}

fn require_user(
    state: &AppState,
    headers: &HeaderMap,
    jar: &CookieJar,
) -> Result<String, Response> {
    state.sessions.resolve(headers, jar).ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "error": "authentication required" })),
        )
            .into_response()
    })
}

fn redirect_with_error(state: &AppState, reason: &str) -> Response {
    Redirect::temporary(&format!(
        "{}?social=error&reason={reason}",
        state.frontend_base_url
    ))
    .into_response()
}

/// Assemble a `PostContent` from the multipart body: a `text` field, an
/// optional `target` field, and any number of `media` file parts.
async fn read_post_content(mut multipart: Multipart) -> Result<PostContent, Response> {
    let mut content = PostContent::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(bad_request(format!("malformed multipart body: {e}"))),
        };

        // Copied out before the field is consumed below.
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("text") => {
                content.text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("unreadable text field: {e}")))?;
            }
            Some("target") => {
                let target = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("unreadable target field: {e}")))?;
                if !target.is_empty() {
                    content.target = Some(target);
                }
            }
            Some("media") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let declared_mime = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("unreadable media field: {e}")))?;

                let mime_type = declared_mime
                    .as_deref()
                    .and_then(MediaMimeType::from_mime_str)
                    .or_else(|| {
                        std::path::Path::new(&file_name)
                            .extension()
                            .and_then(|ext| ext.to_str())
                            .and_then(MediaMimeType::from_extension)
                    })
                    .ok_or_else(|| {
                        bad_request(format!("unsupported media type for '{file_name}'"))
                    })?;

                content.media.push(MediaAttachment {
                    file_name,
                    mime_type,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }

    Ok(content)
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": message })),
    )
        .into_response()
}

/// Map library failures to status codes. Server-side faults answer with a
/// generic message; the full error goes to the log only.
fn error_response(err: SocialcastError) -> Response {
    let status = match &err {
        SocialcastError::Publish(publish) => match publish {
            PublishError::NotConnected(_)
            | PublishError::UnsupportedPlatform(_)
            | PublishError::Validation { .. } => StatusCode::BAD_REQUEST,
            PublishError::ReconnectRequired { .. } | PublishError::Authentication { .. } => {
                StatusCode::CONFLICT
            }
            PublishError::Transient { .. } => StatusCode::BAD_GATEWAY,
        },
        SocialcastError::OAuth(oauth) => match oauth {
            OAuthError::UnauthenticatedCallback => StatusCode::UNAUTHORIZED,
            OAuthError::StateSigning(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        },
        SocialcastError::Config(ConfigError::PlatformNotConfigured(_)) => StatusCode::NOT_FOUND,
        SocialcastError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        SocialcastError::Store(_) | SocialcastError::Config(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let message = if status.is_server_error() {
        error!(error = %err, "request failed");
        "internal error".to_string()
    } else {
        warn!(error = %err, "request rejected");
        err.to_string()
    };

    (status, Json(json!({ "success": false, "error": message }))).into_response()
}
