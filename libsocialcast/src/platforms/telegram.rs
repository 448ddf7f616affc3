//! Telegram adapter
//!
//! No OAuth at all: the process owns one bot credential, and "connecting"
//! registers a caller-supplied chat or channel id against it. The stored
//! account carries the chat id as its remote identity and no tokens; the bot
//! token never enters the store. There is no refresh concept, and the bot API
//! exposes no channel history, so fetch-recent is an empty envelope.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::config::TelegramConfig;
use crate::error::{OAuthError, PublishError, Result};
use crate::platforms::{network_error, SocialPlatformClient};
use crate::types::{
    ConnectedAccount, PendingAuthorization, PostContent, PublishOutcome, PublishedItem,
    RemoteIdentity, SocialPlatform, TokenGrant,
};

const PLATFORM: SocialPlatform = SocialPlatform::Telegram;

pub struct TelegramClient {
    config: TelegramConfig,
    http: reqwest::Client,
    api_base: String,
}

/// Bot API envelope: `ok` with a result, or a human-readable description.
#[derive(Deserialize)]
struct BotResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct Chat {
    id: i64,
    title: Option<String>,
    username: Option<String>,
    first_name: Option<String>,
    #[serde(rename = "type")]
    chat_type: Option<String>,
}

#[derive(Deserialize)]
struct Message {
    message_id: i64,
}

impl TelegramClient {
    pub fn new(config: TelegramConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            api_base: "https://api.telegram.org".to_string(),
        }
    }

    /// Point the bot API host elsewhere (local test servers).
    pub fn with_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.config.bot_token, method)
    }

    fn chat_id<'a>(&self, account: &'a ConnectedAccount) -> Result<&'a str> {
        account
            .platform_user_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                PublishError::Validation {
                    platform: PLATFORM,
                    reason: "no chat registered for this account".to_string(),
                }
                .into()
            })
    }

    async fn into_result<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        context: &'static str,
    ) -> Result<(T, serde_json::Value)> {
        let status = response.status();
        let payload: serde_json::Value =
            response.json().await.map_err(|e| PublishError::Transient {
                platform: PLATFORM,
                reason: format!("{context}: bad response: {e}"),
            })?;

        let envelope: BotResponse<T> =
            serde_json::from_value(payload.clone()).map_err(|e| PublishError::Transient {
                platform: PLATFORM,
                reason: format!("{context}: bad response: {e}"),
            })?;

        if !envelope.ok {
            let description = envelope
                .description
                .unwrap_or_else(|| format!("HTTP {status}"));
            tracing::warn!(context, status = %status, description = %description, "bot api call failed");
            let error = match status.as_u16() {
                401 | 403 => PublishError::Authentication {
                    platform: PLATFORM,
                    reason: format!("{context}: {description}"),
                },
                429 | 500..=599 => PublishError::Transient {
                    platform: PLATFORM,
                    reason: format!("{context}: {description}"),
                },
                _ => PublishError::Validation {
                    platform: PLATFORM,
                    reason: format!("{context}: {description}"),
                },
            };
            return Err(error.into());
        }

        let result = envelope.result.ok_or_else(|| PublishError::Transient {
            platform: PLATFORM,
            reason: format!("{context}: empty result"),
        })?;
        Ok((result, payload))
    }
}

#[async_trait]
impl SocialPlatformClient for TelegramClient {
    fn platform(&self) -> SocialPlatform {
        PLATFORM
    }

    fn supports_oauth(&self) -> bool {
        false
    }

    fn character_limit(&self) -> Option<usize> {
        Some(4096)
    }

    /// Ready once a chat is registered; no stored token is involved.
    fn account_ready(&self, account: &ConnectedAccount) -> bool {
        account
            .platform_user_id
            .as_deref()
            .is_some_and(|id| !id.is_empty())
    }

    fn authorize_url(&self, _pending: &PendingAuthorization) -> Result<Url> {
        Err(OAuthError::NotSupported {
            platform: PLATFORM,
            operation: "authorization-code connect",
        }
        .into())
    }

    async fn exchange_code(
        &self,
        _code: &str,
        _pending: &PendingAuthorization,
    ) -> Result<TokenGrant> {
        Err(OAuthError::NotSupported {
            platform: PLATFORM,
            operation: "token exchange",
        }
        .into())
    }

    async fn fetch_identity(&self, _grant: &TokenGrant) -> Result<RemoteIdentity> {
        Err(OAuthError::NotSupported {
            platform: PLATFORM,
            operation: "token-based identity lookup",
        }
        .into())
    }

    /// Verify the bot can see the chat and capture its display name.
    async fn resolve_manual_target(&self, target: &str) -> Result<RemoteIdentity> {
        if target.trim().is_empty() {
            return Err(PublishError::Validation {
                platform: PLATFORM,
                reason: "chat id cannot be empty".to_string(),
            }
            .into());
        }

        let response = self
            .http
            .get(self.method_url("getChat"))
            .query(&[("chat_id", target)])
            .send()
            .await
            .map_err(|e| network_error(PLATFORM, e))?;

        let (chat, _) = Self::into_result::<Chat>(response, "resolve chat").await?;

        let display_name = chat.title.or(chat.username).or(chat.first_name);
        let mut extras = serde_json::Map::new();
        if let Some(chat_type) = chat.chat_type {
            extras.insert("chat_type".to_string(), serde_json::Value::String(chat_type));
        }

        Ok(RemoteIdentity {
            platform_user_id: chat.id.to_string(),
            display_name,
            extras,
        })
    }

    async fn publish(
        &self,
        account: &ConnectedAccount,
        content: &PostContent,
    ) -> Result<PublishOutcome> {
        self.validate_content(content)?;
        let chat_id = self.chat_id(account)?;

        if content.media.len() > 1 {
            return Err(PublishError::Validation {
                platform: PLATFORM,
                reason: "telegram publishing supports a single attachment".to_string(),
            }
            .into());
        }

        let response = match content.media.first() {
            None => self
                .http
                .post(self.method_url("sendMessage"))
                .json(&serde_json::json!({ "chat_id": chat_id, "text": content.text }))
                .send()
                .await
                .map_err(|e| network_error(PLATFORM, e))?,
            Some(media) => {
                let (method, field) = if media.mime_type.is_video() {
                    ("sendVideo", "video")
                } else {
                    ("sendPhoto", "photo")
                };
                let part = reqwest::multipart::Part::bytes(media.bytes.clone())
                    .file_name(media.file_name.clone())
                    .mime_str(media.mime_type.as_str())
                    .map_err(|e| PublishError::Validation {
                        platform: PLATFORM,
                        reason: format!("unusable attachment '{}': {e}", media.file_name),
                    })?;
                let form = reqwest::multipart::Form::new()
                    .text("chat_id", chat_id.to_string())
                    .text("caption", content.text.clone())
                    .part(field, part);

                self.http
                    .post(self.method_url(method))
                    .multipart(form)
                    .send()
                    .await
                    .map_err(|e| network_error(PLATFORM, e))?
            }
        };

        let (message, payload) = Self::into_result::<Message>(response, "send message").await?;

        Ok(PublishOutcome {
            platform: PLATFORM,
            post_id: message.message_id.to_string(),
            payload,
        })
    }

    async fn fetch_recent(&self, _account: &ConnectedAccount) -> Result<Vec<PublishedItem>> {
        // The bot API has no way to read a channel's history back.
        tracing::debug!("telegram fetch-recent returns an empty set");
        Ok(Vec::new())
    }
}
