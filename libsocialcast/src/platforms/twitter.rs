//! Twitter/X adapter
//!
//! Authorization code with PKCE (S256). The token endpoint wants HTTP Basic
//! client credentials plus the original code verifier. Publishing with media
//! is two-step: upload every attachment to the media endpoint first, then
//! reference all returned ids in a single create-tweet call.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::config::TwitterConfig;
use crate::error::{OAuthError, PublishError, Result, SocialcastError};
use crate::platforms::{fail_from_response, network_error, SocialPlatformClient};
use crate::state_token::PkcePair;
use crate::types::{
    ConnectedAccount, MediaAttachment, PendingAuthorization, PostContent, PublishOutcome,
    PublishedItem, RemoteIdentity, SocialPlatform, TokenGrant,
};

const SCOPES: &str = "tweet.read tweet.write users.read offline.access";
const PLATFORM: SocialPlatform = SocialPlatform::Twitter;

pub struct TwitterClient {
    config: TwitterConfig,
    http: reqwest::Client,
    auth_base: String,
    api_base: String,
    upload_base: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct MediaUploadResponse {
    media_id_string: String,
}

#[derive(Deserialize)]
struct UserEnvelope {
    data: UserData,
}

#[derive(Deserialize)]
struct UserData {
    id: String,
    name: String,
    username: String,
}

#[derive(Deserialize)]
struct TweetEnvelope {
    data: TweetData,
}

#[derive(Deserialize)]
struct TweetData {
    id: String,
}

#[derive(Deserialize)]
struct TimelineEnvelope {
    #[serde(default)]
    data: Vec<TimelineTweet>,
}

#[derive(Deserialize)]
struct TimelineTweet {
    id: String,
    text: Option<String>,
    created_at: Option<String>,
}

impl TwitterClient {
    pub fn new(config: TwitterConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            auth_base: "https://twitter.com".to_string(),
            api_base: "https://api.twitter.com".to_string(),
            upload_base: "https://upload.twitter.com".to_string(),
        }
    }

    /// Point the API and upload hosts elsewhere (local test servers).
    pub fn with_bases(mut self, api_base: impl Into<String>, upload_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.upload_base = upload_base.into();
        self
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenGrant> {
        let response = self
            .http
            .post(format!("{}/2/oauth2/token", self.api_base))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(params)
            .send()
            .await
            .map_err(|e| OAuthError::TokenExchangeFailed(format!("network error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "twitter token endpoint refused");
            return Err(OAuthError::TokenExchangeFailed(format!("HTTP {status}")).into());
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::TokenExchangeFailed(format!("bad token response: {e}")))?;

        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
        })
    }

    async fn me(&self, access_token: &str) -> Result<RemoteIdentity> {
        let response = self
            .http
            .get(format!("{}/2/users/me", self.api_base))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| network_error(PLATFORM, e))?;

        if !response.status().is_success() {
            return Err(fail_from_response(PLATFORM, response, "fetch profile").await.into());
        }

        let user: UserEnvelope = response.json().await.map_err(|e| PublishError::Transient {
            platform: PLATFORM,
            reason: format!("bad profile response: {e}"),
        })?;

        let mut extras = serde_json::Map::new();
        extras.insert(
            "username".to_string(),
            serde_json::Value::String(user.data.username),
        );

        Ok(RemoteIdentity {
            platform_user_id: user.data.id,
            display_name: Some(user.data.name),
            extras,
        })
    }

    async fn upload_media(&self, access_token: &str, media: &MediaAttachment) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(media.bytes.clone())
            .file_name(media.file_name.clone())
            .mime_str(media.mime_type.as_str())
            .map_err(|e| PublishError::Validation {
                platform: PLATFORM,
                reason: format!("unusable attachment '{}': {e}", media.file_name),
            })?;
        let form = reqwest::multipart::Form::new().part("media", part);

        let response = self
            .http
            .post(format!("{}/1.1/media/upload.json", self.upload_base))
            .bearer_auth(access_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| network_error(PLATFORM, e))?;

        if !response.status().is_success() {
            return Err(fail_from_response(PLATFORM, response, "media upload").await.into());
        }

        let upload: MediaUploadResponse =
            response.json().await.map_err(|e| PublishError::Transient {
                platform: PLATFORM,
                reason: format!("bad media upload response: {e}"),
            })?;

        Ok(upload.media_id_string)
    }

    fn access_token<'a>(&self, account: &'a ConnectedAccount) -> Result<&'a str> {
        account
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                PublishError::Authentication {
                    platform: PLATFORM,
                    reason: "no access token stored".to_string(),
                }
                .into()
            })
    }
}

#[async_trait]
impl SocialPlatformClient for TwitterClient {
    fn platform(&self) -> SocialPlatform {
        PLATFORM
    }

    fn uses_pkce(&self) -> bool {
        true
    }

    fn character_limit(&self) -> Option<usize> {
        Some(280)
    }

    fn authorize_url(&self, pending: &PendingAuthorization) -> Result<Url> {
        let verifier = pending
            .code_verifier
            .as_deref()
            .ok_or(OAuthError::MissingCodeVerifier)?;

        let mut url = Url::parse(&format!("{}/i/oauth2/authorize", self.auth_base))
            .map_err(|e| SocialcastError::InvalidInput(format!("bad authorize endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", SCOPES)
            .append_pair("state", &pending.state)
            .append_pair("code_challenge", &PkcePair::challenge_of(verifier))
            .append_pair("code_challenge_method", "S256");

        Ok(url)
    }

    async fn exchange_code(
        &self,
        code: &str,
        pending: &PendingAuthorization,
    ) -> Result<TokenGrant> {
        // No verifier means the attempt cannot complete; refuse before any
        // token traffic.
        let verifier = pending
            .code_verifier
            .as_deref()
            .ok_or(OAuthError::MissingCodeVerifier)?;

        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.config.redirect_uri),
            ("code_verifier", verifier),
        ])
        .await
    }

    async fn refresh(&self, account: &ConnectedAccount) -> Result<TokenGrant> {
        let refresh_token = account
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PublishError::Authentication {
                platform: PLATFORM,
                reason: "no refresh token stored".to_string(),
            })?;

        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn fetch_identity(&self, grant: &TokenGrant) -> Result<RemoteIdentity> {
        self.me(&grant.access_token).await
    }

    async fn publish(
        &self,
        account: &ConnectedAccount,
        content: &PostContent,
    ) -> Result<PublishOutcome> {
        self.validate_content(content)?;
        let token = self.access_token(account)?;

        // Step one: every attachment becomes a media id.
        let mut media_ids = Vec::with_capacity(content.media.len());
        for media in &content.media {
            media_ids.push(self.upload_media(token, media).await?);
        }

        // Step two: exactly one create call referencing all of them.
        let mut body = serde_json::json!({ "text": content.text });
        if !media_ids.is_empty() {
            body["media"] = serde_json::json!({ "media_ids": media_ids });
        }

        let response = self
            .http
            .post(format!("{}/2/tweets", self.api_base))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(PLATFORM, e))?;

        if !response.status().is_success() {
            return Err(fail_from_response(PLATFORM, response, "create tweet").await.into());
        }

        let payload: serde_json::Value =
            response.json().await.map_err(|e| PublishError::Transient {
                platform: PLATFORM,
                reason: format!("bad create response: {e}"),
            })?;
        let tweet: TweetEnvelope =
            serde_json::from_value(payload.clone()).map_err(|e| PublishError::Transient {
                platform: PLATFORM,
                reason: format!("bad create response: {e}"),
            })?;

        Ok(PublishOutcome {
            platform: PLATFORM,
            post_id: tweet.data.id,
            payload,
        })
    }

    async fn fetch_recent(&self, account: &ConnectedAccount) -> Result<Vec<PublishedItem>> {
        let token = self.access_token(account)?;
        let user_id = match &account.platform_user_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => self.me(token).await?.platform_user_id,
        };

        let response = self
            .http
            .get(format!("{}/2/users/{}/tweets", self.api_base, user_id))
            .query(&[("max_results", "10"), ("tweet.fields", "created_at")])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| network_error(PLATFORM, e))?;

        if !response.status().is_success() {
            return Err(fail_from_response(PLATFORM, response, "fetch timeline").await.into());
        }

        let timeline: TimelineEnvelope =
            response.json().await.map_err(|e| PublishError::Transient {
                platform: PLATFORM,
                reason: format!("bad timeline response: {e}"),
            })?;

        Ok(timeline
            .data
            .into_iter()
            .map(|tweet| PublishedItem {
                url: Some(format!("https://twitter.com/i/web/status/{}", tweet.id)),
                id: tweet.id,
                text: tweet.text,
                created_at: tweet.created_at,
            })
            .collect())
    }
}
