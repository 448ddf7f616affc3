//! YouTube/Google adapter
//!
//! Authorization code flow with offline access. The redirect back from Google
//! may arrive without a usable session cookie, so the initiating user rides
//! inside the signed `state` payload instead of the session. Publishing is a
//! multipart/related video upload; the post text becomes the video title and
//! description.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::config::YoutubeConfig;
use crate::error::{OAuthError, PublishError, Result, SocialcastError};
use crate::platforms::{
    fail_from_response, network_error, IdentitySource, SocialPlatformClient,
};
use crate::types::{
    ConnectedAccount, PendingAuthorization, PostContent, PublishOutcome, PublishedItem,
    RemoteIdentity, SocialPlatform, TokenGrant,
};

const SCOPES: &str =
    "https://www.googleapis.com/auth/youtube.upload https://www.googleapis.com/auth/youtube.readonly";
const UPLOAD_BOUNDARY: &str = "socialcast_video_upload";
const PLATFORM: SocialPlatform = SocialPlatform::Youtube;

pub struct YoutubeClient {
    config: YoutubeConfig,
    http: reqwest::Client,
    auth_base: String,
    token_base: String,
    api_base: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    items: Vec<Channel>,
}

#[derive(Deserialize)]
struct Channel {
    id: String,
    snippet: ChannelSnippet,
}

#[derive(Deserialize)]
struct ChannelSnippet {
    title: String,
}

#[derive(Deserialize)]
struct VideoResource {
    id: String,
}

#[derive(Deserialize)]
struct SearchListResponse {
    #[serde(default)]
    items: Vec<SearchResult>,
}

#[derive(Deserialize)]
struct SearchResult {
    id: SearchResultId,
    snippet: Option<SearchSnippet>,
}

#[derive(Deserialize)]
struct SearchResultId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Deserialize)]
struct SearchSnippet {
    title: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
}

impl YoutubeClient {
    pub fn new(config: YoutubeConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            auth_base: "https://accounts.google.com".to_string(),
            token_base: "https://oauth2.googleapis.com".to_string(),
            api_base: "https://www.googleapis.com".to_string(),
        }
    }

    /// Point the token and API hosts elsewhere (local test servers).
    pub fn with_bases(mut self, token_base: impl Into<String>, api_base: impl Into<String>) -> Self {
        self.token_base = token_base.into();
        self.api_base = api_base.into();
        self
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenGrant> {
        let response = self
            .http
            .post(format!("{}/token", self.token_base))
            .form(params)
            .send()
            .await
            .map_err(|e| OAuthError::TokenExchangeFailed(format!("network error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "google token endpoint refused");
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

    /// Build a multipart/related body: JSON metadata part, then video bytes.
    fn upload_body(metadata: &serde_json::Value, video: &[u8], mime: &str) -> Vec<u8> {
        let mut body = Vec::with_capacity(video.len() + 512);
        body.extend_from_slice(format!("--{UPLOAD_BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.extend_from_slice(metadata.to_string().as_bytes());
        body.extend_from_slice(format!("\r\n--{UPLOAD_BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(format!("Content-Type: {mime}\r\n\r\n").as_bytes());
        body.extend_from_slice(video);
        body.extend_from_slice(format!("\r\n--{UPLOAD_BOUNDARY}--\r\n").as_bytes());
        body
    }
}

#[async_trait]
impl SocialPlatformClient for YoutubeClient {
    fn platform(&self) -> SocialPlatform {
        PLATFORM
    }

    fn identity_source(&self) -> IdentitySource {
        IdentitySource::SignedState
    }

    fn character_limit(&self) -> Option<usize> {
        Some(5000)
    }

    fn validate_content(&self, content: &PostContent) -> Result<()> {
        let video = content.media.iter().find(|m| m.mime_type.is_video());
        if video.is_none() {
            return Err(PublishError::Validation {
                platform: PLATFORM,
                reason: "publishing to youtube requires a video attachment".to_string(),
            }
            .into());
        }
        if let Some(limit) = self.character_limit() {
            let count = content.text.chars().count();
            if count > limit {
                return Err(PublishError::Validation {
                    platform: PLATFORM,
                    reason: format!("description exceeds the {limit} character limit (got {count})"),
                }
                .into());
            }
        }
        Ok(())
    }

    fn authorize_url(&self, pending: &PendingAuthorization) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/o/oauth2/v2/auth", self.auth_base))
            .map_err(|e| SocialcastError::InvalidInput(format!("bad authorize endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", SCOPES)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", &pending.state);

        Ok(url)
    }

    async fn exchange_code(
        &self,
        code: &str,
        _pending: &PendingAuthorization,
    ) -> Result<TokenGrant> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", &self.config.client_id),
            ("client_secret", &self.config.client_secret),
            ("redirect_uri", &self.config.redirect_uri),
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

        // Google does not return a new refresh token here; the caller keeps
        // the stored one.
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.config.client_id),
            ("client_secret", &self.config.client_secret),
        ])
        .await
    }

    async fn fetch_identity(&self, grant: &TokenGrant) -> Result<RemoteIdentity> {
        let response = self
            .http
            .get(format!("{}/youtube/v3/channels", self.api_base))
            .query(&[("part", "snippet"), ("mine", "true")])
            .bearer_auth(&grant.access_token)
            .send()
            .await
            .map_err(|e| network_error(PLATFORM, e))?;

        if !response.status().is_success() {
            return Err(fail_from_response(PLATFORM, response, "fetch channel").await.into());
        }

        let channels: ChannelListResponse =
            response.json().await.map_err(|e| PublishError::Transient {
                platform: PLATFORM,
                reason: format!("bad channel response: {e}"),
            })?;

        let channel = channels.items.into_iter().next().ok_or_else(|| {
            PublishError::Validation {
                platform: PLATFORM,
                reason: "account has no youtube channel".to_string(),
            }
        })?;

        Ok(RemoteIdentity {
            platform_user_id: channel.id,
            display_name: Some(channel.snippet.title),
            extras: serde_json::Map::new(),
        })
    }

    async fn publish(
        &self,
        account: &ConnectedAccount,
        content: &PostContent,
    ) -> Result<PublishOutcome> {
        self.validate_content(content)?;
        let token = self.access_token(account)?;

        let video = content
            .media
            .iter()
            .find(|m| m.mime_type.is_video())
            .ok_or_else(|| PublishError::Validation {
                platform: PLATFORM,
                reason: "publishing to youtube requires a video attachment".to_string(),
            })?;

        // First line titles the video; the whole text is the description.
        let title: String = content
            .text
            .lines()
            .next()
            .unwrap_or("Untitled")
            .chars()
            .take(100)
            .collect();
        let metadata = serde_json::json!({
            "snippet": { "title": title, "description": content.text },
            "status": { "privacyStatus": "public" },
        });

        let body = Self::upload_body(&metadata, &video.bytes, video.mime_type.as_str());

        let response = self
            .http
            .post(format!("{}/upload/youtube/v3/videos", self.api_base))
            .query(&[("uploadType", "multipart"), ("part", "snippet,status")])
            .bearer_auth(token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={UPLOAD_BOUNDARY}"),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| network_error(PLATFORM, e))?;

        if !response.status().is_success() {
            return Err(fail_from_response(PLATFORM, response, "video upload").await.into());
        }

        let payload: serde_json::Value =
            response.json().await.map_err(|e| PublishError::Transient {
                platform: PLATFORM,
                reason: format!("bad upload response: {e}"),
            })?;
        let video: VideoResource =
            serde_json::from_value(payload.clone()).map_err(|e| PublishError::Transient {
                platform: PLATFORM,
                reason: format!("bad upload response: {e}"),
            })?;

        Ok(PublishOutcome {
            platform: PLATFORM,
            post_id: video.id,
            payload,
        })
    }

    async fn fetch_recent(&self, account: &ConnectedAccount) -> Result<Vec<PublishedItem>> {
        let token = self.access_token(account)?;

        let response = self
            .http
            .get(format!("{}/youtube/v3/search", self.api_base))
            .query(&[
                ("part", "snippet"),
                ("forMine", "true"),
                ("type", "video"),
                ("order", "date"),
                ("maxResults", "10"),
            ])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| network_error(PLATFORM, e))?;

        if !response.status().is_success() {
            return Err(fail_from_response(PLATFORM, response, "fetch uploads").await.into());
        }

        let results: SearchListResponse =
            response.json().await.map_err(|e| PublishError::Transient {
                platform: PLATFORM,
                reason: format!("bad search response: {e}"),
            })?;

        Ok(results
            .items
            .into_iter()
            .filter_map(|item| {
                let id = item.id.video_id?;
                let snippet = item.snippet;
                Some(PublishedItem {
                    url: Some(format!("https://www.youtube.com/watch?v={id}")),
                    id,
                    text: snippet.as_ref().and_then(|s| s.title.clone()),
                    created_at: snippet.as_ref().and_then(|s| s.published_at.clone()),
                })
            })
            .collect())
    }
}
