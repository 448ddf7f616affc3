//! LinkedIn adapter
//!
//! Plain authorization code flow; the callback identifies its user from the
//! live session, never from the state payload. Publishing goes through the
//! UGC posts API as the member or, when the caller routes there, as an
//! organization. Image attachments are registered as assets first, then
//! referenced from the share.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::config::LinkedinConfig;
use crate::error::{OAuthError, PublishError, Result, SocialcastError};
use crate::platforms::{fail_from_response, network_error, SocialPlatformClient};
use crate::types::{
    ConnectedAccount, MediaAttachment, PendingAuthorization, PostContent, PublishOutcome,
    PublishedItem, RemoteIdentity, SocialPlatform, TokenGrant,
};

const SCOPES: &str = "openid profile w_member_social";
const RESTLI_HEADER: (&str, &str) = ("X-Restli-Protocol-Version", "2.0.0");
const PLATFORM: SocialPlatform = SocialPlatform::Linkedin;

pub struct LinkedinClient {
    config: LinkedinConfig,
    http: reqwest::Client,
    auth_base: String,
    api_base: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct UserinfoResponse {
    sub: String,
    name: Option<String>,
}

#[derive(Deserialize)]
struct RegisterUploadResponse {
    value: RegisterUploadValue,
}

#[derive(Deserialize)]
struct RegisterUploadValue {
    asset: String,
    #[serde(rename = "uploadMechanism")]
    upload_mechanism: UploadMechanism,
}

#[derive(Deserialize)]
struct UploadMechanism {
    #[serde(rename = "com.linkedin.digitalmedia.uploading.MediaUploadHttpRequest")]
    request: MediaUploadHttpRequest,
}

#[derive(Deserialize)]
struct MediaUploadHttpRequest {
    #[serde(rename = "uploadUrl")]
    upload_url: String,
}

#[derive(Deserialize)]
struct UgcPostResponse {
    id: String,
}

#[derive(Deserialize)]
struct UgcPostsPage {
    #[serde(default)]
    elements: Vec<UgcElement>,
}

#[derive(Deserialize)]
struct UgcElement {
    id: String,
    #[serde(rename = "specificContent")]
    specific_content: Option<UgcSpecificContent>,
}

#[derive(Deserialize)]
struct UgcSpecificContent {
    #[serde(rename = "com.linkedin.ugc.ShareContent")]
    share: Option<UgcShareContent>,
}

#[derive(Deserialize)]
struct UgcShareContent {
    #[serde(rename = "shareCommentary")]
    commentary: Option<UgcCommentary>,
}

#[derive(Deserialize)]
struct UgcCommentary {
    text: Option<String>,
}

impl LinkedinClient {
    pub fn new(config: LinkedinConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            auth_base: "https://www.linkedin.com".to_string(),
            api_base: "https://api.linkedin.com".to_string(),
        }
    }

    /// Point the OAuth and API hosts elsewhere (local test servers).
    pub fn with_bases(mut self, auth_base: impl Into<String>, api_base: impl Into<String>) -> Self {
        self.auth_base = auth_base.into();
        self.api_base = api_base.into();
        self
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

    /// The URN a post is published as: the member, or an organization when
    /// the caller routed there.
    fn author_urn(account: &ConnectedAccount, target: Option<&str>) -> Result<String> {
        if let Some(org) = target.filter(|t| !t.is_empty()) {
            return Ok(format!("urn:li:organization:{org}"));
        }
        let person = account
            .platform_user_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PublishError::Authentication {
                platform: PLATFORM,
                reason: "no member id stored, reconnect to refresh the profile".to_string(),
            })?;
        Ok(format!("urn:li:person:{person}"))
    }

    /// Register an image upload, push the bytes, return the asset URN.
    async fn upload_asset(
        &self,
        token: &str,
        author: &str,
        media: &MediaAttachment,
    ) -> Result<String> {
        if media.mime_type.is_video() {
            return Err(PublishError::Validation {
                platform: PLATFORM,
                reason: "only image attachments are supported on linkedin".to_string(),
            }
            .into());
        }

        let register = serde_json::json!({
            "registerUploadRequest": {
                "recipes": ["urn:li:digitalmediaRecipe:feedshare-image"],
                "owner": author,
                "serviceRelationships": [{
                    "relationshipType": "OWNER",
                    "identifier": "urn:li:userGeneratedContent",
                }],
            }
        });

        let response = self
            .http
            .post(format!("{}/v2/assets?action=registerUpload", self.api_base))
            .bearer_auth(token)
            .header(RESTLI_HEADER.0, RESTLI_HEADER.1)
            .json(&register)
            .send()
            .await
            .map_err(|e| network_error(PLATFORM, e))?;

        if !response.status().is_success() {
            return Err(fail_from_response(PLATFORM, response, "register upload").await.into());
        }

        let registered: RegisterUploadResponse =
            response.json().await.map_err(|e| PublishError::Transient {
                platform: PLATFORM,
                reason: format!("bad register response: {e}"),
            })?;

        let upload = self
            .http
            .put(&registered.value.upload_mechanism.request.upload_url)
            .bearer_auth(token)
            .body(media.bytes.clone())
            .send()
            .await
            .map_err(|e| network_error(PLATFORM, e))?;

        if !upload.status().is_success() {
            return Err(fail_from_response(PLATFORM, upload, "asset upload").await.into());
        }

        Ok(registered.value.asset)
    }
}

#[async_trait]
impl SocialPlatformClient for LinkedinClient {
    fn platform(&self) -> SocialPlatform {
        PLATFORM
    }

    fn character_limit(&self) -> Option<usize> {
        Some(3000)
    }

    fn authorize_url(&self, pending: &PendingAuthorization) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/oauth/v2/authorization", self.auth_base))
            .map_err(|e| SocialcastError::InvalidInput(format!("bad authorize endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", SCOPES)
            .append_pair("state", &pending.state);

        Ok(url)
    }

    async fn exchange_code(
        &self,
        code: &str,
        _pending: &PendingAuthorization,
    ) -> Result<TokenGrant> {
        let response = self
            .http
            .post(format!("{}/oauth/v2/accessToken", self.auth_base))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
                ("redirect_uri", &self.config.redirect_uri),
            ])
            .send()
            .await
            .map_err(|e| OAuthError::TokenExchangeFailed(format!("network error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "linkedin token endpoint refused");
            return Err(OAuthError::TokenExchangeFailed(format!("HTTP {status}")).into());
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::TokenExchangeFailed(format!("bad token response: {e}")))?;

        // LinkedIn issues no refresh token on this flow; an expired grant
        // means the member reconnects.
        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: None,
            expires_in: token.expires_in,
        })
    }

    async fn fetch_identity(&self, grant: &TokenGrant) -> Result<RemoteIdentity> {
        let response = self
            .http
            .get(format!("{}/v2/userinfo", self.api_base))
            .bearer_auth(&grant.access_token)
            .send()
            .await
            .map_err(|e| network_error(PLATFORM, e))?;

        if !response.status().is_success() {
            return Err(fail_from_response(PLATFORM, response, "fetch profile").await.into());
        }

        let userinfo: UserinfoResponse =
            response.json().await.map_err(|e| PublishError::Transient {
                platform: PLATFORM,
                reason: format!("bad profile response: {e}"),
            })?;

        Ok(RemoteIdentity {
            platform_user_id: userinfo.sub,
            display_name: userinfo.name,
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
        let author = Self::author_urn(account, content.target.as_deref())?;

        let mut assets = Vec::with_capacity(content.media.len());
        for media in &content.media {
            assets.push(self.upload_asset(token, &author, media).await?);
        }

        let share_content = if assets.is_empty() {
            serde_json::json!({
                "shareCommentary": { "text": content.text },
                "shareMediaCategory": "NONE",
            })
        } else {
            let media: Vec<_> = assets
                .iter()
                .map(|asset| serde_json::json!({ "status": "READY", "media": asset }))
                .collect();
            serde_json::json!({
                "shareCommentary": { "text": content.text },
                "shareMediaCategory": "IMAGE",
                "media": media,
            })
        };

        let body = serde_json::json!({
            "author": author,
            "lifecycleState": "PUBLISHED",
            "specificContent": { "com.linkedin.ugc.ShareContent": share_content },
            "visibility": { "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC" },
        });

        let response = self
            .http
            .post(format!("{}/v2/ugcPosts", self.api_base))
            .bearer_auth(token)
            .header(RESTLI_HEADER.0, RESTLI_HEADER.1)
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(PLATFORM, e))?;

        if !response.status().is_success() {
            return Err(fail_from_response(PLATFORM, response, "create share").await.into());
        }

        let payload: serde_json::Value =
            response.json().await.map_err(|e| PublishError::Transient {
                platform: PLATFORM,
                reason: format!("bad share response: {e}"),
            })?;
        let post: UgcPostResponse =
            serde_json::from_value(payload.clone()).map_err(|e| PublishError::Transient {
                platform: PLATFORM,
                reason: format!("bad share response: {e}"),
            })?;

        Ok(PublishOutcome {
            platform: PLATFORM,
            post_id: post.id,
            payload,
        })
    }

    async fn fetch_recent(&self, account: &ConnectedAccount) -> Result<Vec<PublishedItem>> {
        let token = self.access_token(account)?;
        let author = Self::author_urn(account, None)?;

        let authors = format!("List({author})");
        let response = self
            .http
            .get(format!("{}/v2/ugcPosts", self.api_base))
            .query(&[
                ("q", "authors"),
                ("authors", authors.as_str()),
                ("count", "10"),
            ])
            .bearer_auth(token)
            .header(RESTLI_HEADER.0, RESTLI_HEADER.1)
            .send()
            .await
            .map_err(|e| network_error(PLATFORM, e))?;

        if !response.status().is_success() {
            return Err(fail_from_response(PLATFORM, response, "fetch shares").await.into());
        }

        let page: UgcPostsPage = response.json().await.map_err(|e| PublishError::Transient {
            platform: PLATFORM,
            reason: format!("bad shares response: {e}"),
        })?;

        Ok(page
            .elements
            .into_iter()
            .map(|element| PublishedItem {
                text: element
                    .specific_content
                    .and_then(|c| c.share)
                    .and_then(|s| s.commentary)
                    .and_then(|c| c.text),
                created_at: None,
                url: None,
                id: element.id,
            })
            .collect())
    }
}
