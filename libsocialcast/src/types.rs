//! Core types for Socialcast

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How long an in-flight authorization attempt stays valid.
pub const PENDING_AUTHORIZATION_TTL_SECS: i64 = 600;

/// The social platforms a dashboard user can link.
///
/// `Facebook` and `Instagram` exist so rows written by the wider product stay
/// representable; no adapter is registered for them here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SocialPlatform {
    Linkedin,
    Twitter,
    Youtube,
    Telegram,
    Facebook,
    Instagram,
}

impl SocialPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linkedin => "linkedin",
            Self::Twitter => "twitter",
            Self::Youtube => "youtube",
            Self::Telegram => "telegram",
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
        }
    }

    pub fn all() -> [SocialPlatform; 6] {
        [
            Self::Linkedin,
            Self::Twitter,
            Self::Youtube,
            Self::Telegram,
            Self::Facebook,
            Self::Instagram,
        ]
    }
}

impl FromStr for SocialPlatform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linkedin" => Ok(Self::Linkedin),
            "twitter" | "x" => Ok(Self::Twitter),
            "youtube" => Ok(Self::Youtube),
            "telegram" => Ok(Self::Telegram),
            "facebook" => Ok(Self::Facebook),
            "instagram" => Ok(Self::Instagram),
            _ => Err(format!("Unknown platform: '{s}'")),
        }
    }
}

impl std::fmt::Display for SocialPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One user's link to one platform. At most one per (user, platform).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedAccount {
    pub user_id: String,
    pub platform: SocialPlatform,
    /// Remote identity (person id, channel id, chat id), when known.
    pub platform_user_id: Option<String>,
    pub display_name: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Unix seconds; `None` for tokens without a reported lifetime.
    pub token_expires_at: Option<i64>,
    /// Provider-specific extras (handle, chat type, ...). Merged on upsert.
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ConnectedAccount {
    pub fn new(user_id: impl Into<String>, platform: SocialPlatform) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            user_id: user_id.into(),
            platform,
            platform_user_id: None,
            display_name: None,
            access_token: None,
            refresh_token: None,
            token_expires_at: None,
            metadata: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A non-empty stored access token.
    pub fn has_access_token(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// A short-lived, in-flight authorization attempt, keyed by `state`.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub state: String,
    pub code_verifier: Option<String>,
    pub user_id: Option<String>,
    pub platform: SocialPlatform,
    pub created_at: i64,
    pub expires_at: i64,
}

impl PendingAuthorization {
    pub fn new(
        platform: SocialPlatform,
        user_id: Option<String>,
        state: String,
        code_verifier: Option<String>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            state,
            code_verifier,
            user_id,
            platform,
            created_at: now,
            expires_at: now + PENDING_AUTHORIZATION_TTL_SECS,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

// ============================================================================
// Publish payloads
// ============================================================================

/// Supported attachment MIME types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MediaMimeType {
    Jpeg,
    Png,
    Gif,
    WebP,
    Mp4,
}

impl MediaMimeType {
    pub fn from_mime_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::WebP),
            "video/mp4" => Some(Self::Mp4),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            "mp4" => Some(Self::Mp4),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
            Self::Mp4 => "video/mp4",
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Mp4)
    }
}

impl std::fmt::Display for MediaMimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One uploaded media file, held in memory for the request lifetime.
#[derive(Debug, Clone)]
pub struct MediaAttachment {
    pub file_name: String,
    pub mime_type: MediaMimeType,
    pub bytes: Vec<u8>,
}

/// What a caller wants to publish through a connected account.
#[derive(Debug, Clone, Default)]
pub struct PostContent {
    pub text: String,
    pub media: Vec<MediaAttachment>,
    /// Platform-specific routing (e.g. a LinkedIn organization id).
    pub target: Option<String>,
}

impl PostContent {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            media: Vec::new(),
            target: None,
        }
    }
}

// ============================================================================
// Provider results
// ============================================================================

/// Tokens handed back by a provider's token endpoint.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Provider-reported lifetime in seconds, when any.
    pub expires_in: Option<i64>,
}

impl TokenGrant {
    pub fn expires_at(&self, now: i64) -> Option<i64> {
        self.expires_in.map(|secs| now + secs)
    }
}

/// The remote identity behind a fresh grant or a manual registration.
#[derive(Debug, Clone, Default)]
pub struct RemoteIdentity {
    pub platform_user_id: String,
    pub display_name: Option<String>,
    /// Provider extras worth keeping (handle, chat type, ...).
    pub extras: serde_json::Map<String, serde_json::Value>,
}

/// Result of a successful publish, with the provider payload passed through.
#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub platform: SocialPlatform,
    pub post_id: String,
    pub payload: serde_json::Value,
}

/// One recently published item in the normalized fetch envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedItem {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Connection status of one platform for the dashboard account list.
#[derive(Debug, Clone, Serialize)]
pub struct AccountStatus {
    pub platform: SocialPlatform,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}
