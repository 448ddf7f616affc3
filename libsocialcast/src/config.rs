//! Configuration management for Socialcast
//!
//! Configuration is a TOML file (resolved like the rest of the XDG-style
//! tooling here) with environment overrides for everything secret, so
//! deployments can keep client secrets and bot tokens out of the file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub linkedin: Option<LinkedinConfig>,
    pub twitter: Option<TwitterConfig>,
    pub youtube: Option<YoutubeConfig>,
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL the callback redirects land on after a connect attempt.
    #[serde(default = "default_frontend_base_url")]
    pub frontend_base_url: String,
    /// Upper bound for any single provider round-trip.
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            frontend_base_url: default_frontend_base_url(),
            provider_timeout_secs: default_provider_timeout_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_frontend_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    30
}

/// Secrets for session verification and signed-state issuance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub session_secret: String,
    pub state_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedinConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoutubeConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
}

impl Config {
    /// Load configuration from the default location and apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path and apply env overrides.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let mut config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Pull secrets from the environment over whatever the file said.
    ///
    /// A bot token in the environment is enough to enable Telegram even with
    /// no `[telegram]` section in the file.
    pub fn apply_env_overrides(&mut self) {
        env_override(&mut self.auth.session_secret, "SOCIALCAST_SESSION_SECRET");
        env_override(&mut self.auth.state_secret, "SOCIALCAST_STATE_SECRET");

        if let Some(linkedin) = self.linkedin.as_mut() {
            env_override(&mut linkedin.client_secret, "SOCIALCAST_LINKEDIN_CLIENT_SECRET");
        }
        if let Some(twitter) = self.twitter.as_mut() {
            env_override(&mut twitter.client_secret, "SOCIALCAST_TWITTER_CLIENT_SECRET");
        }
        if let Some(youtube) = self.youtube.as_mut() {
            env_override(&mut youtube.client_secret, "SOCIALCAST_YOUTUBE_CLIENT_SECRET");
        }

        if let Ok(bot_token) = std::env::var("SOCIALCAST_TELEGRAM_BOT_TOKEN") {
            if !bot_token.is_empty() {
                self.telegram = Some(TelegramConfig { bot_token });
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.auth.session_secret.is_empty() {
            return Err(ConfigError::MissingField("auth.session_secret".to_string()).into());
        }
        if self.auth.state_secret.is_empty() {
            return Err(ConfigError::MissingField("auth.state_secret".to_string()).into());
        }
        Ok(())
    }

    /// Create a default configuration with no platforms enabled.
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/socialcast/accounts.db".to_string(),
            },
            server: ServerConfig::default(),
            auth: AuthConfig {
                session_secret: String::new(),
                state_secret: String::new(),
            },
            linkedin: None,
            twitter: None,
            youtube: None,
            telegram: None,
        }
    }
}

fn env_override(field: &mut String, var: &str) {
    if let Ok(value) = std::env::var(var) {
        if !value.is_empty() {
            *field = value;
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SOCIALCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("socialcast").join("config.toml"))
}
