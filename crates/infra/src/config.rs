//! Process configuration from environment variables.
//!
//! Every setting has a dev default except where noted; a value that is set but
//! does not parse is a [`ConfigError`], never silently replaced.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use bootnet_auth::ActivationPolicy;

pub const DEV_JWT_SECRET: &str = "bootnet-dev-secret-change-me";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// `None` selects the in-memory credential store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_expiration: chrono::Duration,
    pub activation_url: String,
    pub activation: ActivationPolicy,
    pub cache_ttl: Duration,
    /// `None` selects the log transport.
    pub mail_relay_url: Option<String>,
    pub mail_from: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let jwt_secs: i64 = parse_or(get("JWT_EXPIRATION_SECS"), "JWT_EXPIRATION_SECS", 8640)?;
        let code_length: usize = parse_or(get("ACTIVATION_CODE_LENGTH"), "ACTIVATION_CODE_LENGTH", 6)?;
        let ttl_minutes: i64 = parse_or(get("ACTIVATION_TTL_MINUTES"), "ACTIVATION_TTL_MINUTES", 15)?;
        let cache_secs: u64 = parse_or(get("CACHE_TTL_SECS"), "CACHE_TTL_SECS", 3600)?;

        if jwt_secs <= 0 {
            return Err(invalid("JWT_EXPIRATION_SECS", "must be positive"));
        }
        if code_length == 0 {
            return Err(invalid("ACTIVATION_CODE_LENGTH", "must be at least 1"));
        }
        if ttl_minutes <= 0 {
            return Err(invalid("ACTIVATION_TTL_MINUTES", "must be positive"));
        }

        Ok(Self {
            bind_addr: parse_or(get("BIND_ADDR"), "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            database_url: get("DATABASE_URL"),
            jwt_secret,
            jwt_expiration: chrono::Duration::seconds(jwt_secs),
            activation_url: get("ACTIVATION_URL")
                .unwrap_or_else(|| "http://localhost:4200/activate-account".to_string()),
            activation: ActivationPolicy {
                code_length,
                ttl: chrono::Duration::minutes(ttl_minutes),
            },
            cache_ttl: Duration::from_secs(cache_secs),
            mail_relay_url: get("MAIL_RELAY_URL"),
            mail_from: get("MAIL_FROM").unwrap_or_else(|| "no-reply@bootnet.local".to_string()),
        })
    }
}

impl Default for AppConfig {
    /// All defaults, as if no variable were set.
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_expiration: chrono::Duration::seconds(8640),
            activation_url: "http://localhost:4200/activate-account".to_string(),
            activation: ActivationPolicy::default(),
            cache_ttl: Duration::from_secs(3600),
            mail_relay_url: None,
            mail_from: "no-reply@bootnet.local".to_string(),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database", &self.database_url.as_ref().map(|_| "<set>"))
            .field("jwt_secret", &"<redacted>")
            .field("jwt_expiration", &self.jwt_expiration)
            .field("activation_url", &self.activation_url)
            .field("activation", &self.activation)
            .field("cache_ttl", &self.cache_ttl)
            .field("mail_relay_url", &self.mail_relay_url)
            .field("mail_from", &self.mail_from)
            .finish()
    }
}

fn parse_or<T>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(v) => v.parse().map_err(|e: T::Err| invalid(key, e.to_string())),
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}
