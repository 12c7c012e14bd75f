use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use keeper_core::db::DatabaseLocation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database: DatabaseLocation,
    pub jwt_secret: String,
    pub at_rest_encryption: bool,
    pub encryption_key: Option<String>,
    pub token_ttl: Duration,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database", &self.database)
            .field("jwt_secret", &"[REDACTED]")
            .field("at_rest_encryption", &self.at_rest_encryption)
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "KEEPER_API_BIND_ADDR", "127.0.0.1:8080");

        let database_url = value_or_default(&lookup, "DATABASE_URL", "keeper-server.db");
        let database_token = optional_trimmed(&lookup, "DATABASE_AUTH_TOKEN");
        let database = DatabaseLocation::parse(&database_url, database_token)
            .map_err(|error| ConfigError::Invalid(format!("DATABASE_URL: {error}")))?;

        let jwt_secret = required_trimmed(&lookup, "JWT_SECRET")?;

        let at_rest_encryption =
            parse_bool(&value_or_default(&lookup, "AT_REST_ENCRYPTION", "true")).ok_or_else(
                || ConfigError::Invalid("AT_REST_ENCRYPTION must be true or false".to_string()),
            )?;
        let encryption_key = optional_trimmed(&lookup, "ENCRYPTION_KEY");
        if at_rest_encryption && encryption_key.is_none() {
            return Err(ConfigError::MissingVar("ENCRYPTION_KEY"));
        }

        let token_ttl_secs = value_or_default(&lookup, "TOKEN_TTL_SECS", "86400")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "TOKEN_TTL_SECS must be an integer in [60, 2592000]".to_string(),
                )
            })?;
        if !(60..=2_592_000).contains(&token_ttl_secs) {
            return Err(ConfigError::Invalid(
                "TOKEN_TTL_SECS must be in [60, 2592000]".to_string(),
            ));
        }

        Ok(Self {
            bind_addr,
            database,
            jwt_secret,
            at_rest_encryption,
            encryption_key,
            token_ttl: Duration::from_secs(token_ttl_secs),
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    keeper_core::util::normalize_text_option(lookup(name))
}
