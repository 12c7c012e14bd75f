use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CliError;
use crate::session::SessionStore;

const DEFAULT_SERVER_URL: &str = "http://localhost:8080";
const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 30;
const MAX_SYNC_TIMEOUT_SECS: u64 = 300;

/// Resolved client settings: flags first, then the environment, then defaults.
#[derive(Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub config_dir: PathBuf,
    pub encryption_key: Option<String>,
    pub sync_timeout: Duration,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server_url", &self.server_url)
            .field("config_dir", &self.config_dir)
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("sync_timeout", &self.sync_timeout)
            .finish()
    }
}

impl ClientConfig {
    pub fn from_env(
        server: Option<String>,
        config_dir: Option<PathBuf>,
    ) -> Result<Self, CliError> {
        Self::from_lookup(|key| std::env::var(key).ok(), server, config_dir)
    }

    pub fn from_lookup<F>(
        lookup: F,
        server: Option<String>,
        config_dir: Option<PathBuf>,
    ) -> Result<Self, CliError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_url = server
            .and_then(|value| non_empty(&value))
            .or_else(|| lookup("SERVER_URL").and_then(|value| non_empty(&value)))
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let server_url = normalize_server_url(&server_url)?;

        let config_dir = match config_dir {
            Some(dir) => dir,
            None => match lookup("KEEPER_CONFIG_DIR").and_then(|value| non_empty(&value)) {
                Some(dir) => PathBuf::from(dir),
                None => dirs::config_dir()
                    .map(|dir| dir.join("keeper"))
                    .ok_or_else(|| {
                        CliError::Config(
                            "could not determine a config directory; set KEEPER_CONFIG_DIR"
                                .to_string(),
                        )
                    })?,
            },
        };

        let encryption_key = lookup("ENCRYPTION_KEY").and_then(|value| non_empty(&value));

        let sync_timeout = match lookup("SYNC_TIMEOUT_SECS").and_then(|value| non_empty(&value)) {
            None => Duration::from_secs(DEFAULT_SYNC_TIMEOUT_SECS),
            Some(raw) => {
                let secs = raw.parse::<u64>().map_err(|_| {
                    CliError::Config(format!("SYNC_TIMEOUT_SECS must be a number, got `{raw}`"))
                })?;
                if !(1..=MAX_SYNC_TIMEOUT_SECS).contains(&secs) {
                    return Err(CliError::Config(format!(
                        "SYNC_TIMEOUT_SECS must be between 1 and {MAX_SYNC_TIMEOUT_SECS}"
                    )));
                }
                Duration::from_secs(secs)
            }
        };

        Ok(Self {
            server_url,
            config_dir,
            encryption_key,
            sync_timeout,
        })
    }

    pub fn vault_path(&self) -> PathBuf {
        self.config_dir.join("vault.db")
    }

    pub fn session_store(&self) -> SessionStore {
        SessionStore::new(&self.config_dir)
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn normalize_server_url(value: &str) -> Result<String, CliError> {
    if !keeper_core::util::is_http_url(value) {
        return Err(CliError::Config(format!(
            "server URL must start with http:// or https://, got `{value}`"
        )));
    }
    Ok(value.trim_end_matches('/').to_string())
}
