//! Session token persistence in the OS keychain.
//!
//! One keychain entry per config directory, so separate vaults keep separate
//! logins. The CLI reads its own identity from the token claims; the server
//! still verifies the signature on every request.

#[cfg(test)]
use std::collections::HashMap;
use std::path::Path;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

use chrono::Utc;
#[cfg(not(test))]
use keyring::Entry;
use keeper_core::auth::{peek_claims, Claims};

use crate::error::CliError;

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "keeper-cli";

/// A token together with the identity it names.
#[derive(Clone)]
pub struct Session {
    pub token: String,
    pub claims: Claims,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"[REDACTED]")
            .field("user_id", &self.claims.user_id)
            .field("username", &self.claims.username)
            .finish()
    }
}

impl Session {
    pub fn from_token(token: &str) -> Result<Self, CliError> {
        let token = token.trim();
        let claims = peek_claims(token).map_err(keeper_core::Error::from)?;
        Ok(Self {
            token: token.to_string(),
            claims,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.claims.user_id
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    username: String,
}

impl SessionStore {
    pub fn new(config_dir: &Path) -> Self {
        Self {
            username: format!("session:{}", config_dir.display()),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> Result<Entry, CliError> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username)
            .map_err(|error| CliError::SecureStorage(error.to_string()))
    }

    /// Validate and store `token`, replacing any previous session.
    pub fn save(&self, token: &str) -> Result<Session, CliError> {
        let session = Session::from_token(token)?;
        self.write(&session.token)?;
        Ok(session)
    }

    pub fn load(&self) -> Result<Option<Session>, CliError> {
        match self.read()? {
            Some(raw) if !raw.trim().is_empty() => Session::from_token(&raw).map(Some),
            _ => Ok(None),
        }
    }

    /// The stored session, or an error telling the user to log in.
    pub fn require(&self) -> Result<Session, CliError> {
        let session = self.load()?.ok_or(CliError::NotLoggedIn)?;
        if session.claims.is_expired_at(Utc::now()) {
            return Err(CliError::SessionExpired);
        }
        Ok(session)
    }

    #[cfg(not(test))]
    fn read(&self) -> Result<Option<String>, CliError> {
        match self.entry()?.get_password() {
            Ok(raw) => Ok(Some(raw)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(CliError::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn read(&self) -> Result<Option<String>, CliError> {
        let guard = Self::test_store()
            .lock()
            .map_err(|error| CliError::SecureStorage(error.to_string()))?;
        Ok(guard.get(&self.username).cloned())
    }

    #[cfg(not(test))]
    fn write(&self, token: &str) -> Result<(), CliError> {
        self.entry()?
            .set_password(token)
            .map_err(|error| CliError::SecureStorage(error.to_string()))
    }

    #[cfg(test)]
    fn write(&self, token: &str) -> Result<(), CliError> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| CliError::SecureStorage(error.to_string()))?;
        guard.insert(self.username.clone(), token.to_string());
        Ok(())
    }

    /// Returns whether a session was removed.
    #[cfg(not(test))]
    pub fn clear(&self) -> Result<bool, CliError> {
        match self.entry()?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(error) => Err(CliError::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    pub fn clear(&self) -> Result<bool, CliError> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| CliError::SecureStorage(error.to_string()))?;
        Ok(guard.remove(&self.username).is_some())
    }
}
