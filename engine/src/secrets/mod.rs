//! Secret retrieval and scrubbing
//!
//! The completion service API key is resolved from the process environment
//! first (`ANTHROPIC_API_KEY` for the secret named `anthropic_api_key`) and
//! then from the OS keychain. Nothing here prompts: the engine runs behind
//! transports that have no terminal.
//!
//! Transport error text is passed through [`scrub_secrets`] before it reaches
//! a log line or a ledger record.

use keyring::Entry;
use regex::Regex;
use sdk::errors::EngineError;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

/// A wrapper for sensitive string data that prevents accidental logging.
///
/// `Debug` and `Display` both print `[REDACTED]`; use `expose()` for the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Access the raw underlying string
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn get_secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        // Static patterns; compilation cannot fail at runtime.
        [
            r"sk-ant-[a-zA-Z0-9\-_]{20,}",
            r"sk-[a-zA-Z0-9\-_]{20,}",
            r"Bearer\s+[^\s]{20,}",
            r#"(?i)x-api-key["':=\s]+[^\s"',]{16,}"#,
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Replace every recognised secret in `text` with `[REDACTED]`.
///
/// ```
/// use arbor_engine::secrets::scrub_secrets;
///
/// let scrubbed = scrub_secrets("401 for key sk-ant-REDACTED");
/// assert_eq!(scrubbed, "401 for key [REDACTED]");
/// ```
pub fn scrub_secrets(text: &str) -> String {
    let mut result = text.to_string();
    for pattern in get_secret_patterns() {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }
    result
}

/// Resolves secrets from the environment and the OS keychain.
pub struct SecretManager {
    service_name: String,
}

impl SecretManager {
    /// The service name namespaces secrets in the OS keychain.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Environment variable consulted before the keychain for `key`.
    pub fn env_var_name(key: &str) -> String {
        key.to_ascii_uppercase()
    }

    /// Retrieve a secret.
    ///
    /// # Errors
    /// Returns `EngineError::KeyringError` if the secret is in neither the
    /// environment nor the keychain, or the keychain cannot be opened.
    pub fn get_secret(&self, key: &str) -> Result<String, EngineError> {
        if let Ok(value) = std::env::var(Self::env_var_name(key)) {
            if !value.trim().is_empty() {
                tracing::debug!("Resolved secret '{}' from environment", key);
                return Ok(value.trim().to_string());
            }
        }

        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        match entry.get_password() {
            Ok(secret) => {
                tracing::debug!("Retrieved secret '{}' from keychain", key);
                Ok(secret)
            }
            Err(keyring::Error::NoEntry) => Err(EngineError::KeyringError(format!(
                "Secret '{}' not set. Export {} or store it in the keychain",
                key,
                Self::env_var_name(key)
            ))),
            Err(e) => Err(EngineError::KeyringError(format!(
                "Failed to retrieve secret '{}': {}",
                key, e
            ))),
        }
    }

    /// Store a secret in the OS keychain.
    pub fn set_secret(&self, key: &str, value: &str) -> Result<(), EngineError> {
        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        entry.set_password(value).map_err(|e| {
            EngineError::KeyringError(format!("Failed to store secret '{}': {}", key, e))
        })?;

        tracing::info!("Stored secret '{}' in keychain", key);
        Ok(())
    }

    /// Non-failing existence check over both sources.
    pub fn has_secret(&self, key: &str) -> bool {
        if std::env::var(Self::env_var_name(key)).is_ok_and(|v| !v.trim().is_empty()) {
            return true;
        }
        Entry::new(&self.service_name, key)
            .and_then(|entry| entry.get_password())
            .is_ok()
    }
}

/// In-memory cache in front of a `SecretManager`.
///
/// Owned by the engine context; `invalidate()` drops cached values so a
/// rotated key is picked up on the next call.
#[derive(Clone)]
pub struct SecretCache {
    manager: Arc<SecretManager>,
    cache: Arc<RwLock<HashMap<String, SecretString>>>,
}

impl SecretCache {
    pub fn new(manager: Arc<SecretManager>) -> Self {
        Self {
            manager,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn get_secret(&self, key: &str) -> Result<SecretString, EngineError> {
        if let Ok(cache) = self.cache.read() {
            if let Some(secret) = cache.get(key) {
                return Ok(secret.clone());
            }
        }

        let secret = SecretString::new(self.manager.get_secret(key)?);

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key.to_string(), secret.clone());
        }

        Ok(secret)
    }

    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }
}
