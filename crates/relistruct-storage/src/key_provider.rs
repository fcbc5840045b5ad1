use std::sync::{Arc, Mutex};

use rand::{rngs::OsRng, Rng};
use thiserror::Error;
use tracing::debug;

const SECRET_LEN: usize = 32;
const HEX_ALPHABET: &[u8; 16] = b"0123456789abcdef";

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("generation error: {0}")]
    Generation(String),
}

/// Generate a 32-character lowercase hex secret from the OS random source.
pub fn generate_secret() -> String {
    let mut rng = OsRng;
    (0..SECRET_LEN)
        .map(|_| char::from(HEX_ALPHABET[rng.gen_range(0..HEX_ALPHABET.len())]))
        .collect()
}

/// Provides the store secret (OS keychain in production; memory in tests).
pub trait SecretProvider: Send + Sync {
    fn get_or_create(&self) -> Result<String, KeyError>;
}

/// OS keyring-backed provider. Uses the `keyring` crate to store the secret.
///
/// Needs one of the crate's platform stores (macOS keychain, Windows
/// credential manager, Linux kernel keyutils). Where the platform store is
/// unreachable every call fails with `KeyError::Keyring`; it never hands out
/// a fresh secret that was not persisted.
pub struct KeyringProvider {
    service: String,
    account: String,
}

impl KeyringProvider {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, KeyError> {
        keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| KeyError::Keyring(e.to_string()))
    }

    /// Read the secret back through a fresh entry. Stores that only keep
    /// credentials on the entry object (the keyring crate's mock store) fail here.
    fn confirm_persisted(&self, secret: &str) -> Result<(), KeyError> {
        match self.entry()?.get_password() {
            Ok(stored) if stored == secret => Ok(()),
            Ok(_) | Err(keyring::Error::NoEntry) => Err(KeyError::Keyring(
                "secret was not persisted by the credential store".to_string(),
            )),
            Err(err) => Err(KeyError::Keyring(err.to_string())),
        }
    }

    /// Delete the stored secret (idempotent). Records encrypted with it become unreadable.
    pub fn forget(&self) -> Result<(), KeyError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(KeyError::Keyring(err.to_string())),
        }
    }
}

impl SecretProvider for KeyringProvider {
    fn get_or_create(&self) -> Result<String, KeyError> {
        let entry = self.entry()?;

        match entry.get_password() {
            Ok(secret) if secret.is_empty() => {
                Err(KeyError::Decode("stored secret is empty".to_string()))
            }
            Ok(secret) => Ok(secret),
            Err(keyring::Error::NoEntry) => {
                debug!(service = %self.service, "no stored secret, generating one");
                let secret = generate_secret();
                entry
                    .set_password(&secret)
                    .map_err(|e| KeyError::Keyring(e.to_string()))?;
                self.confirm_persisted(&secret)?;
                Ok(secret)
            }
            Err(err) => Err(KeyError::Keyring(err.to_string())),
        }
    }
}

/// In-memory provider for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemorySecretProvider {
    inner: Arc<Mutex<Option<String>>>,
}

impl SecretProvider for InMemorySecretProvider {
    fn get_or_create(&self) -> Result<String, KeyError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| KeyError::Generation(format!("lock poisoned: {err}")))?;

        Ok(guard.get_or_insert_with(generate_secret).clone())
    }
}
