use std::{
    fs,
    path::{Path, PathBuf},
};

use dirs::{config_dir, data_dir};
use relistruct_core::TypedStore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{
    aes_cipher::AesGcmCipher,
    file_backend::FileBackend,
    key_provider::{KeyError, KeyringProvider, SecretProvider},
};

const DEFAULT_NAMESPACE: &str = "relistruct";
const DEFAULT_KEYRING_SERVICE: &str = "relistruct";
const DEFAULT_KEYRING_ACCOUNT: &str = "store-secret";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("no {0} dir available")]
    NoDir(&'static str),
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Store configuration loaded from `~/.config/relistruct/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct StoreConfig {
    /// Key prefix isolating this store's records.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Override for the data directory holding records.
    pub data_dir: Option<PathBuf>,
    /// Present when encrypted reads/writes should use a secret.
    pub encryption: Option<EncryptionConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            data_dir: None,
            encryption: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct EncryptionConfig {
    /// Inline secret; takes precedence over the keyring.
    pub secret: Option<String>,
    pub keyring_service: Option<String>,
    pub keyring_account: Option<String>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<StoreConfig, ConfigError> {
    load_from_path(default_path()?)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<StoreConfig, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(StoreConfig::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(StoreConfig::default());
    }
    Ok(toml::from_str(&contents)?)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf, ConfigError> {
    let base = config_dir().ok_or(ConfigError::NoDir("config"))?;
    Ok(base.join("relistruct").join("config.toml"))
}

/// Resolve the default data directory for records.
pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
    let base = data_dir().ok_or(ConfigError::NoDir("data"))?;
    Ok(base.join("relistruct"))
}

/// Write `config` to `path` unless a file already exists there, so user edits
/// are never clobbered. Returns the path either way.
pub fn write_if_missing(
    config: &StoreConfig,
    path: impl AsRef<Path>,
) -> Result<PathBuf, ConfigError> {
    let path = path.as_ref();
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml::to_string_pretty(config)?)?;
    Ok(path.to_path_buf())
}

/// Resolve the store secret: inline first, then the OS keyring.
/// `None` when the config has no `[encryption]` section.
pub fn resolve_secret(config: &StoreConfig) -> Result<Option<String>, ConfigError> {
    let Some(enc) = &config.encryption else {
        return Ok(None);
    };
    let provider = KeyringProvider::new(
        enc.keyring_service
            .as_deref()
            .unwrap_or(DEFAULT_KEYRING_SERVICE),
        enc.keyring_account
            .as_deref()
            .unwrap_or(DEFAULT_KEYRING_ACCOUNT),
    );
    resolve_secret_with(config, &provider)
}

pub fn resolve_secret_with(
    config: &StoreConfig,
    provider: &dyn SecretProvider,
) -> Result<Option<String>, ConfigError> {
    match &config.encryption {
        None => Ok(None),
        Some(EncryptionConfig {
            secret: Some(secret),
            ..
        }) => Ok(Some(secret.clone())),
        Some(_) => Ok(Some(provider.get_or_create()?)),
    }
}

/// Build a file-backed, AES-GCM capable store from config.
pub fn open_store(
    config: &StoreConfig,
) -> Result<TypedStore<FileBackend, AesGcmCipher>, ConfigError> {
    let secret = resolve_secret(config)?;
    build_store(config, secret)
}

/// Same as [`open_store`] with an explicit secret provider in place of the keyring.
pub fn open_store_with(
    config: &StoreConfig,
    provider: &dyn SecretProvider,
) -> Result<TypedStore<FileBackend, AesGcmCipher>, ConfigError> {
    let secret = resolve_secret_with(config, provider)?;
    build_store(config, secret)
}

fn build_store(
    config: &StoreConfig,
    secret: Option<String>,
) -> Result<TypedStore<FileBackend, AesGcmCipher>, ConfigError> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    debug!(
        ?root,
        namespace = %config.namespace,
        encrypted = secret.is_some(),
        "opening store"
    );
    Ok(TypedStore::with_cipher(
        config.namespace.clone(),
        FileBackend::new(root),
        AesGcmCipher::new(),
        secret,
    ))
}
