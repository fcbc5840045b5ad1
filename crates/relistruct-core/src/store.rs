use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::{
    cipher::{Cipher, CipherError, Plaintext},
    storage::{Backend, BackendError},
    value::{classify, describe, TypeTag, TypedValue},
};

const SEPARATOR: char = ':';

/// Errors surfaced by typed store operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The value does not have the shape its type tag declares.
    #[error("invalid value type: expected {expected}, found {found}")]
    Validation { expected: String, found: String },
    /// A stored record or import envelope could not be parsed.
    #[error("malformed envelope: {reason}")]
    Format { reason: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Cipher(#[from] CipherError),
}

/// Record persisted in the backend: `{"value": V, "type": T}`.
#[derive(Serialize)]
struct RecordOut<'a> {
    value: &'a Value,
    #[serde(rename = "type")]
    tag: TypeTag,
}

/// Read side of the record. The tag stays a string so an unknown tag is
/// reported as a type mismatch rather than a parse failure.
#[derive(Deserialize)]
struct RecordIn {
    value: Value,
    #[serde(rename = "type")]
    tag: String,
}

#[derive(Serialize)]
struct ExportEnvelope<'a> {
    key: &'a str,
    value: Value,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    tag: Option<TypeTag>,
}

#[derive(Deserialize)]
struct ImportEnvelope {
    #[serde(default)]
    value: Value,
    #[serde(rename = "type", default)]
    tag: Option<TypeTag>,
}

/// Type-tagged, optionally encrypted values stored under a namespace in a
/// shared key-value backend.
///
/// Every record lives at `"<namespace>:<key>"`. Encryption is opt-in per call
/// and only applies when the store was built with a secret.
pub struct TypedStore<B, C = Plaintext> {
    namespace: String,
    backend: B,
    cipher: C,
    secret: Option<String>,
}

impl<B: Backend> TypedStore<B> {
    /// Store without a secret; encrypted calls fall back to plaintext.
    pub fn new(namespace: impl Into<String>, backend: B) -> Self {
        Self {
            namespace: namespace.into(),
            backend,
            cipher: Plaintext,
            secret: None,
        }
    }
}

impl<B: Backend, C: Cipher> TypedStore<B, C> {
    pub fn with_cipher(
        namespace: impl Into<String>,
        backend: B,
        cipher: C,
        secret: Option<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            backend,
            cipher,
            secret,
        }
    }

    /// Swap in a cipher and the secret it encrypts with.
    pub fn with_encryption<C2: Cipher>(
        self,
        cipher: C2,
        secret: impl Into<String>,
    ) -> TypedStore<B, C2> {
        TypedStore {
            namespace: self.namespace,
            backend: self.backend,
            cipher,
            secret: Some(secret.into()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Whether `encrypted = true` calls actually encrypt.
    pub fn is_encrypting(&self) -> bool {
        self.secret.is_some()
    }

    /// Backend key for `key` under this store's namespace.
    pub fn full_key(&self, key: &str) -> String {
        format!("{}{SEPARATOR}{key}", self.namespace)
    }

    /// Validate `value` against `tag` and persist it.
    ///
    /// Nothing is written when validation or encryption fails.
    #[instrument(skip(self, value), fields(namespace = %self.namespace))]
    pub fn write(
        &self,
        key: &str,
        value: &Value,
        tag: TypeTag,
        encrypted: bool,
    ) -> Result<(), StoreError> {
        ensure_matches(tag, value)?;

        let record = serde_json::to_string(&RecordOut { value, tag }).map_err(format_err)?;
        let payload = self.seal(record, encrypted)?;
        self.backend.set(&self.full_key(key), &payload)?;
        Ok(())
    }

    /// Fetch the value stored under `key`, `None` when absent.
    ///
    /// The record's tag is re-checked against its value so a corrupted or
    /// tampered record fails instead of returning a mistyped value.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub fn read(&self, key: &str, encrypted: bool) -> Result<Option<Value>, StoreError> {
        Ok(self.load(key, encrypted)?.map(|(value, _)| value))
    }

    pub fn write_typed(
        &self,
        key: &str,
        value: &TypedValue,
        encrypted: bool,
    ) -> Result<(), StoreError> {
        self.write(key, &value.to_json(), value.tag(), encrypted)
    }

    pub fn read_typed(
        &self,
        key: &str,
        encrypted: bool,
    ) -> Result<Option<TypedValue>, StoreError> {
        let Some((value, tag)) = self.load(key, encrypted)? else {
            return Ok(None);
        };
        TypedValue::from_tagged(tag, &value)
            .map(Some)
            .ok_or_else(|| StoreError::Validation {
                expected: tag.to_string(),
                found: format!("out-of-range {}", describe(&value)),
            })
    }

    /// Serialize the entry under `key` as `{"key", "value", "type"}`.
    /// A missing entry exports a null value without a type.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub fn export_entry(&self, key: &str, encrypted: bool) -> Result<String, StoreError> {
        let (value, tag) = match self.load(key, encrypted)? {
            Some((value, tag)) => (value, Some(tag)),
            None => (Value::Null, None),
        };
        serde_json::to_string(&ExportEnvelope { key, value, tag }).map_err(format_err)
    }

    /// Write the value of an exported envelope under `key`.
    ///
    /// An explicit `type` in the envelope wins; without one the tag is
    /// inferred from the value, so `3.0` imports as an int.
    #[instrument(skip(self, serialized), fields(namespace = %self.namespace))]
    pub fn import_entry(
        &self,
        key: &str,
        serialized: &str,
        encrypted: bool,
    ) -> Result<(), StoreError> {
        let envelope: ImportEnvelope = parse_object(serialized)?;
        if envelope.value.is_null() {
            return Err(StoreError::Format {
                reason: "envelope has no value".to_string(),
            });
        }

        let tag = envelope
            .tag
            .or_else(|| classify(&envelope.value))
            .ok_or_else(|| StoreError::Format {
                reason: format!(
                    "envelope value is not a scalar: {}",
                    describe(&envelope.value)
                ),
            })?;

        self.write(key, &envelope.value, tag, encrypted)
    }

    /// Delete the entry under `key`; absent keys are not an error.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.backend.remove(&self.full_key(key))?;
        Ok(())
    }

    /// Delete every entry in this namespace and return how many were removed.
    ///
    /// Keys are enumerated once; entries added concurrently may survive.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub fn clear(&self) -> Result<usize, StoreError> {
        let prefix = format!("{}{SEPARATOR}", self.namespace);
        let mut removed = 0;
        for key in self.backend.keys()? {
            if key.starts_with(&prefix) {
                self.backend.remove(&key)?;
                removed += 1;
            }
        }
        debug!(removed, "namespace cleared");
        Ok(removed)
    }

    fn load(&self, key: &str, encrypted: bool) -> Result<Option<(Value, TypeTag)>, StoreError> {
        let raw = match self.backend.get(&self.full_key(key))? {
            // Empty records read as absent.
            Some(raw) if !raw.is_empty() => raw,
            _ => return Ok(None),
        };

        let text = self.open(raw, encrypted)?;
        let record: RecordIn = parse_object(&text)?;
        let tag = TypeTag::parse(&record.tag).ok_or_else(|| StoreError::Validation {
            expected: record.tag.clone(),
            found: describe(&record.value),
        })?;
        ensure_matches(tag, &record.value)?;
        Ok(Some((record.value, tag)))
    }

    fn seal(&self, text: String, encrypted: bool) -> Result<String, StoreError> {
        match (encrypted, &self.secret) {
            (true, Some(secret)) => Ok(self.cipher.encrypt(&text, secret)?),
            (true, None) => {
                warn!("encryption requested but no secret configured; storing plaintext");
                Ok(text)
            }
            (false, _) => Ok(text),
        }
    }

    fn open(&self, text: String, encrypted: bool) -> Result<String, StoreError> {
        match (encrypted, &self.secret) {
            (true, Some(secret)) => Ok(self.cipher.decrypt(&text, secret)?),
            _ => Ok(text),
        }
    }
}

impl<B: fmt::Debug, C> fmt::Debug for TypedStore<B, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the secret itself.
        f.debug_struct("TypedStore")
            .field("namespace", &self.namespace)
            .field("backend", &self.backend)
            .field("encrypting", &self.secret.is_some())
            .finish()
    }
}

fn ensure_matches(tag: TypeTag, value: &Value) -> Result<(), StoreError> {
    if tag.matches(value) {
        Ok(())
    } else {
        Err(StoreError::Validation {
            expected: tag.to_string(),
            found: describe(value),
        })
    }
}

/// Records and envelopes are JSON objects; serde would also accept the
/// positional array form (`[42, "int"]`), so reject anything else first.
fn parse_object<T: DeserializeOwned>(text: &str) -> Result<T, StoreError> {
    let value: Value = serde_json::from_str(text).map_err(format_err)?;
    if !value.is_object() {
        return Err(StoreError::Format {
            reason: format!("expected a JSON object, found {}", describe(&value)),
        });
    }
    serde_json::from_value(value).map_err(format_err)
}

fn format_err<E: ToString>(err: E) -> StoreError {
    StoreError::Format {
        reason: err.to_string(),
    }
}
