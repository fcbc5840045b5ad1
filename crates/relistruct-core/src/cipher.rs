use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("encrypt failed: {reason}")]
    Encrypt { reason: String },
    #[error("decrypt failed: {reason}")]
    Decrypt { reason: String },
}

/// Symmetric text cipher used to wrap storage records.
///
/// Implementations turn text into text so the result can be written to a
/// string backend unchanged. No integrity guarantee is assumed by callers.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &str, secret: &str) -> Result<String, CipherError>;

    fn decrypt(&self, ciphertext: &str, secret: &str) -> Result<String, CipherError>;
}

/// Pass-through cipher for stores configured without encryption.
#[derive(Debug, Default, Clone, Copy)]
pub struct Plaintext;

impl Cipher for Plaintext {
    fn encrypt(&self, plaintext: &str, _secret: &str) -> Result<String, CipherError> {
        Ok(plaintext.to_string())
    }

    fn decrypt(&self, ciphertext: &str, _secret: &str) -> Result<String, CipherError> {
        Ok(ciphertext.to_string())
    }
}
