use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use relistruct_core::cipher::{Cipher, CipherError};
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

/// AES-256-GCM text cipher. The key is the SHA-256 of the secret; output is
/// base64 of `nonce || ciphertext` with a fresh random nonce per call.
#[derive(Debug, Default, Clone, Copy)]
pub struct AesGcmCipher;

impl AesGcmCipher {
    pub fn new() -> Self {
        Self
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str, secret: &str) -> Result<String, CipherError> {
        let cipher = build_cipher(secret);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext =
            cipher
                .encrypt(&nonce, plaintext.as_bytes())
                .map_err(|e| CipherError::Encrypt {
                    reason: e.to_string(),
                })?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    fn decrypt(&self, ciphertext: &str, secret: &str) -> Result<String, CipherError> {
        let bytes = STANDARD.decode(ciphertext).map_err(|e| CipherError::Decrypt {
            reason: format!("base64 decode failed: {e}"),
        })?;
        if bytes.len() < NONCE_LEN {
            return Err(CipherError::Decrypt {
                reason: format!("expected at least {NONCE_LEN} bytes, got {}", bytes.len()),
            });
        }

        let (nonce_bytes, body) = bytes.split_at(NONCE_LEN);
        let plaintext = build_cipher(secret)
            .decrypt(Nonce::from_slice(nonce_bytes), body)
            .map_err(|e| CipherError::Decrypt {
                reason: e.to_string(),
            })?;

        String::from_utf8(plaintext).map_err(|e| CipherError::Decrypt {
            reason: format!("plaintext is not utf-8: {e}"),
        })
    }
}

fn build_cipher(secret: &str) -> Aes256Gcm {
    let hash = Sha256::digest(secret.as_bytes());
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(hash.as_slice()))
}

#[cfg(test)]
mod tests {
    use relistruct_core::{
        storage::{Backend, InMemoryBackend},
        TypeTag, TypedStore,
    };
    use serde_json::json;

    use super::*;

    #[test]
    fn round_trip_encrypts_and_decrypts() {
        let cipher = AesGcmCipher::new();
        let sealed = cipher
            .encrypt(r#"{"value":"hello","type":"str"}"#, "secret")
            .expect("encrypt");

        assert!(!sealed.contains("hello"), "plaintext must not be stored");
        let opened = cipher.decrypt(&sealed, "secret").expect("decrypt");
        assert_eq!(opened, r#"{"value":"hello","type":"str"}"#);
    }

    #[test]
    fn nonces_differ_between_calls() {
        let cipher = AesGcmCipher::new();
        let first = cipher.encrypt("same", "k").expect("encrypt");
        let second = cipher.encrypt("same", "k").expect("encrypt");
        assert_ne!(first, second);
    }

    #[test]
    fn wrong_secret_fails_to_decrypt() {
        let cipher = AesGcmCipher::new();
        let sealed = cipher.encrypt("payload", "right").expect("encrypt");
        let err = cipher.decrypt(&sealed, "wrong").expect_err("auth should fail");
        assert!(matches!(err, CipherError::Decrypt { .. }));
    }

    #[test]
    fn rejects_garbage_input() {
        let cipher = AesGcmCipher::new();
        assert!(matches!(
            cipher.decrypt("%%%", "k"),
            Err(CipherError::Decrypt { .. })
        ));
        assert!(matches!(
            cipher.decrypt(&STANDARD.encode([0u8; 4]), "k"),
            Err(CipherError::Decrypt { .. })
        ));
    }

    #[test]
    fn typed_store_round_trip_with_aes() {
        let backend = InMemoryBackend::new();
        let store = TypedStore::new("vault", backend.clone())
            .with_encryption(AesGcmCipher::new(), "0123456789abcdef0123456789abcdef");

        store
            .write("k", &json!(42), TypeTag::Int, true)
            .expect("write");
        assert_eq!(store.read("k", true).expect("read"), Some(json!(42)));

        let raw = backend.get("vault:k").expect("get").expect("record present");
        assert_ne!(raw, r#"{"value":42,"type":"int"}"#);
    }
}
