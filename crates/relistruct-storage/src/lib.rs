//! Concrete collaborators for the typed store: a durable file backend,
//! an AES-GCM text cipher, secret providers and TOML configuration.

pub mod aes_cipher;
pub mod config;
pub mod file_backend;
pub mod key_provider;

pub use aes_cipher::AesGcmCipher;
pub use file_backend::FileBackend;
