//! error types for umbriel-crypto

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("value does not fit in the BN254 scalar field")]
    FieldOverflow,

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("key derivation exhausted rehash counter")]
    KeyDerivation,
}

pub type Result<T> = std::result::Result<T, CryptoError>;
