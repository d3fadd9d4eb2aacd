//! cryptographic primitives for the umbriel shielded pool
//!
//! everything the transaction builder hashes, derives or encrypts lives here:
//!
//! - [`FieldElement`]: 32-byte canonical BN254 scalar, little-endian on the
//!   wire to the circuit, big-endian for display and keccak input
//! - [`poseidon`]: poseidon2 wrappers carrying the protocol's domain
//!   separation tags
//! - [`keccak`]: keccak-256 and its field-reduced form for ext-data binding
//! - [`keys`]: wallet-signature derived spending key (BN254) and encryption
//!   keypair (X25519)
//! - [`sealed_box`]: fixed-length note ciphertexts for recipients

pub mod error;
pub mod field;
pub mod keccak;
pub mod keys;
pub mod poseidon;
pub mod sealed_box;

pub use error::{CryptoError, Result};
pub use field::FieldElement;
pub use keys::{EncryptionKeypair, SpendingKey};
pub use sealed_box::ENC_LEN;

/// poseidon2 domain tag for note commitments
pub const DOMAIN_COMMITMENT: u64 = 1;
/// poseidon2 domain tag for nullifiers
pub const DOMAIN_NULLIFIER: u64 = 2;
/// poseidon2 domain tag for public-key derivation
pub const DOMAIN_KEYPAIR: u64 = 3;
/// poseidon2 domain tag for in-circuit note signatures
pub const DOMAIN_SIGNATURE: u64 = 4;
/// poseidon2 domain tag for sparse-merkle and membership leaves
pub const DOMAIN_LEAF: u64 = 1;

/// empty-slot leaf of the on-chain pool tree, big-endian
///
/// fixed constant shared with the contracts; an all-zero tree built from this
/// leaf reproduces the deployed empty root.
pub const ZERO_LEAF_BE: [u8; 32] = [
    37, 48, 34, 136, 219, 153, 53, 3, 68, 151, 65, 131, 206, 49, 13, 99, 181, 58, 187, 158, 240,
    248, 87, 87, 83, 238, 211, 110, 1, 24, 249, 206,
];

/// wallet message whose signature seeds the BN254 spending key
pub const SPENDING_KEY_MESSAGE: &str = "Privacy Pool Spending Key [v1]";
/// wallet message whose signature seeds the X25519 encryption keypair
pub const ENCRYPTION_KEY_MESSAGE: &str = "Sign to access Privacy Pool [v1]";
