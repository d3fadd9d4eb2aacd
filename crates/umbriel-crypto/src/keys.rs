//! key derivation from wallet signatures
//!
//! two independent wallet messages are signed, and two unrelated keys fall
//! out of the signatures:
//!
//! ```text
//! wallet (ed25519)
//!   ├─ sign("Privacy Pool Spending Key [v1]")
//!   │    └─ sha256 → BN254 spending key → poseidon2 → public key
//!   └─ sign("Sign to access Privacy Pool [v1]")
//!        └─ sha256 → X25519 keypair for note encryption
//! ```
//!
//! signatures are hashed before use so no algebraic structure of the wallet
//! key leaks into the derived keys. the two messages must stay distinct:
//! reusing one signature for both keys is forbidden.

use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{CryptoError, Result};
use crate::field::FieldElement;
use crate::poseidon;
use crate::DOMAIN_KEYPAIR;

/// ed25519 wallet signature length
pub const SIGNATURE_LEN: usize = 64;

/// BN254 spending key, proves note ownership inside the circuit
#[derive(Clone, Copy)]
pub struct SpendingKey {
    sk: FieldElement,
}

impl SpendingKey {
    /// derive from a wallet signature over [`crate::SPENDING_KEY_MESSAGE`]
    ///
    /// the sha256 output is interpreted little-endian; the rare non-canonical
    /// digest is re-hashed with an appended counter byte until it reduces.
    pub fn from_signature(signature: &[u8]) -> Result<Self> {
        let signature = check_signature_len(signature)?;
        let digest = Sha256::digest(signature);
        if let Ok(sk) = FieldElement::from_le_bytes(&digest) {
            return Ok(Self { sk });
        }
        for counter in 0u8..=255 {
            let mut hasher = Sha256::new();
            hasher.update(signature);
            hasher.update([counter]);
            if let Ok(sk) = FieldElement::from_le_bytes(&hasher.finalize()) {
                return Ok(Self { sk });
            }
        }
        Err(CryptoError::KeyDerivation)
    }

    /// wrap an existing scalar (test fixtures, restored storage)
    pub fn from_field(sk: FieldElement) -> Self {
        Self { sk }
    }

    /// the in-circuit public key, `poseidon2(sk, 0)` under the keypair tag
    ///
    /// the zero lane is padding: the permutation has no arity-1 form.
    pub fn public_key(&self) -> FieldElement {
        poseidon::hash2(self.sk, FieldElement::ZERO, DOMAIN_KEYPAIR)
    }

    pub fn as_field(&self) -> FieldElement {
        self.sk
    }
}

impl std::fmt::Debug for SpendingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print the scalar
        write!(f, "SpendingKey(..)")
    }
}

/// X25519 keypair for off-chain note encryption
#[derive(Clone)]
pub struct EncryptionKeypair {
    public: [u8; 32],
    secret: StaticSecret,
}

impl EncryptionKeypair {
    /// derive from a wallet signature over [`crate::ENCRYPTION_KEY_MESSAGE`]
    pub fn from_signature(signature: &[u8]) -> Result<Self> {
        let signature = check_signature_len(signature)?;
        let digest = Sha256::digest(signature);
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest);
        Ok(Self::from_seed(seed))
    }

    /// build from a 32-byte seed (the X25519 clamp is applied on use)
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let secret = StaticSecret::from(seed);
        let public = PublicKey::from(&secret);
        Self {
            public: *public.as_bytes(),
            secret,
        }
    }

    pub fn public(&self) -> [u8; 32] {
        self.public
    }

    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }

    /// expose the secret bytes for persistence
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }
}

impl std::fmt::Debug for EncryptionKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptionKeypair({})", hex::encode(self.public))
    }
}

fn check_signature_len(signature: &[u8]) -> Result<&[u8]> {
    if signature.len() != SIGNATURE_LEN {
        return Err(CryptoError::InvalidLength {
            expected: SIGNATURE_LEN,
            got: signature.len(),
        });
    }
    Ok(signature)
}
