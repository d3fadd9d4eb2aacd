//! error types for umbriel-builder

use thiserror::Error;
use umbriel_crypto::CryptoError;
use umbriel_merkle::TreeError;

use crate::signer::SignerError;

#[derive(Debug, Error)]
pub enum BuilderError {
    // input validation
    #[error("amounts do not balance: inputs {inputs} + public {public} != outputs {outputs}")]
    Unbalanced {
        inputs: i128,
        public: i128,
        outputs: i128,
    },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("input note at leaf {leaf_index} has no merkle proof")]
    MissingProof { leaf_index: u32 },

    #[error("too many {role} slots: got {got}, circuit takes {max}")]
    TooManySlots {
        role: &'static str,
        got: usize,
        max: usize,
    },

    #[error("nullifier collision between inputs {0} and {1}")]
    NullifierCollision(usize, usize),

    #[error("input note at leaf {leaf_index} is not owned by the spending key")]
    NoteNotOwned { leaf_index: u32 },

    #[error("invalid recipient address: {0}")]
    InvalidAddress(String),

    #[error("output is missing the recipient encryption key")]
    MissingEncryptionKey,

    // compliance
    #[error("spending key is on the sanctions list")]
    Sanctioned,

    #[error("non-membership root mismatch: chain {chain}, proof {proof}")]
    RootMismatch { chain: String, proof: String },

    #[error("public key is not registered with the attestation provider")]
    NotRegistered,

    // external
    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error("chain error: {0}")]
    Chain(String),

    #[error("xdr encoding failed: {0}")]
    Xdr(String),
}

pub type Result<T> = std::result::Result<T, BuilderError>;
