//! poseidon2 merkle trees for the umbriel shielded pool
//!
//! two tree shapes back the protocol:
//!
//! - [`MerkleTree`]: fixed-depth append-only tree of note commitments (also
//!   reused for the attestation membership set). every internal node is the
//!   feed-forward poseidon2 compression the circuit verifies against.
//! - [`SparseMerkleTree`]: key-indexed tree for the sanctions list, producing
//!   non-membership proofs in the circomlib smt shape.

pub mod error;
pub mod smt;
pub mod tree;

pub use error::{Result, TreeError};
pub use smt::{NonMembershipProof, SmtWriteResult, SparseMerkleTree};
pub use tree::{MerkleProof, MerkleTree};
