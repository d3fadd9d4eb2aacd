//! shielded transaction builder
//!
//! turns a spend request - owned input notes, desired outputs, a public
//! amount - into everything a transaction needs:
//!
//! 1. the full circuit witness input (decimal-string map)
//! 2. sealed output notes for the recipients
//! 3. the canonical ext-data bytes and their field-reduced keccak hash
//! 4. the public values the contract checks against the proof
//!
//! the builder is pure data plumbing: it owns no keys, no network and no
//! prover. wallets, chain access and note storage arrive as trait objects
//! ([`Signer`], [`ChainGateway`], [`NoteStore`]) with deterministic fakes for
//! tests; proving happens in the worker crate.

pub mod assembler;
pub mod compliance;
pub mod error;
pub mod extdata;
pub mod gateway;
pub mod signer;
pub mod witness;

pub use assembler::{
    OutputRequest, PublicValues, SpendInput, TransactionBuilder, TransactionBundle,
    TransactionRequest,
};
pub use compliance::{ComplianceProver, MembershipWitness, NonMembershipWitness};
pub use error::{BuilderError, Result};
pub use extdata::{ExtData, ExtDataHash};
pub use gateway::{
    ChainGateway, FakeGateway, MembershipState, NonMembershipState, PoolState, SubmitReceipt,
    SubmittedTransaction,
};
pub use signer::{FakeSigner, Signer, SignerError};
pub use witness::CircuitInputs;

pub use umbriel_pool::{NoteStore, LEVELS, N_INS, N_OUTS};

/// default sanctions-tree depth the circuit verifies against
pub const SMT_LEVELS: usize = 5;
