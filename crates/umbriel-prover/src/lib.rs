//! groth16 proving worker
//!
//! proving is expensive and its artifacts are huge - a proving key of
//! hundreds of megabytes, the parsed constraint system, the witness
//! calculator. all of it lives on one dedicated worker thread and the rest of
//! the application talks to it through a strict request/response protocol:
//!
//! ```text
//!          InitModules        InitWitness         InitProver
//! Loaded ─────────────▶ ModulesReady ──▶ WitnessReady ──▶ ProverReady
//!                                                             │
//!                                            Prove / Verify / GetVk / info
//! ```
//!
//! transitions only move forward; a failed request leaves the state where it
//! was. `Ping` answers from any state with the readiness tuple. requests
//! correlate by message id, pending calls time out locally and late worker
//! responses are dropped.

pub mod artifact;
pub mod calculator;
pub mod error;
pub mod groth16;
pub mod r1cs;
pub mod worker;

pub use artifact::{ArtifactProvider, ArtifactUrls, HttpArtifactProvider, MemoryArtifacts, Progress};
pub use calculator::{FixedWitnessCalculator, WitnessCalculator};
pub use error::{ProverError, Result};
pub use groth16::{vk_to_on_chain, CircuitInfo, Groth16Prover, OnChainProof, ProofBundle};
pub use r1cs::R1cs;
pub use worker::{
    Request, Response, WorkerConfig, WorkerHandle, DEFAULT_TIMEOUT, PROVE_TIMEOUT, SPAWN_TIMEOUT,
};
