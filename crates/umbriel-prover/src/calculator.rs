//! witness calculation interface
//!
//! the witness calculator is the compiled circuit itself - an external wasm
//! artifact that maps the json signal map to the full wire assignment. the
//! core only drives it: a trait for production embeddings and a fixed-output
//! implementation for tests.

use crate::error::{ProverError, Result};

/// maps circuit inputs (json, decimal strings) to little-endian witness bytes
pub trait WitnessCalculator: Send {
    fn calculate(&self, inputs_json: &str) -> Result<Vec<u8>>;
}

/// returns pre-baked witness bytes regardless of input
///
/// stands in for the circuit wasm in worker tests, where the fixture circuit
/// has a known satisfying assignment.
pub struct FixedWitnessCalculator {
    witness: Vec<u8>,
}

impl FixedWitnessCalculator {
    pub fn new(witness: Vec<u8>) -> Self {
        Self { witness }
    }
}

impl WitnessCalculator for FixedWitnessCalculator {
    fn calculate(&self, inputs_json: &str) -> Result<Vec<u8>> {
        // still insist on well-formed input, like the real calculator would
        serde_json::from_str::<serde_json::Value>(inputs_json)
            .map_err(|e| ProverError::InvalidWitness(format!("inputs not json: {e}")))?;
        Ok(self.witness.clone())
    }
}
