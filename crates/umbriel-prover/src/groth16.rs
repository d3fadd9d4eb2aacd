//! groth16 proving over replayed r1cs constraints
//!
//! the circom toolchain computes the witness; we cannot run its generated
//! prover here, so instead the parsed constraint matrices are replayed
//! through arkworks: allocate every wire with its precomputed value, enforce
//! each `a * b = c` row, and hand the system to ark-groth16.
//!
//! two proof encodings leave this module:
//!
//! - *compressed*: arkworks-canonical, for local verification and transport
//! - *on-chain*: 256 uncompressed bytes `a(64) || b(128) || c(64)`, g1 as
//!   `x || y` big-endian, g2 with `c1` before `c0` as the verifier precompile
//!   expects

use ark_bn254::{Bn254, Fr, G1Affine, G2Affine};
use ark_ff::{AdditiveGroup, BigInteger, Field, PrimeField};
use ark_groth16::{Groth16, PreparedVerifyingKey, Proof, ProvingKey, VerifyingKey};
use ark_relations::r1cs::{
    ConstraintSynthesizer, ConstraintSystemRef, SynthesisError, Variable,
};
use ark_relations::lc;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use ark_std::rand::rngs::OsRng;
use core::ops::AddAssign;
use tracing::{debug, info};

use crate::error::{ProverError, Result};
use crate::r1cs::R1cs;

const FIELD_SIZE: usize = 32;

/// proof in both encodings
#[derive(Clone, Debug)]
pub struct ProofBundle {
    /// arkworks-compressed `a || b || c`
    pub compressed: Vec<u8>,
    pub on_chain: OnChainProof,
}

/// uncompressed proof in the verifier contract's byte layout
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OnChainProof {
    pub a: [u8; 64],
    pub b: [u8; 128],
    pub c: [u8; 64],
}

impl OnChainProof {
    /// the 256-byte submit payload
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(&self.a);
        out.extend_from_slice(&self.b);
        out.extend_from_slice(&self.c);
        out
    }

    fn from_proof(proof: &Proof<Bn254>) -> Self {
        Self {
            a: g1_uncompressed(&proof.a),
            b: g2_uncompressed(&proof.b),
            c: g1_uncompressed(&proof.c),
        }
    }
}

/// circuit dimensions, served by the worker's info request
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CircuitInfo {
    pub num_public_inputs: u32,
    pub num_wires: u32,
    pub num_constraints: u64,
}

fn bigint_be_32<B: BigInteger>(value: B) -> [u8; 32] {
    let bytes = value.to_bytes_be();
    let mut out = [0u8; 32];
    let start = 32usize.saturating_sub(bytes.len());
    out[start..].copy_from_slice(&bytes[..bytes.len().min(32)]);
    out
}

/// `x || y`, both big-endian
fn g1_uncompressed(p: &G1Affine) -> [u8; 64] {
    let mut out = [0u8; 64];
    out[..32].copy_from_slice(&bigint_be_32(p.x.into_bigint()));
    out[32..].copy_from_slice(&bigint_be_32(p.y.into_bigint()));
    out
}

/// `x.c1 || x.c0 || y.c1 || y.c0` - imaginary before real, per the verifier
fn g2_uncompressed(p: &G2Affine) -> [u8; 128] {
    let mut out = [0u8; 128];
    out[..32].copy_from_slice(&bigint_be_32(p.x.c1.into_bigint()));
    out[32..64].copy_from_slice(&bigint_be_32(p.x.c0.into_bigint()));
    out[64..96].copy_from_slice(&bigint_be_32(p.y.c1.into_bigint()));
    out[96..].copy_from_slice(&bigint_be_32(p.y.c0.into_bigint()));
    out
}

/// uncompressed verifying key for deployment tooling
///
/// `alpha(64) || beta(128) || gamma(128) || delta(128) || ic_count u32 LE ||
/// ic entries (64 each)`
pub fn vk_to_on_chain(vk_bytes: &[u8]) -> Result<Vec<u8>> {
    let vk = VerifyingKey::<Bn254>::deserialize_compressed(vk_bytes)
        .map_err(|e| ProverError::Serialization(e.to_string()))?;

    let ic_count = u32::try_from(vk.gamma_abc_g1.len())
        .map_err(|_| ProverError::Serialization("ic count exceeds u32".into()))?;

    let mut out = Vec::with_capacity(452 + vk.gamma_abc_g1.len() * 64);
    out.extend_from_slice(&g1_uncompressed(&vk.alpha_g1));
    out.extend_from_slice(&g2_uncompressed(&vk.beta_g2));
    out.extend_from_slice(&g2_uncompressed(&vk.gamma_g2));
    out.extend_from_slice(&g2_uncompressed(&vk.delta_g2));
    out.extend_from_slice(&ic_count.to_le_bytes());
    for ic in &vk.gamma_abc_g1 {
        out.extend_from_slice(&g1_uncompressed(ic));
    }
    Ok(out)
}

/// replays parsed constraints with a precomputed witness
struct ReplayCircuit {
    r1cs: R1cs,
    /// full assignment, wire 0 holding the constant one
    witness: Vec<Fr>,
}

impl ConstraintSynthesizer<Fr> for ReplayCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> std::result::Result<(), SynthesisError> {
        if self.witness.first() != Some(&Fr::ONE) {
            return Err(SynthesisError::Unsatisfiable);
        }

        let num_public = self.r1cs.num_public as usize;
        let num_wires = self.r1cs.num_wires as usize;
        if num_public + 1 > num_wires || self.witness.len() < num_wires {
            return Err(SynthesisError::Unsatisfiable);
        }

        let mut variables: Vec<Variable> = Vec::with_capacity(num_wires);
        variables.push(Variable::One);
        for i in 1..=num_public {
            let value = self.witness[i];
            variables.push(cs.new_input_variable(|| Ok(value))?);
        }
        for i in (num_public + 1)..num_wires {
            let value = self.witness.get(i).copied().unwrap_or(Fr::ZERO);
            variables.push(cs.new_witness_variable(|| Ok(value))?);
        }

        for constraint in &self.r1cs.constraints {
            for term in constraint
                .a
                .terms
                .iter()
                .chain(&constraint.b.terms)
                .chain(&constraint.c.terms)
            {
                if term.wire_id as usize >= num_wires {
                    return Err(SynthesisError::Unsatisfiable);
                }
            }
        }

        for constraint in &self.r1cs.constraints {
            cs.enforce_constraint(
                {
                    let mut combination = lc!();
                    for term in &constraint.a.terms {
                        combination
                            .add_assign((term.coefficient, variables[term.wire_id as usize]));
                    }
                    combination
                },
                {
                    let mut combination = lc!();
                    for term in &constraint.b.terms {
                        combination
                            .add_assign((term.coefficient, variables[term.wire_id as usize]));
                    }
                    combination
                },
                {
                    let mut combination = lc!();
                    for term in &constraint.c.terms {
                        combination
                            .add_assign((term.coefficient, variables[term.wire_id as usize]));
                    }
                    combination
                },
            )?;
        }

        Ok(())
    }
}

/// holds the proving key, processed verifying key and constraints
pub struct Groth16Prover {
    pk: ProvingKey<Bn254>,
    pvk: PreparedVerifyingKey<Bn254>,
    r1cs: R1cs,
}

impl Groth16Prover {
    /// load from serialized artifacts
    ///
    /// the proving key deserializes unchecked - it is a trusted download and
    /// point validation on hundreds of megabytes is prohibitive.
    pub fn new(pk_bytes: &[u8], r1cs_bytes: &[u8]) -> Result<Self> {
        let pk = ProvingKey::<Bn254>::deserialize_compressed_unchecked(pk_bytes)
            .map_err(|e| ProverError::Serialization(format!("proving key: {e}")))?;
        let r1cs = R1cs::parse(r1cs_bytes)?;

        let vk = pk.vk.clone();
        if vk.gamma_abc_g1.len().saturating_sub(1) != r1cs.num_public as usize {
            return Err(ProverError::InvalidR1cs(
                "verifying key public input count disagrees with r1cs".into(),
            ));
        }

        let pvk = Groth16::<Bn254>::process_vk(&vk)
            .map_err(|e| ProverError::ProverFailure(e.to_string()))?;

        info!(
            wires = r1cs.num_wires,
            constraints = r1cs.num_constraints(),
            "prover initialized"
        );
        Ok(Self { pk, pvk, r1cs })
    }

    pub fn circuit_info(&self) -> CircuitInfo {
        CircuitInfo {
            num_public_inputs: self.r1cs.num_public,
            num_wires: self.r1cs.num_wires,
            num_constraints: self.r1cs.num_constraints() as u64,
        }
    }

    /// prove from little-endian witness bytes, 32 per element
    pub fn prove(&self, witness_bytes: &[u8]) -> Result<ProofBundle> {
        let witness = parse_witness(witness_bytes)?;
        if witness.len() < self.r1cs.num_wires as usize {
            return Err(ProverError::InvalidWitness(format!(
                "{} elements, circuit has {} wires",
                witness.len(),
                self.r1cs.num_wires
            )));
        }

        let circuit = ReplayCircuit {
            r1cs: self.r1cs.clone(),
            witness,
        };

        debug!("generating proof");
        let proof = Groth16::<Bn254>::prove(&self.pk, circuit, &mut OsRng)
            .map_err(|e| ProverError::ProverFailure(e.to_string()))?;

        let mut compressed = Vec::new();
        proof
            .serialize_compressed(&mut compressed)
            .map_err(|e| ProverError::Serialization(e.to_string()))?;

        Ok(ProofBundle {
            compressed,
            on_chain: OnChainProof::from_proof(&proof),
        })
    }

    /// verify a compressed proof against little-endian public input bytes
    pub fn verify(&self, compressed_proof: &[u8], public_inputs: &[u8]) -> Result<bool> {
        let proof = Proof::<Bn254>::deserialize_compressed(compressed_proof)
            .map_err(|e| ProverError::Serialization(e.to_string()))?;
        let inputs = parse_witness(public_inputs)?;

        let expected = self.pvk.vk.gamma_abc_g1.len().saturating_sub(1);
        if inputs.len() != expected {
            return Err(ProverError::InvalidWitness(format!(
                "{} public inputs, verifying key expects {expected}",
                inputs.len()
            )));
        }

        Groth16::<Bn254>::verify_with_processed_vk(&self.pvk, &inputs, &proof)
            .map_err(|e| ProverError::ProverFailure(e.to_string()))
    }

    /// compressed verifying key bytes
    pub fn verifying_key(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.pk
            .vk
            .serialize_compressed(&mut out)
            .map_err(|e| ProverError::Serialization(e.to_string()))?;
        Ok(out)
    }

    /// convert a compressed proof to the on-chain layout
    pub fn to_on_chain(&self, compressed_proof: &[u8]) -> Result<OnChainProof> {
        let proof = Proof::<Bn254>::deserialize_compressed(compressed_proof)
            .map_err(|e| ProverError::Serialization(e.to_string()))?;
        Ok(OnChainProof::from_proof(&proof))
    }

    /// slice the public inputs out of a full witness
    ///
    /// element 0 is the constant one; public values follow immediately.
    pub fn extract_public_inputs(&self, witness_bytes: &[u8]) -> Result<Vec<u8>> {
        if witness_bytes.len() % FIELD_SIZE != 0 {
            return Err(ProverError::InvalidWitness("length not 32-aligned".into()));
        }
        let num_public = self.r1cs.num_public as usize;
        let start = FIELD_SIZE;
        let end = start + num_public * FIELD_SIZE;
        if end > witness_bytes.len() {
            return Err(ProverError::InvalidWitness(format!(
                "witness too short for {num_public} public inputs"
            )));
        }
        Ok(witness_bytes[start..end].to_vec())
    }
}

fn parse_witness(bytes: &[u8]) -> Result<Vec<Fr>> {
    if bytes.len() % FIELD_SIZE != 0 {
        return Err(ProverError::InvalidWitness(format!(
            "{} bytes is not a multiple of {FIELD_SIZE}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(FIELD_SIZE)
        .map(Fr::from_le_bytes_mod_order)
        .collect())
}

/// trusted setup over the fixture circuit; test helper shared with the
/// worker tests
#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures {
    use super::*;
    use crate::r1cs::fixtures as r1cs_fixtures;

    /// returns serialized `(proving key, r1cs)` for the product circuit
    pub fn product_setup() -> (Vec<u8>, Vec<u8>) {
        let r1cs_bytes = r1cs_fixtures::product_circuit();
        let circuit = ReplayCircuit {
            r1cs: R1cs::parse(&r1cs_bytes).expect("fixture parses"),
            witness: parse_witness(&r1cs_fixtures::product_witness(2, 3))
                .expect("fixture witness parses"),
        };
        let (pk, _vk) = Groth16::<Bn254>::circuit_specific_setup(circuit, &mut OsRng)
            .expect("setup succeeds");

        let mut pk_bytes = Vec::new();
        pk.serialize_compressed(&mut pk_bytes).expect("pk serializes");
        (pk_bytes, r1cs_bytes)
    }
}
