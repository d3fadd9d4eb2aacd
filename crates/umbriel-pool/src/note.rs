//! note algebra
//!
//! pure functions in the circuit's semantics. each hash carries its own
//! domain tag so commitments, signatures and nullifiers can never collide
//! across roles:
//!
//! ```text
//! commitment = poseidon2(amount, pk, blinding)          tag 1
//! signature  = poseidon2(sk, commitment, path_indices)  tag 4
//! nullifier  = poseidon2(commitment, path_indices, sig) tag 2
//! ```
//!
//! the signature is only meaningful when `pk = poseidon2(sk)` - the circuit
//! enforces that; off-chain we just mirror the arithmetic.

use rand::rngs::OsRng;
use rand::RngCore;
use umbriel_crypto::{
    poseidon, FieldElement, SpendingKey, DOMAIN_COMMITMENT, DOMAIN_NULLIFIER, DOMAIN_SIGNATURE,
};

/// a shielded note
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Note {
    /// value, strictly below 2^248 in the circuit (u64 on the wire)
    pub amount: u64,
    /// owner's in-circuit public key
    pub pk: FieldElement,
    /// commitment randomness
    pub blinding: FieldElement,
}

impl Note {
    pub fn new(amount: u64, pk: FieldElement, blinding: FieldElement) -> Self {
        Self { amount, pk, blinding }
    }

    /// fresh blinding from the system csprng
    ///
    /// blindings are random per note and must be stored; they are not
    /// derivable from any key.
    pub fn random_blinding() -> FieldElement {
        loop {
            let mut bytes = [0u8; 32];
            OsRng.fill_bytes(&mut bytes);
            // clear the top byte so the sample is always canonical
            bytes[31] = 0;
            if let Ok(fe) = FieldElement::from_le_bytes(&bytes) {
                return fe;
            }
        }
    }

    /// a note is dummy iff it carries no value; the circuit skips merkle
    /// membership for it but the slot is still occupied
    pub fn is_dummy(&self) -> bool {
        self.amount == 0
    }

    /// the leaf published in the pool tree
    pub fn commitment(&self) -> FieldElement {
        poseidon::hash3(
            FieldElement::from_u64(self.amount),
            self.pk,
            self.blinding,
            DOMAIN_COMMITMENT,
        )
    }

    /// in-circuit spend authorization over this note at a tree position
    pub fn signature(&self, sk: &SpendingKey, path_indices: u64) -> FieldElement {
        poseidon::hash3(
            sk.as_field(),
            self.commitment(),
            FieldElement::from_u64(path_indices),
            DOMAIN_SIGNATURE,
        )
    }

    /// nullifier revealed when this note is spent
    pub fn nullifier(&self, sk: &SpendingKey, path_indices: u64) -> FieldElement {
        let commitment = self.commitment();
        let signature = self.signature(sk, path_indices);
        poseidon::hash3(
            commitment,
            FieldElement::from_u64(path_indices),
            signature,
            DOMAIN_NULLIFIER,
        )
    }
}

/// zero-amount filler for unused input slots
///
/// blindings only need to be field-distinct per slot; the fixed constants
/// keep dummy witnesses reproducible.
#[derive(Clone, Copy, Debug)]
pub struct DummyInput {
    pub note: Note,
    pub path_indices: u64,
}

impl DummyInput {
    /// blinding constants for the two dummy slots
    pub const BLINDINGS: [u64; 2] = [101, 202];

    /// dummy for input slot `slot`
    pub fn for_slot(slot: usize, pk: FieldElement) -> Self {
        let blinding = Self::BLINDINGS[slot % Self::BLINDINGS.len()];
        Self {
            note: Note::new(0, pk, FieldElement::from_u64(blinding)),
            path_indices: 0,
        }
    }
}
