//! keccak-256 and its field-reduced form
//!
//! used only for binding transaction metadata to a proof: the canonical
//! ext-data byte stream is keccak-hashed, and the 256-bit digest reduced into
//! the BN254 scalar field becomes a public circuit input.

use tiny_keccak::{Hasher, Keccak};

use crate::field::FieldElement;

/// keccak-256 digest
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// digest of `data` reduced mod the field order
///
/// returns the reduced element; its big-endian bytes are what the chain sees.
pub fn keccak256_to_field(data: &[u8]) -> FieldElement {
    let digest = keccak256(data);
    FieldElement::from_be_bytes_reduced(&digest).expect("digest is 32 bytes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_vector() {
        // keccak256("") - the standard self-test vector
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_reduced_is_canonical() {
        let fe = keccak256_to_field(b"umbriel");
        let rt = FieldElement::from_le_bytes(&fe.to_le_bytes()).unwrap();
        assert_eq!(rt, fe);
    }

    #[test]
    fn test_reduction_changes_large_digests() {
        // find an input whose digest tops the modulus; the reduced form must
        // differ from the raw digest interpretation
        for i in 0u32..64 {
            let digest = keccak256(&i.to_le_bytes());
            if FieldElement::from_be_bytes(&digest).is_err() {
                let reduced = keccak256_to_field(&i.to_le_bytes());
                assert_ne!(reduced.to_be_bytes(), digest);
                return;
            }
        }
        // ~4/5 of digests exceed the modulus; 64 misses in a row is
        // effectively impossible
        panic!("no digest above the modulus found");
    }
}
