//! poseidon2 over BN254
//!
//! thin wrappers around the zkhash permutation. the registry crate ships one
//! bn254 instance (width 3), so every shape the protocol needs is built over
//! it, with the domain tag in the last lane:
//!
//! - [`compress`]: merkle node compression, `P(l, r, 0)[0] + l` - the
//!   feed-forward keeps node hashing distinct from the sponge shapes
//! - [`hash2`]: two elements plus a tag, `P(a, b, tag)[0]`
//! - [`hash3`]: three elements plus a tag, chained absorption
//!   `hash2(hash2(a, b, tag), c, tag)`

use zkhash::fields::bn256::FpBN256 as Scalar;
use zkhash::poseidon2::poseidon2::Poseidon2;
use zkhash::poseidon2::poseidon2_instance_bn256::POSEIDON2_BN256_PARAMS;

use crate::field::FieldElement;

fn permute(input: [Scalar; 3]) -> Vec<Scalar> {
    let h = Poseidon2::new(&POSEIDON2_BN256_PARAMS);
    h.permutation(&input)
}

/// merkle node compression with feed-forward
pub fn compress(left: FieldElement, right: FieldElement) -> FieldElement {
    let l = left.to_scalar();
    let perm = permute([l, right.to_scalar(), FieldElement::ZERO.to_scalar()]);
    FieldElement::from_scalar(perm[0] + l)
}

/// two-element hash with a domain tag in the third lane
pub fn hash2(a: FieldElement, b: FieldElement, domain: u64) -> FieldElement {
    let perm = permute([
        a.to_scalar(),
        b.to_scalar(),
        FieldElement::from_u64(domain).to_scalar(),
    ]);
    FieldElement::from_scalar(perm[0])
}

/// three-element hash with a domain tag, absorbed in two blocks
pub fn hash3(a: FieldElement, b: FieldElement, c: FieldElement, domain: u64) -> FieldElement {
    hash2(hash2(a, b, domain), c, domain)
}
