//! canonical BN254 scalar field elements
//!
//! a [`FieldElement`] is always a reduced element of the BN254 scalar field,
//! stored as 32 little-endian bytes. two byte encodings cross the crate
//! boundary: little-endian (witness wire, note storage) and big-endian (hex
//! display, keccak input, on-chain values). conversion between the two is
//! explicit and total.

use zkhash::ark_ff::{BigInteger, PrimeField, Zero};
use zkhash::fields::bn256::FpBN256 as Scalar;

use crate::error::{CryptoError, Result};

/// field element size in bytes
pub const FIELD_SIZE: usize = 32;

/// a reduced BN254 scalar, canonical little-endian bytes
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FieldElement([u8; FIELD_SIZE]);

impl FieldElement {
    pub const ZERO: FieldElement = FieldElement([0u8; FIELD_SIZE]);

    /// parse canonical little-endian bytes
    ///
    /// fails with `FieldOverflow` for encodings at or above the field modulus.
    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self> {
        let arr = fixed_32(bytes)?;
        let scalar = Scalar::from_le_bytes_mod_order(&arr);
        let out = Self::from_scalar(scalar);
        if out.0 != arr {
            return Err(CryptoError::FieldOverflow);
        }
        Ok(out)
    }

    /// parse little-endian bytes, reducing mod the field order
    pub fn from_le_bytes_reduced(bytes: &[u8]) -> Result<Self> {
        let arr = fixed_32(bytes)?;
        Ok(Self::from_scalar(Scalar::from_le_bytes_mod_order(&arr)))
    }

    /// parse canonical big-endian bytes
    pub fn from_be_bytes(bytes: &[u8]) -> Result<Self> {
        let mut arr = fixed_32(bytes)?;
        arr.reverse();
        Self::from_le_bytes(&arr)
    }

    /// parse big-endian bytes, reducing mod the field order
    pub fn from_be_bytes_reduced(bytes: &[u8]) -> Result<Self> {
        let mut arr = fixed_32(bytes)?;
        arr.reverse();
        Self::from_le_bytes_reduced(&arr)
    }

    pub fn from_u64(value: u64) -> Self {
        Self::from_scalar(Scalar::from(value))
    }

    pub fn from_u128(value: u128) -> Self {
        Self::from_scalar(Scalar::from(value))
    }

    /// parse a big-endian hex string, with or without a 0x prefix
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let stripped = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        if stripped.len() > 64 {
            return Err(CryptoError::InvalidHex(format!(
                "hex string too long: {} chars",
                stripped.len()
            )));
        }
        let padded = format!("{stripped:0>64}");
        let bytes = hex::decode(&padded)
            .map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
        Self::from_be_bytes(&bytes)
    }

    pub fn to_le_bytes(&self) -> [u8; FIELD_SIZE] {
        self.0
    }

    pub fn to_be_bytes(&self) -> [u8; FIELD_SIZE] {
        let mut out = self.0;
        out.reverse();
        out
    }

    /// big-endian hex with 0x prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_be_bytes()))
    }

    /// decimal string, as the circuit witness wire expects
    pub fn to_decimal(&self) -> String {
        format!("{}", self.to_scalar())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; FIELD_SIZE]
    }

    /// additive inverse, `p - x`
    ///
    /// used to express negative public amounts the way the contract does.
    pub fn negate(&self) -> Self {
        Self::from_scalar(-self.to_scalar())
    }

    /// whether the element fits in 248 bits (the circuit's amount range)
    pub fn fits_u248(&self) -> bool {
        self.0[31] == 0
    }

    pub(crate) fn to_scalar(self) -> Scalar {
        Scalar::from_le_bytes_mod_order(&self.0)
    }

    pub(crate) fn from_scalar(scalar: Scalar) -> Self {
        let mut out = [0u8; FIELD_SIZE];
        let bigint = scalar.into_bigint();
        for (chunk, limb) in out.chunks_exact_mut(8).zip(bigint.0.iter()) {
            chunk.copy_from_slice(&limb.to_le_bytes());
        }
        Self(out)
    }
}

impl std::fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FieldElement({})", self.to_hex())
    }
}

impl std::fmt::Display for FieldElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<u64> for FieldElement {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

fn fixed_32(bytes: &[u8]) -> Result<[u8; FIELD_SIZE]> {
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidLength {
            expected: FIELD_SIZE,
            got: bytes.len(),
        })
}

/// the field modulus, big-endian
///
/// 0x30644e72e131a029b85045b68181585d2833e84879b9709143e1f593f0000001
pub fn modulus_be_bytes() -> [u8; FIELD_SIZE] {
    let mut out = [0u8; FIELD_SIZE];
    let minus_one = Scalar::zero() - Scalar::from(1u64);
    let bytes = minus_one.into_bigint().to_bytes_be();
    out.copy_from_slice(&bytes);
    // modulus = (p - 1) + 1, and p - 1 ends in 0x00
    out[31] = out[31].wrapping_add(1);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zero_roundtrip() {
        let z = FieldElement::ZERO;
        assert!(z.is_zero());
        assert_eq!(z.to_le_bytes(), [0u8; 32]);
        assert_eq!(z.to_decimal(), "0");
    }

    #[test]
    fn test_le_be_crossing() {
        let x = FieldElement::from_u64(0xdead_beef);
        let le = x.to_le_bytes();
        let mut reversed = le;
        reversed.reverse();
        assert_eq!(x.to_be_bytes(), reversed);
        assert_eq!(FieldElement::from_be_bytes(&reversed).unwrap(), x);
    }

    #[test]
    fn test_modulus_rejected() {
        let p = modulus_be_bytes();
        assert!(matches!(
            FieldElement::from_be_bytes(&p),
            Err(CryptoError::FieldOverflow)
        ));
        // p - 1 is canonical
        let mut p_minus_one = p;
        p_minus_one[31] -= 1;
        assert!(FieldElement::from_be_bytes(&p_minus_one).is_ok());
    }

    #[test]
    fn test_reduced_parse_wraps() {
        let p = modulus_be_bytes();
        let wrapped = FieldElement::from_be_bytes_reduced(&p).unwrap();
        assert!(wrapped.is_zero());
    }

    #[test]
    fn test_hex_roundtrip() {
        let x = FieldElement::from_u64(500_000);
        let parsed = FieldElement::from_hex(&x.to_hex()).unwrap();
        assert_eq!(parsed, x);
        // short hex is left-padded
        assert_eq!(FieldElement::from_hex("0x2a").unwrap(), FieldElement::from_u64(42));
    }

    #[test]
    fn test_invalid_hex() {
        assert!(matches!(
            FieldElement::from_hex("0xzz"),
            Err(CryptoError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_wrong_length() {
        assert!(matches!(
            FieldElement::from_le_bytes(&[0u8; 16]),
            Err(CryptoError::InvalidLength { expected: 32, got: 16 })
        ));
    }

    #[test]
    fn test_fits_u248() {
        assert!(FieldElement::from_u64(u64::MAX).fits_u248());
        let mut top = [0u8; 32];
        top[31] = 1; // 2^248
        assert!(!FieldElement::from_le_bytes(&top).unwrap().fits_u248());
    }

    #[test]
    fn test_negate() {
        let x = FieldElement::from_u64(5);
        assert!(!x.negate().is_zero());
        assert_eq!(x.negate().negate(), x);
        assert!(FieldElement::ZERO.negate().is_zero());
        // p - 1 sits just below the modulus
        let mut expected = modulus_be_bytes();
        expected[31] -= 1;
        assert_eq!(FieldElement::from_u64(1).negate().to_be_bytes(), expected);
    }

    #[test]
    fn test_decimal() {
        assert_eq!(FieldElement::from_u64(500_000).to_decimal(), "500000");
        assert_eq!(
            FieldElement::from_u128(1u128 << 64).to_decimal(),
            "18446744073709551616"
        );
    }

    proptest! {
        #[test]
        fn prop_le_roundtrip(v in any::<u64>()) {
            let x = FieldElement::from_u64(v);
            let back = FieldElement::from_le_bytes(&x.to_le_bytes()).unwrap();
            prop_assert_eq!(back, x);
        }

        #[test]
        fn prop_be_roundtrip(bytes in any::<[u8; 32]>()) {
            // reduce first, then both encodings must round-trip
            let x = FieldElement::from_le_bytes_reduced(&bytes).unwrap();
            prop_assert_eq!(FieldElement::from_le_bytes(&x.to_le_bytes()).unwrap(), x);
            prop_assert_eq!(FieldElement::from_be_bytes(&x.to_be_bytes()).unwrap(), x);
        }
    }
}
