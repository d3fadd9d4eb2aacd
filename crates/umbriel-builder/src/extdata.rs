//! ext-data canonical encoding and hashing
//!
//! transaction metadata - recipient, public amount, fee, the two sealed
//! outputs - is bound to the proof through a keccak hash of its canonical
//! byte form. the contract recomputes the hash from the submitted struct, so
//! the builder must produce byte-for-byte the same stream: the soroban scval
//! map with entries in byte-lexicographic symbol order, xdr-serialized.

use stellar_xdr::curr::{
    AccountId, Int256Parts, Limits, PublicKey as XdrPublicKey, ScAddress, ScBytes, ScMap,
    ScMapEntry, ScSymbol, ScVal, UInt256Parts, Uint256, WriteXdr,
};
use umbriel_crypto::{keccak, FieldElement};

use crate::error::{BuilderError, Result};

/// transaction metadata, pre-hash
///
/// `encrypted_output0/1` are filled by the assembler, never by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtData {
    /// strkey account address receiving a withdrawal (or the sender for
    /// deposits and transfers)
    pub recipient: String,
    /// signed public amount moved in (+) or out (-) of the pool
    pub ext_amount: i128,
    /// relayer fee, subtracted from `ext_amount` in the public amount
    pub fee: u64,
    pub encrypted_output0: Vec<u8>,
    pub encrypted_output1: Vec<u8>,
}

/// the two forms of the ext-data digest
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtDataHash {
    /// reduced digest, public circuit input
    pub field: FieldElement,
    /// big-endian bytes of the reduced digest, passed to the submit call
    pub bytes_be: [u8; 32],
}

impl ExtData {
    /// canonical xdr bytes of the scval map
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let scval = self.to_scval()?;
        scval
            .to_xdr(Limits::none())
            .map_err(|e| BuilderError::Xdr(e.to_string()))
    }

    /// keccak-256 of the canonical bytes, reduced into the field
    pub fn hash(&self) -> Result<ExtDataHash> {
        let bytes = self.serialize()?;
        let field = keccak::keccak256_to_field(&bytes);
        Ok(ExtDataHash {
            field,
            bytes_be: field.to_be_bytes(),
        })
    }

    /// build the scval map, entries sorted by symbol key
    ///
    /// `encrypted_output0 < encrypted_output1 < ext_amount < fee < recipient`
    /// in byte order - the order soroban's map canonicalization yields.
    fn to_scval(&self) -> Result<ScVal> {
        let entries = vec![
            ScMapEntry {
                key: ScVal::Symbol(symbol("encrypted_output0")?),
                val: bytes_val(&self.encrypted_output0)?,
            },
            ScMapEntry {
                key: ScVal::Symbol(symbol("encrypted_output1")?),
                val: bytes_val(&self.encrypted_output1)?,
            },
            ScMapEntry {
                key: ScVal::Symbol(symbol("ext_amount")?),
                val: ScVal::I256(i256_parts(self.ext_amount)),
            },
            ScMapEntry {
                key: ScVal::Symbol(symbol("fee")?),
                val: ScVal::U256(UInt256Parts {
                    hi_hi: 0,
                    hi_lo: 0,
                    lo_hi: 0,
                    lo_lo: self.fee,
                }),
            },
            ScMapEntry {
                key: ScVal::Symbol(symbol("recipient")?),
                val: ScVal::Address(parse_account(&self.recipient)?),
            },
        ];

        let map = ScMap(
            entries
                .try_into()
                .map_err(|_| BuilderError::Xdr("map exceeds xdr bounds".into()))?,
        );
        Ok(ScVal::Map(Some(map)))
    }

    /// net public amount as the circuit sees it
    ///
    /// `ext_amount - fee`, with negative values wrapped to `p - |x|`.
    pub fn public_amount(&self) -> Result<FieldElement> {
        let fee = i128::try_from(self.fee).map_err(|_| {
            BuilderError::Xdr("fee exceeds i128".into())
        })?;
        let net = self
            .ext_amount
            .checked_sub(fee)
            .ok_or_else(|| BuilderError::Xdr("public amount underflows i128".into()))?;
        if net >= 0 {
            Ok(FieldElement::from_u128(net.unsigned_abs()))
        } else {
            Ok(FieldElement::from_u128(net.unsigned_abs()).negate())
        }
    }
}

fn symbol(name: &str) -> Result<ScSymbol> {
    name.try_into()
        .map(ScSymbol)
        .map_err(|_| BuilderError::Xdr(format!("invalid symbol: {name}")))
}

fn bytes_val(bytes: &[u8]) -> Result<ScVal> {
    let inner = bytes
        .to_vec()
        .try_into()
        .map_err(|_| BuilderError::Xdr("byte value exceeds xdr bounds".into()))?;
    Ok(ScVal::Bytes(ScBytes(inner)))
}

/// two's-complement split of an i128 into i256 limbs
fn i256_parts(value: i128) -> Int256Parts {
    let low = value as u128;
    let (hi_hi, hi_lo) = if value < 0 { (-1i64, u64::MAX) } else { (0, 0) };
    Int256Parts {
        hi_hi,
        hi_lo,
        lo_hi: (low >> 64) as u64,
        lo_lo: low as u64,
    }
}

fn parse_account(address: &str) -> Result<ScAddress> {
    let key = stellar_strkey::ed25519::PublicKey::from_string(address)
        .map_err(|_| BuilderError::InvalidAddress(address.into()))?;
    Ok(ScAddress::Account(AccountId(
        XdrPublicKey::PublicKeyTypeEd25519(Uint256(key.0)),
    )))
}
