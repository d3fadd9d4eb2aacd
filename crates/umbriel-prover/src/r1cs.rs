//! r1cs binary parser
//!
//! reads the `.r1cs` container the circom compiler emits (magic `r1cs`,
//! version 1, typed sections) into constraint matrices we can replay inside
//! the groth16 synthesizer. only the header and constraint sections matter;
//! wire-to-label maps and anything unknown is skipped.
//!
//! format reference: iden3 r1cs binary spec.

use ark_bn254::Fr;
use ark_ff::PrimeField;

use crate::error::{ProverError, Result};

const FIELD_SIZE: usize = 32;

/// one `coefficient * wire` term
#[derive(Clone, Debug)]
pub struct Term {
    pub wire_id: u32,
    pub coefficient: Fr,
}

/// linear combination of wires
#[derive(Clone, Debug, Default)]
pub struct LinearCombination {
    pub terms: Vec<Term>,
}

/// one rank-1 constraint, `a * b = c`
#[derive(Clone, Debug)]
pub struct Constraint {
    pub a: LinearCombination,
    pub b: LinearCombination,
    pub c: LinearCombination,
}

/// parsed constraint system
#[derive(Clone, Debug)]
pub struct R1cs {
    pub num_wires: u32,
    pub num_pub_out: u32,
    pub num_pub_in: u32,
    pub num_prv_in: u32,
    /// public outputs + inputs, excluding the constant-one wire
    pub num_public: u32,
    pub constraints: Vec<Constraint>,
}

impl R1cs {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);

        if cursor.take(4)? != b"r1cs" {
            return Err(ProverError::InvalidR1cs("bad magic".into()));
        }
        let version = cursor.u32()?;
        if version != 1 {
            return Err(ProverError::InvalidR1cs(format!(
                "unsupported version {version}"
            )));
        }

        let num_sections = cursor.u32()?;
        let mut header: Option<Header> = None;
        let mut constraint_section: Option<usize> = None;

        for _ in 0..num_sections {
            let section_type = cursor.u32()?;
            let section_size = usize::try_from(cursor.u64()?)
                .map_err(|_| ProverError::InvalidR1cs("section size overflow".into()))?;
            let section_start = cursor.position;

            match section_type {
                1 => header = Some(Header::parse(&mut cursor)?),
                2 => constraint_section = Some(section_start),
                _ => {}
            }

            // land exactly past the section regardless of what we consumed
            cursor.seek(section_start)?;
            cursor.skip(section_size)?;
        }

        let header = header.ok_or_else(|| ProverError::InvalidR1cs("missing header".into()))?;

        let constraints = match constraint_section {
            Some(start) => {
                cursor.seek(start)?;
                parse_constraints(&mut cursor, &header)?
            }
            None => Vec::new(),
        };

        Ok(R1cs {
            num_wires: header.num_wires,
            num_pub_out: header.num_pub_out,
            num_pub_in: header.num_pub_in,
            num_prv_in: header.num_prv_in,
            num_public: header.num_pub_out + header.num_pub_in,
            constraints,
        })
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }
}

struct Header {
    num_wires: u32,
    num_pub_out: u32,
    num_pub_in: u32,
    num_prv_in: u32,
    num_constraints: u32,
}

impl Header {
    fn parse(cursor: &mut Cursor<'_>) -> Result<Self> {
        let field_size = cursor.u32()?;
        if field_size as usize != FIELD_SIZE {
            return Err(ProverError::InvalidR1cs(format!(
                "unsupported field size {field_size}"
            )));
        }
        // the prime itself; we only ever prove over bn254
        cursor.skip(FIELD_SIZE)?;

        let num_wires = cursor.u32()?;
        let num_pub_out = cursor.u32()?;
        let num_pub_in = cursor.u32()?;
        let num_prv_in = cursor.u32()?;
        let _num_labels = cursor.u64()?;
        let num_constraints = cursor.u32()?;

        Ok(Header {
            num_wires,
            num_pub_out,
            num_pub_in,
            num_prv_in,
            num_constraints,
        })
    }
}

fn parse_constraints(cursor: &mut Cursor<'_>, header: &Header) -> Result<Vec<Constraint>> {
    let mut constraints = Vec::with_capacity(header.num_constraints as usize);
    for _ in 0..header.num_constraints {
        let a = parse_lc(cursor)?;
        let b = parse_lc(cursor)?;
        let c = parse_lc(cursor)?;
        constraints.push(Constraint { a, b, c });
    }
    Ok(constraints)
}

fn parse_lc(cursor: &mut Cursor<'_>) -> Result<LinearCombination> {
    let num_terms = cursor.u32()?;
    let mut terms = Vec::with_capacity(num_terms as usize);
    for _ in 0..num_terms {
        let wire_id = cursor.u32()?;
        let coefficient = Fr::from_le_bytes_mod_order(cursor.take(FIELD_SIZE)?);
        terms.push(Term {
            wire_id,
            coefficient,
        });
    }
    Ok(LinearCombination { terms })
}

struct Cursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .position
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| ProverError::InvalidR1cs("unexpected end of data".into()))?;
        let slice = &self.data[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().expect("4 bytes")))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().expect("8 bytes")))
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    fn seek(&mut self, position: usize) -> Result<()> {
        if position > self.data.len() {
            return Err(ProverError::InvalidR1cs("seek past end".into()));
        }
        self.position = position;
        Ok(())
    }
}

/// build a minimal r1cs binary; test helper shared with the worker tests
#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures {
    use ark_ff::{BigInteger, PrimeField};

    use super::*;

    fn push_fr(out: &mut Vec<u8>, value: Fr) {
        let mut bytes = value.into_bigint().to_bytes_le();
        bytes.resize(FIELD_SIZE, 0);
        out.extend_from_slice(&bytes);
    }

    fn push_lc(out: &mut Vec<u8>, terms: &[(u32, u64)]) {
        out.extend_from_slice(&(terms.len() as u32).to_le_bytes());
        for &(wire, coeff) in terms {
            out.extend_from_slice(&wire.to_le_bytes());
            push_fr(out, Fr::from(coeff));
        }
    }

    /// a single-constraint circuit: `w2 * w3 = w1`, with w1 the only public
    /// input. satisfied by the witness `[1, a*b, a, b]`.
    pub fn product_circuit() -> Vec<u8> {
        let mut body = Vec::new();

        // header section
        let mut header = Vec::new();
        header.extend_from_slice(&(FIELD_SIZE as u32).to_le_bytes());
        header.extend_from_slice(&[0u8; FIELD_SIZE]); // prime, unchecked
        header.extend_from_slice(&4u32.to_le_bytes()); // wires
        header.extend_from_slice(&0u32.to_le_bytes()); // pub out
        header.extend_from_slice(&1u32.to_le_bytes()); // pub in
        header.extend_from_slice(&2u32.to_le_bytes()); // prv in
        header.extend_from_slice(&4u64.to_le_bytes()); // labels
        header.extend_from_slice(&1u32.to_le_bytes()); // constraints

        // constraint section: a = w2, b = w3, c = w1
        let mut constraints = Vec::new();
        push_lc(&mut constraints, &[(2, 1)]);
        push_lc(&mut constraints, &[(3, 1)]);
        push_lc(&mut constraints, &[(1, 1)]);

        body.extend_from_slice(b"r1cs");
        body.extend_from_slice(&1u32.to_le_bytes()); // version
        body.extend_from_slice(&2u32.to_le_bytes()); // sections

        body.extend_from_slice(&1u32.to_le_bytes());
        body.extend_from_slice(&(header.len() as u64).to_le_bytes());
        body.extend_from_slice(&header);

        body.extend_from_slice(&2u32.to_le_bytes());
        body.extend_from_slice(&(constraints.len() as u64).to_le_bytes());
        body.extend_from_slice(&constraints);

        body
    }

    /// little-endian witness bytes for [`product_circuit`]
    pub fn product_witness(a: u64, b: u64) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 * FIELD_SIZE);
        push_fr(&mut out, Fr::from(1u64));
        push_fr(&mut out, Fr::from(a) * Fr::from(b));
        push_fr(&mut out, Fr::from(a));
        push_fr(&mut out, Fr::from(b));
        out
    }
}
