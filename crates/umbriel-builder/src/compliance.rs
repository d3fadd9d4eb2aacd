//! compliance proof builder
//!
//! every non-dummy input must show two things about its owner key: it is
//! *registered* (a leaf of the attestation membership tree) and it is *not
//! sanctioned* (absent from the non-membership tree). the membership tree is
//! rebuilt locally from chain events so proofs can be taken at any index; the
//! sanctions tree stays external and only hands out proofs.

use tracing::{debug, warn};
use umbriel_crypto::{poseidon, FieldElement, DOMAIN_LEAF};
use umbriel_merkle::{MerkleTree, NonMembershipProof};

use crate::error::{BuilderError, Result};
use crate::gateway::ChainGateway;

/// membership proof shaped for one circuit input
#[derive(Clone, Debug)]
pub struct MembershipWitness {
    pub leaf: FieldElement,
    pub blinding: FieldElement,
    pub path_indices: u64,
    pub path_elements: Vec<FieldElement>,
    pub root: FieldElement,
}

/// non-membership proof shaped for one circuit input
#[derive(Clone, Debug)]
pub struct NonMembershipWitness {
    pub key: FieldElement,
    pub old_key: FieldElement,
    pub old_value: FieldElement,
    pub is_old_zero: bool,
    /// padded with zeros to the circuit's fixed depth
    pub siblings: Vec<FieldElement>,
    pub root: FieldElement,
}

/// registration leaf: `poseidon2(pk, blinding)` under the leaf tag
pub fn membership_leaf(pk: FieldElement, blinding: FieldElement) -> FieldElement {
    poseidon::hash2(pk, blinding, DOMAIN_LEAF)
}

/// locally rebuilt attestation state
pub struct ComplianceProver {
    membership: MerkleTree,
    smt_levels: usize,
}

impl ComplianceProver {
    /// rebuild the membership tree from chain events
    ///
    /// a root disagreement with the chain is logged, not fatal: the local
    /// root goes into the witness and the on-chain verifier stays
    /// authoritative.
    pub fn sync(gateway: &dyn ChainGateway, levels: usize, smt_levels: usize) -> Result<Self> {
        let leaves = gateway.membership_leaves()?;
        let membership = MerkleTree::from_leaves(levels, FieldElement::ZERO, &leaves)?;

        let chain = gateway.read_membership_state()?;
        if membership.root() != chain.root {
            warn!(
                local = %membership.root(),
                chain = %chain.root,
                "membership root disagrees with chain, using local rebuild"
            );
        } else {
            debug!(root = %membership.root(), leaves = leaves.len(), "membership tree synced");
        }

        Ok(Self {
            membership,
            smt_levels,
        })
    }

    pub fn membership_root(&self) -> FieldElement {
        self.membership.root()
    }

    /// membership proof for a registered key at its claimed index
    pub fn membership_witness(
        &self,
        pk: FieldElement,
        blinding: FieldElement,
        leaf_index: u32,
    ) -> Result<MembershipWitness> {
        let leaf = membership_leaf(pk, blinding);
        match self.membership.leaf(leaf_index) {
            Some(stored) if stored == leaf => {}
            _ => return Err(BuilderError::NotRegistered),
        }

        let proof = self.membership.proof(leaf_index)?;
        Ok(MembershipWitness {
            leaf,
            blinding,
            path_indices: proof.path_indices,
            path_elements: proof.path_elements,
            root: self.membership.root(),
        })
    }

    /// non-membership proof for a key, padded to the circuit depth
    ///
    /// an empty sanctions tree short-circuits to the canonical empty proof
    /// without asking the external source; a present key is `Sanctioned`.
    pub fn non_membership_witness(
        &self,
        gateway: &dyn ChainGateway,
        pk: FieldElement,
    ) -> Result<NonMembershipWitness> {
        let state = gateway.read_non_membership_state()?;
        if state.is_empty || state.root.is_zero() {
            return Ok(self.pad(NonMembershipProof::empty(pk)));
        }

        let proof = gateway.non_membership_proof(&pk)?;
        if proof.root != state.root {
            return Err(BuilderError::RootMismatch {
                chain: state.root.to_hex(),
                proof: proof.root.to_hex(),
            });
        }
        if !proof.verify() {
            return Err(BuilderError::RootMismatch {
                chain: state.root.to_hex(),
                proof: proof.root.to_hex(),
            });
        }

        Ok(self.pad(proof))
    }

    fn pad(&self, proof: NonMembershipProof) -> NonMembershipWitness {
        let mut siblings = proof.siblings;
        siblings.resize(self.smt_levels.max(siblings.len()), FieldElement::ZERO);
        NonMembershipWitness {
            key: proof.key,
            old_key: proof.old_key,
            old_value: proof.old_value,
            is_old_zero: proof.is_old_zero,
            siblings,
            root: proof.root,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::FakeGateway;
    use umbriel_crypto::SpendingKey;

    const LEVELS: usize = 5;
    const SMT_LEVELS: usize = 5;

    fn registered_user(gw: &mut FakeGateway) -> (FieldElement, FieldElement, u32) {
        let pk = SpendingKey::from_field(FieldElement::from_u64(42)).public_key();
        let blinding = FieldElement::from_u64(9);
        let index = gw.add_membership_leaf(membership_leaf(pk, blinding));
        (pk, blinding, index)
    }

    #[test]
    fn test_membership_witness_verifies() {
        let mut gw = FakeGateway::new(LEVELS);
        let (pk, blinding, index) = registered_user(&mut gw);

        let prover = ComplianceProver::sync(&gw, LEVELS, SMT_LEVELS).unwrap();
        assert_eq!(prover.membership_root(), gw.read_membership_state().unwrap().root);

        let witness = prover.membership_witness(pk, blinding, index).unwrap();
        assert_eq!(witness.leaf, membership_leaf(pk, blinding));
        assert_eq!(witness.root, prover.membership_root());
        assert_eq!(witness.path_elements.len(), LEVELS);
    }

    #[test]
    fn test_unregistered_key_fails() {
        let mut gw = FakeGateway::new(LEVELS);
        let (pk, blinding, index) = registered_user(&mut gw);
        let prover = ComplianceProver::sync(&gw, LEVELS, SMT_LEVELS).unwrap();

        // wrong blinding, wrong index, unknown key: all refuse
        assert!(matches!(
            prover.membership_witness(pk, FieldElement::from_u64(10), index),
            Err(BuilderError::NotRegistered)
        ));
        assert!(matches!(
            prover.membership_witness(pk, blinding, index + 1),
            Err(BuilderError::NotRegistered)
        ));
    }

    #[test]
    fn test_empty_sanctions_tree_canonical_proof() {
        let mut gw = FakeGateway::new(LEVELS);
        let (pk, _, _) = registered_user(&mut gw);
        let prover = ComplianceProver::sync(&gw, LEVELS, SMT_LEVELS).unwrap();

        let witness = prover.non_membership_witness(&gw, pk).unwrap();
        assert!(witness.is_old_zero);
        assert!(witness.root.is_zero());
        assert_eq!(witness.siblings, vec![FieldElement::ZERO; SMT_LEVELS]);
        assert_eq!(witness.key, pk);
    }

    #[test]
    fn test_sanctioned_key_fails() {
        let mut gw = FakeGateway::new(LEVELS);
        let (pk, _, _) = registered_user(&mut gw);
        gw.add_sanctioned_key(pk);
        // another entry so the tree is non-trivial
        gw.add_sanctioned_key(FieldElement::from_u64(1234));

        let prover = ComplianceProver::sync(&gw, LEVELS, SMT_LEVELS).unwrap();
        assert!(matches!(
            prover.non_membership_witness(&gw, pk),
            Err(BuilderError::Sanctioned)
        ));
    }

    #[test]
    fn test_absent_key_witness_padded() {
        let mut gw = FakeGateway::new(LEVELS);
        let (pk, _, _) = registered_user(&mut gw);
        gw.add_sanctioned_key(FieldElement::from_u64(1));
        gw.add_sanctioned_key(FieldElement::from_u64(10));

        let prover = ComplianceProver::sync(&gw, LEVELS, SMT_LEVELS).unwrap();
        let witness = prover.non_membership_witness(&gw, pk).unwrap();
        assert_eq!(witness.root, gw.read_non_membership_state().unwrap().root);
        assert!(witness.siblings.len() >= SMT_LEVELS);
    }
}
