//! chain gateway interface
//!
//! the contract suite is reachable only through this trait: state roots,
//! event replay and transaction submission. the fake gateway keeps the three
//! trees in memory and behaves like a freshly deployed contract set, which is
//! enough to exercise every builder path without a network.

use umbriel_crypto::{FieldElement, ZERO_LEAF_BE};
use umbriel_merkle::{MerkleTree, NonMembershipProof, SparseMerkleTree};
use umbriel_pool::CommitmentEvent;

use crate::error::{BuilderError, Result};
use crate::extdata::ExtData;

/// pool contract state
#[derive(Clone, Debug)]
pub struct PoolState {
    pub merkle_root: FieldElement,
    pub merkle_next_index: u64,
    pub merkle_levels: u32,
}

/// attestation membership tree state
#[derive(Clone, Debug)]
pub struct MembershipState {
    pub root: FieldElement,
    pub next_index: u64,
    pub capacity: u64,
}

/// sanctions tree state
#[derive(Clone, Debug)]
pub struct NonMembershipState {
    pub root: FieldElement,
    pub is_empty: bool,
}

/// everything the pool contract's transact entrypoint takes
#[derive(Clone, Debug)]
pub struct SubmittedTransaction {
    /// on-chain proof encoding, `a(64) || b(128) || c(64)`
    pub proof: Vec<u8>,
    pub root: FieldElement,
    pub input_nullifiers: Vec<FieldElement>,
    pub output_commitment0: FieldElement,
    pub output_commitment1: FieldElement,
    pub public_amount: FieldElement,
    pub ext_data_hash: [u8; 32],
    pub asp_membership_root: FieldElement,
    pub asp_non_membership_root: FieldElement,
    pub ext_data: ExtData,
    pub sender: String,
}

/// submission outcome
#[derive(Clone, Debug)]
pub struct SubmitReceipt {
    pub success: bool,
    pub tx_hash: Option<String>,
    pub ledger: Option<u32>,
    pub error: Option<String>,
}

/// read and write access to the deployed contracts
pub trait ChainGateway {
    fn read_pool_state(&self) -> Result<PoolState>;
    fn read_membership_state(&self) -> Result<MembershipState>;
    fn read_non_membership_state(&self) -> Result<NonMembershipState>;

    /// membership leaves in insertion order, replayed from chain events
    fn membership_leaves(&self) -> Result<Vec<(u32, FieldElement)>>;

    /// most recent commitment events, newest last
    fn commitment_events(&self, limit: usize) -> Result<Vec<CommitmentEvent>>;

    /// non-membership proof from the sanction tree's own storage
    fn non_membership_proof(&self, key: &FieldElement) -> Result<NonMembershipProof>;

    fn submit(&mut self, tx: SubmittedTransaction) -> Result<SubmitReceipt>;
}

/// in-memory gateway over local trees
pub struct FakeGateway {
    pool: MerkleTree,
    membership: MerkleTree,
    sanctions: SparseMerkleTree,
    events: Vec<CommitmentEvent>,
    spent_nullifiers: Vec<FieldElement>,
    submitted: Vec<SubmittedTransaction>,
    next_ledger: u32,
}

impl FakeGateway {
    pub fn new(levels: usize) -> Self {
        let zero = FieldElement::from_be_bytes(&ZERO_LEAF_BE).expect("fixed constant");
        Self {
            pool: MerkleTree::with_zero_leaf(levels, zero).expect("valid depth"),
            membership: MerkleTree::new(levels).expect("valid depth"),
            sanctions: SparseMerkleTree::new(),
            events: Vec::new(),
            spent_nullifiers: Vec::new(),
            submitted: Vec::new(),
            next_ledger: 1,
        }
    }

    /// register a user: insert their membership leaf
    pub fn add_membership_leaf(&mut self, leaf: FieldElement) -> u32 {
        self.membership.insert(leaf).expect("membership tree full")
    }

    /// sanction a key
    pub fn add_sanctioned_key(&mut self, key: FieldElement) {
        self.sanctions
            .insert(key, FieldElement::from_u64(1))
            .expect("key already sanctioned");
    }

    /// seed a pool commitment directly (test setup)
    pub fn seed_commitment(&mut self, commitment: FieldElement, encrypted_output: Vec<u8>) -> u32 {
        let index = self.pool.insert(commitment).expect("pool tree full");
        self.events.push(CommitmentEvent {
            commitment,
            leaf_index: index,
            encrypted_output,
        });
        index
    }

    pub fn pool_tree(&self) -> &MerkleTree {
        &self.pool
    }

    pub fn submitted(&self) -> &[SubmittedTransaction] {
        &self.submitted
    }
}

impl ChainGateway for FakeGateway {
    fn read_pool_state(&self) -> Result<PoolState> {
        Ok(PoolState {
            merkle_root: self.pool.root(),
            merkle_next_index: self.pool.next_index(),
            merkle_levels: self.pool.depth() as u32,
        })
    }

    fn read_membership_state(&self) -> Result<MembershipState> {
        Ok(MembershipState {
            root: self.membership.root(),
            next_index: self.membership.next_index(),
            capacity: 1u64 << self.membership.depth(),
        })
    }

    fn read_non_membership_state(&self) -> Result<NonMembershipState> {
        Ok(NonMembershipState {
            root: self.sanctions.root(),
            is_empty: self.sanctions.is_empty(),
        })
    }

    fn membership_leaves(&self) -> Result<Vec<(u32, FieldElement)>> {
        let mut leaves = Vec::new();
        for index in 0..self.membership.next_index() {
            let index = u32::try_from(index).map_err(|_| {
                BuilderError::Chain("membership index exceeds u32".into())
            })?;
            if let Some(leaf) = self.membership.leaf(index) {
                leaves.push((index, leaf));
            }
        }
        Ok(leaves)
    }

    fn commitment_events(&self, limit: usize) -> Result<Vec<CommitmentEvent>> {
        let start = self.events.len().saturating_sub(limit);
        Ok(self.events[start..].to_vec())
    }

    fn non_membership_proof(&self, key: &FieldElement) -> Result<NonMembershipProof> {
        match self.sanctions.prove_non_membership(key) {
            Ok(proof) => Ok(proof),
            Err(umbriel_merkle::TreeError::KeyExists) => Err(BuilderError::Sanctioned),
            Err(e) => Err(e.into()),
        }
    }

    fn submit(&mut self, tx: SubmittedTransaction) -> Result<SubmitReceipt> {
        // the real contract checks root recency, nullifier freshness and the
        // proof; the fake accepts structurally complete submissions and
        // appends the output commitments like the contract would
        if tx.proof.len() != 256 {
            return Ok(SubmitReceipt {
                success: false,
                tx_hash: None,
                ledger: None,
                error: Some("#7 invalid proof".into()),
            });
        }
        if tx.root != self.pool.root() {
            return Ok(SubmitReceipt {
                success: false,
                tx_hash: None,
                ledger: None,
                error: Some("#8 invalid root".into()),
            });
        }
        if tx
            .input_nullifiers
            .iter()
            .any(|n| self.spent_nullifiers.contains(n))
        {
            return Ok(SubmitReceipt {
                success: false,
                tx_hash: None,
                ledger: None,
                error: Some("#9 double spend".into()),
            });
        }
        self.spent_nullifiers.extend(tx.input_nullifiers.iter().copied());

        let idx0 = self
            .pool
            .insert(tx.output_commitment0)
            .map_err(|e| BuilderError::Chain(e.to_string()))?;
        self.events.push(CommitmentEvent {
            commitment: tx.output_commitment0,
            leaf_index: idx0,
            encrypted_output: tx.ext_data.encrypted_output0.clone(),
        });
        let idx1 = self
            .pool
            .insert(tx.output_commitment1)
            .map_err(|e| BuilderError::Chain(e.to_string()))?;
        self.events.push(CommitmentEvent {
            commitment: tx.output_commitment1,
            leaf_index: idx1,
            encrypted_output: tx.ext_data.encrypted_output1.clone(),
        });

        let ledger = self.next_ledger;
        self.next_ledger += 1;
        let tx_hash = format!("fake-tx-{ledger:08x}");
        self.submitted.push(tx);

        Ok(SubmitReceipt {
            success: true,
            tx_hash: Some(tx_hash),
            ledger: Some(ledger),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_gateway_state() {
        let gw = FakeGateway::new(5);
        let pool = gw.read_pool_state().unwrap();
        assert_eq!(pool.merkle_next_index, 0);
        assert_eq!(pool.merkle_levels, 5);

        let nm = gw.read_non_membership_state().unwrap();
        assert!(nm.is_empty);
        assert!(nm.root.is_zero());
    }

    #[test]
    fn test_membership_leaves_replay() {
        let mut gw = FakeGateway::new(5);
        gw.add_membership_leaf(FieldElement::from_u64(11));
        gw.add_membership_leaf(FieldElement::from_u64(22));

        let leaves = gw.membership_leaves().unwrap();
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0], (0, FieldElement::from_u64(11)));
        assert_eq!(leaves[1], (1, FieldElement::from_u64(22)));

        // replaying into a local tree reproduces the chain root
        let local = MerkleTree::from_leaves(5, FieldElement::ZERO, &leaves).unwrap();
        assert_eq!(local.root(), gw.read_membership_state().unwrap().root);
    }

    #[test]
    fn test_sanctioned_key_refused() {
        let mut gw = FakeGateway::new(5);
        let key = FieldElement::from_u64(666);
        gw.add_sanctioned_key(key);
        assert!(matches!(
            gw.non_membership_proof(&key),
            Err(BuilderError::Sanctioned)
        ));
        assert!(gw.non_membership_proof(&FieldElement::from_u64(667)).is_ok());
    }

    #[test]
    fn test_double_spend_rejected() {
        let mut gw = FakeGateway::new(5);
        let nullifier = FieldElement::from_u64(7);
        let tx = |root: FieldElement, c0: u64| SubmittedTransaction {
            proof: vec![0u8; 256],
            root,
            input_nullifiers: vec![nullifier],
            output_commitment0: FieldElement::from_u64(c0),
            output_commitment1: FieldElement::from_u64(c0 + 1),
            public_amount: FieldElement::ZERO,
            ext_data_hash: [0u8; 32],
            asp_membership_root: FieldElement::ZERO,
            asp_non_membership_root: FieldElement::ZERO,
            ext_data: ExtData {
                recipient: stellar_strkey::ed25519::PublicKey([1u8; 32]).to_string(),
                ext_amount: 0,
                fee: 0,
                encrypted_output0: Vec::new(),
                encrypted_output1: Vec::new(),
            },
            sender: "GSENDER".into(),
        };

        let root = gw.read_pool_state().unwrap().merkle_root;
        let first = gw.submit(tx(root, 100)).unwrap();
        assert!(first.success);

        // fresh root, same nullifier: the chain refuses
        let root = gw.read_pool_state().unwrap().merkle_root;
        let second = gw.submit(tx(root, 200)).unwrap();
        assert!(!second.success);
        assert!(second.error.unwrap().contains("#9"));
    }

    #[test]
    fn test_commitment_events_limit() {
        let mut gw = FakeGateway::new(5);
        for i in 0..5u64 {
            gw.seed_commitment(FieldElement::from_u64(i + 1), vec![0u8; 112]);
        }
        let events = gw.commitment_events(2).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].leaf_index, 3);
        assert_eq!(events[1].leaf_index, 4);
    }
}
