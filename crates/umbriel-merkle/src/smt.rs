//! sparse merkle tree for the sanctions list
//!
//! key-indexed binary tree in the circomlib smt shape: leaves hash as
//! `poseidon2(key, value, 1)`, internal nodes as the feed-forward
//! compression, and an empty subtree is the literal zero element. keys are
//! traversed by their little-endian bits.
//!
//! the builder only ever asks this tree one question: prove that a public key
//! is *absent*. a non-membership proof either lands on an empty branch
//! (`is_old_zero`) or collides with a leaf holding a different key.

use std::collections::BTreeMap;

use umbriel_crypto::{poseidon, FieldElement, DOMAIN_LEAF};

use crate::error::{Result, TreeError};

/// non-membership proof in the circuit's input shape
///
/// `siblings` is unpadded; the witness layer pads with zeros to the circuit's
/// fixed depth.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NonMembershipProof {
    /// the absent key
    pub key: FieldElement,
    /// colliding leaf key, zero when the path was empty
    pub old_key: FieldElement,
    /// colliding leaf value, zero when the path was empty
    pub old_value: FieldElement,
    /// true iff traversal ended on an empty branch
    pub is_old_zero: bool,
    /// sibling hashes from root towards the leaf
    pub siblings: Vec<FieldElement>,
    /// root the proof was taken against
    pub root: FieldElement,
}

impl NonMembershipProof {
    /// canonical proof against an empty tree, no traversal needed
    pub fn empty(key: FieldElement) -> Self {
        Self {
            key,
            old_key: FieldElement::ZERO,
            old_value: FieldElement::ZERO,
            is_old_zero: true,
            siblings: Vec::new(),
            root: FieldElement::ZERO,
        }
    }

    /// recompute the root and check the non-membership claim
    pub fn verify(&self) -> bool {
        if !self.is_old_zero && self.old_key == self.key {
            return false;
        }

        let mut current = if self.is_old_zero {
            FieldElement::ZERO
        } else {
            poseidon::hash2(self.old_key, self.old_value, DOMAIN_LEAF)
        };

        let bits = key_bits(&self.key);
        for (level, sibling) in self.siblings.iter().enumerate().rev() {
            current = if bits[level] {
                poseidon::compress(*sibling, current)
            } else {
                poseidon::compress(current, *sibling)
            };
        }
        current == self.root
    }
}

/// result of a write (insert or update)
#[derive(Clone, Debug)]
pub struct SmtWriteResult {
    pub old_root: FieldElement,
    pub new_root: FieldElement,
    pub old_key: FieldElement,
    pub old_value: FieldElement,
    pub is_old_zero: bool,
    pub siblings: Vec<FieldElement>,
}

#[derive(Clone, Debug)]
enum Node {
    Leaf { key: FieldElement, value: FieldElement },
    Internal { left: FieldElement, right: FieldElement },
}

/// hash-addressed sparse merkle tree
#[derive(Clone, Debug, Default)]
pub struct SparseMerkleTree {
    nodes: BTreeMap<[u8; 32], Node>,
    root: FieldElement,
}

impl SparseMerkleTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> FieldElement {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_zero()
    }

    /// whether `key` holds a value
    pub fn contains(&self, key: &FieldElement) -> bool {
        self.traverse(key).found
    }

    /// prove that `key` is absent
    ///
    /// fails with `KeyExists` when the key is present - the caller decides
    /// what presence means (for the sanctions list: refuse to build).
    pub fn prove_non_membership(&self, key: &FieldElement) -> Result<NonMembershipProof> {
        if self.is_empty() {
            return Ok(NonMembershipProof::empty(*key));
        }

        let found = self.traverse(key);
        if found.found {
            return Err(TreeError::KeyExists);
        }

        Ok(NonMembershipProof {
            key: *key,
            old_key: found.leaf_key,
            old_value: found.leaf_value,
            is_old_zero: found.is_old_zero,
            siblings: found.siblings,
            root: self.root,
        })
    }

    /// insert a fresh key
    pub fn insert(&mut self, key: FieldElement, value: FieldElement) -> Result<SmtWriteResult> {
        let found = self.traverse(&key);
        if found.found {
            return Err(TreeError::KeyExists);
        }

        let old_root = self.root;
        let bits = key_bits(&key);
        let new_leaf = poseidon::hash2(key, value, DOMAIN_LEAF);
        self.put(new_leaf, Node::Leaf { key, value });

        let mut siblings = found.siblings.clone();
        if !found.is_old_zero {
            // the path collides with an existing leaf: push zero siblings
            // until the two keys' bits diverge, then the old leaf becomes the
            // final sibling
            let old_bits = key_bits(&found.leaf_key);
            let mut level = siblings.len();
            while level < 256 && old_bits[level] == bits[level] {
                siblings.push(FieldElement::ZERO);
                level += 1;
            }
            let old_leaf = poseidon::hash2(found.leaf_key, found.leaf_value, DOMAIN_LEAF);
            siblings.push(old_leaf);
        }

        self.root = self.write_path(new_leaf, &bits, &siblings);

        // the circuit's insert witness wants the divergence path without the
        // trailing zeros or the collision leaf itself
        let mut result_siblings = siblings;
        while result_siblings.last() == Some(&FieldElement::ZERO) {
            result_siblings.pop();
        }
        if !found.is_old_zero && !result_siblings.is_empty() {
            result_siblings.pop();
        }

        Ok(SmtWriteResult {
            old_root,
            new_root: self.root,
            old_key: found.leaf_key,
            old_value: found.leaf_value,
            is_old_zero: found.is_old_zero,
            siblings: result_siblings,
        })
    }

    /// overwrite the value at an existing key
    pub fn update(&mut self, key: FieldElement, value: FieldElement) -> Result<SmtWriteResult> {
        let found = self.traverse(&key);
        if !found.found {
            return Err(TreeError::KeyMissing);
        }

        let old_root = self.root;
        let bits = key_bits(&key);
        let new_leaf = poseidon::hash2(key, value, DOMAIN_LEAF);
        self.put(new_leaf, Node::Leaf { key, value });
        self.root = self.write_path(new_leaf, &bits, &found.siblings);

        Ok(SmtWriteResult {
            old_root,
            new_root: self.root,
            old_key: key,
            old_value: found.leaf_value,
            is_old_zero: false,
            siblings: found.siblings,
        })
    }

    fn write_path(
        &mut self,
        leaf_hash: FieldElement,
        bits: &[bool],
        siblings: &[FieldElement],
    ) -> FieldElement {
        let mut current = leaf_hash;
        for (level, sibling) in siblings.iter().enumerate().rev() {
            let (left, right) = if bits[level] {
                (*sibling, current)
            } else {
                (current, *sibling)
            };
            current = poseidon::compress(left, right);
            self.put(current, Node::Internal { left, right });
        }
        current
    }

    fn traverse(&self, key: &FieldElement) -> Traversal {
        let bits = key_bits(key);
        let mut siblings = Vec::new();
        let mut current = self.root;
        let mut level = 0usize;

        loop {
            if current.is_zero() {
                return Traversal {
                    found: false,
                    is_old_zero: true,
                    leaf_key: FieldElement::ZERO,
                    leaf_value: FieldElement::ZERO,
                    siblings,
                };
            }
            match self.nodes.get(&current.to_le_bytes()) {
                Some(Node::Leaf { key: leaf_key, value }) => {
                    return if leaf_key == key {
                        Traversal {
                            found: true,
                            is_old_zero: false,
                            leaf_key: *leaf_key,
                            leaf_value: *value,
                            siblings,
                        }
                    } else {
                        Traversal {
                            found: false,
                            is_old_zero: false,
                            leaf_key: *leaf_key,
                            leaf_value: *value,
                            siblings,
                        }
                    };
                }
                Some(Node::Internal { left, right }) => {
                    let (child, sibling) = if bits[level] {
                        (*right, *left)
                    } else {
                        (*left, *right)
                    };
                    siblings.push(sibling);
                    current = child;
                    level += 1;
                }
                None => {
                    // dangling hash means corruption; treat as empty branch
                    return Traversal {
                        found: false,
                        is_old_zero: true,
                        leaf_key: FieldElement::ZERO,
                        leaf_value: FieldElement::ZERO,
                        siblings,
                    };
                }
            }
        }
    }

    fn put(&mut self, hash: FieldElement, node: Node) {
        if !hash.is_zero() {
            self.nodes.insert(hash.to_le_bytes(), node);
        }
    }
}

struct Traversal {
    found: bool,
    is_old_zero: bool,
    leaf_key: FieldElement,
    leaf_value: FieldElement,
    siblings: Vec<FieldElement>,
}

/// little-endian bit decomposition of a key
fn key_bits(key: &FieldElement) -> Vec<bool> {
    let bytes = key.to_le_bytes();
    let mut bits = Vec::with_capacity(256);
    for byte in bytes {
        for i in 0..8 {
            bits.push((byte >> i) & 1 == 1);
        }
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fe(v: u64) -> FieldElement {
        FieldElement::from_u64(v)
    }

    #[test]
    fn test_empty_tree_proof() {
        let tree = SparseMerkleTree::new();
        let proof = tree.prove_non_membership(&fe(42)).unwrap();
        assert!(proof.is_old_zero);
        assert!(proof.siblings.is_empty());
        assert!(proof.root.is_zero());
        assert!(proof.verify());
    }

    #[test]
    fn test_insert_then_absent_key_proof_verifies() {
        let mut tree = SparseMerkleTree::new();
        tree.insert(fe(1), fe(100)).unwrap();
        tree.insert(fe(10), fe(200)).unwrap();

        let proof = tree.prove_non_membership(&fe(7)).unwrap();
        assert_eq!(proof.root, tree.root());
        assert!(proof.verify());
    }

    #[test]
    fn test_present_key_refused() {
        let mut tree = SparseMerkleTree::new();
        tree.insert(fe(5), fe(1)).unwrap();
        assert!(matches!(
            tree.prove_non_membership(&fe(5)),
            Err(TreeError::KeyExists)
        ));
        assert!(tree.contains(&fe(5)));
        assert!(!tree.contains(&fe(6)));
    }

    #[test]
    fn test_double_insert_rejected() {
        let mut tree = SparseMerkleTree::new();
        tree.insert(fe(5), fe(1)).unwrap();
        assert!(matches!(tree.insert(fe(5), fe(2)), Err(TreeError::KeyExists)));
    }

    #[test]
    fn test_update_changes_root() {
        let mut tree = SparseMerkleTree::new();
        tree.insert(fe(5), fe(1)).unwrap();
        let before = tree.root();

        let result = tree.update(fe(5), fe(2)).unwrap();
        assert_eq!(result.old_root, before);
        assert_eq!(result.new_root, tree.root());
        assert_ne!(tree.root(), before);
        assert!(matches!(tree.update(fe(6), fe(1)), Err(TreeError::KeyMissing)));
    }

    #[test]
    fn test_roots_insertion_order_independent() {
        let mut a = SparseMerkleTree::new();
        a.insert(fe(1), fe(10)).unwrap();
        a.insert(fe(2), fe(20)).unwrap();
        a.insert(fe(300), fe(30)).unwrap();

        let mut b = SparseMerkleTree::new();
        b.insert(fe(300), fe(30)).unwrap();
        b.insert(fe(1), fe(10)).unwrap();
        b.insert(fe(2), fe(20)).unwrap();

        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn test_collision_proof_names_other_leaf() {
        // keys 2 and 12 traverse towards existing leaves; the proof must carry
        // the colliding leaf's key, not ours
        let mut tree = SparseMerkleTree::new();
        for k in [1u64, 10, 100, 1000] {
            tree.insert(fe(k), fe(k * 2)).unwrap();
        }
        for absent in [2u64, 12, 7, 999] {
            let proof = tree.prove_non_membership(&fe(absent)).unwrap();
            assert!(proof.verify(), "key {absent}");
            if !proof.is_old_zero {
                assert_ne!(proof.old_key, fe(absent));
            }
        }
    }

    #[test]
    fn test_tampered_proof_fails() {
        let mut tree = SparseMerkleTree::new();
        for k in 1..=8u64 {
            tree.insert(fe(k), fe(k)).unwrap();
        }
        let mut proof = tree.prove_non_membership(&fe(1000)).unwrap();
        assert!(proof.verify());

        if let Some(first) = proof.siblings.first_mut() {
            *first = fe(0xbad);
            assert!(!proof.verify());
        }
    }

    #[test]
    fn test_deep_tree_proofs() {
        // push enough keys that paths exceed the default circuit depth;
        // padding to larger depths is the witness layer's job
        let mut tree = SparseMerkleTree::new();
        for k in 0..64u64 {
            tree.insert(fe(k * 7 + 1), fe(k)).unwrap();
        }
        let proof = tree.prove_non_membership(&fe(500_000)).unwrap();
        assert!(proof.verify());
        assert!(proof.siblings.len() <= 20);
    }
}
