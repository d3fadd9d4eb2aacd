//! incremental commitment tree
//!
//! fixed-depth binary tree over the poseidon2 compression. leaves are note
//! commitments; empty slots hold a configurable zero leaf so the local tree
//! reproduces the on-chain empty root. all levels are materialized, which
//! keeps insert and proof at one hash per level.

use umbriel_crypto::{poseidon, FieldElement};

use crate::error::{Result, TreeError};

const MAX_DEPTH: usize = 32;
const FIELD_SIZE: usize = 32;

/// inclusion proof for a leaf
///
/// bit `j` of `path_indices` is 1 iff the leaf's ancestor at level `j` is a
/// right child, i.e. the sibling in `path_elements[j]` sits on the left.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleProof {
    pub path_elements: Vec<FieldElement>,
    pub path_indices: u64,
    pub root: FieldElement,
}

impl MerkleProof {
    /// number of levels this proof spans
    pub fn levels(&self) -> usize {
        self.path_elements.len()
    }

    /// recompute the root from `leaf` and compare
    pub fn verify(&self, leaf: FieldElement) -> bool {
        let mut current = leaf;
        for (level, sibling) in self.path_elements.iter().enumerate() {
            current = if (self.path_indices >> level) & 1 == 1 {
                poseidon::compress(*sibling, current)
            } else {
                poseidon::compress(current, *sibling)
            };
        }
        current == self.root
    }
}

/// append-only merkle tree with all levels in memory
#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// levels[0] is the leaf row, levels[depth] the single root
    levels: Vec<Vec<FieldElement>>,
    depth: usize,
    next_index: u64,
}

impl MerkleTree {
    /// empty tree whose unused slots are the all-zero leaf
    pub fn new(depth: usize) -> Result<Self> {
        Self::with_zero_leaf(depth, FieldElement::ZERO)
    }

    /// empty tree with a custom empty-slot value
    ///
    /// the pool contract fills empty slots with a fixed nonzero constant; the
    /// local tree must use the same value to agree on roots.
    pub fn with_zero_leaf(depth: usize, zero: FieldElement) -> Result<Self> {
        if depth == 0 || depth > MAX_DEPTH {
            return Err(TreeError::DepthOutOfRange(depth));
        }

        let mut levels = Vec::with_capacity(depth + 1);
        levels.push(vec![zero; 1usize << depth]);

        let mut node = zero;
        for level in 0..depth {
            node = poseidon::compress(node, node);
            levels.push(vec![node; 1usize << (depth - level - 1)]);
        }

        Ok(Self {
            levels,
            depth,
            next_index: 0,
        })
    }

    /// rebuild from indexed leaves in one bottom-up pass
    ///
    /// equivalent to inserting each `(index, leaf)` with [`Self::insert_at`];
    /// `next_index` lands just past the highest index seen.
    pub fn from_leaves(
        depth: usize,
        zero: FieldElement,
        leaves: &[(u32, FieldElement)],
    ) -> Result<Self> {
        if depth == 0 || depth > MAX_DEPTH {
            return Err(TreeError::DepthOutOfRange(depth));
        }

        let capacity = 1usize << depth;
        let mut row = vec![zero; capacity];
        let mut max_index: Option<u32> = None;

        for &(index, leaf) in leaves {
            let slot = index as usize;
            if slot >= capacity {
                return Err(TreeError::IndexOutOfRange {
                    index: u64::from(index),
                    depth,
                });
            }
            row[slot] = leaf;
            max_index = Some(max_index.map_or(index, |m| m.max(index)));
        }

        let mut levels = Vec::with_capacity(depth + 1);
        levels.push(row);
        for level in 0..depth {
            let parents: Vec<FieldElement> = levels[level]
                .chunks_exact(2)
                .map(|pair| poseidon::compress(pair[0], pair[1]))
                .collect();
            levels.push(parents);
        }

        Ok(Self {
            levels,
            depth,
            next_index: max_index.map_or(0, |m| u64::from(m) + 1),
        })
    }

    /// append a leaf at the next free slot, returning its index
    pub fn insert(&mut self, leaf: FieldElement) -> Result<u32> {
        let index = u32::try_from(self.next_index).map_err(|_| TreeError::TreeFull)?;
        self.insert_at(leaf, index)
    }

    /// place a leaf at `index`
    ///
    /// overwriting an occupied slot is allowed (chain reorgs, re-sync);
    /// writing past `next_index` is not, as it would leave a gap.
    pub fn insert_at(&mut self, leaf: FieldElement, index: u32) -> Result<u32> {
        let index_u64 = u64::from(index);
        if index_u64 >= 1u64 << self.depth {
            return Err(TreeError::TreeFull);
        }
        if index_u64 > self.next_index {
            return Err(TreeError::WouldCreateGap {
                index: index_u64,
                next_index: self.next_index,
            });
        }

        self.update_path(index as usize, leaf);
        self.next_index = self.next_index.max(index_u64 + 1);
        Ok(index)
    }

    fn update_path(&mut self, index: usize, leaf: FieldElement) {
        self.levels[0][index] = leaf;

        let mut current_index = index;
        let mut current = leaf;
        for level in 0..self.depth {
            let sibling = self.levels[level][current_index ^ 1];
            current = if current_index & 1 == 0 {
                poseidon::compress(current, sibling)
            } else {
                poseidon::compress(sibling, current)
            };
            current_index /= 2;
            self.levels[level + 1][current_index] = current;
        }
    }

    pub fn root(&self) -> FieldElement {
        self.levels[self.depth][0]
    }

    /// inclusion proof for the leaf at `index`
    pub fn proof(&self, index: u32) -> Result<MerkleProof> {
        let mut current_index = index as usize;
        if current_index >= 1usize << self.depth {
            return Err(TreeError::IndexOutOfRange {
                index: u64::from(index),
                depth: self.depth,
            });
        }

        let mut path_elements = Vec::with_capacity(self.depth);
        let mut path_indices = 0u64;
        for level in 0..self.depth {
            path_elements.push(self.levels[level][current_index ^ 1]);
            if current_index & 1 == 1 {
                path_indices |= 1u64 << level;
            }
            current_index /= 2;
        }

        Ok(MerkleProof {
            path_elements,
            path_indices,
            root: self.root(),
        })
    }

    pub fn leaf(&self, index: u32) -> Option<FieldElement> {
        self.levels[0].get(index as usize).copied()
    }

    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// encode for storage: `[depth u32 LE][next_index u64 LE][levels LE..]`
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.depth as u32).to_le_bytes());
        out.extend_from_slice(&self.next_index.to_le_bytes());
        for level in &self.levels {
            for node in level {
                out.extend_from_slice(&node.to_le_bytes());
            }
        }
        out
    }

    /// reconstruct a tree written by [`Self::serialize`]
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        if data.len() < 12 {
            return Err(TreeError::InvalidEncoding("header too short".into()));
        }

        let depth_u32 = u32::from_le_bytes(data[..4].try_into().expect("4 bytes"));
        let depth = depth_u32 as usize;
        if depth == 0 || depth > MAX_DEPTH {
            return Err(TreeError::DepthOutOfRange(depth));
        }
        let next_index = u64::from_le_bytes(data[4..12].try_into().expect("8 bytes"));

        let num_leaves = 1usize << depth;
        let total_nodes = 2 * num_leaves - 1;
        let expected = 12 + total_nodes * FIELD_SIZE;
        if data.len() != expected {
            return Err(TreeError::InvalidEncoding(format!(
                "expected {expected} bytes, got {}",
                data.len()
            )));
        }

        let mut levels = Vec::with_capacity(depth + 1);
        let mut offset = 12usize;
        let mut level_size = num_leaves;
        for _ in 0..=depth {
            let mut level = Vec::with_capacity(level_size);
            for _ in 0..level_size {
                let node = FieldElement::from_le_bytes(&data[offset..offset + FIELD_SIZE])
                    .map_err(|e| TreeError::InvalidEncoding(e.to_string()))?;
                level.push(node);
                offset += FIELD_SIZE;
            }
            levels.push(level);
            level_size /= 2;
        }

        Ok(Self {
            levels,
            depth,
            next_index,
        })
    }
}
