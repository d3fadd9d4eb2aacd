//! note storage
//!
//! the builder reads owned notes from an opaque store and marks them spent
//! only after an on-chain submit succeeds. the trait is deliberately small;
//! persistence engines live outside the core.

use umbriel_crypto::FieldElement;

use crate::note::Note;

/// a note we own, tied to its slot in the pool tree
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoredNote {
    pub note: Note,
    pub leaf_index: u32,
    pub spent: bool,
}

/// storage for scanned notes
pub trait NoteStore {
    fn put(&mut self, note: StoredNote);
    fn get_by_commitment(&self, commitment: &FieldElement) -> Option<StoredNote>;
    fn mark_spent(&mut self, commitment: &FieldElement);
    /// unspent notes owned by `pk`, in leaf order
    fn list_unspent(&self, pk: &FieldElement) -> Vec<StoredNote>;
}

/// in-memory store, keyed by commitment
#[derive(Debug, Default)]
pub struct MemoryNoteStore {
    notes: Vec<(FieldElement, StoredNote)>,
}

impl MemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

impl NoteStore for MemoryNoteStore {
    fn put(&mut self, stored: StoredNote) {
        let commitment = stored.note.commitment();
        if let Some(slot) = self.notes.iter_mut().find(|(c, _)| *c == commitment) {
            slot.1 = stored;
        } else {
            self.notes.push((commitment, stored));
        }
    }

    fn get_by_commitment(&self, commitment: &FieldElement) -> Option<StoredNote> {
        self.notes
            .iter()
            .find(|(c, _)| c == commitment)
            .map(|(_, n)| *n)
    }

    fn mark_spent(&mut self, commitment: &FieldElement) {
        if let Some(slot) = self.notes.iter_mut().find(|(c, _)| c == commitment) {
            slot.1.spent = true;
        }
    }

    fn list_unspent(&self, pk: &FieldElement) -> Vec<StoredNote> {
        let mut owned: Vec<StoredNote> = self
            .notes
            .iter()
            .filter(|(_, n)| !n.spent && n.note.pk == *pk)
            .map(|(_, n)| *n)
            .collect();
        owned.sort_by_key(|n| n.leaf_index);
        owned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbriel_crypto::SpendingKey;

    fn note(amount: u64, blinding: u64) -> Note {
        let pk = SpendingKey::from_field(FieldElement::from_u64(1)).public_key();
        Note::new(amount, pk, FieldElement::from_u64(blinding))
    }

    #[test]
    fn test_put_get_mark_spent() {
        let mut store = MemoryNoteStore::new();
        let n = note(100, 1);
        store.put(StoredNote { note: n, leaf_index: 3, spent: false });

        let got = store.get_by_commitment(&n.commitment()).unwrap();
        assert_eq!(got.leaf_index, 3);
        assert!(!got.spent);

        store.mark_spent(&n.commitment());
        assert!(store.get_by_commitment(&n.commitment()).unwrap().spent);
    }

    #[test]
    fn test_list_unspent_ordered_and_filtered() {
        let mut store = MemoryNoteStore::new();
        let a = note(100, 1);
        let b = note(200, 2);
        let c = note(300, 3);
        store.put(StoredNote { note: b, leaf_index: 5, spent: false });
        store.put(StoredNote { note: a, leaf_index: 1, spent: false });
        store.put(StoredNote { note: c, leaf_index: 9, spent: true });

        let unspent = store.list_unspent(&a.pk);
        assert_eq!(unspent.len(), 2);
        assert_eq!(unspent[0].leaf_index, 1);
        assert_eq!(unspent[1].leaf_index, 5);
    }

    #[test]
    fn test_put_overwrites_same_commitment() {
        let mut store = MemoryNoteStore::new();
        let n = note(100, 1);
        store.put(StoredNote { note: n, leaf_index: 3, spent: false });
        store.put(StoredNote { note: n, leaf_index: 4, spent: false });
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_by_commitment(&n.commitment()).unwrap().leaf_index, 4);
    }
}
