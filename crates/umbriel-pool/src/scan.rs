//! output scanning
//!
//! every new commitment event on the pool carries an encrypted output. we
//! trial-decrypt each one with our encryption key; a successful open whose
//! recomputed commitment matches the event is a note addressed to us.

use tracing::debug;
use umbriel_crypto::{sealed_box, EncryptionKeypair, FieldElement};

use crate::note::Note;
use crate::store::{NoteStore, StoredNote};

/// a `NewCommitment` event as read from the chain gateway
#[derive(Clone, Debug)]
pub struct CommitmentEvent {
    pub commitment: FieldElement,
    pub leaf_index: u32,
    pub encrypted_output: Vec<u8>,
}

/// trial-decrypt events and store the notes that are ours
///
/// returns the number of notes recovered. decryption failures are the normal
/// case (someone else's outputs); a decryption that succeeds but does not
/// reproduce the event commitment is discarded as not ours.
pub fn scan_outputs<S: NoteStore>(
    keypair: &EncryptionKeypair,
    owner_pk: FieldElement,
    events: &[CommitmentEvent],
    store: &mut S,
) -> usize {
    let mut recovered = 0usize;
    for event in events {
        let Some((amount, blinding)) = sealed_box::decrypt_note(keypair, &event.encrypted_output)
        else {
            continue;
        };

        let note = Note::new(amount, owner_pk, blinding);
        if note.commitment() != event.commitment {
            // decryptable but committed to a different pk
            continue;
        }

        debug!(leaf_index = event.leaf_index, amount, "recovered note");
        store.put(StoredNote {
            note,
            leaf_index: event.leaf_index,
            spent: false,
        });
        recovered += 1;
    }
    recovered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryNoteStore;
    use umbriel_crypto::SpendingKey;

    fn setup() -> (EncryptionKeypair, FieldElement) {
        let enc = EncryptionKeypair::from_seed([9u8; 32]);
        let pk = SpendingKey::from_field(FieldElement::from_u64(77)).public_key();
        (enc, pk)
    }

    fn event_for(enc: &EncryptionKeypair, pk: FieldElement, amount: u64, index: u32) -> CommitmentEvent {
        let blinding = FieldElement::from_u64(u64::from(index) + 1000);
        let note = Note::new(amount, pk, blinding);
        CommitmentEvent {
            commitment: note.commitment(),
            leaf_index: index,
            encrypted_output: sealed_box::encrypt_note(&enc.public(), amount, blinding).unwrap(),
        }
    }

    #[test]
    fn test_scan_recovers_own_notes() {
        let (enc, pk) = setup();
        let mut store = MemoryNoteStore::new();
        let events = vec![event_for(&enc, pk, 500_000, 0), event_for(&enc, pk, 42, 1)];

        assert_eq!(scan_outputs(&enc, pk, &events, &mut store), 2);
        assert_eq!(store.list_unspent(&pk).len(), 2);
    }

    #[test]
    fn test_scan_skips_foreign_notes() {
        let (enc, pk) = setup();
        let stranger = EncryptionKeypair::from_seed([1u8; 32]);
        let mut store = MemoryNoteStore::new();

        // encrypted to someone else entirely
        let events = vec![event_for(&stranger, pk, 10, 0)];
        assert_eq!(scan_outputs(&enc, pk, &events, &mut store), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_scan_rejects_commitment_mismatch() {
        let (enc, pk) = setup();
        let mut store = MemoryNoteStore::new();

        // decryptable, but the event commitment belongs to a different owner
        let other_pk = SpendingKey::from_field(FieldElement::from_u64(88)).public_key();
        let event = event_for(&enc, other_pk, 10, 0);
        assert_eq!(scan_outputs(&enc, pk, &[event], &mut store), 0);
    }
}
