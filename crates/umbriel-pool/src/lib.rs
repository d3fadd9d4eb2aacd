//! shielded note model for the umbriel pool
//!
//! a note is a triple `(amount, pk, blinding)` whose commitment lives in the
//! pool tree. spending one reveals its nullifier, a one-way function of the
//! commitment and its position, so double spends are detectable without
//! linking back to the note.

pub mod note;
pub mod scan;
pub mod store;

pub use note::{DummyInput, Note};
pub use scan::{scan_outputs, CommitmentEvent};
pub use store::{MemoryNoteStore, NoteStore, StoredNote};

/// number of input slots the circuit expects
pub const N_INS: usize = 2;
/// number of output slots the circuit expects
pub const N_OUTS: usize = 2;
/// default pool tree depth
pub const LEVELS: usize = 5;
