use impro_types::{Key, NoteEvent};

use crate::model_store::{ModelImport, ModelState};

/// Commands sent from the control side to the engine.
///
/// Drained at the start of every block, before learning.
#[derive(Debug)]
pub enum EngineCmd {
    /// Clear all four chains, the key scores and the play gate
    Reset,
    /// Reply with a full copy of the learned state
    Snapshot,
    /// Merge a parsed model blob
    Load(Box<ModelImport>),
    /// Treat a note as if it had arrived at offset 0 of the next block
    InjectNote(NoteEvent),
}

/// Messages sent from the engine back to the control side.
#[derive(Debug)]
pub enum EngineFeedback {
    KeyChanged {
        key: Option<Key>,
        /// Display name, empty when there is no key
        name: &'static str,
    },
    Snapshot(Box<ModelState>),
    /// Chains displaced by a load, handed back so they are freed off the
    /// real-time thread
    Retired(Box<ModelImport>),
}
