// Copyright 2025 Cowboy AI, LLC.

use super::interface::SettingsToViewInterface;
use super::persistable::AtomStore;
use super::persistor::{PersistenceBackend, PersistenceCore};
use super::serializer::BoxedStateSerializer;
use crate::errors::WorkbenchResult;
use crate::state_store::StateStore;
use serde_json::Value;
use std::fmt;
use std::rc::Rc;

/// Persists state store, atoms and interface base states of a module instance
///
/// Besides storage round-trips it exposes the current document directly,
/// so a whole session can be captured and replayed without going through
/// per-instance storage keys.
pub struct ModuleStateStorageManager {
    core: Rc<PersistenceCore>,
}

impl ModuleStateStorageManager {
    pub fn new(
        instance_id: impl Into<String>,
        backend: PersistenceBackend,
        serializer: BoxedStateSerializer,
        state_store: Rc<StateStore>,
        atoms: Rc<AtomStore>,
        interface: Rc<SettingsToViewInterface>,
    ) -> Self {
        Self {
            core: PersistenceCore::new(
                instance_id,
                backend,
                serializer,
                state_store,
                atoms,
                Some(interface),
            ),
        }
    }

    pub fn storage_key(&self) -> &str {
        self.core.storage_key()
    }

    pub fn persist_state(&self) -> WorkbenchResult<()> {
        self.core.persist_state()
    }

    /// See [`super::ModuleStatePersistor::maybe_apply_persisted_state`]
    pub fn maybe_apply_persisted_state(&self) -> bool {
        self.core.maybe_apply_persisted_state()
    }

    pub fn remove_persisted_state(&self) -> WorkbenchResult<()> {
        self.core.remove_persisted_state()
    }

    /// The document current state serializes to
    pub fn get_persisted_state(&self) -> WorkbenchResult<Value> {
        self.core.serialize_state()
    }

    /// Validate and apply a document; restored atoms are tagged as persisted
    pub fn apply_persisted_state(&self, document: Value) -> WorkbenchResult<()> {
        self.core.apply(document)
    }

    pub fn detach(&self) {
        self.core.detach();
    }
}

impl fmt::Debug for ModuleStateStorageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleStateStorageManager")
            .field("storage_key", &self.core.storage_key())
            .finish()
    }
}
