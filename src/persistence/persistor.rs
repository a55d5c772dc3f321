// Copyright 2025 Cowboy AI, LLC.

//! Change-driven persistence of a module instance's state document

use super::interface::SettingsToViewInterface;
use super::persistable::AtomStore;
use super::schema::SchemaValidator;
use super::serializer::{BoxedStateSerializer, StateReader, StateWriter};
use super::storage::KeyValueStorage;
use crate::errors::WorkbenchResult;
use crate::pubsub::SubscriptionHandle;
use crate::state_store::StateStore;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, error, info, warn};

/// Where and how a persistor reads and writes its document
#[derive(Clone)]
pub struct PersistenceBackend {
    pub storage: Rc<dyn KeyValueStorage>,
    pub validator: Rc<dyn SchemaValidator>,
    /// Storage key of the document, usually `"{instanceId}-state"`
    pub storage_key: String,
    /// Write the document whenever a tracked value changes
    pub persist_on_change: bool,
}

impl fmt::Debug for PersistenceBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceBackend")
            .field("storage", &self.storage)
            .field("storage_key", &self.storage_key)
            .field("persist_on_change", &self.persist_on_change)
            .finish()
    }
}

pub(super) struct PersistenceCore {
    instance_id: String,
    backend: PersistenceBackend,
    serializer: BoxedStateSerializer,
    state_store: Rc<StateStore>,
    atoms: Rc<AtomStore>,
    interface: Option<Rc<SettingsToViewInterface>>,
    applying: Cell<bool>,
    subscriptions: RefCell<Vec<SubscriptionHandle>>,
}

impl PersistenceCore {
    pub(super) fn new(
        instance_id: impl Into<String>,
        backend: PersistenceBackend,
        serializer: BoxedStateSerializer,
        state_store: Rc<StateStore>,
        atoms: Rc<AtomStore>,
        interface: Option<Rc<SettingsToViewInterface>>,
    ) -> Rc<Self> {
        let core = Rc::new(Self {
            instance_id: instance_id.into(),
            backend,
            serializer,
            state_store,
            atoms,
            interface,
            applying: Cell::new(false),
            subscriptions: RefCell::new(Vec::new()),
        });
        if core.backend.persist_on_change {
            core.track();
        }
        core
    }

    pub(super) fn storage_key(&self) -> &str {
        &self.backend.storage_key
    }

    /// Subscribe to every state key, atom and interface base state
    fn track(self: &Rc<Self>) {
        let mut handles = Vec::new();

        for key in self.state_store.keys() {
            let weak = Rc::downgrade(self);
            match self.state_store.subscribe(&key, move |_| Self::on_change(&weak)) {
                Ok(handle) => handles.push(handle),
                Err(err) => warn!(instance_id = %self.instance_id, %err, "state key not tracked"),
            }
        }
        for name in self.atoms.names() {
            let weak = Rc::downgrade(self);
            match self.atoms.subscribe(&name, move |_| Self::on_change(&weak)) {
                Ok(handle) => handles.push(handle),
                Err(err) => warn!(instance_id = %self.instance_id, %err, "atom not tracked"),
            }
        }
        if let Some(interface) = &self.interface {
            for name in interface.base_names() {
                let weak = Rc::downgrade(self);
                match interface.subscribe(&name, move || Self::on_change(&weak)) {
                    Ok(handle) => handles.push(handle),
                    Err(err) => warn!(instance_id = %self.instance_id, %err, "interface state not tracked"),
                }
            }
        }

        debug!(instance_id = %self.instance_id, tracked = handles.len(), "persistence tracking wired");
        self.subscriptions.borrow_mut().extend(handles);
    }

    fn on_change(weak: &Weak<Self>) {
        let Some(core) = weak.upgrade() else {
            return;
        };
        if core.applying.get() {
            return;
        }
        if let Err(err) = core.persist_state() {
            error!(instance_id = %core.instance_id, %err, "failed to persist state after change");
        }
    }

    pub(super) fn detach(&self) {
        let handles: Vec<SubscriptionHandle> = self.subscriptions.borrow_mut().drain(..).collect();
        for handle in handles {
            handle.unsubscribe();
        }
    }

    pub(super) fn serialize_state(&self) -> WorkbenchResult<Value> {
        let reader = StateReader::new(&self.state_store, &self.atoms, self.interface.as_deref());
        self.serializer.serialize(&reader)
    }

    pub(super) fn persist_state(&self) -> WorkbenchResult<()> {
        let document = self.serialize_state()?;
        self.backend
            .storage
            .set_item(&self.backend.storage_key, &serde_json::to_string(&document)?)?;
        info!(instance_id = %self.instance_id, key = %self.backend.storage_key, "state persisted");
        Ok(())
    }

    /// The stored document if it parses and validates
    fn read_persisted(&self) -> Option<Value> {
        let raw = match self.backend.storage.get_item(&self.backend.storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                error!(instance_id = %self.instance_id, %err, "failed to read persisted state");
                return None;
            }
        };
        let document: Value = match serde_json::from_str(&raw) {
            Ok(document) => document,
            Err(err) => {
                error!(instance_id = %self.instance_id, %err, "persisted state is not valid JSON");
                return None;
            }
        };
        if let Err(err) = self.backend.validator.validate(self.serializer.schema(), &document) {
            error!(
                instance_id = %self.instance_id,
                %err,
                "persisted state does not match the state definition"
            );
            return None;
        }
        Some(document)
    }

    /// Validate and deserialize `document`, then persist the result once
    pub(super) fn apply(&self, document: Value) -> WorkbenchResult<()> {
        self.backend.validator.validate(self.serializer.schema(), &document)?;

        let writer = StateWriter::new(&self.state_store, &self.atoms, self.interface.as_deref());
        self.applying.set(true);
        let result = self.serializer.deserialize(document, &writer);
        self.applying.set(false);
        result?;

        if self.backend.persist_on_change {
            self.persist_state()?;
        }
        Ok(())
    }

    pub(super) fn maybe_apply_persisted_state(&self) -> bool {
        let Some(document) = self.read_persisted() else {
            return false;
        };
        match self.apply(document) {
            Ok(()) => {
                info!(instance_id = %self.instance_id, "persisted state applied");
                true
            }
            Err(err) => {
                error!(instance_id = %self.instance_id, %err, "failed to apply persisted state");
                false
            }
        }
    }

    pub(super) fn remove_persisted_state(&self) -> WorkbenchResult<()> {
        self.backend.storage.remove_item(&self.backend.storage_key)
    }
}

/// Persists a module instance's state store and atoms
///
/// With `persist_on_change` the document is rewritten after every change of
/// a tracked value. Writes are synchronous, so the last write wins.
pub struct ModuleStatePersistor {
    core: Rc<PersistenceCore>,
}

impl ModuleStatePersistor {
    pub fn new(
        instance_id: impl Into<String>,
        backend: PersistenceBackend,
        serializer: BoxedStateSerializer,
        state_store: Rc<StateStore>,
        atoms: Rc<AtomStore>,
    ) -> Self {
        Self {
            core: PersistenceCore::new(instance_id, backend, serializer, state_store, atoms, None),
        }
    }

    pub fn storage_key(&self) -> &str {
        self.core.storage_key()
    }

    /// Serialize current state and write it to storage
    pub fn persist_state(&self) -> WorkbenchResult<()> {
        self.core.persist_state()
    }

    /// Restore from storage when a valid document exists
    ///
    /// Missing, unparsable or invalid documents are logged and leave state
    /// untouched. Returns whether a document was applied.
    pub fn maybe_apply_persisted_state(&self) -> bool {
        self.core.maybe_apply_persisted_state()
    }

    pub fn remove_persisted_state(&self) -> WorkbenchResult<()> {
        self.core.remove_persisted_state()
    }

    /// Stop tracking changes
    pub fn detach(&self) {
        self.core.detach();
    }
}

impl fmt::Debug for ModuleStatePersistor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleStatePersistor")
            .field("instance_id", &self.core.instance_id)
            .field("storage_key", &self.core.storage_key())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::schema::JsonSchemaValidator;
    use crate::persistence::serializer::StateSerializer;
    use crate::persistence::storage::InMemoryStorage;
    use crate::state_store::StateOptions;
    use schemars::JsonSchema;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct State {
        surface_name: String,
        realization: u32,
    }

    #[derive(Serialize, Deserialize, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    struct Document {
        surface_name: String,
        realization: u32,
        selected_wells: Vec<String>,
    }

    struct SurfaceSerializer;

    impl StateSerializer for SurfaceSerializer {
        type Document = Document;

        fn serialize(&self, reader: &StateReader<'_>) -> WorkbenchResult<Document> {
            Ok(Document {
                surface_name: reader.state("surfaceName")?,
                realization: reader.state("realization")?,
                selected_wells: reader.atom("selectedWells")?,
            })
        }

        fn deserialize(&self, document: Document, writer: &StateWriter<'_>) -> WorkbenchResult<()> {
            writer.set_state("surfaceName", document.surface_name)?;
            writer.set_state("realization", document.realization)?;
            writer.set_atom("selectedWells", document.selected_wells)
        }
    }

    struct Fixture {
        storage: Rc<InMemoryStorage>,
        state_store: Rc<StateStore>,
        atoms: Rc<AtomStore>,
        persistor: ModuleStatePersistor,
    }

    fn fixture(storage: Rc<InMemoryStorage>) -> Fixture {
        let state_store = Rc::new(
            StateStore::new(
                &State {
                    surface_name: "Top Volantis".to_string(),
                    realization: 0,
                },
                StateOptions::new(),
            )
            .unwrap(),
        );
        let atoms = Rc::new(AtomStore::new());
        atoms.define("selectedWells", Vec::<String>::new()).unwrap();
        let persistor = ModuleStatePersistor::new(
            "Map-1",
            PersistenceBackend {
                storage: storage.clone(),
                validator: Rc::new(JsonSchemaValidator::new()),
                storage_key: "Map-1-state".to_string(),
                persist_on_change: true,
            },
            BoxedStateSerializer::new(SurfaceSerializer),
            Rc::clone(&state_store),
            Rc::clone(&atoms),
        );
        Fixture {
            storage,
            state_store,
            atoms,
            persistor,
        }
    }

    fn stored(storage: &InMemoryStorage) -> Value {
        serde_json::from_str(&storage.get_item("Map-1-state").unwrap().unwrap()).unwrap()
    }

    #[test]
    fn test_changes_are_persisted() {
        let f = fixture(Rc::new(InMemoryStorage::new()));
        assert!(f.storage.is_empty());

        f.state_store.set_value("realization", 7).unwrap();
        assert_eq!(stored(&f.storage)["realization"], json!(7));

        f.atoms.set("selectedWells", vec!["A-1"]).unwrap();
        assert_eq!(stored(&f.storage)["selectedWells"], json!(["A-1"]));
    }

    #[test]
    fn test_restore_into_fresh_instance() {
        let storage = Rc::new(InMemoryStorage::new());
        {
            let f = fixture(Rc::clone(&storage));
            f.state_store.set_value("surfaceName", "Base Therys").unwrap();
            f.atoms.set("selectedWells", vec!["B-2"]).unwrap();
            f.persistor.detach();
        }

        let f = fixture(storage);
        assert!(f.persistor.maybe_apply_persisted_state());
        assert_eq!(
            f.state_store.get_value::<String>("surfaceName").unwrap(),
            "Base Therys"
        );
        let wells = f.atoms.get::<Vec<String>>("selectedWells").unwrap();
        assert!(wells.is_persisted_state);
        assert_eq!(wells.state, vec!["B-2".to_string()]);
    }

    #[test]
    fn test_invalid_document_leaves_state_untouched() {
        let storage = Rc::new(InMemoryStorage::new());
        storage
            .set_item(
                "Map-1-state",
                r#"{"surfaceName":"Top","realization":"seven","selectedWells":[]}"#,
            )
            .unwrap();
        let f = fixture(storage);

        assert!(!f.persistor.maybe_apply_persisted_state());
        assert_eq!(f.state_store.get_value::<u32>("realization").unwrap(), 0);
        assert!(!f.atoms.is_persisted("selectedWells").unwrap());
    }

    #[test]
    fn test_missing_document_is_not_an_error() {
        let f = fixture(Rc::new(InMemoryStorage::new()));
        assert!(!f.persistor.maybe_apply_persisted_state());

        f.persistor.persist_state().unwrap();
        f.persistor.remove_persisted_state().unwrap();
        assert!(f.storage.get_item("Map-1-state").unwrap().is_none());
    }

    #[test]
    fn test_detached_persistor_stops_writing() {
        let f = fixture(Rc::new(InMemoryStorage::new()));
        f.persistor.detach();
        f.state_store.set_value("realization", 3).unwrap();
        assert!(f.storage.is_empty());
    }
}
