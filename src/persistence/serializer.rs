// Copyright 2025 Cowboy AI, LLC.

//! The contract between a module and its persisted state document

use super::interface::SettingsToViewInterface;
use super::persistable::AtomStore;
use crate::errors::{WorkbenchError, WorkbenchResult};
use crate::state_store::StateStore;
use schemars::schema::RootSchema;
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::rc::Rc;

/// Read accessors handed to [`StateSerializer::serialize`]
pub struct StateReader<'a> {
    pub(super) state_store: &'a StateStore,
    pub(super) atoms: &'a AtomStore,
    pub(super) interface: Option<&'a SettingsToViewInterface>,
}

impl<'a> StateReader<'a> {
    pub fn new(
        state_store: &'a StateStore,
        atoms: &'a AtomStore,
        interface: Option<&'a SettingsToViewInterface>,
    ) -> Self {
        Self {
            state_store,
            atoms,
            interface,
        }
    }

    pub fn state<T: DeserializeOwned>(&self, key: &str) -> WorkbenchResult<T> {
        self.state_store.get_value(key)
    }

    /// An atom's value without its persisted tag
    pub fn atom<T: DeserializeOwned>(&self, name: &str) -> WorkbenchResult<T> {
        self.atoms.get_value(name)
    }

    /// A base or derived interface state
    pub fn interface<T: DeserializeOwned>(&self, name: &str) -> WorkbenchResult<T> {
        self.interface
            .ok_or_else(|| WorkbenchError::InterfaceNotInitialized(name.to_string()))?
            .get_as(name)
    }
}

/// Setters handed to [`StateSerializer::deserialize`]
pub struct StateWriter<'a> {
    pub(super) state_store: &'a StateStore,
    pub(super) atoms: &'a AtomStore,
    pub(super) interface: Option<&'a SettingsToViewInterface>,
}

impl<'a> StateWriter<'a> {
    pub fn new(
        state_store: &'a StateStore,
        atoms: &'a AtomStore,
        interface: Option<&'a SettingsToViewInterface>,
    ) -> Self {
        Self {
            state_store,
            atoms,
            interface,
        }
    }

    pub fn set_state<T: Serialize>(&self, key: &str, value: T) -> WorkbenchResult<()> {
        self.state_store.set_value(key, value)
    }

    /// Restore an atom, tagging it as persisted
    pub fn set_atom<T: Serialize>(&self, name: &str, value: T) -> WorkbenchResult<()> {
        self.atoms.set_persisted(name, serde_json::to_value(value)?)
    }

    pub fn set_interface_base<T: Serialize>(&self, name: &str, value: T) -> WorkbenchResult<()> {
        self.interface
            .ok_or_else(|| WorkbenchError::InterfaceNotInitialized(name.to_string()))?
            .set_base_value(name, value)
    }
}

/// Converts a module instance's state to and from a persisted document
///
/// The document's `JsonSchema` is used to validate what is read back from
/// storage before `deserialize` sees it.
pub trait StateSerializer: 'static {
    /// The persisted document
    type Document: Serialize + DeserializeOwned + JsonSchema;

    /// Build the document from current state
    fn serialize(&self, reader: &StateReader<'_>) -> WorkbenchResult<Self::Document>;

    /// Write a validated document back through the setters
    fn deserialize(&self, document: Self::Document, writer: &StateWriter<'_>) -> WorkbenchResult<()>;
}

trait ErasedStateSerializer {
    fn serialize_value(&self, reader: &StateReader<'_>) -> WorkbenchResult<Value>;
    fn deserialize_value(&self, value: Value, writer: &StateWriter<'_>) -> WorkbenchResult<()>;
}

impl<S: StateSerializer> ErasedStateSerializer for S {
    fn serialize_value(&self, reader: &StateReader<'_>) -> WorkbenchResult<Value> {
        Ok(serde_json::to_value(self.serialize(reader)?)?)
    }

    fn deserialize_value(&self, value: Value, writer: &StateWriter<'_>) -> WorkbenchResult<()> {
        let document: S::Document = serde_json::from_value(value)?;
        self.deserialize(document, writer)
    }
}

/// A type-erased serializer together with its document schema
#[derive(Clone)]
pub struct BoxedStateSerializer {
    inner: Rc<dyn ErasedStateSerializer>,
    schema: Rc<RootSchema>,
}

impl BoxedStateSerializer {
    pub fn new<S: StateSerializer>(serializer: S) -> Self {
        Self {
            schema: Rc::new(schema_for!(S::Document)),
            inner: Rc::new(serializer),
        }
    }

    /// Schema persisted documents must satisfy
    pub fn schema(&self) -> &RootSchema {
        &self.schema
    }

    pub fn serialize(&self, reader: &StateReader<'_>) -> WorkbenchResult<Value> {
        self.inner.serialize_value(reader)
    }

    pub fn deserialize(&self, value: Value, writer: &StateWriter<'_>) -> WorkbenchResult<()> {
        self.inner.deserialize_value(value, writer)
    }
}

impl fmt::Debug for BoxedStateSerializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedStateSerializer")
            .field(
                "document",
                &self.schema.schema.metadata.as_ref().and_then(|m| m.title.clone()),
            )
            .finish()
    }
}
