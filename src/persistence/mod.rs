// Copyright 2025 Cowboy AI, LLC.

//! # Persistence
//!
//! Per-instance state documents and the pieces they are built from.
//!
//! ## Components
//!
//! - **Storage**: [`KeyValueStorage`] with in-memory and JSON file backends
//! - **Validation**: [`SchemaValidator`] checks stored documents against the
//!   schema derived from the serializer's document type
//! - **Tagged values**: [`PersistableValue`] and the per-instance [`AtomStore`]
//! - **Interface**: [`SettingsToViewInterface`] with base and derived states
//! - **Persistors**: [`ModuleStatePersistor`] (state store and atoms) and
//!   [`ModuleStateStorageManager`] (adds interface base states)
//!
//! Invalid or unreadable documents are logged and treated as absent; they
//! never abort instance creation.

mod interface;
mod persistable;
mod persistor;
mod schema;
mod serializer;
mod storage;
mod storage_manager;

pub use interface::{InterfaceInitialization, InterfaceReader, SettingsToViewInterface};
pub use persistable::{AtomStore, PersistableValue};
pub use persistor::{ModuleStatePersistor, PersistenceBackend};
pub use schema::{JsonSchemaValidator, SchemaValidator};
pub use serializer::{BoxedStateSerializer, StateReader, StateSerializer, StateWriter};
pub use storage::{InMemoryStorage, JsonFileStorage, KeyValueStorage};
pub use storage_manager::ModuleStateStorageManager;
