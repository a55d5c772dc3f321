// Copyright 2025 Cowboy AI, LLC.

//! # Reservoir Workbench
//!
//! Module composition runtime for a reservoir-visualization workbench.
//!
//! The crate provides the pieces independently developed modules are
//! assembled from:
//! - **StateStore**: per-instance key/value state with per-key subscriptions
//! - **Layers**: layer trees of groups, layers and settings with effective-setting lookup
//! - **Channels**: typed, lazily generated data published by one instance and pulled by another
//! - **Modules**: registered capabilities, loaded lazily, instantiated any number of times
//! - **Persistence**: schema-validated instance state in durable key/value storage
//! - **Workbench**: composition root with shared session data and cross-module topics
//!
//! ## Execution model
//!
//! Everything runs on one thread. Notification is synchronous and happens in
//! subscription order before the mutating call returns. The only
//! asynchronous step is loading module code through a [`ModuleLoader`].
//!
//! ## Example
//!
//! ```rust
//! use reservoir_workbench::{StateOptions, StateStore};
//! use serde_json::json;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let store = StateStore::new(&json!({ "zoom": 1, "layer": "depth" }), StateOptions::new()).unwrap();
//! let calls = Rc::new(Cell::new(0));
//! let c = Rc::clone(&calls);
//! let _handle = store.subscribe("zoom", move |_| c.set(c.get() + 1)).unwrap();
//!
//! store.set_value("layer", "time").unwrap();
//! store.set_value("zoom", 4).unwrap();
//! assert_eq!(calls.get(), 1);
//! assert_eq!(store.get_value::<i32>("zoom").unwrap(), 4);
//! ```

pub mod channels;
mod config;
mod errors;
pub mod layers;
pub mod module;
pub mod persistence;
pub mod pubsub;
mod registry;
mod state_store;
pub mod workbench;

pub use config::{WorkbenchConfig, WorkbenchConfigBuilder};
pub use errors::{WorkbenchError, WorkbenchResult};
pub use module::{
    ImportState, Module, ModuleContext, ModuleInstance, ModuleInstanceState, ModuleLoader, ModuleOptions,
    StaticModuleLoader, SyncSettingKey,
};
pub use pubsub::SubscriptionHandle;
pub use registry::ModuleRegistry;
pub use state_store::{StateOptions, StateStore};
pub use workbench::{EnsembleIdent, Workbench, WorkbenchServices, WorkbenchSession};
