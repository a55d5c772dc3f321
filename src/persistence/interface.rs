// Copyright 2025 Cowboy AI, LLC.

//! One-way interface from a module's settings side to its view side
//!
//! Base states are written by the settings side. Derived states are pure
//! functions of other states; they are memoized and recomputed on first read
//! after any base state changes.

use crate::errors::{WorkbenchError, WorkbenchResult};
use crate::pubsub::{SubscriptionHandle, TopicSubscribers};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, warn};

type DeriveFn = Rc<dyn Fn(&InterfaceReader<'_>) -> Value>;

/// Read access handed to derived-state functions
pub struct InterfaceReader<'a> {
    interface: &'a SettingsToViewInterface,
}

impl InterfaceReader<'_> {
    /// Any base or derived state; unknown names read as `null`
    pub fn get(&self, name: &str) -> Value {
        match self.interface.get(name) {
            Ok(value) => value,
            Err(err) => {
                warn!(%err, "derived state read an unknown interface state");
                Value::Null
            }
        }
    }

    /// A state converted to `T`, `None` when absent or of another shape
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        serde_json::from_value(self.get(name)).ok()
    }
}

/// Declaration of an interface's base and derived states
#[derive(Default)]
pub struct InterfaceInitialization {
    base_states: IndexMap<String, Value>,
    derived_states: IndexMap<String, DeriveFn>,
}

impl InterfaceInitialization {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a writable base state
    pub fn base<T: Serialize>(mut self, name: impl Into<String>, initial: T) -> WorkbenchResult<Self> {
        self.base_states.insert(name.into(), serde_json::to_value(initial)?);
        Ok(self)
    }

    /// Add a derived state
    pub fn derived(
        mut self,
        name: impl Into<String>,
        derive: impl Fn(&InterfaceReader<'_>) -> Value + 'static,
    ) -> Self {
        self.derived_states.insert(name.into(), Rc::new(derive));
        self
    }

    /// Build a live interface
    pub fn build(&self) -> SettingsToViewInterface {
        SettingsToViewInterface {
            base_states: RefCell::new(self.base_states.clone()),
            derived_states: self.derived_states.clone(),
            derived_cache: RefCell::new(HashMap::new()),
            subscribers: TopicSubscribers::new(),
        }
    }
}

impl fmt::Debug for InterfaceInitialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceInitialization")
            .field("base_states", &self.base_states)
            .field("derived_states", &self.derived_states.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Live settings-to-view interface of one module instance
pub struct SettingsToViewInterface {
    base_states: RefCell<IndexMap<String, Value>>,
    derived_states: IndexMap<String, DeriveFn>,
    derived_cache: RefCell<HashMap<String, Value>>,
    subscribers: TopicSubscribers<String, ()>,
}

impl SettingsToViewInterface {
    pub fn base_names(&self) -> Vec<String> {
        self.base_states.borrow().keys().cloned().collect()
    }

    pub fn derived_names(&self) -> Vec<String> {
        self.derived_states.keys().cloned().collect()
    }

    pub fn has_base(&self, name: &str) -> bool {
        self.base_states.borrow().contains_key(name)
    }

    fn has(&self, name: &str) -> bool {
        self.has_base(name) || self.derived_states.contains_key(name)
    }

    fn unknown(name: &str) -> WorkbenchError {
        WorkbenchError::UnknownStateKey(format!("interface state '{name}'"))
    }

    pub fn get_base(&self, name: &str) -> WorkbenchResult<Value> {
        self.base_states
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| Self::unknown(name))
    }

    /// A base or derived state
    pub fn get(&self, name: &str) -> WorkbenchResult<Value> {
        if let Some(value) = self.base_states.borrow().get(name) {
            return Ok(value.clone());
        }
        let derive = self
            .derived_states
            .get(name)
            .cloned()
            .ok_or_else(|| Self::unknown(name))?;
        if let Some(cached) = self.derived_cache.borrow().get(name) {
            return Ok(cached.clone());
        }

        debug!(state = name, "recomputing derived interface state");
        let value = derive(&InterfaceReader { interface: self });
        self.derived_cache
            .borrow_mut()
            .insert(name.to_string(), value.clone());
        Ok(value)
    }

    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> WorkbenchResult<T> {
        Ok(serde_json::from_value(self.get(name)?)?)
    }

    /// Write a base state
    ///
    /// Subscribers of the base state and of every derived state are notified;
    /// derived values are recomputed when next read.
    pub fn set_base(&self, name: &str, value: Value) -> WorkbenchResult<()> {
        {
            let mut base_states = self.base_states.borrow_mut();
            let slot = base_states.get_mut(name).ok_or_else(|| Self::unknown(name))?;
            if *slot == value {
                return Ok(());
            }
            *slot = value;
        }
        self.derived_cache.borrow_mut().clear();

        self.subscribers.notify(&name.to_string(), &());
        for derived in self.derived_states.keys() {
            self.subscribers.notify(derived, &());
        }
        Ok(())
    }

    pub fn set_base_value<T: Serialize>(&self, name: &str, value: T) -> WorkbenchResult<()> {
        self.set_base(name, serde_json::to_value(value)?)
    }

    /// Listen for changes of a base or derived state; re-read on notification
    pub fn subscribe(&self, name: &str, callback: impl Fn() + 'static) -> WorkbenchResult<SubscriptionHandle> {
        if !self.has(name) {
            return Err(Self::unknown(name));
        }
        Ok(self.subscribers.subscribe(name.to_string(), move |_: &()| callback()))
    }
}

impl fmt::Debug for SettingsToViewInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsToViewInterface")
            .field("base_states", &self.base_states.borrow())
            .field("derived_states", &self.derived_names())
            .finish()
    }
}
