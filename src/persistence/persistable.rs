// Copyright 2025 Cowboy AI, LLC.

//! Values that remember whether they were restored from storage

use crate::errors::{WorkbenchError, WorkbenchResult};
use crate::pubsub::{SubscriptionHandle, TopicSubscribers};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::fmt;

/// A value tagged with its origin
///
/// `is_persisted_state` is true when the value was written by a state
/// deserializer rather than by a live choice. Consumers use it to decide
/// whether a value still needs checking against newly loaded data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistableValue<T> {
    pub state: T,
    pub is_persisted_state: bool,
}

impl<T> PersistableValue<T> {
    /// A value chosen live
    pub fn fresh(state: T) -> Self {
        Self {
            state,
            is_persisted_state: false,
        }
    }

    /// A value restored from storage
    pub fn persisted(state: T) -> Self {
        Self {
            state,
            is_persisted_state: true,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PersistableValue<U> {
        PersistableValue {
            state: f(self.state),
            is_persisted_state: self.is_persisted_state,
        }
    }
}

/// Named persistable values of one module instance
///
/// Atoms hold state a module keeps outside its [`crate::StateStore`], such
/// as user selections that must be validated against loaded data.
#[derive(Default)]
pub struct AtomStore {
    atoms: RefCell<IndexMap<String, PersistableValue<Value>>>,
    subscribers: TopicSubscribers<String, PersistableValue<Value>>,
}

impl AtomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an atom with its initial value, replacing any previous declaration
    pub fn define<T: Serialize>(&self, name: impl Into<String>, initial: T) -> WorkbenchResult<()> {
        let value = serde_json::to_value(initial)?;
        self.atoms
            .borrow_mut()
            .insert(name.into(), PersistableValue::fresh(value));
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.atoms.borrow().keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.atoms.borrow().contains_key(name)
    }

    /// The raw tagged value
    pub fn get_raw(&self, name: &str) -> WorkbenchResult<PersistableValue<Value>> {
        self.atoms
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| WorkbenchError::UnknownAtom(name.to_string()))
    }

    /// The tagged value converted to `T`
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> WorkbenchResult<PersistableValue<T>> {
        let raw = self.get_raw(name)?;
        Ok(PersistableValue {
            state: serde_json::from_value(raw.state)?,
            is_persisted_state: raw.is_persisted_state,
        })
    }

    /// Just the value, without its tag
    pub fn get_value<T: DeserializeOwned>(&self, name: &str) -> WorkbenchResult<T> {
        Ok(self.get::<T>(name)?.state)
    }

    pub fn is_persisted(&self, name: &str) -> WorkbenchResult<bool> {
        Ok(self.get_raw(name)?.is_persisted_state)
    }

    /// Live write; clears the persisted tag
    pub fn set<T: Serialize>(&self, name: &str, value: T) -> WorkbenchResult<()> {
        self.store(name, PersistableValue::fresh(serde_json::to_value(value)?))
    }

    /// Restoring write; sets the persisted tag
    pub fn set_persisted(&self, name: &str, value: Value) -> WorkbenchResult<()> {
        self.store(name, PersistableValue::persisted(value))
    }

    fn store(&self, name: &str, value: PersistableValue<Value>) -> WorkbenchResult<()> {
        {
            let mut atoms = self.atoms.borrow_mut();
            let slot = atoms
                .get_mut(name)
                .ok_or_else(|| WorkbenchError::UnknownAtom(name.to_string()))?;
            *slot = value.clone();
        }
        self.subscribers.notify(&name.to_string(), &value);
        Ok(())
    }

    pub fn subscribe(
        &self,
        name: &str,
        callback: impl Fn(&PersistableValue<Value>) + 'static,
    ) -> WorkbenchResult<SubscriptionHandle> {
        if !self.contains(name) {
            return Err(WorkbenchError::UnknownAtom(name.to_string()));
        }
        Ok(self.subscribers.subscribe(name.to_string(), callback))
    }
}

impl fmt::Debug for AtomStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomStore")
            .field("atoms", &self.atoms.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_live_and_restored_writes_are_tagged() {
        let atoms = AtomStore::new();
        atoms.define("selectedEnsemble", Option::<String>::None).unwrap();
        assert!(!atoms.is_persisted("selectedEnsemble").unwrap());

        atoms.set_persisted("selectedEnsemble", json!("case::iter-0")).unwrap();
        let restored = atoms.get::<Option<String>>("selectedEnsemble").unwrap();
        assert!(restored.is_persisted_state);
        assert_eq!(restored.state.as_deref(), Some("case::iter-0"));

        atoms.set("selectedEnsemble", Some("case::iter-1")).unwrap();
        assert!(!atoms.is_persisted("selectedEnsemble").unwrap());
    }

    #[test]
    fn test_unknown_atom() {
        let atoms = AtomStore::new();
        assert!(matches!(atoms.set("missing", 1), Err(WorkbenchError::UnknownAtom(_))));
        assert!(atoms.subscribe("missing", |_| {}).is_err());
    }

    #[test]
    fn test_subscribers_see_tagged_value() {
        let atoms = AtomStore::new();
        atoms.define("count", 0).unwrap();
        let persisted_seen = Rc::new(Cell::new(false));
        let p = Rc::clone(&persisted_seen);
        let _ = atoms
            .subscribe("count", move |value| p.set(value.is_persisted_state))
            .unwrap();
        atoms.set_persisted("count", json!(4)).unwrap();
        assert!(persisted_seen.get());
        assert_eq!(atoms.get_value::<i32>("count").unwrap(), 4);
    }

    #[test]
    fn test_persistable_value_serializes_camel_case() {
        let value = PersistableValue::persisted(3).map(|n| n * 2);
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            json!({ "state": 6, "isPersistedState": true })
        );
    }
}
