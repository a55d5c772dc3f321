// Copyright 2025 Cowboy AI, LLC.

//! Per-module-instance key/value state with per-key subscriptions
//!
//! A [`StateStore`] is created from an initial state object (any type that
//! serializes to a JSON object). Its keys are fixed at construction: every
//! field of the initial state becomes a key, and no key can be added later.
//! Setting a key notifies only that key's subscribers, synchronously and in
//! subscription order.

use crate::errors::{WorkbenchError, WorkbenchResult};
use crate::pubsub::{SubscriptionHandle, TopicSubscribers};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Options controlling notification behaviour per key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateOptions {
    deep_compare: HashSet<String>,
}

impl StateOptions {
    /// Options with no per-key behaviour
    pub fn new() -> Self {
        Self::default()
    }

    /// Writing a value equal to the current one is ignored for this key
    pub fn deep_compare(mut self, key: impl Into<String>) -> Self {
        self.deep_compare.insert(key.into());
        self
    }

    /// Whether equal writes are ignored for `key`
    pub fn is_deep_compared(&self, key: &str) -> bool {
        self.deep_compare.contains(key)
    }
}

/// Key/value store with fine-grained subscriptions
pub struct StateStore {
    values: RefCell<IndexMap<String, Value>>,
    subscribers: TopicSubscribers<String, Value>,
    options: StateOptions,
}

impl StateStore {
    /// Create a store from an initial state that serializes to a JSON object
    pub fn new<S: Serialize>(initial_state: &S, options: StateOptions) -> WorkbenchResult<Self> {
        match serde_json::to_value(initial_state)? {
            Value::Object(map) => Ok(Self::from_values(map.into_iter().collect(), options)),
            other => Err(WorkbenchError::Serialization(format!(
                "initial state must be an object, got {other}"
            ))),
        }
    }

    /// Create a store from already-serialized key/value pairs
    pub fn from_values(values: IndexMap<String, Value>, options: StateOptions) -> Self {
        Self {
            values: RefCell::new(values),
            subscribers: TopicSubscribers::new(),
            options,
        }
    }

    /// All keys, in initial-state order
    pub fn keys(&self) -> Vec<String> {
        self.values.borrow().keys().cloned().collect()
    }

    /// Whether `key` is part of this store's shape
    pub fn has_key(&self, key: &str) -> bool {
        self.values.borrow().contains_key(key)
    }

    /// The options this store was created with
    pub fn options(&self) -> &StateOptions {
        &self.options
    }

    /// Raw JSON value for a key
    pub fn get_raw(&self, key: &str) -> WorkbenchResult<Value> {
        self.values
            .borrow()
            .get(key)
            .cloned()
            .ok_or_else(|| WorkbenchError::UnknownStateKey(key.to_string()))
    }

    /// Typed value for a key
    pub fn get_value<T: DeserializeOwned>(&self, key: &str) -> WorkbenchResult<T> {
        Ok(serde_json::from_value(self.get_raw(key)?)?)
    }

    /// Set a typed value and notify the key's subscribers
    pub fn set_value<T: Serialize>(&self, key: &str, value: T) -> WorkbenchResult<()> {
        self.set_raw(key, serde_json::to_value(value)?)
    }

    /// Set a value from the previous one
    pub fn update_value<T, F>(&self, key: &str, update: F) -> WorkbenchResult<()>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(T) -> T,
    {
        let previous: T = self.get_value(key)?;
        self.set_value(key, update(previous))
    }

    /// Set a raw JSON value and notify the key's subscribers
    pub fn set_raw(&self, key: &str, value: Value) -> WorkbenchResult<()> {
        {
            let mut values = self.values.borrow_mut();
            let slot = values
                .get_mut(key)
                .ok_or_else(|| WorkbenchError::UnknownStateKey(key.to_string()))?;
            if self.options.is_deep_compared(key) && *slot == value {
                debug!(key, "state value unchanged, skipping notification");
                return Ok(());
            }
            *slot = value.clone();
        }
        self.subscribers.notify(&key.to_string(), &value);
        Ok(())
    }

    /// Subscribe to changes of a single key
    ///
    /// The callback is not invoked with the current value.
    pub fn subscribe(
        &self,
        key: &str,
        callback: impl Fn(&Value) + 'static,
    ) -> WorkbenchResult<SubscriptionHandle> {
        if !self.has_key(key) {
            return Err(WorkbenchError::UnknownStateKey(key.to_string()));
        }
        Ok(self.subscribers.subscribe(key.to_string(), callback))
    }

    /// Subscribe with a typed callback
    pub fn subscribe_typed<T, F>(&self, key: &str, callback: F) -> WorkbenchResult<SubscriptionHandle>
    where
        T: DeserializeOwned,
        F: Fn(T) + 'static,
    {
        let key_owned = key.to_string();
        self.subscribe(key, move |value| {
            match serde_json::from_value::<T>(value.clone()) {
                Ok(typed) => callback(typed),
                Err(err) => debug!(key = %key_owned, %err, "typed subscriber skipped value"),
            }
        })
    }

    /// Every key/value pair as currently stored
    pub fn values(&self) -> IndexMap<String, Value> {
        self.values.borrow().clone()
    }

    /// Reassemble the whole state as a typed value
    pub fn snapshot<S: DeserializeOwned>(&self) -> WorkbenchResult<S> {
        let map: serde_json::Map<String, Value> = self.values().into_iter().collect();
        Ok(serde_json::from_value(Value::Object(map))?)
    }

    /// Number of subscribers on a key
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.subscribers.subscriber_count(&key.to_string())
    }
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("values", &self.values.borrow())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct CountState {
        count: i32,
        label: String,
        selected: Vec<String>,
    }

    fn make_store() -> StateStore {
        StateStore::new(
            &CountState {
                count: 0,
                label: "start".to_string(),
                selected: vec![],
            },
            StateOptions::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_keys_follow_initial_state() {
        let store = make_store();
        assert_eq!(store.keys(), vec!["count", "label", "selected"]);
        assert!(store.has_key("label"));
        assert!(!store.has_key("missing"));
    }

    #[test]
    fn test_set_value_notifies_only_that_key() {
        let store = make_store();
        let count_calls = Rc::new(Cell::new(0));
        let label_calls = Rc::new(Cell::new(0));

        let c = Rc::clone(&count_calls);
        let _ = store.subscribe("count", move |_| c.set(c.get() + 1)).unwrap();
        let l = Rc::clone(&label_calls);
        let _ = store.subscribe("label", move |_| l.set(l.get() + 1)).unwrap();

        store.set_value("label", "next").unwrap();
        assert_eq!(count_calls.get(), 0);
        assert_eq!(label_calls.get(), 1);
        assert_eq!(store.get_value::<String>("label").unwrap(), "next");
    }

    #[test]
    fn test_subscribe_does_not_replay() {
        let store = make_store();
        store.set_value("count", 5).unwrap();

        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        let _ = store.subscribe("count", move |_| c.set(c.get() + 1)).unwrap();
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_unknown_key_is_an_error() {
        let store = make_store();
        assert!(matches!(
            store.set_value("nope", 1),
            Err(WorkbenchError::UnknownStateKey(_))
        ));
        assert!(store.subscribe("nope", |_| {}).is_err());
        assert!(store.get_raw("nope").is_err());
    }

    #[test]
    fn test_non_object_initial_state_is_rejected() {
        assert!(StateStore::new(&42, StateOptions::new()).is_err());
    }

    #[test]
    fn test_deep_compare_skips_equal_writes() {
        let initial = CountState {
            count: 0,
            label: "a".into(),
            selected: vec!["x".into()],
        };
        let store = StateStore::new(&initial, StateOptions::new().deep_compare("selected")).unwrap();
        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        let _ = store.subscribe("selected", move |_| c.set(c.get() + 1)).unwrap();

        store.set_value("selected", vec!["x"]).unwrap();
        assert_eq!(calls.get(), 0);
        store.set_value("selected", vec!["y"]).unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_update_and_snapshot() {
        let store = make_store();
        store.update_value::<i32, _>("count", |c| c + 3).unwrap();
        let snapshot: CountState = store.snapshot().unwrap();
        assert_eq!(snapshot.count, 3);
        assert_eq!(snapshot.label, "start");
    }

    #[test]
    fn test_typed_subscriber_receives_new_value() {
        let store = make_store();
        let last = Rc::new(Cell::new(0));
        let l = Rc::clone(&last);
        let _ = store.subscribe_typed::<i32, _>("count", move |v| l.set(v)).unwrap();
        store.set_value("count", 9).unwrap();
        assert_eq!(last.get(), 9);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let store = make_store();
        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        let handle = store.subscribe("count", move |_| c.set(c.get() + 1)).unwrap();
        store.set_value("count", 1).unwrap();
        handle.unsubscribe();
        store.set_value("count", 2).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(store.subscriber_count("count"), 0);
    }
}
