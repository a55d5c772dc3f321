// Copyright 2025 Cowboy AI, LLC.

//! Global and navigator topics broadcast across module boundaries
//!
//! Each topic keeps its last published value. Subscribing with replay
//! delivers that value at once. Publishing is synchronous: the cache is
//! updated and every current subscriber is called before `publish` returns,
//! so a publish made from inside a subscriber recurses immediately.

use crate::pubsub::{SubscriberList, SubscriptionHandle};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::trace;

/// A named topic with a fixed value type
pub trait Topic: 'static {
    const NAME: &'static str;
    type Value: Clone + 'static;
}

/// Topics any module may publish
pub trait GlobalTopic: Topic {}

/// Topics only the navigator publishes
pub trait NavigatorTopic: Topic {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoverRealization {
    pub realization: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoverTimestamp {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

pub mod topics {
    use super::{GlobalTopic, HoverRealization, HoverTimestamp, NavigatorTopic, Topic};

    pub struct FieldName;
    impl Topic for FieldName {
        const NAME: &'static str = "navigator.fieldName";
        type Value = String;
    }
    impl NavigatorTopic for FieldName {}

    pub struct CaseId;
    impl Topic for CaseId {
        const NAME: &'static str = "navigator.caseId";
        type Value = String;
    }
    impl NavigatorTopic for CaseId {}

    pub struct InfoMessage;
    impl Topic for InfoMessage {
        const NAME: &'static str = "global.infoMessage";
        type Value = String;
    }
    impl GlobalTopic for InfoMessage {}

    pub struct HoverRealizationTopic;
    impl Topic for HoverRealizationTopic {
        const NAME: &'static str = "global.hoverRealization";
        type Value = HoverRealization;
    }
    impl GlobalTopic for HoverRealizationTopic {}

    pub struct HoverTimestampTopic;
    impl Topic for HoverTimestampTopic {
        const NAME: &'static str = "global.hoverTimestamp";
        type Value = HoverTimestamp;
    }
    impl GlobalTopic for HoverTimestampTopic {}
}

type Payload = Rc<dyn Any>;

/// Last-value cache and subscribers for every topic
pub struct WorkbenchServices {
    replay_by_default: bool,
    latest: RefCell<HashMap<&'static str, Payload>>,
    subscribers: RefCell<HashMap<&'static str, Rc<SubscriberList<dyn Any>>>>,
}

impl WorkbenchServices {
    pub fn new(replay_by_default: bool) -> Self {
        Self {
            replay_by_default,
            latest: RefCell::new(HashMap::new()),
            subscribers: RefCell::new(HashMap::new()),
        }
    }

    fn list(&self, name: &'static str) -> Rc<SubscriberList<dyn Any>> {
        Rc::clone(self.subscribers.borrow_mut().entry(name).or_default())
    }

    /// Subscribe using the configured replay default
    pub fn subscribe<T: Topic>(&self, callback: impl Fn(&T::Value) + 'static) -> SubscriptionHandle {
        self.subscribe_with_replay::<T>(callback, self.replay_by_default)
    }

    /// Subscribe; with `replay` the cached value is delivered before returning
    pub fn subscribe_with_replay<T: Topic>(
        &self,
        callback: impl Fn(&T::Value) + 'static,
        replay: bool,
    ) -> SubscriptionHandle {
        let callback = Rc::new(callback);
        let subscriber = Rc::clone(&callback);
        let handle = self.list(T::NAME).subscribe(move |payload| {
            if let Some(value) = payload.downcast_ref::<T::Value>() {
                (*subscriber)(value);
            }
        });
        if replay {
            if let Some(value) = self.latest::<T>() {
                (*callback)(&value);
            }
        }
        handle
    }

    /// The last value published to `T`
    pub fn latest<T: Topic>(&self) -> Option<T::Value> {
        self.latest
            .borrow()
            .get(T::NAME)
            .and_then(|payload| payload.downcast_ref::<T::Value>())
            .cloned()
    }

    pub fn publish_global_data<T: GlobalTopic>(&self, value: T::Value) {
        self.publish(T::NAME, Rc::new(value));
    }

    pub fn publish_navigator_data<T: NavigatorTopic>(&self, value: T::Value) {
        self.publish(T::NAME, Rc::new(value));
    }

    fn publish(&self, name: &'static str, value: Payload) {
        self.latest.borrow_mut().insert(name, Rc::clone(&value));
        let list = self.list(name);
        trace!(topic = name, subscribers = list.len(), "publishing topic value");
        list.notify(&*value);
    }

    pub fn subscriber_count<T: Topic>(&self) -> usize {
        self.subscribers
            .borrow()
            .get(T::NAME)
            .map(|list| list.len())
            .unwrap_or(0)
    }
}

impl Default for WorkbenchServices {
    fn default() -> Self {
        Self::new(true)
    }
}

impl fmt::Debug for WorkbenchServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkbenchServices")
            .field("replay_by_default", &self.replay_by_default)
            .field("topics", &self.latest.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}
