// Copyright 2025 Cowboy AI, LLC.

//! Synchronous publish/subscribe primitives shared by every notifying type
//!
//! All notification in the workbench is single-threaded and synchronous:
//! subscribers are called in subscription order, on the publisher's call
//! stack, before `notify` returns. A callback removed while a notification
//! is running is not called for the rest of it; a callback added while one
//! is running is first called by the next notification.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

type Callback<T> = Rc<dyn Fn(&T)>;

/// Ordered list of subscriber callbacks
pub struct SubscriberList<T: ?Sized> {
    next_id: Cell<u64>,
    entries: RefCell<Vec<(u64, Callback<T>)>>,
}

impl<T: ?Sized + 'static> SubscriberList<T> {
    /// Create an empty list
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(0),
            entries: RefCell::new(Vec::new()),
        }
    }

    /// Add a callback, returning its id within this list
    pub fn add(&self, callback: Callback<T>) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.entries.borrow_mut().push((id, callback));
        id
    }

    /// Remove a callback by id
    pub fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    fn is_subscribed(&self, id: u64) -> bool {
        self.entries.borrow().iter().any(|(entry_id, _)| *entry_id == id)
    }

    /// Call every subscriber with `value`
    pub fn notify(&self, value: &T) {
        let snapshot: Vec<(u64, Callback<T>)> = self
            .entries
            .borrow()
            .iter()
            .map(|(id, callback)| (*id, Rc::clone(callback)))
            .collect();
        for (id, callback) in snapshot {
            if self.is_subscribed(id) {
                callback(value);
            }
        }
    }

    /// Number of registered subscribers
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// True when nobody is subscribed
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Subscribe and get a handle that can undo the subscription
    pub fn subscribe(self: &Rc<Self>, callback: impl Fn(&T) + 'static) -> SubscriptionHandle {
        let id = self.add(Rc::new(callback));
        let list: Weak<Self> = Rc::downgrade(self);
        SubscriptionHandle::new(move || {
            if let Some(list) = list.upgrade() {
                list.remove(id);
            }
        })
    }
}

impl<T: ?Sized + 'static> Default for SubscriberList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for SubscriberList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberList")
            .field("len", &self.entries.borrow().len())
            .finish()
    }
}

/// Handle returned from every `subscribe` call
///
/// Dropping the handle does not unsubscribe; call [`SubscriptionHandle::unsubscribe`].
#[must_use = "keep the handle if the subscription ever needs to be undone"]
pub struct SubscriptionHandle {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl SubscriptionHandle {
    /// Wrap an unsubscribe function
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle whose unsubscribe does nothing
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Remove the subscription
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Subscriber lists keyed by topic
pub struct TopicSubscribers<K, T: ?Sized> {
    topics: RefCell<HashMap<K, Rc<SubscriberList<T>>>>,
}

impl<K, T> TopicSubscribers<K, T>
where
    K: Eq + Hash + Clone + 'static,
    T: ?Sized + 'static,
{
    /// Create an empty topic map
    pub fn new() -> Self {
        Self {
            topics: RefCell::new(HashMap::new()),
        }
    }

    /// Subscribe to one topic
    pub fn subscribe(&self, topic: K, callback: impl Fn(&T) + 'static) -> SubscriptionHandle {
        let list = {
            let mut topics = self.topics.borrow_mut();
            Rc::clone(topics.entry(topic).or_default())
        };
        list.subscribe(callback)
    }

    /// Notify the subscribers of one topic; other topics are untouched
    pub fn notify(&self, topic: &K, value: &T) {
        let list = self.topics.borrow().get(topic).cloned();
        if let Some(list) = list {
            list.notify(value);
        }
    }

    /// Number of subscribers on a topic
    pub fn subscriber_count(&self, topic: &K) -> usize {
        self.topics
            .borrow()
            .get(topic)
            .map(|list| list.len())
            .unwrap_or(0)
    }
}

impl<K, T> Default for TopicSubscribers<K, T>
where
    K: Eq + Hash + Clone + 'static,
    T: ?Sized + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_in_subscription_order() {
        let list: Rc<SubscriberList<i32>> = Rc::new(SubscriberList::new());
        let seen = Rc::new(RefCell::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = Rc::clone(&seen);
            let _ = list.subscribe(move |value| seen.borrow_mut().push(format!("{tag}{value}")));
        }

        list.notify(&1);
        assert_eq!(*seen.borrow(), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn test_unsubscribe_removes_only_that_callback() {
        let list: Rc<SubscriberList<()>> = Rc::new(SubscriberList::new());
        let count = Rc::new(Cell::new(0));

        let c1 = Rc::clone(&count);
        let first = list.subscribe(move |_| c1.set(c1.get() + 1));
        let c2 = Rc::clone(&count);
        let _second = list.subscribe(move |_| c2.set(c2.get() + 10));

        first.unsubscribe();
        list.notify(&());
        assert_eq!(count.get(), 10);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_subscribing_during_notify_takes_effect_next_time() {
        let list: Rc<SubscriberList<()>> = Rc::new(SubscriberList::new());
        let late_calls = Rc::new(Cell::new(0));

        let list_ref = Rc::downgrade(&list);
        let late = Rc::clone(&late_calls);
        let _ = list.subscribe(move |_| {
            if let Some(list) = list_ref.upgrade() {
                let late = Rc::clone(&late);
                let _ = list.subscribe(move |_| late.set(late.get() + 1));
            }
        });

        list.notify(&());
        assert_eq!(late_calls.get(), 0);
        list.notify(&());
        assert_eq!(late_calls.get(), 1);
    }

    #[test]
    fn test_unsubscribed_during_notify_is_skipped() {
        let list: Rc<SubscriberList<()>> = Rc::new(SubscriberList::new());
        let later: Rc<RefCell<Option<SubscriptionHandle>>> = Rc::new(RefCell::new(None));
        let later_calls = Rc::new(Cell::new(0));

        let pending = Rc::clone(&later);
        let _ = list.subscribe(move |_| {
            if let Some(handle) = pending.borrow_mut().take() {
                handle.unsubscribe();
            }
        });
        let calls = Rc::clone(&later_calls);
        *later.borrow_mut() = Some(list.subscribe(move |_| calls.set(calls.get() + 1)));

        list.notify(&());
        assert_eq!(later_calls.get(), 0);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_topics_are_isolated() {
        let topics: TopicSubscribers<&'static str, str> = TopicSubscribers::new();
        let hits = Rc::new(RefCell::new(Vec::<String>::new()));

        let h = Rc::clone(&hits);
        let _ = topics.subscribe("a", move |value| h.borrow_mut().push(value.to_string()));

        topics.notify(&"b", "ignored");
        topics.notify(&"a", "seen");
        assert_eq!(*hits.borrow(), vec!["seen".to_string()]);
        assert_eq!(topics.subscriber_count(&"a"), 1);
        assert_eq!(topics.subscriber_count(&"b"), 0);
    }
}
