// Copyright 2025 Cowboy AI, LLC.

//! A single content of a channel, with its memoized data

use super::types::{ContentMetaData, DataElement, DataGenerator, GeneratedData};
use crate::pubsub::{SubscriberList, SubscriptionHandle};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use tracing::debug;

type Cached = (Rc<Vec<DataElement>>, Rc<ContentMetaData>);
type SharedGenerator = Rc<dyn Fn() -> GeneratedData>;

/// One named data series of a channel
///
/// The generator runs at most once between two [`ChannelContent::publish`]
/// calls. Data and metadata always come from the same run. A generator may
/// publish to its own content; that run's data is returned but not cached.
pub struct ChannelContent {
    id_string: String,
    display_name: String,
    generator: RefCell<SharedGenerator>,
    revision: Cell<u64>,
    cache: RefCell<Option<Cached>>,
    data_array_change: Rc<SubscriberList<()>>,
}

impl ChannelContent {
    pub fn new(id_string: impl Into<String>, display_name: impl Into<String>, generator: DataGenerator) -> Self {
        Self {
            id_string: id_string.into(),
            display_name: display_name.into(),
            generator: RefCell::new(Rc::from(generator)),
            revision: Cell::new(0),
            cache: RefCell::new(None),
            data_array_change: Rc::new(SubscriberList::new()),
        }
    }

    pub fn id_string(&self) -> &str {
        &self.id_string
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Whether the next read is served from the cache
    pub fn is_cached(&self) -> bool {
        self.cache.borrow().is_some()
    }

    fn cached(&self) -> Cached {
        if let Some(cached) = self.cache.borrow().as_ref() {
            return (Rc::clone(&cached.0), Rc::clone(&cached.1));
        }

        debug!(content = %self.id_string, "running data generator");
        let revision = self.revision.get();
        let generator = Rc::clone(&*self.generator.borrow());
        let GeneratedData { data, meta_data } = (*generator)();
        let fresh = (Rc::new(data), Rc::new(meta_data));
        if self.revision.get() == revision {
            *self.cache.borrow_mut() = Some((Rc::clone(&fresh.0), Rc::clone(&fresh.1)));
        }
        fresh
    }

    /// The data array, generated on first access after invalidation
    pub fn data_array(&self) -> Rc<Vec<DataElement>> {
        self.cached().0
    }

    /// The metadata, generated together with the data array
    pub fn meta_data(&self) -> Rc<ContentMetaData> {
        self.cached().1
    }

    /// Replace the generator and invalidate the cache
    ///
    /// Subscribers are told the data is stale; they pull again on their next read.
    pub fn publish(&self, generator: DataGenerator) {
        *self.generator.borrow_mut() = Rc::from(generator);
        self.revision.set(self.revision.get() + 1);
        self.cache.borrow_mut().take();
        debug!(content = %self.id_string, "content published");
        self.data_array_change.notify(&());
    }

    /// Listen for invalidation
    pub fn subscribe_data_array_change(&self, callback: impl Fn() + 'static) -> SubscriptionHandle {
        self.data_array_change.subscribe(move |_: &()| callback())
    }
}

impl fmt::Debug for ChannelContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelContent")
            .field("id_string", &self.id_string)
            .field("display_name", &self.display_name)
            .field("cached", &self.is_cached())
            .finish()
    }
}
