// Copyright 2025 Cowboy AI, LLC.

//! Channels and receivers of one module instance

use super::channel::Channel;
use super::receiver::{ChannelReceiver, ReceiverPersistedState, ReceiverTopic};
use super::types::{ChannelDefinition, ChannelReceiverDefinition};
use crate::errors::WorkbenchResult;
use crate::persistence::KeyValueStorage;
use crate::pubsub::{SubscriptionHandle, TopicSubscribers};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, error, info};

/// Topics a [`ChannelManager`] notifies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelManagerTopic {
    ChannelsChange,
    ReceiversChange,
    /// A receiver subscribed to or dropped a channel
    ReceiversSubscriptionChange,
}

/// Owner of a module instance's channels and receivers
///
/// Receiver subscriptions are written to durable storage whenever one
/// changes, under the instance's receivers key.
pub struct ChannelManager {
    self_ref: Weak<ChannelManager>,
    module_instance_id: String,
    channels: RefCell<Vec<Rc<Channel>>>,
    receivers: RefCell<Vec<Rc<ChannelReceiver>>>,
    receiver_subscriptions: RefCell<Vec<SubscriptionHandle>>,
    subscribers: TopicSubscribers<ChannelManagerTopic, ()>,
    storage: Option<Rc<dyn KeyValueStorage>>,
    receivers_key: String,
}

impl ChannelManager {
    /// Create a manager; without storage receiver subscriptions are not persisted
    pub fn new(
        module_instance_id: impl Into<String>,
        storage: Option<Rc<dyn KeyValueStorage>>,
        receivers_key: impl Into<String>,
    ) -> Rc<Self> {
        let module_instance_id = module_instance_id.into();
        let receivers_key = receivers_key.into();
        Rc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            module_instance_id,
            channels: RefCell::new(Vec::new()),
            receivers: RefCell::new(Vec::new()),
            receiver_subscriptions: RefCell::new(Vec::new()),
            subscribers: TopicSubscribers::new(),
            storage,
            receivers_key,
        })
    }

    pub fn module_instance_id(&self) -> &str {
        &self.module_instance_id
    }

    pub fn channel(&self, id_string: &str) -> Option<Rc<Channel>> {
        self.channels
            .borrow()
            .iter()
            .find(|channel| channel.id_string() == id_string)
            .cloned()
    }

    pub fn channels(&self) -> Vec<Rc<Channel>> {
        self.channels.borrow().clone()
    }

    pub fn receiver(&self, id_string: &str) -> Option<Rc<ChannelReceiver>> {
        self.receivers
            .borrow()
            .iter()
            .find(|receiver| receiver.id_string() == id_string)
            .cloned()
    }

    pub fn receivers(&self) -> Vec<Rc<ChannelReceiver>> {
        self.receivers.borrow().clone()
    }

    pub fn subscribe(&self, topic: ChannelManagerTopic, callback: impl Fn() + 'static) -> SubscriptionHandle {
        self.subscribers.subscribe(topic, move |_: &()| callback())
    }

    fn notify(&self, topic: ChannelManagerTopic) {
        self.subscribers.notify(&topic, &());
    }

    pub fn register_channels(&self, definitions: &[ChannelDefinition]) {
        let new_channels: Vec<Rc<Channel>> = definitions
            .iter()
            .map(|definition| Rc::new(Channel::new(definition, self.module_instance_id.clone())))
            .collect();
        debug!(instance_id = %self.module_instance_id, count = new_channels.len(), "channels registered");
        self.channels.borrow_mut().extend(new_channels);
        self.notify(ChannelManagerTopic::ChannelsChange);
    }

    pub fn register_receivers(&self, definitions: &[ChannelReceiverDefinition]) {
        for definition in definitions {
            let receiver = ChannelReceiver::new(definition, self.module_instance_id.clone());
            let manager = self.self_ref.clone();
            let handle = receiver.subscribe(ReceiverTopic::ChannelChange, move || {
                if let Some(manager) = manager.upgrade() {
                    if let Err(err) = manager.persist_receivers_state() {
                        error!(instance_id = %manager.module_instance_id, %err, "failed to persist receivers");
                    }
                    manager.notify(ChannelManagerTopic::ReceiversSubscriptionChange);
                }
            });
            self.receiver_subscriptions.borrow_mut().push(handle);
            self.receivers.borrow_mut().push(receiver);
        }
        debug!(instance_id = %self.module_instance_id, count = definitions.len(), "receivers registered");
        self.notify(ChannelManagerTopic::ReceiversChange);
    }

    /// Remove every channel; receivers following them drop their subscription first
    pub fn unregister_all_channels(&self) {
        let channels: Vec<Rc<Channel>> = self.channels.borrow_mut().drain(..).collect();
        for channel in &channels {
            channel.notify_about_to_be_removed();
        }
        self.notify(ChannelManagerTopic::ChannelsChange);
    }

    /// Remove every receiver, dropping their subscriptions
    pub fn unregister_all_receivers(&self) {
        let handles: Vec<SubscriptionHandle> = self.receiver_subscriptions.borrow_mut().drain(..).collect();
        for handle in handles {
            handle.unsubscribe();
        }
        let receivers: Vec<Rc<ChannelReceiver>> = self.receivers.borrow_mut().drain(..).collect();
        for receiver in &receivers {
            receiver.unsubscribe_from_current_channel();
        }
        self.notify(ChannelManagerTopic::ReceiversChange);
    }

    /// Write the subscriptions of all subscribed receivers
    pub fn persist_receivers_state(&self) -> WorkbenchResult<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        let states: Vec<ReceiverPersistedState> = self
            .receivers()
            .iter()
            .filter_map(|receiver| receiver.make_persisted_state())
            .collect();
        storage.set_item(&self.receivers_key, &serde_json::to_string(&states)?)?;
        info!(instance_id = %self.module_instance_id, receivers = states.len(), "receivers persisted");
        Ok(())
    }

    /// Read persisted subscriptions; unreadable data counts as none
    pub fn load_persisted_receivers_state(&self) -> Vec<ReceiverPersistedState> {
        let Some(storage) = &self.storage else {
            return Vec::new();
        };
        let raw = match storage.get_item(&self.receivers_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(err) => {
                error!(instance_id = %self.module_instance_id, %err, "failed to read persisted receivers");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(states) => states,
            Err(err) => {
                error!(instance_id = %self.module_instance_id, %err, "persisted receivers are invalid");
                Vec::new()
            }
        }
    }

    /// Re-subscribe receivers from persisted state; returns how many were restored
    pub fn apply_persisted_receivers_state(
        &self,
        states: &[ReceiverPersistedState],
        resolve: &dyn Fn(&str, &str) -> Option<Rc<Channel>>,
    ) -> usize {
        states
            .iter()
            .filter(|state| match self.receiver(&state.receiver_id_string) {
                Some(receiver) => receiver.apply_persisted_state(state, resolve),
                None => false,
            })
            .count()
    }

    pub fn remove_persisted_receivers_state(&self) -> WorkbenchResult<()> {
        match &self.storage {
            Some(storage) => storage.remove_item(&self.receivers_key),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelManager")
            .field("module_instance_id", &self.module_instance_id)
            .field("channels", &self.channels.borrow().len())
            .field("receivers", &self.receivers.borrow().len())
            .finish()
    }
}
