// Copyright 2025 Cowboy AI, LLC.

//! Inputs that subscribe to another module instance's channel

use super::channel::{Channel, ChannelTopic};
use super::types::{ChannelReceiverDefinition, ContentMetaData, DataElement, KeyKind};
use crate::errors::{WorkbenchError, WorkbenchResult};
use crate::pubsub::{SubscriptionHandle, TopicSubscribers};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

/// Topics a [`ChannelReceiver`] notifies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiverTopic {
    /// The receiver subscribed to, or dropped, a channel
    ChannelChange,
    /// Data behind the current subscription is stale
    ContentsDataArrayChange,
}

/// What a receiver remembers across reloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverPersistedState {
    pub receiver_id_string: String,
    pub module_instance_id: String,
    pub channel_id_string: String,
    pub content_id_strings: Vec<String>,
}

/// One content as pulled by a receiver
#[derive(Debug, Clone)]
pub struct ReceivedContent {
    pub id_string: String,
    pub display_name: String,
    pub data_array: Rc<Vec<DataElement>>,
    pub meta_data: Rc<ContentMetaData>,
}

/// The subscribed channel as seen by a receiver
#[derive(Debug, Clone)]
pub struct ReceivedChannel {
    pub id_string: String,
    pub display_name: String,
    pub module_instance_id: String,
    pub kind_of_key: KeyKind,
    pub contents: Vec<ReceivedContent>,
}

/// Snapshot of a receiver after a pull
#[derive(Debug, Clone)]
pub struct ReceiverData {
    pub id_string: String,
    pub display_name: String,
    pub is_pending: bool,
    pub revision_number: u64,
    pub channel: Option<ReceivedChannel>,
}

impl ReceiverData {
    pub fn has_active_subscription(&self) -> bool {
        self.channel.is_some()
    }
}

/// Token identifying one refresh of a receiver's contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket(u64);

/// An input of a module instance
///
/// A receiver follows at most one channel and a selection of its contents.
/// Pulling data goes through [`receive_channel_contents`], which checks the
/// channel's key kind first.
pub struct ChannelReceiver {
    self_ref: Weak<ChannelReceiver>,
    id_string: String,
    display_name: String,
    supported_kinds_of_keys: Vec<KeyKind>,
    supports_multi_contents: bool,
    module_instance_id: String,
    channel: RefCell<Option<Rc<Channel>>>,
    content_id_strings: RefCell<Vec<String>>,
    channel_subscriptions: RefCell<Vec<SubscriptionHandle>>,
    subscribers: Rc<TopicSubscribers<ReceiverTopic, ()>>,
    latest_ticket: Cell<u64>,
    pending_ticket: Cell<Option<u64>>,
    revision_number: Cell<u64>,
    received: RefCell<Vec<ReceivedContent>>,
}

impl ChannelReceiver {
    pub fn new(definition: &ChannelReceiverDefinition, module_instance_id: impl Into<String>) -> Rc<Self> {
        let module_instance_id = module_instance_id.into();
        Rc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            id_string: definition.id_string.clone(),
            display_name: definition.display_name.clone(),
            supported_kinds_of_keys: definition.supported_kinds_of_keys.clone(),
            supports_multi_contents: definition.supports_multi_contents,
            module_instance_id,
            channel: RefCell::new(None),
            content_id_strings: RefCell::new(Vec::new()),
            channel_subscriptions: RefCell::new(Vec::new()),
            subscribers: Rc::new(TopicSubscribers::new()),
            latest_ticket: Cell::new(0),
            pending_ticket: Cell::new(None),
            revision_number: Cell::new(0),
            received: RefCell::new(Vec::new()),
        })
    }

    pub fn id_string(&self) -> &str {
        &self.id_string
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn supported_kinds_of_keys(&self) -> &[KeyKind] {
        &self.supported_kinds_of_keys
    }

    pub fn supports_multi_contents(&self) -> bool {
        self.supports_multi_contents
    }

    /// Id of the module instance owning this receiver
    pub fn module_instance_id(&self) -> &str {
        &self.module_instance_id
    }

    pub fn channel(&self) -> Option<Rc<Channel>> {
        self.channel.borrow().clone()
    }

    pub fn content_id_strings(&self) -> Vec<String> {
        self.content_id_strings.borrow().clone()
    }

    pub fn has_active_subscription(&self) -> bool {
        self.channel.borrow().is_some()
    }

    pub fn subscribe(&self, topic: ReceiverTopic, callback: impl Fn() + 'static) -> SubscriptionHandle {
        self.subscribers.subscribe(topic, move |_: &()| callback())
    }

    fn notify(&self, topic: ReceiverTopic) {
        self.subscribers.notify(&topic, &());
    }

    fn drop_channel_subscriptions(&self) {
        let handles: Vec<SubscriptionHandle> = self.channel_subscriptions.borrow_mut().drain(..).collect();
        for handle in handles {
            handle.unsubscribe();
        }
    }

    fn limit_selection(&self, mut content_id_strings: Vec<String>) -> Vec<String> {
        if !self.supports_multi_contents && content_id_strings.len() > 1 {
            warn!(
                receiver = %self.id_string,
                requested = content_id_strings.len(),
                "receiver takes a single content, keeping the first"
            );
            content_id_strings.truncate(1);
        }
        content_id_strings
    }

    /// Follow `channel`, selecting `content_id_strings`
    pub fn subscribe_to_channel(&self, channel: Rc<Channel>, content_id_strings: Vec<String>) {
        self.drop_channel_subscriptions();

        let subscribers = Rc::downgrade(&self.subscribers);
        let data_change = channel.subscribe(ChannelTopic::ContentsDataArraysChange, move || {
            if let Some(subscribers) = subscribers.upgrade() {
                subscribers.notify(&ReceiverTopic::ContentsDataArrayChange, &());
            }
        });
        let receiver = self.self_ref.clone();
        let removal = channel.subscribe(ChannelTopic::ChannelAboutToBeRemoved, move || {
            if let Some(receiver) = receiver.upgrade() {
                receiver.unsubscribe_from_current_channel();
            }
        });
        *self.channel_subscriptions.borrow_mut() = vec![data_change, removal];

        debug!(
            receiver = %self.id_string,
            instance_id = %self.module_instance_id,
            channel = %channel.id_string(),
            from_instance = %channel.module_instance_id(),
            "receiver subscribed to channel"
        );
        *self.content_id_strings.borrow_mut() = self.limit_selection(content_id_strings);
        *self.channel.borrow_mut() = Some(channel);
        self.received.borrow_mut().clear();

        self.notify(ReceiverTopic::ChannelChange);
        self.notify(ReceiverTopic::ContentsDataArrayChange);
    }

    /// Change which contents of the current channel are selected
    pub fn set_content_id_strings(&self, content_id_strings: Vec<String>) {
        *self.content_id_strings.borrow_mut() = self.limit_selection(content_id_strings);
        self.notify(ReceiverTopic::ChannelChange);
        self.notify(ReceiverTopic::ContentsDataArrayChange);
    }

    /// Drop the current subscription, if any
    pub fn unsubscribe_from_current_channel(&self) {
        if self.channel.borrow_mut().take().is_none() {
            return;
        }
        self.drop_channel_subscriptions();
        self.content_id_strings.borrow_mut().clear();
        self.received.borrow_mut().clear();
        debug!(receiver = %self.id_string, instance_id = %self.module_instance_id, "receiver unsubscribed");

        self.notify(ReceiverTopic::ChannelChange);
        self.notify(ReceiverTopic::ContentsDataArrayChange);
    }

    /// What to persist, `None` without a subscription
    pub fn make_persisted_state(&self) -> Option<ReceiverPersistedState> {
        let channel = self.channel()?;
        Some(ReceiverPersistedState {
            receiver_id_string: self.id_string.clone(),
            module_instance_id: channel.module_instance_id().to_string(),
            channel_id_string: channel.id_string().to_string(),
            content_id_strings: self.content_id_strings(),
        })
    }

    /// Re-subscribe from persisted state
    ///
    /// `resolve` maps a module instance id and channel id to a live channel.
    /// Returns whether the channel was found.
    pub fn apply_persisted_state(
        &self,
        state: &ReceiverPersistedState,
        resolve: &dyn Fn(&str, &str) -> Option<Rc<Channel>>,
    ) -> bool {
        match resolve(&state.module_instance_id, &state.channel_id_string) {
            Some(channel) => {
                self.subscribe_to_channel(channel, state.content_id_strings.clone());
                true
            }
            None => {
                warn!(
                    receiver = %self.id_string,
                    from_instance = %state.module_instance_id,
                    channel = %state.channel_id_string,
                    "persisted channel no longer exists"
                );
                false
            }
        }
    }

    /// Start a refresh; any refresh started earlier can no longer commit
    pub fn begin_refresh(&self) -> RefreshTicket {
        let ticket = self.latest_ticket.get() + 1;
        self.latest_ticket.set(ticket);
        self.pending_ticket.set(Some(ticket));
        RefreshTicket(ticket)
    }

    /// Commit the result of a refresh
    ///
    /// Returns `false` and discards `contents` when a newer refresh has started.
    pub fn commit_refresh(&self, ticket: RefreshTicket, contents: Vec<ReceivedContent>) -> bool {
        if self.pending_ticket.get() != Some(ticket.0) {
            debug!(receiver = %self.id_string, ticket = ticket.0, "refresh superseded");
            return false;
        }
        *self.received.borrow_mut() = contents;
        self.pending_ticket.set(None);
        self.revision_number.set(self.revision_number.get() + 1);
        true
    }

    /// Whether a refresh has started and not yet committed
    pub fn is_pending(&self) -> bool {
        self.pending_ticket.get().is_some()
    }

    /// Number of committed refreshes
    pub fn revision_number(&self) -> u64 {
        self.revision_number.get()
    }

    pub fn received_contents(&self) -> Vec<ReceivedContent> {
        self.received.borrow().clone()
    }

    /// Current view of the receiver without pulling
    pub fn data(&self) -> ReceiverData {
        let channel = self.channel().map(|channel| ReceivedChannel {
            id_string: channel.id_string().to_string(),
            display_name: channel.display_name().to_string(),
            module_instance_id: channel.module_instance_id().to_string(),
            kind_of_key: channel.kind_of_key(),
            contents: self.received_contents(),
        });
        ReceiverData {
            id_string: self.id_string.clone(),
            display_name: self.display_name.clone(),
            is_pending: self.is_pending(),
            revision_number: self.revision_number(),
            channel,
        }
    }

    /// Pull using the receiver's own supported key kinds
    pub fn receive(&self) -> WorkbenchResult<ReceiverData> {
        receive_channel_contents(self, &self.supported_kinds_of_keys)
    }
}

impl fmt::Debug for ChannelReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelReceiver")
            .field("id_string", &self.id_string)
            .field("module_instance_id", &self.module_instance_id)
            .field("channel", &self.channel.borrow().as_ref().map(|c| c.id_string().to_string()))
            .field("content_id_strings", &self.content_id_strings.borrow())
            .field("revision_number", &self.revision_number.get())
            .finish()
    }
}

/// Pull the selected contents of a receiver's channel
///
/// Fails with [`WorkbenchError::KeyKindMismatch`] when the channel's key
/// kind is not in `expected_kinds_of_keys`. Without a subscription the
/// receiver's data is returned unchanged.
pub fn receive_channel_contents(
    receiver: &ChannelReceiver,
    expected_kinds_of_keys: &[KeyKind],
) -> WorkbenchResult<ReceiverData> {
    let Some(channel) = receiver.channel() else {
        return Ok(receiver.data());
    };

    if !expected_kinds_of_keys.contains(&channel.kind_of_key()) {
        let expected: Vec<String> = expected_kinds_of_keys.iter().map(ToString::to_string).collect();
        return Err(WorkbenchError::KeyKindMismatch {
            channel: channel.id_string().to_string(),
            actual: channel.kind_of_key().to_string(),
            expected: expected.join(", "),
        });
    }

    let ticket = receiver.begin_refresh();
    let selected = receiver.content_id_strings();
    let contents: Vec<ReceivedContent> = channel
        .contents()
        .into_iter()
        .filter(|content| selected.iter().any(|id| id == content.id_string()))
        .map(|content| ReceivedContent {
            id_string: content.id_string().to_string(),
            display_name: content.display_name().to_string(),
            data_array: content.data_array(),
            meta_data: content.meta_data(),
        })
        .collect();
    receiver.commit_refresh(ticket, contents);
    Ok(receiver.data())
}
