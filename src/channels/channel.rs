// Copyright 2025 Cowboy AI, LLC.

//! Output channels of a module instance

use super::content::ChannelContent;
use super::types::{ChannelDefinition, ContentDefinition, KeyKind};
use crate::pubsub::{SubscriptionHandle, TopicSubscribers};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// Topics a [`Channel`] notifies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelTopic {
    /// The list of contents was replaced
    ContentsArrayChange,
    /// Data of at least one content is stale
    ContentsDataArraysChange,
    /// The channel is being unregistered
    ChannelAboutToBeRemoved,
}

/// A named, key-kinded output of one module instance
pub struct Channel {
    id_string: String,
    display_name: String,
    kind_of_key: KeyKind,
    module_instance_id: String,
    contents: RefCell<Vec<Rc<ChannelContent>>>,
    content_subscriptions: RefCell<Vec<SubscriptionHandle>>,
    subscribers: Rc<TopicSubscribers<ChannelTopic, ()>>,
}

impl Channel {
    pub fn new(definition: &ChannelDefinition, module_instance_id: impl Into<String>) -> Self {
        Self {
            id_string: definition.id_string.clone(),
            display_name: definition.display_name.clone(),
            kind_of_key: definition.kind_of_key,
            module_instance_id: module_instance_id.into(),
            contents: RefCell::new(Vec::new()),
            content_subscriptions: RefCell::new(Vec::new()),
            subscribers: Rc::new(TopicSubscribers::new()),
        }
    }

    pub fn id_string(&self) -> &str {
        &self.id_string
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn kind_of_key(&self) -> KeyKind {
        self.kind_of_key
    }

    /// Id of the module instance publishing on this channel
    pub fn module_instance_id(&self) -> &str {
        &self.module_instance_id
    }

    pub fn contents(&self) -> Vec<Rc<ChannelContent>> {
        self.contents.borrow().clone()
    }

    pub fn content(&self, id_string: &str) -> Option<Rc<ChannelContent>> {
        self.contents
            .borrow()
            .iter()
            .find(|content| content.id_string() == id_string)
            .cloned()
    }

    /// Swap the whole content list
    ///
    /// Always fires `ContentsArrayChange` followed by `ContentsDataArraysChange`.
    pub fn replace_contents(&self, definitions: Vec<ContentDefinition>) {
        let old_subscriptions: Vec<SubscriptionHandle> =
            self.content_subscriptions.borrow_mut().drain(..).collect();
        for handle in old_subscriptions {
            handle.unsubscribe();
        }

        let mut contents = Vec::with_capacity(definitions.len());
        let mut subscriptions = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let content = Rc::new(ChannelContent::new(
                definition.id_string,
                definition.display_name,
                definition.data_generator,
            ));
            let subscribers = Rc::downgrade(&self.subscribers);
            subscriptions.push(content.subscribe_data_array_change(move || {
                if let Some(subscribers) = subscribers.upgrade() {
                    subscribers.notify(&ChannelTopic::ContentsDataArraysChange, &());
                }
            }));
            contents.push(content);
        }

        debug!(
            channel = %self.id_string,
            instance_id = %self.module_instance_id,
            contents = contents.len(),
            "channel contents replaced"
        );
        *self.contents.borrow_mut() = contents;
        *self.content_subscriptions.borrow_mut() = subscriptions;

        self.subscribers.notify(&ChannelTopic::ContentsArrayChange, &());
        self.subscribers.notify(&ChannelTopic::ContentsDataArraysChange, &());
    }

    pub fn subscribe(&self, topic: ChannelTopic, callback: impl Fn() + 'static) -> SubscriptionHandle {
        self.subscribers.subscribe(topic, move |_: &()| callback())
    }

    pub(crate) fn notify_about_to_be_removed(&self) {
        self.subscribers.notify(&ChannelTopic::ChannelAboutToBeRemoved, &());
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id_string", &self.id_string)
            .field("kind_of_key", &self.kind_of_key)
            .field("module_instance_id", &self.module_instance_id)
            .field("contents", &self.contents.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::types::GeneratedData;

    fn channel() -> Channel {
        Channel::new(
            &ChannelDefinition::new("response", "Response", KeyKind::Realization),
            "Inplace-0",
        )
    }

    #[test]
    fn test_replace_contents_fires_both_topics_in_order() {
        let channel = channel();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for topic in [ChannelTopic::ContentsDataArraysChange, ChannelTopic::ContentsArrayChange] {
            let seen = Rc::clone(&seen);
            let _ = channel.subscribe(topic, move || seen.borrow_mut().push(topic));
        }

        channel.replace_contents(vec![]);
        assert_eq!(
            *seen.borrow(),
            vec![ChannelTopic::ContentsArrayChange, ChannelTopic::ContentsDataArraysChange]
        );
    }

    #[test]
    fn test_content_publish_bubbles_up() {
        let channel = channel();
        channel.replace_contents(vec![ContentDefinition::new("a", "A", GeneratedData::default)]);

        let hits = Rc::new(RefCell::new(0));
        let h = Rc::clone(&hits);
        let _ = channel.subscribe(ChannelTopic::ContentsDataArraysChange, move || {
            *h.borrow_mut() += 1
        });

        let content = channel.content("a").unwrap();
        content.publish(Box::new(GeneratedData::default));
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn test_replaced_contents_no_longer_bubble() {
        let channel = channel();
        channel.replace_contents(vec![ContentDefinition::new("a", "A", GeneratedData::default)]);
        let old = channel.content("a").unwrap();
        channel.replace_contents(vec![ContentDefinition::new("b", "B", GeneratedData::default)]);

        let hits = Rc::new(RefCell::new(0));
        let h = Rc::clone(&hits);
        let _ = channel.subscribe(ChannelTopic::ContentsDataArraysChange, move || {
            *h.borrow_mut() += 1
        });
        old.publish(Box::new(GeneratedData::default));
        assert_eq!(*hits.borrow(), 0);
        assert!(channel.content("a").is_none());
    }
}
