// Copyright 2025 Cowboy AI, LLC.

//! Typed data exchange between module instances
//!
//! A publishing instance declares [`Channel`]s and fills them with
//! [`ChannelContent`]s whose data is generated lazily and cached until the
//! next publish. A consuming instance declares [`ChannelReceiver`]s, points
//! them at another instance's channel and pulls the selected contents with
//! [`receive_channel_contents`].

mod channel;
mod content;
mod manager;
mod receiver;
mod types;

pub use channel::{Channel, ChannelTopic};
pub use content::ChannelContent;
pub use manager::{ChannelManager, ChannelManagerTopic};
pub use receiver::{
    receive_channel_contents, ChannelReceiver, ReceivedChannel, ReceivedContent, ReceiverData,
    ReceiverPersistedState, ReceiverTopic, RefreshTicket,
};
pub use types::{
    ChannelDefinition, ChannelKey, ChannelReceiverDefinition, ContentDefinition, ContentMetaData,
    DataElement, DataGenerator, GeneratedData, KeyKind,
};
