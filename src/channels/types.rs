// Copyright 2025 Cowboy AI, LLC.

//! Value types exchanged over channels

use serde::{Deserialize, Serialize};
use std::fmt;

/// What the keys of a channel's data elements mean
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyKind {
    /// Realization number
    Realization,
    /// Milliseconds since the epoch
    Timestamp,
    /// Grid cell `(i, j, k)`
    GridIjk,
    /// Flat grid cell index
    GridIndex,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Realization => write!(f, "Realization"),
            KeyKind::Timestamp => write!(f, "Timestamp"),
            KeyKind::GridIjk => write!(f, "GridIJK"),
            KeyKind::GridIndex => write!(f, "GridIndex"),
        }
    }
}

/// A key of one data element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKey {
    Realization(i64),
    Timestamp(i64),
    GridIjk([i64; 3]),
    GridIndex(i64),
}

impl ChannelKey {
    /// The kind this key belongs to
    pub fn kind(&self) -> KeyKind {
        match self {
            ChannelKey::Realization(_) => KeyKind::Realization,
            ChannelKey::Timestamp(_) => KeyKind::Timestamp,
            ChannelKey::GridIjk(_) => KeyKind::GridIjk,
            ChannelKey::GridIndex(_) => KeyKind::GridIndex,
        }
    }
}

/// One key/value pair of channel data
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataElement {
    pub key: ChannelKey,
    pub value: f64,
}

impl DataElement {
    pub fn new(key: ChannelKey, value: f64) -> Self {
        Self { key, value }
    }
}

/// Metadata describing a content's data array
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMetaData {
    /// Ensemble the data was computed from
    pub ensemble_ident_string: String,
    pub unit: Option<String>,
    pub display_string: Option<String>,
    pub preferred_color: Option<String>,
}

/// Result of one generator call: data and metadata computed together
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedData {
    pub data: Vec<DataElement>,
    pub meta_data: ContentMetaData,
}

/// Lazily invoked producer of a content's data
pub type DataGenerator = Box<dyn Fn() -> GeneratedData>;

/// Declaration of an output channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDefinition {
    pub id_string: String,
    pub display_name: String,
    pub kind_of_key: KeyKind,
}

impl ChannelDefinition {
    pub fn new(id_string: impl Into<String>, display_name: impl Into<String>, kind_of_key: KeyKind) -> Self {
        Self {
            id_string: id_string.into(),
            display_name: display_name.into(),
            kind_of_key,
        }
    }
}

/// Declaration of an input that can subscribe to another instance's channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelReceiverDefinition {
    pub id_string: String,
    pub display_name: String,
    pub supported_kinds_of_keys: Vec<KeyKind>,
    /// Whether more than one content can be selected at a time
    pub supports_multi_contents: bool,
}

impl ChannelReceiverDefinition {
    pub fn new(
        id_string: impl Into<String>,
        display_name: impl Into<String>,
        supported_kinds_of_keys: Vec<KeyKind>,
        supports_multi_contents: bool,
    ) -> Self {
        Self {
            id_string: id_string.into(),
            display_name: display_name.into(),
            supported_kinds_of_keys,
            supports_multi_contents,
        }
    }
}

/// Declaration of a content together with its generator
pub struct ContentDefinition {
    pub id_string: String,
    pub display_name: String,
    pub data_generator: DataGenerator,
}

impl ContentDefinition {
    pub fn new(
        id_string: impl Into<String>,
        display_name: impl Into<String>,
        data_generator: impl Fn() -> GeneratedData + 'static,
    ) -> Self {
        Self {
            id_string: id_string.into(),
            display_name: display_name.into(),
            data_generator: Box::new(data_generator),
        }
    }
}

impl fmt::Debug for ContentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentDefinition")
            .field("id_string", &self.id_string)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}
