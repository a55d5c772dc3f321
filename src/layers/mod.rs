// Copyright 2025 Cowboy AI, LLC.

//! Layer trees: layers, groups and settings owned by a [`LayerManager`]
//!
//! The manager is the arena. It holds every item strongly, keyed by
//! [`ItemId`]; groups and layers only hold ids of their children and a weak
//! reference back to the manager for resolution. Nesting is one level deep:
//! the root may contain layers, groups and settings, a group may contain
//! layers and settings, and a layer owns its attached settings.

mod group;
mod layer;
mod manager;
mod setting;

pub use group::LayerGroup;
pub use layer::{Layer, LayerKind};
pub use manager::{LayerManager, LayerManagerTopic};
pub use setting::{BaseSetting, SettingType};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use uuid::Uuid;

/// Globally unique id of a layer-tree item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(Uuid);

impl ItemId {
    /// Generate a fresh id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing uuid
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying uuid
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A container that can hold items in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerRef {
    /// The manager's own top-level list
    Root,
    /// A group, by id
    Group(ItemId),
}

/// Any item of a layer tree
#[derive(Debug, Clone)]
pub enum LayerItem {
    /// A renderable layer
    Layer(Rc<Layer>),
    /// A group of layers and settings
    Group(Rc<LayerGroup>),
    /// A setting shared with its siblings and their descendants
    Setting(Rc<BaseSetting>),
}

impl LayerItem {
    /// Id of the wrapped item
    pub fn id(&self) -> ItemId {
        match self {
            LayerItem::Layer(layer) => layer.id(),
            LayerItem::Group(group) => group.id(),
            LayerItem::Setting(setting) => setting.id(),
        }
    }

    /// Display name of the wrapped item
    pub fn name(&self) -> String {
        match self {
            LayerItem::Layer(layer) => layer.name(),
            LayerItem::Group(group) => group.name(),
            LayerItem::Setting(setting) => setting.display_name().to_string(),
        }
    }

    /// The layer, if this item is one
    pub fn as_layer(&self) -> Option<&Rc<Layer>> {
        match self {
            LayerItem::Layer(layer) => Some(layer),
            _ => None,
        }
    }

    /// The group, if this item is one
    pub fn as_group(&self) -> Option<&Rc<LayerGroup>> {
        match self {
            LayerItem::Group(group) => Some(group),
            _ => None,
        }
    }

    /// The setting, if this item is one
    pub fn as_setting(&self) -> Option<&Rc<BaseSetting>> {
        match self {
            LayerItem::Setting(setting) => Some(setting),
            _ => None,
        }
    }

    /// Whether two handles point at the same item object
    pub fn ptr_eq(&self, other: &LayerItem) -> bool {
        match (self, other) {
            (LayerItem::Layer(a), LayerItem::Layer(b)) => Rc::ptr_eq(a, b),
            (LayerItem::Group(a), LayerItem::Group(b)) => Rc::ptr_eq(a, b),
            (LayerItem::Setting(a), LayerItem::Setting(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}
