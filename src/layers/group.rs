// Copyright 2025 Cowboy AI, LLC.

//! Layer groups

use super::{ItemId, Layer, LayerItem, LayerManager};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Ordered container of layers and settings
///
/// Children are stored as ids and resolved through the owning manager.
/// Ids that no longer resolve are skipped.
pub struct LayerGroup {
    id: ItemId,
    name: RefCell<String>,
    expanded: Cell<bool>,
    children: RefCell<Vec<ItemId>>,
    manager: Weak<LayerManager>,
}

impl LayerGroup {
    pub(super) fn new(name: String, manager: Weak<LayerManager>) -> Self {
        Self {
            id: ItemId::new(),
            name: RefCell::new(name),
            expanded: Cell::new(true),
            children: RefCell::new(Vec::new()),
            manager,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded.get()
    }

    pub fn set_expanded(&self, expanded: bool) {
        self.expanded.set(expanded);
    }

    /// Child ids in order, resolvable or not
    pub fn child_ids(&self) -> Vec<ItemId> {
        self.children.borrow().clone()
    }

    /// Children resolved through the manager
    pub fn items(&self) -> Vec<LayerItem> {
        let Some(manager) = self.manager.upgrade() else {
            return Vec::new();
        };
        self.child_ids()
            .into_iter()
            .filter_map(|id| manager.item(id))
            .collect()
    }

    /// Direct child layers
    pub fn layers(&self) -> Vec<Rc<Layer>> {
        self.items()
            .into_iter()
            .filter_map(|item| item.as_layer().cloned())
            .collect()
    }

    /// Visible only when every direct layer is visible; an empty group is visible
    pub fn is_visible(&self) -> bool {
        self.layers().iter().all(|layer| layer.is_visible())
    }

    pub(super) fn set_name(&self, name: String) {
        *self.name.borrow_mut() = name;
    }

    pub(super) fn children_mut(&self) -> std::cell::RefMut<'_, Vec<ItemId>> {
        self.children.borrow_mut()
    }

    pub(super) fn contains(&self, id: ItemId) -> bool {
        self.children.borrow().contains(&id)
    }
}

impl fmt::Debug for LayerGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerGroup")
            .field("id", &self.id)
            .field("name", &self.name.borrow())
            .field("children", &self.children.borrow())
            .finish()
    }
}
