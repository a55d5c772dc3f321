// Copyright 2025 Cowboy AI, LLC.

//! The layer-tree arena

use super::{BaseSetting, ContainerRef, ItemId, Layer, LayerGroup, LayerItem, LayerKind, SettingType};
use crate::errors::{WorkbenchError, WorkbenchResult};
use crate::pubsub::{SubscriptionHandle, TopicSubscribers};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

/// Topics a [`LayerManager`] notifies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerManagerTopic {
    /// Items were inserted, removed, moved or renamed
    ItemsChanged,
    /// The flattened layer list may have changed
    LayersChangedRecursively,
    /// A layer's visibility changed
    VisibilityChanged,
    /// A setting owned by the tree changed value
    SettingsChanged,
}

/// Owner of every layer, group and setting of one tree
pub struct LayerManager {
    self_ref: Weak<LayerManager>,
    items: RefCell<IndexMap<ItemId, LayerItem>>,
    root: RefCell<Vec<ItemId>>,
    subscribers: TopicSubscribers<LayerManagerTopic, ()>,
    setting_subscriptions: RefCell<HashMap<ItemId, SubscriptionHandle>>,
}

impl LayerManager {
    /// Create an empty tree
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            items: RefCell::new(IndexMap::new()),
            root: RefCell::new(Vec::new()),
            subscribers: TopicSubscribers::new(),
            setting_subscriptions: RefCell::new(HashMap::new()),
        })
    }

    /// Subscribe to one topic
    pub fn subscribe(
        &self,
        topic: LayerManagerTopic,
        callback: impl Fn() + 'static,
    ) -> SubscriptionHandle {
        self.subscribers.subscribe(topic, move |_: &()| callback())
    }

    fn notify(&self, topic: LayerManagerTopic) {
        self.subscribers.notify(&topic, &());
    }

    fn notify_structure_changed(&self) {
        self.notify(LayerManagerTopic::ItemsChanged);
        self.notify(LayerManagerTopic::LayersChangedRecursively);
    }

    // ---- lookup ------------------------------------------------------------

    /// Number of items in the arena, attached settings included
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.borrow().contains_key(&id)
    }

    pub fn item(&self, id: ItemId) -> Option<LayerItem> {
        self.items.borrow().get(&id).cloned()
    }

    pub fn layer(&self, id: ItemId) -> Option<Rc<Layer>> {
        self.item(id).and_then(|item| item.as_layer().cloned())
    }

    pub fn group(&self, id: ItemId) -> Option<Rc<LayerGroup>> {
        self.item(id).and_then(|item| item.as_group().cloned())
    }

    pub fn setting(&self, id: ItemId) -> Option<Rc<BaseSetting>> {
        self.item(id).and_then(|item| item.as_setting().cloned())
    }

    /// Items of the top-level list, in order
    pub fn root_items(&self) -> Vec<LayerItem> {
        self.children(ContainerRef::Root)
    }

    /// Resolved items of a container; unresolvable ids are dropped
    pub fn children(&self, container: ContainerRef) -> Vec<LayerItem> {
        self.container_ids(container)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|id| self.item(id))
            .collect()
    }

    fn container_ids(&self, container: ContainerRef) -> Option<Vec<ItemId>> {
        match container {
            ContainerRef::Root => Some(self.root.borrow().clone()),
            ContainerRef::Group(id) => self.group(id).map(|group| group.child_ids()),
        }
    }

    fn with_container_mut<R>(
        &self,
        container: ContainerRef,
        edit: impl FnOnce(&mut Vec<ItemId>) -> R,
    ) -> Option<R> {
        match container {
            ContainerRef::Root => {
                let mut root = self.root.borrow_mut();
                Some(edit(&mut *root))
            }
            ContainerRef::Group(id) => {
                let group = self.group(id)?;
                let mut children = group.children_mut();
                Some(edit(&mut *children))
            }
        }
    }

    /// Container and index of an item placed in the root or a group
    ///
    /// Settings attached to a layer have no position.
    pub fn position_of(&self, id: ItemId) -> WorkbenchResult<(ContainerRef, usize)> {
        if let Some(index) = self.root.borrow().iter().position(|child| *child == id) {
            return Ok((ContainerRef::Root, index));
        }
        let groups: Vec<Rc<LayerGroup>> = self
            .items
            .borrow()
            .values()
            .filter_map(|item| item.as_group().cloned())
            .collect();
        for group in groups {
            if let Some(index) = group.child_ids().iter().position(|child| *child == id) {
                return Ok((ContainerRef::Group(group.id()), index));
            }
        }
        Err(WorkbenchError::ItemNotFound(format!(
            "item {id} has no position in the layer tree"
        )))
    }

    // ---- naming ------------------------------------------------------------

    /// `requested` if no layer or group uses it yet, otherwise `requested (n)`
    /// with the smallest free `n` starting at 1
    pub fn make_unique_name(&self, requested: &str) -> String {
        self.make_unique_name_excluding(requested, None)
    }

    fn make_unique_name_excluding(&self, requested: &str, exclude: Option<ItemId>) -> String {
        let taken: HashSet<String> = self
            .items
            .borrow()
            .values()
            .filter(|item| !matches!(item, LayerItem::Setting(_)))
            .filter(|item| Some(item.id()) != exclude)
            .map(LayerItem::name)
            .collect();

        let mut candidate = requested.to_string();
        let mut n = 1;
        while taken.contains(&candidate) {
            candidate = format!("{requested} ({n})");
            n += 1;
        }
        candidate
    }

    /// Give a layer or group a new name, made unique among the others
    pub fn rename_item(&self, id: ItemId, requested: &str) -> Option<String> {
        let name = self.make_unique_name_excluding(requested, Some(id));
        match self.item(id) {
            Some(LayerItem::Layer(layer)) => layer.set_name(name.clone()),
            Some(LayerItem::Group(group)) => group.set_name(name.clone()),
            _ => {
                warn!(%id, "rename ignored, no such layer or group");
                return None;
            }
        }
        self.notify(LayerManagerTopic::ItemsChanged);
        Some(name)
    }

    // ---- insertion ---------------------------------------------------------

    fn ensure_container(&self, container: ContainerRef) -> WorkbenchResult<()> {
        match container {
            ContainerRef::Root => Ok(()),
            ContainerRef::Group(id) => match self.item(id) {
                Some(LayerItem::Group(_)) => Ok(()),
                Some(_) => Err(WorkbenchError::InvalidMove(format!(
                    "item {id} is not a container"
                ))),
                None => Err(WorkbenchError::ItemNotFound(format!("group {id}"))),
            },
        }
    }

    fn place(&self, id: ItemId, item: LayerItem, container: ContainerRef, position: usize) {
        self.items.borrow_mut().insert(id, item);
        self.with_container_mut(container, |children| {
            let index = position.min(children.len());
            children.insert(index, id);
        });
    }

    /// Insert a new layer at `position` of `container`
    ///
    /// The layer is named `requested_name` or its kind's default name, made unique.
    pub fn insert_layer(
        &self,
        kind: LayerKind,
        requested_name: Option<&str>,
        container: ContainerRef,
        position: usize,
    ) -> WorkbenchResult<Rc<Layer>> {
        self.ensure_container(container)?;
        let name = self.make_unique_name(requested_name.unwrap_or_else(|| kind.default_name()));
        let layer = Rc::new(Layer::new(kind, name));
        self.place(layer.id(), LayerItem::Layer(Rc::clone(&layer)), container, position);
        debug!(layer_id = %layer.id(), name = %layer.name(), "layer inserted");
        self.notify_structure_changed();
        Ok(layer)
    }

    /// Insert a new group at `position` of the root list
    pub fn insert_group(&self, requested_name: Option<&str>, position: usize) -> Rc<LayerGroup> {
        let name = self.make_unique_name(requested_name.unwrap_or("Group"));
        let group = Rc::new(LayerGroup::new(name, self.self_ref.clone()));
        self.place(group.id(), LayerItem::Group(Rc::clone(&group)), ContainerRef::Root, position);
        debug!(group_id = %group.id(), name = %group.name(), "group inserted");
        self.notify_structure_changed();
        group
    }

    /// Insert a shared setting into a container
    pub fn insert_setting(
        &self,
        setting: BaseSetting,
        container: ContainerRef,
        position: usize,
    ) -> WorkbenchResult<Rc<BaseSetting>> {
        self.ensure_container(container)?;
        let setting = Rc::new(setting);
        self.watch_setting(&setting);
        self.place(setting.id(), LayerItem::Setting(Rc::clone(&setting)), container, position);
        self.notify(LayerManagerTopic::ItemsChanged);
        Ok(setting)
    }

    /// Attach a setting to a layer
    pub fn attach_setting(
        &self,
        layer_id: ItemId,
        setting: BaseSetting,
    ) -> WorkbenchResult<Rc<BaseSetting>> {
        let layer = self
            .layer(layer_id)
            .ok_or_else(|| WorkbenchError::ItemNotFound(format!("layer {layer_id}")))?;
        let setting = Rc::new(setting);
        self.watch_setting(&setting);
        self.items
            .borrow_mut()
            .insert(setting.id(), LayerItem::Setting(Rc::clone(&setting)));
        layer.attach_setting(setting.id());
        self.notify(LayerManagerTopic::ItemsChanged);
        Ok(setting)
    }

    fn watch_setting(&self, setting: &Rc<BaseSetting>) {
        let manager = self.self_ref.clone();
        let handle = setting.subscribe(move |_| {
            if let Some(manager) = manager.upgrade() {
                manager.notify(LayerManagerTopic::SettingsChanged);
            }
        });
        self.setting_subscriptions
            .borrow_mut()
            .insert(setting.id(), handle);
    }

    // ---- removal -----------------------------------------------------------

    /// Remove an item from every container that references it
    ///
    /// Removing a group removes its children; removing a layer removes its
    /// attached settings. Unknown ids are ignored.
    pub fn remove_item(&self, id: ItemId) -> bool {
        let Some(item) = self.item(id) else {
            warn!(%id, "remove ignored, unknown item");
            return false;
        };

        self.discard(&item);
        self.root.borrow_mut().retain(|child| *child != id);
        let owners: Vec<LayerItem> = self.items.borrow().values().cloned().collect();
        for owner in owners {
            match owner {
                LayerItem::Group(group) => group.children_mut().retain(|child| *child != id),
                LayerItem::Layer(layer) => {
                    layer.detach_setting(id);
                }
                LayerItem::Setting(_) => {}
            }
        }
        debug!(%id, "item removed");
        self.notify_structure_changed();
        true
    }

    pub fn remove_layer(&self, id: ItemId) -> bool {
        self.layer(id).is_some() && self.remove_item(id)
    }

    pub fn remove_group(&self, id: ItemId) -> bool {
        self.group(id).is_some() && self.remove_item(id)
    }

    pub fn remove_setting(&self, id: ItemId) -> bool {
        self.setting(id).is_some() && self.remove_item(id)
    }

    fn discard(&self, item: &LayerItem) {
        match item {
            LayerItem::Group(group) => {
                for child in group.items() {
                    self.discard(&child);
                }
            }
            LayerItem::Layer(layer) => {
                for setting_id in layer.setting_ids() {
                    if let Some(setting) = self.item(setting_id) {
                        self.discard(&setting);
                    }
                }
            }
            LayerItem::Setting(setting) => {
                let handle = self.setting_subscriptions.borrow_mut().remove(&setting.id());
                if let Some(handle) = handle {
                    handle.unsubscribe();
                }
            }
        }
        self.items.borrow_mut().shift_remove(&item.id());
    }

    // ---- moving ------------------------------------------------------------

    /// Check whether `id` may move into `destination`
    pub fn check_move(&self, id: ItemId, destination: ContainerRef) -> WorkbenchResult<()> {
        let item = self
            .item(id)
            .ok_or_else(|| WorkbenchError::ItemNotFound(format!("item {id}")))?;
        self.position_of(id)?;
        self.ensure_container(destination)?;
        if matches!(item, LayerItem::Group(_)) && destination != ContainerRef::Root {
            return Err(WorkbenchError::InvalidMove(
                "a group cannot be placed inside another group".to_string(),
            ));
        }
        Ok(())
    }

    /// Move an item to `position` of `destination`, keeping the item object
    ///
    /// The move is removal from the origin followed by insertion, so
    /// `position` indexes the destination after removal. Moves the tree shape
    /// forbids are ignored and return `false`.
    pub fn move_item(&self, id: ItemId, destination: ContainerRef, position: usize) -> bool {
        if let Err(err) = self.check_move(id, destination) {
            warn!(%id, %err, "move ignored");
            return false;
        }
        let Ok((origin, _)) = self.position_of(id) else {
            return false;
        };

        self.with_container_mut(origin, |children| children.retain(|child| *child != id));
        self.with_container_mut(destination, |children| {
            let index = position.min(children.len());
            children.insert(index, id);
        });
        debug!(%id, ?origin, ?destination, position, "item moved");
        self.notify_structure_changed();
        true
    }

    // ---- visibility --------------------------------------------------------

    /// Show or hide a layer
    pub fn set_layer_visible(&self, id: ItemId, visible: bool) -> bool {
        let Some(layer) = self.layer(id) else {
            warn!(%id, "visibility change ignored, unknown layer");
            return false;
        };
        if layer.set_visible(visible) {
            self.notify(LayerManagerTopic::VisibilityChanged);
        }
        true
    }

    /// Whether every direct layer of the group is visible
    pub fn is_group_visible(&self, id: ItemId) -> Option<bool> {
        self.group(id).map(|group| group.is_visible())
    }

    /// Force every direct layer of the group to `visible`
    pub fn set_group_visible(&self, id: ItemId, visible: bool) -> bool {
        let Some(group) = self.group(id) else {
            warn!(%id, "visibility change ignored, unknown group");
            return false;
        };
        let mut changed = false;
        for layer in group.layers() {
            changed |= layer.set_visible(visible);
        }
        if changed {
            self.notify(LayerManagerTopic::VisibilityChanged);
        }
        true
    }

    // ---- aggregation -------------------------------------------------------

    /// Every layer in tree order, with groups flattened into their layers
    pub fn all_layers_recursively(&self) -> Vec<Rc<Layer>> {
        let mut layers = Vec::new();
        for item in self.root_items() {
            match item {
                LayerItem::Layer(layer) => layers.push(layer),
                LayerItem::Group(group) => layers.extend(group.layers()),
                LayerItem::Setting(_) => {}
            }
        }
        layers
    }

    /// The nearest setting of each type visible from an item
    ///
    /// A layer's own settings come first, then settings among the item's
    /// siblings, then among its container's siblings, outward to the root.
    pub fn effective_settings(&self, id: ItemId) -> Vec<Rc<BaseSetting>> {
        let mut settings = Vec::new();
        let mut seen: HashSet<SettingType> = HashSet::new();

        if let Some(layer) = self.layer(id) {
            for setting_id in layer.setting_ids() {
                if let Some(setting) = self.setting(setting_id) {
                    push_unseen(&mut settings, &mut seen, setting);
                }
            }
        }

        let mut container = match self.position_of(id) {
            Ok((container, _)) => container,
            Err(_) => return settings,
        };
        loop {
            for item in self.children(container) {
                if let LayerItem::Setting(setting) = item {
                    push_unseen(&mut settings, &mut seen, setting);
                }
            }
            container = match container {
                ContainerRef::Root => break,
                ContainerRef::Group(group_id) => match self.position_of(group_id) {
                    Ok((parent, _)) => parent,
                    Err(_) => break,
                },
            };
        }
        settings
    }

    /// Whether every setting type the layer requires is effective and set
    pub fn has_all_required_settings(&self, layer_id: ItemId) -> bool {
        let Some(layer) = self.layer(layer_id) else {
            return false;
        };
        let effective = self.effective_settings(layer_id);
        layer.required_settings().iter().all(|required| {
            effective
                .iter()
                .any(|setting| setting.setting_type() == required && setting.has_value())
        })
    }
}

fn push_unseen(
    settings: &mut Vec<Rc<BaseSetting>>,
    seen: &mut HashSet<SettingType>,
    setting: Rc<BaseSetting>,
) {
    if seen.insert(setting.setting_type().clone()) {
        settings.push(setting);
    }
}

impl fmt::Debug for LayerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerManager")
            .field("items", &self.items.borrow().len())
            .field("root", &self.root.borrow())
            .finish()
    }
}
