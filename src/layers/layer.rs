// Copyright 2025 Cowboy AI, LLC.

//! Renderable layers

use super::{ItemId, SettingType};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;

/// Closed set of layer kinds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerKind {
    /// Observed or simulated surface
    Surface,
    /// Well trajectory
    Wellbore,
    /// Polygon set
    Polygon,
    /// Fault polygons for a surface
    FaultPolygon,
    /// 3D grid slice
    Grid,
    /// Layer kind provided by a module
    Custom(String),
}

impl LayerKind {
    /// Name used when the caller does not request one
    pub fn default_name(&self) -> &str {
        match self {
            LayerKind::Surface => "Surface",
            LayerKind::Wellbore => "Wellbore",
            LayerKind::Polygon => "Polygons",
            LayerKind::FaultPolygon => "Fault polygons",
            LayerKind::Grid => "Grid",
            LayerKind::Custom(name) => name,
        }
    }

    /// Setting types a layer of this kind needs before it can produce data
    pub fn required_settings(&self) -> Vec<SettingType> {
        match self {
            LayerKind::Surface => vec![
                SettingType::Ensemble,
                SettingType::Realization,
                SettingType::SurfaceName,
                SettingType::Attribute,
            ],
            LayerKind::Wellbore => vec![SettingType::Ensemble],
            LayerKind::Polygon => vec![SettingType::Ensemble, SettingType::Realization],
            LayerKind::FaultPolygon => vec![
                SettingType::Ensemble,
                SettingType::Realization,
                SettingType::SurfaceName,
            ],
            LayerKind::Grid => vec![
                SettingType::Ensemble,
                SettingType::Realization,
                SettingType::Attribute,
                SettingType::TimeOrInterval,
            ],
            LayerKind::Custom(_) => Vec::new(),
        }
    }
}

/// A layer in a [`super::LayerManager`]
///
/// Visibility and name are changed through the manager so that its
/// subscribers are told.
pub struct Layer {
    id: ItemId,
    kind: LayerKind,
    name: RefCell<String>,
    visible: Cell<bool>,
    expanded: Cell<bool>,
    setting_ids: RefCell<Vec<ItemId>>,
    required_settings: Vec<SettingType>,
}

impl Layer {
    pub(super) fn new(kind: LayerKind, name: String) -> Self {
        let required_settings = kind.required_settings();
        Self {
            id: ItemId::new(),
            kind,
            name: RefCell::new(name),
            visible: Cell::new(true),
            expanded: Cell::new(true),
            setting_ids: RefCell::new(Vec::new()),
            required_settings,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }

    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub fn is_visible(&self) -> bool {
        self.visible.get()
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded.get()
    }

    /// Expansion is presentation-only and notifies nobody
    pub fn set_expanded(&self, expanded: bool) {
        self.expanded.set(expanded);
    }

    /// Ids of the settings attached to this layer, in order
    pub fn setting_ids(&self) -> Vec<ItemId> {
        self.setting_ids.borrow().clone()
    }

    pub fn required_settings(&self) -> &[SettingType] {
        &self.required_settings
    }

    pub(super) fn set_name(&self, name: String) {
        *self.name.borrow_mut() = name;
    }

    /// Returns whether the flag changed
    pub(super) fn set_visible(&self, visible: bool) -> bool {
        self.visible.replace(visible) != visible
    }

    pub(super) fn attach_setting(&self, id: ItemId) {
        self.setting_ids.borrow_mut().push(id);
    }

    pub(super) fn detach_setting(&self, id: ItemId) -> bool {
        let mut ids = self.setting_ids.borrow_mut();
        let before = ids.len();
        ids.retain(|existing| *existing != id);
        ids.len() != before
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name.borrow())
            .field("visible", &self.visible.get())
            .field("settings", &self.setting_ids.borrow().len())
            .finish()
    }
}
