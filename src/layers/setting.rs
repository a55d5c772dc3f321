// Copyright 2025 Cowboy AI, LLC.

//! Typed, named setting values with change subscribers

use super::ItemId;
use crate::pubsub::{SubscriberList, SubscriptionHandle};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// What a setting controls
///
/// Effective-setting resolution uses the type: the nearest setting of a
/// given type wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettingType {
    /// Ensemble selection
    Ensemble,
    /// Realization number
    Realization,
    /// Surface name
    SurfaceName,
    /// Surface or grid attribute
    Attribute,
    /// Time point or interval
    TimeOrInterval,
    /// Anything a layer kind defines for itself
    Custom(String),
}

impl fmt::Display for SettingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingType::Ensemble => write!(f, "ensemble"),
            SettingType::Realization => write!(f, "realization"),
            SettingType::SurfaceName => write!(f, "surfaceName"),
            SettingType::Attribute => write!(f, "attribute"),
            SettingType::TimeOrInterval => write!(f, "timeOrInterval"),
            SettingType::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// A named value
pub struct BaseSetting {
    id: ItemId,
    key: String,
    display_name: String,
    setting_type: SettingType,
    value: RefCell<Value>,
    subscribers: Rc<SubscriberList<Value>>,
}

impl BaseSetting {
    /// Create a setting holding `value`
    pub fn new(
        key: impl Into<String>,
        display_name: impl Into<String>,
        setting_type: SettingType,
        value: Value,
    ) -> Self {
        Self {
            id: ItemId::new(),
            key: key.into(),
            display_name: display_name.into(),
            setting_type,
            value: RefCell::new(value),
            subscribers: Rc::new(SubscriberList::new()),
        }
    }

    /// Setting of `setting_type` with its display name as key
    pub fn of_type(setting_type: SettingType, value: Value) -> Self {
        let name = setting_type.to_string();
        Self::new(name.clone(), name, setting_type, value)
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn setting_type(&self) -> &SettingType {
        &self.setting_type
    }

    /// Current value
    pub fn value(&self) -> Value {
        self.value.borrow().clone()
    }

    /// Current value converted to `T`, `None` when it does not fit
    pub fn value_as<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.value()).ok()
    }

    /// Whether the setting holds anything other than `null`
    pub fn has_value(&self) -> bool {
        !self.value.borrow().is_null()
    }

    /// Replace the value; subscribers are notified only on change
    pub fn set_value(&self, value: Value) {
        if *self.value.borrow() == value {
            return;
        }
        *self.value.borrow_mut() = value.clone();
        debug!(setting = %self.key, %value, "setting value changed");
        self.subscribers.notify(&value);
    }

    /// Listen for value changes
    pub fn subscribe(&self, callback: impl Fn(&Value) + 'static) -> SubscriptionHandle {
        self.subscribers.subscribe(callback)
    }
}

impl fmt::Debug for BaseSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseSetting")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("setting_type", &self.setting_type)
            .field("value", &self.value.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    #[test]
    fn test_set_value_notifies_on_change_only() {
        let setting = BaseSetting::of_type(SettingType::Realization, json!(0));
        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        let _ = setting.subscribe(move |_| c.set(c.get() + 1));

        setting.set_value(json!(0));
        assert_eq!(calls.get(), 0);
        setting.set_value(json!(3));
        assert_eq!(calls.get(), 1);
        assert_eq!(setting.value_as::<i64>(), Some(3));
    }

    #[test]
    fn test_of_type_uses_type_name() {
        let setting = BaseSetting::of_type(SettingType::SurfaceName, Value::Null);
        assert_eq!(setting.key(), "surfaceName");
        assert!(!setting.has_value());

        let custom = BaseSetting::of_type(SettingType::Custom("colorScale".into()), json!("viridis"));
        assert_eq!(custom.display_name(), "colorScale");
        assert_eq!(custom.value_as::<String>().as_deref(), Some("viridis"));
    }
}
