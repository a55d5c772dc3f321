// Copyright 2025 Cowboy AI, LLC.

use super::instance::ModuleInstance;
use super::sync_settings::SyncSettingKey;
use crate::channels::ChannelManager;
use crate::errors::{WorkbenchError, WorkbenchResult};
use crate::persistence::{AtomStore, SettingsToViewInterface};
use crate::pubsub::SubscriptionHandle;
use crate::state_store::StateStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::rc::{Rc, Weak};

/// What a module's settings and view code see of their instance
///
/// Exists only once the instance has a state store.
pub struct ModuleContext {
    instance_id: String,
    instance: Weak<ModuleInstance>,
    state_store: Rc<StateStore>,
}

impl ModuleContext {
    pub(crate) fn new(instance: &Rc<ModuleInstance>, state_store: Rc<StateStore>) -> Self {
        Self {
            instance_id: instance.id().to_string(),
            instance: Rc::downgrade(instance),
            state_store,
        }
    }

    pub fn instance_id_string(&self) -> &str {
        &self.instance_id
    }

    pub fn state_store(&self) -> &Rc<StateStore> {
        &self.state_store
    }

    pub fn get_value<T: DeserializeOwned>(&self, key: &str) -> WorkbenchResult<T> {
        self.state_store.get_value(key)
    }

    pub fn set_value<T: Serialize>(&self, key: &str, value: T) -> WorkbenchResult<()> {
        self.state_store.set_value(key, value)
    }

    pub fn subscribe(&self, key: &str, callback: impl Fn(&Value) + 'static) -> WorkbenchResult<SubscriptionHandle> {
        self.state_store.subscribe(key, callback)
    }

    fn instance(&self) -> WorkbenchResult<Rc<ModuleInstance>> {
        self.instance
            .upgrade()
            .ok_or_else(|| WorkbenchError::ItemNotFound(format!("module instance '{}'", self.instance_id)))
    }

    pub fn synced_setting_keys(&self) -> WorkbenchResult<Vec<SyncSettingKey>> {
        Ok(self.instance()?.synced_setting_keys())
    }

    /// Called immediately with the current keys, then on every change
    pub fn subscribe_to_synced_setting_keys(
        &self,
        callback: impl Fn(&[SyncSettingKey]) + 'static,
    ) -> WorkbenchResult<SubscriptionHandle> {
        Ok(self.instance()?.subscribe_to_synced_setting_keys_change(callback))
    }

    pub fn settings_to_view_interface(&self) -> WorkbenchResult<Rc<SettingsToViewInterface>> {
        self.instance()?.settings_to_view_interface()
    }

    pub fn atoms(&self) -> WorkbenchResult<Rc<AtomStore>> {
        Ok(self.instance()?.atom_store())
    }

    pub fn channel_manager(&self) -> WorkbenchResult<Rc<ChannelManager>> {
        Ok(self.instance()?.channel_manager())
    }
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("instance_id", &self.instance_id)
            .finish()
    }
}
