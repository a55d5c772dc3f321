// Copyright 2025 Cowboy AI, LLC.

//! One running occurrence of a module

use super::context::ModuleContext;
use super::definition::{AtomsInitializer, DefaultState, Module, ModuleKind};
use super::import_state::ImportState;
use super::initial_settings::InitialSettings;
use super::sync_settings::SyncSettingKey;
use crate::channels::ChannelManager;
use crate::errors::{WorkbenchError, WorkbenchResult};
use crate::persistence::{
    AtomStore, BoxedStateSerializer, InterfaceInitialization, ModuleStatePersistor,
    ModuleStateStorageManager, PersistenceBackend, SettingsToViewInterface,
};
use crate::pubsub::{SubscriberList, SubscriptionHandle};
use crate::state_store::StateStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, error, info};

/// Health of a module instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleInstanceState {
    Initializing,
    Ok,
    Error,
    Resetting,
}

type SubModuleCallback = Rc<dyn Fn(Value)>;

enum InstanceRole {
    Main {
        sub_instance_ids: RefCell<Vec<String>>,
        callback_cache: RefCell<HashMap<String, Value>>,
    },
    Sub {
        parent_id: RefCell<Option<String>>,
        callback: RefCell<Option<SubModuleCallback>>,
    },
}

enum InstancePersistence {
    Basic(ModuleStatePersistor),
    Full(ModuleStateStorageManager),
}

impl InstancePersistence {
    fn persist_state(&self) -> WorkbenchResult<()> {
        match self {
            InstancePersistence::Basic(persistor) => persistor.persist_state(),
            InstancePersistence::Full(manager) => manager.persist_state(),
        }
    }

    fn maybe_apply_persisted_state(&self) -> bool {
        match self {
            InstancePersistence::Basic(persistor) => persistor.maybe_apply_persisted_state(),
            InstancePersistence::Full(manager) => manager.maybe_apply_persisted_state(),
        }
    }

    fn remove_persisted_state(&self) -> WorkbenchResult<()> {
        match self {
            InstancePersistence::Basic(persistor) => persistor.remove_persisted_state(),
            InstancePersistence::Full(manager) => manager.remove_persisted_state(),
        }
    }

    fn detach(&self) {
        match self {
            InstancePersistence::Basic(persistor) => persistor.detach(),
            InstancePersistence::Full(manager) => manager.detach(),
        }
    }
}

/// A running module instance
///
/// Identified by `"{moduleName}-{ordinal}"` unless an id was supplied. The
/// state store and context exist once the owning module has default state
/// and its code is imported.
pub struct ModuleInstance {
    self_ref: Weak<ModuleInstance>,
    id: String,
    module_name: String,
    module: Weak<Module>,
    syncable_setting_keys: Vec<SyncSettingKey>,

    title: RefCell<String>,
    title_subscribers: Rc<SubscriberList<str>>,
    import_state_subscribers: Rc<SubscriberList<ImportState>>,

    state: Cell<ModuleInstanceState>,
    state_subscribers: Rc<SubscriberList<ModuleInstanceState>>,
    fatal_error: RefCell<Option<String>>,

    synced_setting_keys: RefCell<Vec<SyncSettingKey>>,
    synced_setting_subscribers: Rc<SubscriberList<[SyncSettingKey]>>,

    initialised: Cell<bool>,
    cached_default_state: RefCell<Option<DefaultState>>,
    state_store: RefCell<Option<Rc<StateStore>>>,
    context: RefCell<Option<Rc<ModuleContext>>>,
    interface: RefCell<Option<Rc<SettingsToViewInterface>>>,
    atoms: Rc<AtomStore>,
    persistence_setup: RefCell<Option<(BoxedStateSerializer, PersistenceBackend)>>,
    persistence: RefCell<Option<InstancePersistence>>,
    initial_settings: RefCell<Option<InitialSettings>>,

    channel_manager: Rc<ChannelManager>,
    role: InstanceRole,
}

impl ModuleInstance {
    pub(crate) fn new(module: &Module, id: String, channel_manager: Rc<ChannelManager>) -> Rc<Self> {
        let options = module.options();
        channel_manager.register_receivers(&options.channel_receiver_definitions);
        channel_manager.register_channels(&options.channel_definitions);

        let role = match module.kind() {
            ModuleKind::Main => InstanceRole::Main {
                sub_instance_ids: RefCell::new(Vec::new()),
                callback_cache: RefCell::new(HashMap::new()),
            },
            ModuleKind::Sub => InstanceRole::Sub {
                parent_id: RefCell::new(None),
                callback: RefCell::new(None),
            },
        };

        Rc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            id,
            module_name: options.name.clone(),
            module: module.weak(),
            syncable_setting_keys: options.syncable_setting_keys.clone(),
            title: RefCell::new(options.default_title.clone()),
            title_subscribers: Rc::new(SubscriberList::new()),
            import_state_subscribers: Rc::new(SubscriberList::new()),
            state: Cell::new(ModuleInstanceState::Initializing),
            state_subscribers: Rc::new(SubscriberList::new()),
            fatal_error: RefCell::new(None),
            synced_setting_keys: RefCell::new(Vec::new()),
            synced_setting_subscribers: Rc::new(SubscriberList::new()),
            initialised: Cell::new(false),
            cached_default_state: RefCell::new(None),
            state_store: RefCell::new(None),
            context: RefCell::new(None),
            interface: RefCell::new(None),
            atoms: Rc::new(AtomStore::new()),
            persistence_setup: RefCell::new(None),
            persistence: RefCell::new(None),
            initial_settings: RefCell::new(None),
            channel_manager,
            role,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name of the module this is an instance of
    pub fn name(&self) -> &str {
        &self.module_name
    }

    pub fn module(&self) -> Option<Rc<Module>> {
        self.module.upgrade()
    }

    pub fn kind(&self) -> ModuleKind {
        match self.role {
            InstanceRole::Main { .. } => ModuleKind::Main,
            InstanceRole::Sub { .. } => ModuleKind::Sub,
        }
    }

    pub fn import_state(&self) -> ImportState {
        self.module
            .upgrade()
            .map(|module| module.import_state())
            .unwrap_or_default()
    }

    pub fn subscribe_to_import_state_change(&self, callback: impl Fn(&ImportState) + 'static) -> SubscriptionHandle {
        self.import_state_subscribers.subscribe(callback)
    }

    pub(crate) fn notify_import_state_change(&self, state: ImportState) {
        self.import_state_subscribers.notify(&state);
    }

    // Title

    pub fn title(&self) -> String {
        self.title.borrow().clone()
    }

    pub fn set_title(&self, title: impl Into<String>) {
        let title = title.into();
        *self.title.borrow_mut() = title.clone();
        self.title_subscribers.notify(&title);
    }

    pub fn subscribe_to_title_change(&self, callback: impl Fn(&str) + 'static) -> SubscriptionHandle {
        self.title_subscribers.subscribe(callback)
    }

    // Instance state

    pub fn module_instance_state(&self) -> ModuleInstanceState {
        self.state.get()
    }

    pub fn subscribe_to_module_instance_state_change(
        &self,
        callback: impl Fn(&ModuleInstanceState) + 'static,
    ) -> SubscriptionHandle {
        self.state_subscribers.subscribe(callback)
    }

    fn set_module_instance_state(&self, state: ModuleInstanceState) {
        debug!(instance_id = %self.id, ?state, "module instance state changed");
        self.state.set(state);
        self.state_subscribers.notify(&state);
    }

    /// Mark the instance as crashed
    pub fn set_fatal_error(&self, message: impl Into<String>) {
        let message = message.into();
        error!(instance_id = %self.id, error = %message, "module instance failed");
        *self.fatal_error.borrow_mut() = Some(message);
        self.set_module_instance_state(ModuleInstanceState::Error);
    }

    pub fn fatal_error(&self) -> Option<String> {
        self.fatal_error.borrow().clone()
    }

    // Synced settings

    pub fn synced_setting_keys(&self) -> Vec<SyncSettingKey> {
        self.synced_setting_keys.borrow().clone()
    }

    pub fn is_synced_setting(&self, key: SyncSettingKey) -> bool {
        self.synced_setting_keys.borrow().contains(&key)
    }

    /// Start syncing a key the module declares syncable
    pub fn add_synced_setting(&self, key: SyncSettingKey) -> WorkbenchResult<()> {
        if !self.syncable_setting_keys.contains(&key) {
            return Err(WorkbenchError::InvariantViolation(format!(
                "module '{}' cannot sync '{key}'",
                self.module_name
            )));
        }
        if self.is_synced_setting(key) {
            return Ok(());
        }
        self.synced_setting_keys.borrow_mut().push(key);
        self.notify_synced_setting_keys();
        Ok(())
    }

    pub fn remove_synced_setting(&self, key: SyncSettingKey) {
        let removed = {
            let mut keys = self.synced_setting_keys.borrow_mut();
            let before = keys.len();
            keys.retain(|k| *k != key);
            keys.len() != before
        };
        if removed {
            self.notify_synced_setting_keys();
        }
    }

    fn notify_synced_setting_keys(&self) {
        let keys = self.synced_setting_keys();
        self.synced_setting_subscribers.notify(&keys);
    }

    /// Called immediately with the current keys, then on every change
    pub fn subscribe_to_synced_setting_keys_change(
        &self,
        callback: impl Fn(&[SyncSettingKey]) + 'static,
    ) -> SubscriptionHandle {
        let callback = Rc::new(callback);
        let subscriber = Rc::clone(&callback);
        let handle = self
            .synced_setting_subscribers
            .subscribe(move |keys| (*subscriber)(keys));
        (*callback)(&self.synced_setting_keys());
        handle
    }

    // State

    pub fn is_initialised(&self) -> bool {
        self.initialised.get()
    }

    pub fn state_store(&self) -> WorkbenchResult<Rc<StateStore>> {
        self.state_store
            .borrow()
            .clone()
            .ok_or_else(|| WorkbenchError::ContextNotInitialized(self.title()))
    }

    pub fn get_context(&self) -> WorkbenchResult<Rc<ModuleContext>> {
        self.context
            .borrow()
            .clone()
            .ok_or_else(|| WorkbenchError::ContextNotInitialized(self.title()))
    }

    pub fn settings_to_view_interface(&self) -> WorkbenchResult<Rc<SettingsToViewInterface>> {
        self.interface
            .borrow()
            .clone()
            .ok_or_else(|| WorkbenchError::InterfaceNotInitialized(self.title()))
    }

    pub fn atom_store(&self) -> Rc<AtomStore> {
        Rc::clone(&self.atoms)
    }

    pub fn channel_manager(&self) -> Rc<ChannelManager> {
        Rc::clone(&self.channel_manager)
    }

    pub fn set_initial_settings(&self, settings: InitialSettings) {
        *self.initial_settings.borrow_mut() = Some(settings);
    }

    pub fn initial_settings(&self) -> Option<InitialSettings> {
        self.initial_settings.borrow().clone()
    }

    fn rc(&self) -> WorkbenchResult<Rc<Self>> {
        self.self_ref
            .upgrade()
            .ok_or_else(|| WorkbenchError::ItemNotFound(format!("module instance '{}'", self.id)))
    }

    fn make_state_store(&self, default_state: &DefaultState) -> WorkbenchResult<()> {
        let store = Rc::new(StateStore::from_values(
            default_state.values.clone(),
            default_state.options.clone(),
        ));
        let context = Rc::new(ModuleContext::new(&self.rc()?, Rc::clone(&store)));
        *self.state_store.borrow_mut() = Some(store);
        *self.context.borrow_mut() = Some(context);
        Ok(())
    }

    /// Give the instance its state, interface, atoms and persistence
    pub(crate) fn initialize(
        &self,
        default_state: &DefaultState,
        interface: Option<&InterfaceInitialization>,
        atoms: Option<&AtomsInitializer>,
        persistence: Option<(BoxedStateSerializer, PersistenceBackend)>,
    ) -> WorkbenchResult<()> {
        if self.is_initialised() {
            return Ok(());
        }
        self.cached_default_state
            .borrow_mut()
            .get_or_insert_with(|| default_state.clone());
        self.make_state_store(default_state)?;

        if let Some(interface) = interface {
            *self.interface.borrow_mut() = Some(Rc::new(interface.build()));
        }
        if let Some(atoms) = atoms {
            (**atoms)(&*self.atoms)?;
        }

        self.initialised.set(true);
        if let Some((serializer, backend)) = persistence {
            self.install_persistence(serializer, backend, true)?;
        }
        info!(instance_id = %self.id, "module instance initialised");
        self.set_module_instance_state(ModuleInstanceState::Ok);
        Ok(())
    }

    /// Wire change-driven persistence, optionally restoring stored state first
    pub(crate) fn install_persistence(
        &self,
        serializer: BoxedStateSerializer,
        backend: PersistenceBackend,
        restore: bool,
    ) -> WorkbenchResult<()> {
        let state_store = self.state_store()?;
        if let Some(previous) = self.persistence.borrow_mut().take() {
            previous.detach();
        }
        *self.persistence_setup.borrow_mut() = Some((serializer.clone(), backend.clone()));

        let persistence = match self.interface.borrow().clone() {
            Some(interface) => InstancePersistence::Full(ModuleStateStorageManager::new(
                self.id.clone(),
                backend,
                serializer,
                state_store,
                Rc::clone(&self.atoms),
                interface,
            )),
            None => InstancePersistence::Basic(ModuleStatePersistor::new(
                self.id.clone(),
                backend,
                serializer,
                state_store,
                Rc::clone(&self.atoms),
            )),
        };
        if restore {
            persistence.maybe_apply_persisted_state();
        }
        *self.persistence.borrow_mut() = Some(persistence);
        Ok(())
    }

    /// Recreate the state store from the default state
    pub fn reset(&self) -> WorkbenchResult<()> {
        let default_state = self
            .cached_default_state
            .borrow()
            .clone()
            .ok_or_else(|| WorkbenchError::ContextNotInitialized(self.title()))?;
        self.set_module_instance_state(ModuleInstanceState::Resetting);
        self.make_state_store(&default_state)?;

        let setup = self.persistence_setup.borrow().clone();
        if let Some((serializer, backend)) = setup {
            self.install_persistence(serializer, backend, false)?;
            self.persist_state()?;
        }
        self.set_module_instance_state(ModuleInstanceState::Ok);
        Ok(())
    }

    // Persistence

    pub fn has_persistence(&self) -> bool {
        self.persistence.borrow().is_some()
    }

    pub fn persist_state(&self) -> WorkbenchResult<()> {
        match &*self.persistence.borrow() {
            Some(persistence) => persistence.persist_state(),
            None => Ok(()),
        }
    }

    /// Current state document, when the instance has an interface-aware storage manager
    pub fn get_persisted_state(&self) -> WorkbenchResult<Option<Value>> {
        match &*self.persistence.borrow() {
            Some(InstancePersistence::Full(manager)) => manager.get_persisted_state().map(Some),
            _ => Ok(None),
        }
    }

    pub fn apply_persisted_state(&self, document: Value) -> WorkbenchResult<()> {
        match &*self.persistence.borrow() {
            Some(InstancePersistence::Full(manager)) => manager.apply_persisted_state(document),
            _ => Err(WorkbenchError::InvariantViolation(format!(
                "module instance '{}' has no state storage manager",
                self.id
            ))),
        }
    }

    pub(crate) fn remove_persisted_state(&self) -> WorkbenchResult<()> {
        match &*self.persistence.borrow() {
            Some(persistence) => persistence.remove_persisted_state(),
            None => Ok(()),
        }
    }

    /// Stop persisting and tear down channels before removal
    pub(crate) fn dispose(&self) {
        if let Some(persistence) = self.persistence.borrow_mut().take() {
            persistence.detach();
        }
        self.channel_manager.unregister_all_channels();
        self.channel_manager.unregister_all_receivers();
    }

    // Main / sub composition

    pub fn add_sub_module_instance(&self, sub_instance_id: impl Into<String>) -> WorkbenchResult<()> {
        match &self.role {
            InstanceRole::Main { sub_instance_ids, .. } => {
                let id = sub_instance_id.into();
                let mut ids = sub_instance_ids.borrow_mut();
                if !ids.contains(&id) {
                    ids.push(id);
                }
                Ok(())
            }
            InstanceRole::Sub { .. } => Err(self.role_error("main")),
        }
    }

    pub(crate) fn remove_sub_module_instance(&self, sub_instance_id: &str) {
        if let InstanceRole::Main { sub_instance_ids, .. } = &self.role {
            sub_instance_ids.borrow_mut().retain(|id| id != sub_instance_id);
        }
    }

    pub fn sub_module_instance_ids(&self) -> Vec<String> {
        match &self.role {
            InstanceRole::Main { sub_instance_ids, .. } => sub_instance_ids.borrow().clone(),
            InstanceRole::Sub { .. } => Vec::new(),
        }
    }

    pub fn cache_sub_module_callback_data(&self, sub_module_name: impl Into<String>, data: Value) -> WorkbenchResult<()> {
        match &self.role {
            InstanceRole::Main { callback_cache, .. } => {
                callback_cache.borrow_mut().insert(sub_module_name.into(), data);
                Ok(())
            }
            InstanceRole::Sub { .. } => Err(self.role_error("main")),
        }
    }

    pub fn cached_sub_module_callback_data(&self, sub_module_name: &str) -> Option<Value> {
        match &self.role {
            InstanceRole::Main { callback_cache, .. } => callback_cache.borrow().get(sub_module_name).cloned(),
            InstanceRole::Sub { .. } => None,
        }
    }

    pub fn set_parent_module_instance(&self, parent_id: impl Into<String>) -> WorkbenchResult<()> {
        match &self.role {
            InstanceRole::Sub { parent_id: slot, .. } => {
                *slot.borrow_mut() = Some(parent_id.into());
                Ok(())
            }
            InstanceRole::Main { .. } => Err(self.role_error("sub")),
        }
    }

    pub fn parent_module_instance_id(&self) -> Option<String> {
        match &self.role {
            InstanceRole::Sub { parent_id, .. } => parent_id.borrow().clone(),
            InstanceRole::Main { .. } => None,
        }
    }

    pub fn set_sub_module_callback(&self, callback: impl Fn(Value) + 'static) -> WorkbenchResult<()> {
        match &self.role {
            InstanceRole::Sub { callback: slot, .. } => {
                *slot.borrow_mut() = Some(Rc::new(callback));
                Ok(())
            }
            InstanceRole::Main { .. } => Err(self.role_error("sub")),
        }
    }

    pub fn clear_sub_module_callback(&self) {
        if let InstanceRole::Sub { callback, .. } = &self.role {
            callback.borrow_mut().take();
        }
    }

    /// Hand data to the parent; returns whether a callback was set
    pub fn invoke_sub_module_callback(&self, data: Value) -> bool {
        let callback = match &self.role {
            InstanceRole::Sub { callback, .. } => callback.borrow().clone(),
            InstanceRole::Main { .. } => None,
        };
        match callback {
            Some(callback) => {
                (*callback)(data);
                true
            }
            None => false,
        }
    }

    fn role_error(&self, required: &str) -> WorkbenchError {
        WorkbenchError::InvariantViolation(format!(
            "module instance '{}' is not a {required} module instance",
            self.id
        ))
    }
}

impl fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInstance")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("state", &self.state.get())
            .field("initialised", &self.initialised.get())
            .finish()
    }
}
