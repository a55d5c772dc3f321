// Copyright 2025 Cowboy AI, LLC.

//! Registered modules and their import lifecycle

use super::import_state::{ImportState, ImportTransition};
use super::instance::ModuleInstance;
use super::loader::ModuleLoader;
use super::sync_settings::SyncSettingKey;
use crate::channels::{ChannelDefinition, ChannelManager, ChannelReceiverDefinition};
use crate::config::WorkbenchConfig;
use crate::errors::{WorkbenchError, WorkbenchResult};
use crate::persistence::{
    AtomStore, BoxedStateSerializer, InterfaceInitialization, KeyValueStorage, PersistenceBackend,
    SchemaValidator, StateSerializer,
};
use crate::pubsub::{SubscriberList, SubscriptionHandle};
use crate::registry::ModuleRegistry;
use crate::state_store::StateOptions;
use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, error, info, warn};

/// Whether a module is a top-level module or a sub-module of one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleKind {
    Main,
    Sub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleCategory {
    #[default]
    Main,
    Sub,
    Debug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleDevState {
    #[default]
    Prod,
    Dev,
    Deprecated,
}

/// Static description of a module, given at registration
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleOptions {
    pub name: String,
    pub default_title: String,
    pub category: ModuleCategory,
    pub dev_state: ModuleDevState,
    pub description: Option<String>,
    pub data_tag_ids: Vec<String>,
    pub syncable_setting_keys: Vec<SyncSettingKey>,
    pub channel_definitions: Vec<ChannelDefinition>,
    pub channel_receiver_definitions: Vec<ChannelReceiverDefinition>,
}

impl ModuleOptions {
    pub fn new(name: impl Into<String>, default_title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_title: default_title.into(),
            category: ModuleCategory::default(),
            dev_state: ModuleDevState::default(),
            description: None,
            data_tag_ids: Vec::new(),
            syncable_setting_keys: Vec::new(),
            channel_definitions: Vec::new(),
            channel_receiver_definitions: Vec::new(),
        }
    }

    pub fn category(mut self, category: ModuleCategory) -> Self {
        self.category = category;
        self
    }

    pub fn dev_state(mut self, dev_state: ModuleDevState) -> Self {
        self.dev_state = dev_state;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn data_tag_ids(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.data_tag_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn syncable_setting_keys(mut self, keys: impl IntoIterator<Item = SyncSettingKey>) -> Self {
        self.syncable_setting_keys = keys.into_iter().collect();
        self
    }

    pub fn channels(mut self, definitions: Vec<ChannelDefinition>) -> Self {
        self.channel_definitions = definitions;
        self
    }

    pub fn receivers(mut self, definitions: Vec<ChannelReceiverDefinition>) -> Self {
        self.channel_receiver_definitions = definitions;
        self
    }
}

/// Initial state template copied into every new instance
#[derive(Debug, Clone)]
pub(crate) struct DefaultState {
    pub(crate) values: IndexMap<String, Value>,
    pub(crate) options: StateOptions,
}

/// Defines the atoms of a fresh instance
pub type AtomsInitializer = Rc<dyn Fn(&AtomStore) -> WorkbenchResult<()>>;

/// What a module needs from the workbench it is attached to
pub trait ModuleHost {
    fn config(&self) -> WorkbenchConfig;

    fn storage(&self) -> Rc<dyn KeyValueStorage>;

    fn schema_validator(&self) -> Rc<dyn SchemaValidator>;

    /// Called every time a module finishes importing
    fn maybe_make_first_module_instance_active(&self);
}

/// A registered capability that can be instantiated any number of times
///
/// Owns its instances. Its code is loaded lazily: the first instance moves
/// the module to `Importing`, and [`Module::run_import`] asks a
/// [`ModuleLoader`] for the code.
pub struct Module {
    self_ref: Weak<Module>,
    options: ModuleOptions,
    kind: ModuleKind,
    import_state: Cell<ImportState>,
    transitions: RefCell<Vec<ImportTransition>>,
    load_in_flight: Cell<bool>,
    last_load_error: RefCell<Option<String>>,
    instance_counter: Cell<u32>,
    instances: RefCell<Vec<Rc<ModuleInstance>>>,
    default_state: RefCell<Option<DefaultState>>,
    interface_initialization: RefCell<Option<Rc<InterfaceInitialization>>>,
    atoms_initialization: RefCell<Option<AtomsInitializer>>,
    serializer: RefCell<Option<BoxedStateSerializer>>,
    host: RefCell<Option<Weak<dyn ModuleHost>>>,
    import_state_subscribers: Rc<SubscriberList<ImportState>>,
}

impl Module {
    pub(crate) fn new(options: ModuleOptions, kind: ModuleKind) -> Rc<Self> {
        Rc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            options,
            kind,
            import_state: Cell::new(ImportState::NotImported),
            transitions: RefCell::new(Vec::new()),
            load_in_flight: Cell::new(false),
            last_load_error: RefCell::new(None),
            instance_counter: Cell::new(0),
            instances: RefCell::new(Vec::new()),
            default_state: RefCell::new(None),
            interface_initialization: RefCell::new(None),
            atoms_initialization: RefCell::new(None),
            serializer: RefCell::new(None),
            host: RefCell::new(None),
            import_state_subscribers: Rc::new(SubscriberList::new()),
        })
    }

    pub(crate) fn weak(&self) -> Weak<Module> {
        self.self_ref.clone()
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn default_title(&self) -> &str {
        &self.options.default_title
    }

    pub fn options(&self) -> &ModuleOptions {
        &self.options
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    pub fn category(&self) -> ModuleCategory {
        self.options.category
    }

    pub fn dev_state(&self) -> ModuleDevState {
        self.options.dev_state
    }

    pub fn description(&self) -> Option<&str> {
        self.options.description.as_deref()
    }

    pub fn data_tag_ids(&self) -> &[String] {
        &self.options.data_tag_ids
    }

    pub fn syncable_setting_keys(&self) -> &[SyncSettingKey] {
        &self.options.syncable_setting_keys
    }

    pub fn has_syncable_setting_key(&self, key: SyncSettingKey) -> bool {
        self.options.syncable_setting_keys.contains(&key)
    }

    // Host

    pub(crate) fn attach_host(&self, host: Weak<dyn ModuleHost>) {
        *self.host.borrow_mut() = Some(host);
    }

    fn host(&self) -> Option<Rc<dyn ModuleHost>> {
        self.host.borrow().as_ref().and_then(Weak::upgrade)
    }

    pub fn is_attached(&self) -> bool {
        self.host().is_some()
    }

    // Import lifecycle

    pub fn import_state(&self) -> ImportState {
        self.import_state.get()
    }

    /// Every import state change so far, oldest first
    pub fn import_transitions(&self) -> Vec<ImportTransition> {
        self.transitions.borrow().clone()
    }

    pub fn last_load_error(&self) -> Option<String> {
        self.last_load_error.borrow().clone()
    }

    pub fn subscribe_to_import_state_change(&self, callback: impl Fn(&ImportState) + 'static) -> SubscriptionHandle {
        self.import_state_subscribers.subscribe(callback)
    }

    fn set_import_state(&self, to: ImportState) -> WorkbenchResult<()> {
        let from = self.import_state.get();
        if !from.can_transition_to(&to) {
            return Err(WorkbenchError::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        self.import_state.set(to);
        self.transitions.borrow_mut().push(ImportTransition {
            from,
            to,
            at: Utc::now(),
        });
        debug!(module = %self.name(), %from, %to, "import state changed");

        for instance in self.instances() {
            instance.notify_import_state_change(to);
        }
        self.import_state_subscribers.notify(&to);
        Ok(())
    }

    /// Start importing on first use; initialise waiting instances once imported
    pub fn maybe_import_self(&self) {
        match self.import_state.get() {
            ImportState::NotImported => {
                if let Err(err) = self.set_import_state(ImportState::Importing) {
                    warn!(module = %self.name(), %err, "could not start import");
                }
            }
            ImportState::Imported => self.init_instances(),
            ImportState::Importing | ImportState::Failed => {}
        }
    }

    /// Ask `loader` for this module's code if an import is pending
    ///
    /// Does nothing unless the module is `Importing` with no load already
    /// running. Returns the resulting import state.
    pub async fn run_import(&self, loader: &dyn ModuleLoader, registry: &ModuleRegistry) -> ImportState {
        if self.import_state.get() != ImportState::Importing || self.load_in_flight.get() {
            return self.import_state.get();
        }
        self.load_in_flight.set(true);
        info!(module = %self.name(), "importing module code");
        let result = loader.load(self.name(), registry).await;
        self.load_in_flight.set(false);
        self.finish_import(result);
        self.import_state.get()
    }

    pub(crate) fn finish_import(&self, result: anyhow::Result<()>) {
        match result {
            Ok(()) => {
                self.init_instances();
                if let Err(err) = self.set_import_state(ImportState::Imported) {
                    warn!(module = %self.name(), %err, "import finished in unexpected state");
                    return;
                }
                info!(module = %self.name(), instances = self.instance_count(), "module imported");
                if let Some(host) = self.host() {
                    host.maybe_make_first_module_instance_active();
                }
            }
            Err(source) => {
                let err = WorkbenchError::ModuleLoad {
                    module: self.name().to_string(),
                    source,
                };
                error!(module = %self.name(), error = %err, "failed to import module");
                *self.last_load_error.borrow_mut() = Some(err.to_string());
                if let Err(err) = self.set_import_state(ImportState::Failed) {
                    warn!(module = %self.name(), %err, "import failed in unexpected state");
                }
            }
        }
    }

    // Code-provided parts

    /// Set the state template for instances
    ///
    /// Supplying state to a module that was never imported starts its
    /// import. Once imported, instances still waiting for state are
    /// initialised immediately.
    pub fn set_default_state<S: Serialize>(&self, default_state: &S, options: StateOptions) -> WorkbenchResult<()> {
        let values = match serde_json::to_value(default_state)? {
            Value::Object(map) => map.into_iter().collect(),
            other => {
                return Err(WorkbenchError::Serialization(format!(
                    "default state of module '{}' must be an object, got {other}",
                    self.name()
                )))
            }
        };
        *self.default_state.borrow_mut() = Some(DefaultState { values, options });

        match self.import_state.get() {
            ImportState::NotImported => self.set_import_state(ImportState::Importing)?,
            ImportState::Imported => self.init_instances(),
            ImportState::Importing | ImportState::Failed => {}
        }
        Ok(())
    }

    pub fn has_default_state(&self) -> bool {
        self.default_state.borrow().is_some()
    }

    pub fn set_settings_to_view_interface_initialization(&self, initialization: InterfaceInitialization) {
        *self.interface_initialization.borrow_mut() = Some(Rc::new(initialization));
    }

    pub fn set_atoms_initialization(&self, initializer: impl Fn(&AtomStore) -> WorkbenchResult<()> + 'static) {
        *self.atoms_initialization.borrow_mut() = Some(Rc::new(initializer));
    }

    /// Enable persistence; initialised instances restore and start persisting at once
    pub fn register_state_serializer<S: StateSerializer>(&self, serializer: S) -> WorkbenchResult<()> {
        *self.serializer.borrow_mut() = Some(BoxedStateSerializer::new(serializer));
        for instance in self.instances() {
            if !instance.is_initialised() || instance.has_persistence() {
                continue;
            }
            if let Some((serializer, backend)) = self.persistence_setup(instance.id()) {
                instance.install_persistence(serializer, backend, true)?;
            }
        }
        Ok(())
    }

    fn persistence_setup(&self, instance_id: &str) -> Option<(BoxedStateSerializer, PersistenceBackend)> {
        let serializer = self.serializer.borrow().clone()?;
        let host = self.host()?;
        let config = host.config();
        Some((
            serializer,
            PersistenceBackend {
                storage: host.storage(),
                validator: host.schema_validator(),
                storage_key: config.state_key(instance_id),
                persist_on_change: config.persist_on_change,
            },
        ))
    }

    fn init_instances(&self) {
        let Some(default_state) = self.default_state.borrow().clone() else {
            return;
        };
        let interface = self.interface_initialization.borrow().clone();
        let atoms = self.atoms_initialization.borrow().clone();

        for instance in self.instances() {
            if instance.is_initialised() {
                continue;
            }
            let persistence = self.persistence_setup(instance.id());
            if let Err(err) = instance.initialize(&default_state, interface.as_deref(), atoms.as_ref(), persistence) {
                instance.set_fatal_error(err.to_string());
            }
        }
    }

    // Instances

    pub fn instances(&self) -> Vec<Rc<ModuleInstance>> {
        self.instances.borrow().clone()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.borrow().len()
    }

    /// Create an instance with id `"{name}-{n}"` or `id_override`
    ///
    /// The first instance starts the module's import.
    pub fn make_instance(&self, id_override: Option<String>) -> WorkbenchResult<Rc<ModuleInstance>> {
        let host = self
            .host()
            .ok_or_else(|| WorkbenchError::ModuleNotAttached(self.name().to_string()))?;

        let number = self.instance_counter.get();
        self.instance_counter.set(number + 1);
        let id = id_override.unwrap_or_else(|| format!("{}-{number}", self.name()));

        let config = host.config();
        let channel_manager = ChannelManager::new(id.clone(), Some(host.storage()), config.receivers_key(&id));
        let instance = ModuleInstance::new(self, id, channel_manager);
        self.instances.borrow_mut().push(Rc::clone(&instance));
        info!(module = %self.name(), instance_id = %instance.id(), "module instance created");

        self.maybe_import_self();
        Ok(instance)
    }

    pub(crate) fn remove_instance(&self, instance_id: &str) -> Option<Rc<ModuleInstance>> {
        let mut instances = self.instances.borrow_mut();
        let index = instances.iter().position(|instance| instance.id() == instance_id)?;
        Some(instances.remove(index))
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.options.name)
            .field("kind", &self.kind)
            .field("import_state", &self.import_state.get())
            .field("instances", &self.instance_count())
            .finish()
    }
}
