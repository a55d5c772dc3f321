// Copyright 2025 Cowboy AI, LLC.

//! The composition root
//!
//! A [`Workbench`] owns the registry, session, services, durable storage and
//! the module loader, and keeps the ordered list of live module instances.
//! It is the [`ModuleHost`] every registered module is attached to.

use super::services::WorkbenchServices;
use super::session::WorkbenchSession;
use crate::config::WorkbenchConfig;
use crate::errors::{WorkbenchError, WorkbenchResult};
use crate::module::{ImportState, Module, ModuleHost, ModuleInstance, ModuleLoader};
use crate::persistence::{InMemoryStorage, JsonSchemaValidator, KeyValueStorage, SchemaValidator};
use crate::pubsub::{SubscriptionHandle, TopicSubscribers};
use crate::registry::ModuleRegistry;
use futures::future::join_all;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, info, warn};

/// Workbench-level changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkbenchTopic {
    ModuleInstances,
    ActiveModuleInstance,
}

pub struct Workbench {
    self_ref: Weak<Workbench>,
    config: WorkbenchConfig,
    registry: Rc<ModuleRegistry>,
    loader: Rc<dyn ModuleLoader>,
    storage: Rc<dyn KeyValueStorage>,
    validator: Rc<dyn SchemaValidator>,
    session: WorkbenchSession,
    services: WorkbenchServices,
    instances: RefCell<Vec<Rc<ModuleInstance>>>,
    active_instance_id: RefCell<Option<String>>,
    first_activation_done: Cell<bool>,
    subscribers: TopicSubscribers<WorkbenchTopic, ()>,
}

impl Workbench {
    /// A workbench with process-lifetime storage
    pub fn new(config: WorkbenchConfig, registry: Rc<ModuleRegistry>, loader: Rc<dyn ModuleLoader>) -> Rc<Self> {
        Self::with_backends(
            config,
            registry,
            loader,
            Rc::new(InMemoryStorage::new()),
            Rc::new(JsonSchemaValidator::new()),
        )
    }

    /// A workbench over caller-supplied storage and schema validation
    ///
    /// Every module in `registry`, and every module registered later, is
    /// attached to the new workbench.
    pub fn with_backends(
        config: WorkbenchConfig,
        registry: Rc<ModuleRegistry>,
        loader: Rc<dyn ModuleLoader>,
        storage: Rc<dyn KeyValueStorage>,
        validator: Rc<dyn SchemaValidator>,
    ) -> Rc<Self> {
        let services = WorkbenchServices::new(config.replay_topics_by_default);
        let workbench = Rc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            config,
            registry,
            loader,
            storage,
            validator,
            session: WorkbenchSession::new(),
            services,
            instances: RefCell::new(Vec::new()),
            active_instance_id: RefCell::new(None),
            first_activation_done: Cell::new(false),
            subscribers: TopicSubscribers::new(),
        });

        let host: Rc<dyn ModuleHost> = workbench.clone();
        workbench.registry.attach_host(Rc::downgrade(&host));
        info!(
            modules = workbench.registry.registered_modules().len(),
            sub_modules = workbench.registry.registered_sub_modules().len(),
            "workbench created"
        );
        workbench
    }

    pub fn subscribe(&self, topic: WorkbenchTopic, callback: impl Fn() + 'static) -> SubscriptionHandle {
        self.subscribers.subscribe(topic, move |_| callback())
    }

    fn notify(&self, topic: WorkbenchTopic) {
        self.subscribers.notify(&topic, &());
    }

    pub fn registry(&self) -> &Rc<ModuleRegistry> {
        &self.registry
    }

    pub fn session(&self) -> &WorkbenchSession {
        &self.session
    }

    pub fn services(&self) -> &WorkbenchServices {
        &self.services
    }

    pub fn storage(&self) -> Rc<dyn KeyValueStorage> {
        Rc::clone(&self.storage)
    }

    // Instances

    fn add_instance(&self, module: &Module, id_override: Option<String>) -> WorkbenchResult<Rc<ModuleInstance>> {
        if let Some(id) = &id_override {
            if self.module_instance(id).is_some() {
                return Err(WorkbenchError::InvariantViolation(format!(
                    "module instance '{id}' already exists"
                )));
            }
        }
        let instance = module.make_instance(id_override)?;
        self.instances.borrow_mut().push(Rc::clone(&instance));
        self.notify(WorkbenchTopic::ModuleInstances);
        Ok(instance)
    }

    /// Create a new instance of a registered main module
    pub fn make_module_instance(&self, module_name: &str) -> WorkbenchResult<Rc<ModuleInstance>> {
        let module = self.registry.get_module(module_name)?;
        self.add_instance(&module, None)
    }

    /// Recreate an instance under a previously used id so its persisted state applies
    pub fn restore_module_instance(&self, module_name: &str, instance_id: &str) -> WorkbenchResult<Rc<ModuleInstance>> {
        let module = self.registry.get_module(module_name)?;
        self.add_instance(&module, Some(instance_id.to_string()))
    }

    pub fn make_sub_module_instance(&self, sub_module_name: &str) -> WorkbenchResult<Rc<ModuleInstance>> {
        let module = self.registry.get_sub_module(sub_module_name)?;
        self.add_instance(&module, None)
    }

    /// Link a sub-module instance to its main instance
    ///
    /// Data the sub-instance hands to its callback is cached in the main
    /// instance under the sub-module's name.
    pub fn connect_sub_module_instance(&self, main_instance_id: &str, sub_instance_id: &str) -> WorkbenchResult<()> {
        let main = self
            .module_instance(main_instance_id)
            .ok_or_else(|| WorkbenchError::ItemNotFound(format!("module instance {main_instance_id}")))?;
        let sub = self
            .module_instance(sub_instance_id)
            .ok_or_else(|| WorkbenchError::ItemNotFound(format!("module instance {sub_instance_id}")))?;

        main.add_sub_module_instance(sub_instance_id)?;
        sub.set_parent_module_instance(main_instance_id)?;

        let workbench = self.self_ref.clone();
        let parent_id = main_instance_id.to_string();
        let sub_module_name = sub.name().to_string();
        sub.set_sub_module_callback(move |data| {
            let Some(parent) = workbench.upgrade().and_then(|wb| wb.module_instance(&parent_id)) else {
                warn!(parent = %parent_id, "sub-module data for a removed parent dropped");
                return;
            };
            if let Err(err) = parent.cache_sub_module_callback_data(sub_module_name.clone(), data) {
                warn!(parent = %parent_id, %err, "could not cache sub-module data");
            }
        })?;
        debug!(main = %main_instance_id, sub = %sub_instance_id, "sub-module instance connected");
        Ok(())
    }

    /// Remove an instance together with its persisted state
    ///
    /// Returns `false` when no instance has that id.
    pub fn remove_module_instance(&self, instance_id: &str) -> bool {
        let removed = {
            let mut instances = self.instances.borrow_mut();
            instances
                .iter()
                .position(|instance| instance.id() == instance_id)
                .map(|index| instances.remove(index))
        };
        let Some(instance) = removed else {
            return false;
        };

        if let Some(module) = instance.module() {
            module.remove_instance(instance_id);
        }
        instance.dispose();
        for key in [
            self.config.state_key(instance_id),
            self.config.receivers_key(instance_id),
        ] {
            if let Err(err) = self.storage.remove_item(&key) {
                warn!(instance_id, key = %key, %err, "could not remove persisted state");
            }
        }

        if let Some(parent_id) = instance.parent_module_instance_id() {
            if let Some(parent) = self.module_instance(&parent_id) {
                parent.remove_sub_module_instance(instance_id);
            }
        }
        for sub_id in instance.sub_module_instance_ids() {
            if let Some(sub) = self.module_instance(&sub_id) {
                sub.clear_sub_module_callback();
            }
        }

        let was_active = self.active_instance_id.borrow().as_deref() == Some(instance_id);
        if was_active {
            let next = self.instances.borrow().first().map(|instance| instance.id().to_string());
            *self.active_instance_id.borrow_mut() = next;
        }

        info!(instance_id, "module instance removed");
        self.notify(WorkbenchTopic::ModuleInstances);
        if was_active {
            self.notify(WorkbenchTopic::ActiveModuleInstance);
        }
        true
    }

    pub fn module_instance(&self, instance_id: &str) -> Option<Rc<ModuleInstance>> {
        self.instances
            .borrow()
            .iter()
            .find(|instance| instance.id() == instance_id)
            .cloned()
    }

    /// Live instances in creation order
    pub fn module_instances(&self) -> Vec<Rc<ModuleInstance>> {
        self.instances.borrow().clone()
    }

    // Imports

    /// Load the code of every module waiting in `Importing`
    ///
    /// Loads run concurrently on the current task. Returns how many modules
    /// were attempted.
    pub async fn process_pending_imports(&self) -> usize {
        let pending: Vec<Rc<Module>> = self
            .registry
            .registered_modules()
            .into_iter()
            .chain(self.registry.registered_sub_modules())
            .filter(|module| module.import_state() == ImportState::Importing)
            .collect();
        if pending.is_empty() {
            return 0;
        }

        debug!(pending = pending.len(), "processing pending imports");
        let loader = &*self.loader;
        let registry = &*self.registry;
        let outcomes = join_all(pending.iter().map(|module| module.run_import(loader, registry))).await;
        let failed = outcomes.iter().filter(|state| **state == ImportState::Failed).count();
        if failed > 0 {
            warn!(failed, "some modules failed to import");
        }
        pending.len()
    }

    // Activation

    pub fn active_module_instance_id(&self) -> Option<String> {
        self.active_instance_id.borrow().clone()
    }

    pub fn active_module_instance(&self) -> Option<Rc<ModuleInstance>> {
        let id = self.active_module_instance_id()?;
        self.module_instance(&id)
    }

    pub fn set_active_module_instance(&self, instance_id: &str) -> WorkbenchResult<()> {
        if self.module_instance(instance_id).is_none() {
            return Err(WorkbenchError::ItemNotFound(format!("module instance {instance_id}")));
        }
        *self.active_instance_id.borrow_mut() = Some(instance_id.to_string());
        self.notify(WorkbenchTopic::ActiveModuleInstance);
        Ok(())
    }

    // Channels

    /// Re-subscribe every instance's receivers from persisted state
    ///
    /// Call once all instances of a restored layout exist. Returns the
    /// number of receivers that found their channel again.
    pub fn apply_persisted_channel_receivers(&self) -> usize {
        let resolve = |instance_id: &str, channel_id: &str| {
            self.module_instance(instance_id)
                .and_then(|instance| instance.channel_manager().channel(channel_id))
        };
        self.module_instances()
            .iter()
            .map(|instance| {
                let manager = instance.channel_manager();
                let states = manager.load_persisted_receivers_state();
                manager.apply_persisted_receivers_state(&states, &resolve)
            })
            .sum()
    }
}

impl ModuleHost for Workbench {
    fn config(&self) -> WorkbenchConfig {
        self.config.clone()
    }

    fn storage(&self) -> Rc<dyn KeyValueStorage> {
        Rc::clone(&self.storage)
    }

    fn schema_validator(&self) -> Rc<dyn SchemaValidator> {
        Rc::clone(&self.validator)
    }

    /// Activate the first imported instance the first time any module imports
    fn maybe_make_first_module_instance_active(&self) {
        if !self.config.auto_activate_first_instance || self.first_activation_done.get() {
            return;
        }
        if self.active_instance_id.borrow().is_some() {
            self.first_activation_done.set(true);
            return;
        }
        let first = self
            .instances
            .borrow()
            .iter()
            .find(|instance| instance.import_state() == ImportState::Imported)
            .map(|instance| instance.id().to_string());
        let Some(first) = first else {
            return;
        };
        self.first_activation_done.set(true);
        info!(instance_id = %first, "first module instance activated");
        *self.active_instance_id.borrow_mut() = Some(first);
        self.notify(WorkbenchTopic::ActiveModuleInstance);
    }
}

impl fmt::Debug for Workbench {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workbench")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field(
                "instances",
                &self
                    .instances
                    .borrow()
                    .iter()
                    .map(|instance| instance.id().to_string())
                    .collect::<Vec<_>>(),
            )
            .field("active_instance_id", &self.active_instance_id.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ModuleOptions, StaticModuleLoader};
    use crate::state_store::StateOptions;
    use serde_json::json;

    fn workbench_with(loader: StaticModuleLoader) -> Rc<Workbench> {
        let registry = Rc::new(ModuleRegistry::new());
        registry.register_module(ModuleOptions::new("Map", "Map"));
        registry.register_sub_module(ModuleOptions::new("WellPicker", "Well picker"));
        Workbench::new(WorkbenchConfig::default(), registry, Rc::new(loader))
    }

    fn map_loader() -> StaticModuleLoader {
        StaticModuleLoader::new().with_module("Map", |registry| {
            registry.init_module("Map", &json!({ "zoom": 3 }), StateOptions::new())?;
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_import_activates_first_instance() {
        let workbench = workbench_with(map_loader());
        let first = workbench.make_module_instance("Map").unwrap();
        let _second = workbench.make_module_instance("Map").unwrap();
        assert_eq!(workbench.active_module_instance_id(), None);

        assert_eq!(workbench.process_pending_imports().await, 1);
        assert!(first.is_initialised());
        assert_eq!(workbench.active_module_instance_id().as_deref(), Some("Map-0"));
        assert_eq!(workbench.process_pending_imports().await, 0);
    }

    #[tokio::test]
    async fn test_remove_instance_clears_state_and_activation() {
        let workbench = workbench_with(map_loader());
        workbench.make_module_instance("Map").unwrap();
        let second = workbench.make_module_instance("Map").unwrap();
        workbench.process_pending_imports().await;
        workbench.set_active_module_instance(second.id()).unwrap();

        let storage = workbench.storage();
        storage.set_item("Map-1-state", "{}").unwrap();
        assert!(workbench.remove_module_instance("Map-1"));
        assert!(!workbench.remove_module_instance("Map-1"));
        assert_eq!(storage.get_item("Map-1-state").unwrap(), None);
        assert_eq!(workbench.active_module_instance_id().as_deref(), Some("Map-0"));
        assert!(workbench.set_active_module_instance("Map-1").is_err());
    }

    #[test]
    fn test_sub_module_data_reaches_parent_cache() {
        let workbench = workbench_with(StaticModuleLoader::new());
        let main = workbench.make_module_instance("Map").unwrap();
        let sub = workbench.make_sub_module_instance("WellPicker").unwrap();

        workbench.connect_sub_module_instance(main.id(), sub.id()).unwrap();
        assert_eq!(main.sub_module_instance_ids(), vec![sub.id().to_string()]);
        assert_eq!(sub.parent_module_instance_id().as_deref(), Some(main.id()));

        assert!(sub.invoke_sub_module_callback(json!({ "well": "A-1" })));
        assert_eq!(
            main.cached_sub_module_callback_data("WellPicker"),
            Some(json!({ "well": "A-1" }))
        );

        workbench.remove_module_instance(sub.id());
        assert!(main.sub_module_instance_ids().is_empty());
    }

    #[test]
    fn test_restore_rejects_live_id() {
        let workbench = workbench_with(StaticModuleLoader::new());
        workbench.restore_module_instance("Map", "Map-7").unwrap();
        assert!(workbench.restore_module_instance("Map", "Map-7").is_err());
        assert!(workbench.make_module_instance("Missing").is_err());
    }
}
