// Copyright 2025 Cowboy AI, LLC.

//! Registry of every module the application knows about
//!
//! Constructed once at start-up and shared by reference; registration is
//! expected before any instance is made. Registering a name twice replaces
//! the earlier module.

use crate::errors::{WorkbenchError, WorkbenchResult};
use crate::module::{Module, ModuleHost, ModuleKind, ModuleOptions};
use crate::state_store::StateOptions;
use indexmap::IndexMap;
use serde::Serialize;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{info, warn};

/// Name-indexed modules and sub-modules
#[derive(Default)]
pub struct ModuleRegistry {
    modules: RefCell<IndexMap<String, Rc<Module>>>,
    sub_modules: RefCell<IndexMap<String, Rc<Module>>>,
    host: RefCell<Option<Weak<dyn ModuleHost>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, options: ModuleOptions, kind: ModuleKind) -> Rc<Module> {
        let module = Module::new(options, kind);
        if let Some(host) = self.host.borrow().clone() {
            module.attach_host(host);
        }
        let table = match kind {
            ModuleKind::Main => &self.modules,
            ModuleKind::Sub => &self.sub_modules,
        };
        let previous = table
            .borrow_mut()
            .insert(module.name().to_string(), Rc::clone(&module));
        if previous.is_some() {
            warn!(module = %module.name(), ?kind, "module registered twice; replacing");
        }
        info!(module = %module.name(), ?kind, "module registered");
        module
    }

    pub fn register_module(&self, options: ModuleOptions) -> Rc<Module> {
        self.insert(options, ModuleKind::Main)
    }

    pub fn register_sub_module(&self, options: ModuleOptions) -> Rc<Module> {
        self.insert(options, ModuleKind::Sub)
    }

    /// Give a registered module its default state
    pub fn init_module<S: Serialize>(
        &self,
        name: &str,
        default_state: &S,
        options: StateOptions,
    ) -> WorkbenchResult<Rc<Module>> {
        let module = self.get_module(name)?;
        module.set_default_state(default_state, options)?;
        Ok(module)
    }

    /// Give a registered sub-module its default state
    pub fn init_sub_module<S: Serialize>(
        &self,
        name: &str,
        default_state: &S,
        options: StateOptions,
    ) -> WorkbenchResult<Rc<Module>> {
        let module = self.get_sub_module(name)?;
        module.set_default_state(default_state, options)?;
        Ok(module)
    }

    pub fn get_module(&self, name: &str) -> WorkbenchResult<Rc<Module>> {
        self.modules
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| WorkbenchError::ModuleNotFound(name.to_string()))
    }

    pub fn get_sub_module(&self, name: &str) -> WorkbenchResult<Rc<Module>> {
        self.sub_modules
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| WorkbenchError::SubModuleNotFound(name.to_string()))
    }

    /// Registered modules in registration order
    pub fn registered_modules(&self) -> Vec<Rc<Module>> {
        self.modules.borrow().values().cloned().collect()
    }

    pub fn registered_sub_modules(&self) -> Vec<Rc<Module>> {
        self.sub_modules.borrow().values().cloned().collect()
    }

    /// Attach every current and future module to `host`
    pub fn attach_host(&self, host: Weak<dyn ModuleHost>) {
        for module in self.registered_modules().into_iter().chain(self.registered_sub_modules()) {
            module.attach_host(host.clone());
        }
        *self.host.borrow_mut() = Some(host);
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.modules.borrow().keys().collect::<Vec<_>>())
            .field("sub_modules", &self.sub_modules.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ImportState, ModuleCategory};
    use serde_json::json;

    #[test]
    fn test_register_and_lookup() {
        let registry = ModuleRegistry::new();
        registry.register_module(ModuleOptions::new("Map", "Map"));
        registry.register_sub_module(
            ModuleOptions::new("WellLog", "Well log").category(ModuleCategory::Sub),
        );

        assert_eq!(registry.get_module("Map").unwrap().kind(), ModuleKind::Main);
        assert_eq!(registry.get_sub_module("WellLog").unwrap().kind(), ModuleKind::Sub);
        assert!(matches!(
            registry.get_module("WellLog"),
            Err(WorkbenchError::ModuleNotFound(_))
        ));
        assert!(matches!(
            registry.get_sub_module("Map"),
            Err(WorkbenchError::SubModuleNotFound(_))
        ));
    }

    #[test]
    fn test_init_unknown_module_fails() {
        let registry = ModuleRegistry::new();
        let err = registry
            .init_module("Missing", &json!({}), StateOptions::new())
            .unwrap_err();
        assert!(err.is_configuration_error());
        assert!(registry
            .init_sub_module("Missing", &json!({}), StateOptions::new())
            .is_err());
    }

    #[test]
    fn test_init_before_instances_starts_import() {
        let registry = ModuleRegistry::new();
        registry.register_module(ModuleOptions::new("Map", "Map"));
        let module = registry
            .init_module("Map", &json!({ "zoom": 1 }), StateOptions::new())
            .unwrap();
        assert!(module.has_default_state());
        assert_eq!(module.import_state(), ImportState::Importing);
    }

    #[test]
    fn test_registration_order_and_replacement() {
        let registry = ModuleRegistry::new();
        registry.register_module(ModuleOptions::new("B", "B"));
        registry.register_module(ModuleOptions::new("A", "A"));
        registry.register_module(ModuleOptions::new("B", "B again"));
        let names: Vec<String> = registry
            .registered_modules()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(registry.get_module("B").unwrap().default_title(), "B again");
    }
}
