// Copyright 2025 Cowboy AI, LLC.

//! Loading a module's code on first use
//!
//! The runtime never knows how code is produced. A [`ModuleLoader`] is
//! asked once per load attempt and either resolves or rejects; while loading
//! it typically calls [`ModuleRegistry::init_module`] to hand the module its
//! default state, interface and serializer. There is no timeout or retry at
//! this layer.

use crate::registry::ModuleRegistry;
use anyhow::anyhow;
use async_trait::async_trait;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Asynchronous provider of module code
#[async_trait(?Send)]
pub trait ModuleLoader {
    /// Load the code of `module_name`, resolving exactly once
    async fn load(&self, module_name: &str, registry: &ModuleRegistry) -> anyhow::Result<()>;
}

/// Code of one module, run when the module is loaded
pub type ModuleInitializer = Box<dyn Fn(&ModuleRegistry) -> anyhow::Result<()>>;

/// Loader backed by initializers linked into the binary
#[derive(Default)]
pub struct StaticModuleLoader {
    initializers: HashMap<String, ModuleInitializer>,
    load_counts: RefCell<HashMap<String, usize>>,
}

impl StaticModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the initializer run when `module_name` is loaded
    pub fn with_module(
        mut self,
        module_name: impl Into<String>,
        initializer: impl Fn(&ModuleRegistry) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.initializers
            .insert(module_name.into(), Box::new(initializer));
        self
    }

    /// How many times `module_name` was asked for
    pub fn load_count(&self, module_name: &str) -> usize {
        self.load_counts
            .borrow()
            .get(module_name)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait(?Send)]
impl ModuleLoader for StaticModuleLoader {
    async fn load(&self, module_name: &str, registry: &ModuleRegistry) -> anyhow::Result<()> {
        *self
            .load_counts
            .borrow_mut()
            .entry(module_name.to_string())
            .or_insert(0) += 1;

        let initializer = self
            .initializers
            .get(module_name)
            .ok_or_else(|| anyhow!("no code linked for module '{module_name}'"))?;
        debug!(module = module_name, "running module initializer");
        initializer(registry)
    }
}

impl fmt::Debug for StaticModuleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticModuleLoader")
            .field("modules", &self.initializers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleOptions;
    use crate::state_store::StateOptions;
    use serde_json::json;

    #[tokio::test]
    async fn test_static_loader_runs_initializer() {
        let registry = ModuleRegistry::new();
        registry.register_module(ModuleOptions::new("Map", "Map"));
        let loader = StaticModuleLoader::new().with_module("Map", |registry| {
            registry.init_module("Map", &json!({ "zoom": 1 }), StateOptions::new())?;
            Ok(())
        });

        loader.load("Map", &registry).await.unwrap();
        assert_eq!(loader.load_count("Map"), 1);
        assert!(registry.get_module("Map").unwrap().has_default_state());
    }

    #[tokio::test]
    async fn test_unknown_module_rejects() {
        let registry = ModuleRegistry::new();
        let loader = StaticModuleLoader::new();
        let err = loader.load("Nope", &registry).await.unwrap_err();
        assert!(err.to_string().contains("Nope"));
        assert_eq!(loader.load_count("Nope"), 1);
    }
}
