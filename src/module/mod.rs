// Copyright 2025 Cowboy AI, LLC.

//! # Modules
//!
//! A [`Module`] is a registered capability identified by a unique name; a
//! [`ModuleInstance`] is one running occurrence of it with its own state
//! store, atoms, interface and channels.
//!
//! Module code is loaded lazily through a [`ModuleLoader`]. The import
//! state moves `NotImported -> Importing -> Imported | Failed`; instances are
//! initialised once the module is imported and has a default state.

mod context;
mod definition;
mod import_state;
mod initial_settings;
mod instance;
mod loader;
mod sync_settings;

pub use context::ModuleContext;
pub use definition::{
    AtomsInitializer, Module, ModuleCategory, ModuleDevState, ModuleHost, ModuleKind, ModuleOptions,
};
pub use import_state::{ImportState, ImportTransition};
pub use initial_settings::{InitialSettingKind, InitialSettings};
pub use instance::{ModuleInstance, ModuleInstanceState};
pub use loader::{ModuleInitializer, ModuleLoader, StaticModuleLoader};
pub use sync_settings::SyncSettingKey;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkbenchConfig;
    use crate::errors::WorkbenchError;
    use crate::persistence::{InMemoryStorage, JsonSchemaValidator, KeyValueStorage, SchemaValidator};
    use crate::state_store::StateOptions;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::{Rc, Weak};

    #[derive(Default)]
    struct TestHost {
        storage: Rc<InMemoryStorage>,
        activations: Cell<u32>,
    }

    impl ModuleHost for TestHost {
        fn config(&self) -> WorkbenchConfig {
            WorkbenchConfig::default()
        }

        fn storage(&self) -> Rc<dyn KeyValueStorage> {
            self.storage.clone()
        }

        fn schema_validator(&self) -> Rc<dyn SchemaValidator> {
            Rc::new(JsonSchemaValidator::new())
        }

        fn maybe_make_first_module_instance_active(&self) {
            self.activations.set(self.activations.get() + 1);
        }
    }

    fn attached(options: ModuleOptions, host: &Rc<TestHost>) -> Rc<Module> {
        let module = Module::new(options, ModuleKind::Main);
        let host: Rc<dyn ModuleHost> = host.clone();
        let weak: Weak<dyn ModuleHost> = Rc::downgrade(&host);
        module.attach_host(weak);
        module
    }

    #[test]
    fn test_instance_requires_host() {
        let module = Module::new(ModuleOptions::new("Map", "Map"), ModuleKind::Main);
        assert!(matches!(
            module.make_instance(None),
            Err(WorkbenchError::ModuleNotAttached(_))
        ));
    }

    #[test]
    fn test_first_instance_starts_import() {
        let host = Rc::new(TestHost::default());
        let module = attached(ModuleOptions::new("Map", "Map"), &host);
        assert_eq!(module.import_state(), ImportState::NotImported);

        let first = module.make_instance(None).unwrap();
        let second = module.make_instance(Some("Map-restored".to_string())).unwrap();
        assert_eq!(first.id(), "Map-0");
        assert_eq!(second.id(), "Map-restored");
        assert_eq!(module.import_state(), ImportState::Importing);
        assert_eq!(module.import_transitions().len(), 1);
        assert!(matches!(
            first.get_context(),
            Err(WorkbenchError::ContextNotInitialized(_))
        ));
    }

    #[test]
    fn test_successful_import_initialises_instances() {
        let host = Rc::new(TestHost::default());
        let module = attached(ModuleOptions::new("Map", "Map"), &host);
        let instance = module.make_instance(None).unwrap();

        let notified = Rc::new(Cell::new(0));
        let n = Rc::clone(&notified);
        let _ = instance.subscribe_to_import_state_change(move |state| {
            assert_eq!(*state, ImportState::Imported);
            n.set(n.get() + 1);
        });

        module
            .set_default_state(&json!({ "zoom": 2 }), StateOptions::new())
            .unwrap();
        module.finish_import(Ok(()));

        assert_eq!(notified.get(), 1);
        assert_eq!(host.activations.get(), 1);
        assert!(instance.is_initialised());
        assert_eq!(instance.module_instance_state(), ModuleInstanceState::Ok);
        let context = instance.get_context().unwrap();
        assert_eq!(context.get_value::<i32>("zoom").unwrap(), 2);
    }

    #[test]
    fn test_generated_ids_count_from_zero() {
        let host = Rc::new(TestHost::default());
        let module = attached(ModuleOptions::new("Map", "Map"), &host);
        let ids: Vec<String> = (0..3)
            .map(|_| module.make_instance(None).unwrap().id().to_string())
            .collect();
        assert_eq!(ids, vec!["Map-0", "Map-1", "Map-2"]);
    }

    fn count_imported(instance: &ModuleInstance) -> Rc<Cell<u32>> {
        let imported = Rc::new(Cell::new(0));
        let i = Rc::clone(&imported);
        let _ = instance.subscribe_to_import_state_change(move |state| {
            if *state == ImportState::Imported {
                i.set(i.get() + 1);
            }
        });
        imported
    }

    #[test]
    fn test_successful_import_notifies_every_instance_once() {
        let host = Rc::new(TestHost::default());
        let module = attached(ModuleOptions::new("Map", "Map"), &host);
        let first = module.make_instance(None).unwrap();
        let second = module.make_instance(None).unwrap();
        let first_imported = count_imported(&first);
        let second_imported = count_imported(&second);

        module
            .set_default_state(&json!({ "zoom": 2 }), StateOptions::new())
            .unwrap();
        module.finish_import(Ok(()));

        assert_eq!(first_imported.get(), 1);
        assert_eq!(second_imported.get(), 1);
        assert!(first.is_initialised() && second.is_initialised());
    }

    #[test]
    fn test_failed_import_never_reports_imported() {
        let host = Rc::new(TestHost::default());
        let module = attached(ModuleOptions::new("Grid3D", "Grid 3D"), &host);
        let first = module.make_instance(None).unwrap();
        let second = module.make_instance(None).unwrap();
        let first_imported = count_imported(&first);
        let second_imported = count_imported(&second);

        let failed = Rc::new(Cell::new(0));
        let f = Rc::clone(&failed);
        let _ = first.subscribe_to_import_state_change(move |state| {
            if *state == ImportState::Failed {
                f.set(f.get() + 1);
            }
        });

        module.finish_import(Err(anyhow::anyhow!("chunk missing")));
        assert_eq!(first_imported.get(), 0);
        assert_eq!(second_imported.get(), 0);
        assert_eq!(failed.get(), 1);
        assert!(!first.is_initialised() && !second.is_initialised());
    }

    #[test]
    fn test_failed_import_is_terminal() {
        let host = Rc::new(TestHost::default());
        let module = attached(ModuleOptions::new("Grid3D", "Grid 3D"), &host);
        let instance = module.make_instance(None).unwrap();

        module.finish_import(Err(anyhow::anyhow!("chunk missing")));
        assert_eq!(module.import_state(), ImportState::Failed);
        assert_eq!(instance.import_state(), ImportState::Failed);
        assert!(module.last_load_error().unwrap().contains("chunk missing"));
        assert_eq!(host.activations.get(), 0);

        module.maybe_import_self();
        assert_eq!(module.import_state(), ImportState::Failed);
    }

    #[test]
    fn test_late_default_state_initialises_waiting_instances() {
        let host = Rc::new(TestHost::default());
        let module = attached(ModuleOptions::new("Map", "Map"), &host);
        let instance = module.make_instance(None).unwrap();
        module.finish_import(Ok(()));
        assert!(!instance.is_initialised());

        module
            .set_default_state(&json!({ "zoom": 1 }), StateOptions::new())
            .unwrap();
        assert!(instance.is_initialised());
    }

    #[test]
    fn test_synced_settings_and_reset() {
        let host = Rc::new(TestHost::default());
        let module = attached(
            ModuleOptions::new("Map", "Map").syncable_setting_keys([SyncSettingKey::Ensemble]),
            &host,
        );
        module
            .set_default_state(&json!({ "zoom": 1 }), StateOptions::new())
            .unwrap();
        let instance = module.make_instance(None).unwrap();
        module.finish_import(Ok(()));

        let seen = Rc::new(Cell::new(0usize));
        let s = Rc::clone(&seen);
        let _ = instance.subscribe_to_synced_setting_keys_change(move |keys| s.set(keys.len()));
        instance.add_synced_setting(SyncSettingKey::Ensemble).unwrap();
        assert_eq!(seen.get(), 1);
        assert!(instance.add_synced_setting(SyncSettingKey::Date).is_err());

        let store = instance.state_store().unwrap();
        store.set_value("zoom", 9).unwrap();
        instance.reset().unwrap();
        assert_eq!(instance.state_store().unwrap().get_value::<i32>("zoom").unwrap(), 1);
        assert_eq!(instance.module_instance_state(), ModuleInstanceState::Ok);
    }
}
