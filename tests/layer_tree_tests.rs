//! Integration tests for layer trees

use reservoir_workbench::layers::{BaseSetting, ContainerRef, LayerKind, LayerManager, SettingType};
use reservoir_workbench::WorkbenchError;
use serde_json::json;
use std::rc::Rc;

#[test]
fn test_names_stay_unique_across_groups_and_layers() {
    let manager = LayerManager::new();
    let group = manager.insert_group(Some("Surface"), 0);
    assert_eq!(group.name(), "Surface");

    let first = manager
        .insert_layer(LayerKind::Surface, None, ContainerRef::Root, 1)
        .unwrap();
    let second = manager
        .insert_layer(LayerKind::Surface, None, ContainerRef::Group(group.id()), 0)
        .unwrap();
    assert_eq!(first.name(), "Surface (1)");
    assert_eq!(second.name(), "Surface (2)");

    manager.remove_layer(first.id());
    let third = manager
        .insert_layer(LayerKind::Surface, None, ContainerRef::Root, 0)
        .unwrap();
    assert_eq!(third.name(), "Surface (1)");

    assert_eq!(manager.rename_item(third.id(), "Surface (2)").as_deref(), Some("Surface (2) (1)"));
}

#[test]
fn test_group_visibility_is_conjunction_of_its_layers() {
    let manager = LayerManager::new();
    let group = manager.insert_group(None, 0);
    assert_eq!(manager.is_group_visible(group.id()), Some(true));

    let wells = manager
        .insert_layer(LayerKind::Wellbore, None, ContainerRef::Group(group.id()), 0)
        .unwrap();
    let faults = manager
        .insert_layer(LayerKind::FaultPolygon, None, ContainerRef::Group(group.id()), 1)
        .unwrap();
    assert_eq!(manager.is_group_visible(group.id()), Some(true));

    manager.set_layer_visible(faults.id(), false);
    assert_eq!(manager.is_group_visible(group.id()), Some(false));

    manager.set_group_visible(group.id(), true);
    assert!(wells.is_visible() && faults.is_visible());
    manager.set_group_visible(group.id(), false);
    assert!(!wells.is_visible() && !faults.is_visible());
}

#[test]
fn test_move_keeps_the_object_and_its_settings() {
    let manager = LayerManager::new();
    let group = manager.insert_group(Some("Wells"), 0);
    let layer = manager
        .insert_layer(LayerKind::Wellbore, Some("Drilled"), ContainerRef::Root, 1)
        .unwrap();
    let planned = manager
        .insert_layer(LayerKind::Wellbore, Some("Planned"), ContainerRef::Group(group.id()), 0)
        .unwrap();
    let depth = manager
        .attach_setting(layer.id(), BaseSetting::of_type(SettingType::Realization, json!(2)))
        .unwrap();

    assert!(manager.move_item(layer.id(), ContainerRef::Group(group.id()), 0));
    let children = manager.children(ContainerRef::Group(group.id()));
    assert_eq!(children.len(), 2);
    assert!(Rc::ptr_eq(children[0].as_layer().unwrap(), &layer));
    assert_eq!(children[1].id(), planned.id());
    assert_eq!(manager.root_items().len(), 1);

    assert!(manager.move_item(layer.id(), ContainerRef::Root, 0));
    assert_eq!(group.layers().len(), 1);
    assert!(!group.layers().iter().any(|l| Rc::ptr_eq(l, &layer)));
    let roots = manager.root_items();
    assert_eq!(roots.len(), 2);
    assert!(Rc::ptr_eq(roots[0].as_layer().unwrap(), &layer));
    assert_eq!(layer.setting_ids(), vec![depth.id()]);
    assert!(Rc::ptr_eq(&manager.setting(depth.id()).unwrap(), &depth));
    let all = manager.all_layers_recursively();
    assert_eq!(all.iter().filter(|l| Rc::ptr_eq(l, &layer)).count(), 1);

    let nested = manager.insert_group(Some("Nested"), 1);
    assert!(matches!(
        manager.check_move(nested.id(), ContainerRef::Group(group.id())),
        Err(WorkbenchError::InvalidMove(_))
    ));
    assert!(!manager.move_item(nested.id(), ContainerRef::Group(group.id()), 0));
}

#[test]
fn test_settings_resolve_outward_from_the_layer() {
    let manager = LayerManager::new();
    manager
        .insert_setting(
            BaseSetting::of_type(SettingType::Ensemble, json!("iter-0")),
            ContainerRef::Root,
            0,
        )
        .unwrap();
    let group = manager.insert_group(Some("Polygons"), 1);
    let inner = manager
        .insert_setting(
            BaseSetting::of_type(SettingType::Realization, json!(3)),
            ContainerRef::Group(group.id()),
            0,
        )
        .unwrap();
    let layer = manager
        .insert_layer(LayerKind::Polygon, None, ContainerRef::Group(group.id()), 1)
        .unwrap();
    assert!(manager.has_all_required_settings(layer.id()));

    let own = manager
        .attach_setting(layer.id(), BaseSetting::of_type(SettingType::Realization, json!(5)))
        .unwrap();
    let effective = manager.effective_settings(layer.id());
    let realization = effective
        .iter()
        .find(|setting| *setting.setting_type() == SettingType::Realization)
        .unwrap();
    assert!(Rc::ptr_eq(realization, &own));
    assert!(!Rc::ptr_eq(realization, &inner));

    own.set_value(json!(null));
    assert!(!manager.has_all_required_settings(layer.id()));
}
