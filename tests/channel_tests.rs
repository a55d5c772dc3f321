//! Integration tests for data channels between module instances

use reservoir_workbench::channels::{
    receive_channel_contents, ChannelDefinition, ChannelKey, ChannelReceiverDefinition, ContentDefinition,
    ContentMetaData, DataElement, GeneratedData, KeyKind,
};
use reservoir_workbench::persistence::{InMemoryStorage, JsonSchemaValidator, KeyValueStorage};
use reservoir_workbench::{ModuleOptions, ModuleRegistry, StaticModuleLoader, Workbench, WorkbenchConfig};
use std::cell::Cell;
use std::rc::Rc;

fn registry() -> Rc<ModuleRegistry> {
    let registry = Rc::new(ModuleRegistry::new());
    registry.register_module(ModuleOptions::new("Inplace", "Inplace volumes").channels(vec![
        ChannelDefinition::new("volumes", "Volumes per realization", KeyKind::Realization),
    ]));
    registry.register_module(ModuleOptions::new("Plot", "Distribution plot").receivers(vec![
        ChannelReceiverDefinition::new("input", "Input", vec![KeyKind::Realization], true),
    ]));
    registry
}

fn workbench(storage: Rc<InMemoryStorage>) -> Rc<Workbench> {
    Workbench::with_backends(
        WorkbenchConfig::default(),
        registry(),
        Rc::new(StaticModuleLoader::new()),
        storage,
        Rc::new(JsonSchemaValidator::new()),
    )
}

fn counted_content(id: &str, calls: &Rc<Cell<u32>>, value: f64) -> ContentDefinition {
    let calls = Rc::clone(calls);
    ContentDefinition::new(id, id.to_uppercase(), move || {
        calls.set(calls.get() + 1);
        GeneratedData {
            data: vec![
                DataElement::new(ChannelKey::Realization(0), value),
                DataElement::new(ChannelKey::Realization(1), value * 2.0),
            ],
            meta_data: ContentMetaData {
                ensemble_ident_string: "case::iter-0".to_string(),
                unit: Some("Sm3".to_string()),
                ..ContentMetaData::default()
            },
        }
    })
}

#[test]
fn test_generator_runs_once_until_published_again() {
    let workbench = workbench(Rc::new(InMemoryStorage::new()));
    let inplace = workbench.make_module_instance("Inplace").unwrap();
    let plot = workbench.make_module_instance("Plot").unwrap();

    let calls = Rc::new(Cell::new(0));
    let channel = inplace.channel_manager().channel("volumes").unwrap();
    channel.replace_contents(vec![counted_content("stoiip", &calls, 10.0)]);

    let receiver = plot.channel_manager().receiver("input").unwrap();
    receiver.subscribe_to_channel(Rc::clone(&channel), vec!["stoiip".to_string()]);

    let first = receive_channel_contents(&receiver, &[KeyKind::Realization]).unwrap();
    let second = receive_channel_contents(&receiver, &[KeyKind::Realization]).unwrap();
    assert_eq!(calls.get(), 1);
    assert_eq!(second.revision_number, first.revision_number + 1);
    let contents = second.channel.unwrap().contents;
    assert_eq!(contents[0].data_array[1].value, 20.0);
    assert_eq!(contents[0].meta_data.unit.as_deref(), Some("Sm3"));

    let content = channel.content("stoiip").unwrap();
    content.publish(Box::new(|| GeneratedData::default()));
    assert!(!content.is_cached());
    let third = receive_channel_contents(&receiver, &[KeyKind::Realization]).unwrap();
    assert!(third.channel.unwrap().contents[0].data_array.is_empty());
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_removing_publisher_drops_receiver_subscription() {
    let workbench = workbench(Rc::new(InMemoryStorage::new()));
    let inplace = workbench.make_module_instance("Inplace").unwrap();
    let plot = workbench.make_module_instance("Plot").unwrap();

    let channel = inplace.channel_manager().channel("volumes").unwrap();
    let receiver = plot.channel_manager().receiver("input").unwrap();
    receiver.subscribe_to_channel(channel, Vec::new());
    assert!(receiver.has_active_subscription());

    assert!(workbench.remove_module_instance(inplace.id()));
    assert!(!receiver.has_active_subscription());
}

#[test]
fn test_receiver_subscriptions_survive_a_restart() {
    let storage = Rc::new(InMemoryStorage::new());
    {
        let workbench = workbench(Rc::clone(&storage));
        let inplace = workbench.make_module_instance("Inplace").unwrap();
        let plot = workbench.make_module_instance("Plot").unwrap();
        let channel = inplace.channel_manager().channel("volumes").unwrap();
        plot.channel_manager()
            .receiver("input")
            .unwrap()
            .subscribe_to_channel(channel, vec!["stoiip".to_string()]);
    }
    assert!(storage.get_item("Plot-0-receivers").unwrap().is_some());

    let workbench = workbench(storage);
    let plot = workbench.restore_module_instance("Plot", "Plot-0").unwrap();
    workbench.restore_module_instance("Inplace", "Inplace-0").unwrap();
    assert_eq!(workbench.apply_persisted_channel_receivers(), 1);

    let receiver = plot.channel_manager().receiver("input").unwrap();
    assert_eq!(receiver.channel().unwrap().module_instance_id(), "Inplace-0");
    assert_eq!(receiver.content_id_strings(), vec!["stoiip".to_string()]);
}
