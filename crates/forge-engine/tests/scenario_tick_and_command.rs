//! A command enqueued before a tick lands as component state after it.

use std::sync::Arc;

use forge_ecs::entity::{ComponentId, EntityId};
use forge_engine::prelude::*;
use forge_module::module::Module;
use forge_module::schema::{CommandField, CommandSchema, ComponentManifestEntry, ScalarType};
use serde_json::json;

const POSITION_X: ComponentId = ComponentId(10);
const POSITION_Y: ComponentId = ComponentId(11);

fn phys_module() -> Module {
    Module::new("Phys")
        .with_component(ComponentManifestEntry { name: "POSITION_X".to_owned(), cid: POSITION_X })
        .with_component(ComponentManifestEntry { name: "POSITION_Y".to_owned(), cid: POSITION_Y })
        .with_command(CommandSchema {
            name: "move".to_owned(),
            fields: vec![
                CommandField { name: "id".to_owned(), ty: ScalarType::Long },
                CommandField { name: "dx".to_owned(), ty: ScalarType::Double },
                CommandField { name: "dy".to_owned(), ty: ScalarType::Double },
            ],
        })
        .with_command_handler("move", |store, invocation| {
            let id = EntityId::new(invocation.payload["id"].as_u64().expect("id is a long"));
            let dx = invocation.payload["dx"].as_f64().expect("dx is a double") as f32;
            let dy = invocation.payload["dy"].as_f64().expect("dy is a double") as f32;
            let x = store.get(id, POSITION_X);
            let y = store.get(id, POSITION_Y);
            store.attach(id, POSITION_X, if x.is_nan() { 0.0 } else { x } + dx)?;
            store.attach(id, POSITION_Y, if y.is_nan() { 0.0 } else { y } + dy)?;
            Ok(())
        })
}

#[test]
fn enqueued_move_lands_after_one_tick() {
    let container = ContainerManager::new();
    container
        .modules
        .register_factory("Phys", Arc::new(phys_module))
        .unwrap();
    container.start().unwrap();
    container
        .create_match("M1", vec!["Phys".to_owned()], vec![], MatchConfig::default())
        .unwrap();

    container
        .enqueue_command("M1", "p1", "move", json!({"id": 1, "dx": 10.0, "dy": 5.0}).as_object().unwrap().clone())
        .unwrap();
    container.advance("M1").unwrap();

    let snapshot = container.snapshot_for_match("M1").unwrap();
    let phys = snapshot.modules.iter().find(|m| m.name == "Phys").unwrap();
    let x = phys.components.iter().find(|c| c.name == "POSITION_X").unwrap();
    let y = phys.components.iter().find(|c| c.name == "POSITION_Y").unwrap();
    assert_eq!(phys.entity_ids, vec![1]);
    assert_eq!(x.values[0], 10.0);
    assert_eq!(y.values[0], 5.0);
}
