//! Point-in-time snapshots of a match's component state, optionally
//! filtered down to what one player can see.

use forge_ecs::entity::EntityId;
use forge_ecs::store::ComponentStore;
use forge_module::registry::ModuleRegistry;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// One component's values, parallel to its module's `entity_ids`: index `i`
/// here is entity `entity_ids[i]`. A `NaN` entry means that entity has no
/// value for this component, and is carried across the wire rather than
/// dropped, so receivers can tell "no value" apart from "value is zero".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSnapshot {
    pub name: String,
    pub values: Vec<f32>,
}

/// One module's slice of a snapshot: the entity ordering shared by every
/// one of its components' value arrays, plus each component's current
/// values in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSnapshot {
    pub name: String,
    pub entity_ids: Vec<u64>,
    pub components: Vec<ComponentSnapshot>,
}

/// A full or player-filtered snapshot of a match at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub match_id: String,
    pub tick: u64,
    pub modules: Vec<ModuleSnapshot>,
}

/// The name every module publishes its ownership marker component under,
/// when it wants entities to be filterable by owning player.
pub const OWNER_COMPONENT_NAME: &str = "owner";

/// Builds [`MatchSnapshot`]s for a match's enabled modules against its
/// live component store.
pub struct SnapshotProvider<'a> {
    modules: &'a ModuleRegistry,
}

impl<'a> SnapshotProvider<'a> {
    pub fn new(modules: &'a ModuleRegistry) -> Self {
        Self { modules }
    }

    /// Capture every entity's values for every enabled module's published
    /// components.
    pub fn for_match(
        &self,
        match_id: &str,
        tick: u64,
        enabled_modules: &[String],
        store: &ComponentStore,
    ) -> Result<MatchSnapshot, EngineError> {
        self.build(match_id, tick, enabled_modules, store, None)
    }

    /// As [`for_match`](Self::for_match), but entities are kept only when
    /// their `owner` component value equals `owner_entity`'s id -- i.e.
    /// they belong to whichever entity the requesting player is bound to.
    pub fn for_match_and_player(
        &self,
        match_id: &str,
        tick: u64,
        enabled_modules: &[String],
        store: &ComponentStore,
        owner_entity: EntityId,
    ) -> Result<MatchSnapshot, EngineError> {
        self.build(match_id, tick, enabled_modules, store, Some(owner_entity))
    }

    fn build(
        &self,
        match_id: &str,
        tick: u64,
        enabled_modules: &[String],
        store: &ComponentStore,
        owner_filter: Option<EntityId>,
    ) -> Result<MatchSnapshot, EngineError> {
        let entities = store.all_entities();
        let owner_cid = enabled_modules
            .iter()
            .find_map(|module_name| {
                let module = self.modules.peek(module_name).ok()?;
                module
                    .components
                    .iter()
                    .find(|c| c.name == OWNER_COMPONENT_NAME)
                    .map(|c| c.cid)
            });

        let visible: Vec<EntityId> = match (owner_filter, owner_cid) {
            (Some(owner), Some(owner_cid)) => entities
                .into_iter()
                .filter(|&id| store.get(id, owner_cid) as u64 == owner.raw())
                .collect(),
            (Some(_), None) => Vec::new(),
            (None, _) => entities,
        };

        let entity_ids: Vec<u64> = visible.iter().map(|id| id.raw()).collect();

        let mut modules = Vec::new();
        for module_name in enabled_modules {
            let module = self.modules.peek(module_name)?;
            let mut components = Vec::new();
            for entry in &module.components {
                let values: Vec<f32> = visible.iter().map(|&id| store.get(id, entry.cid)).collect();
                components.push(ComponentSnapshot { name: entry.name.clone(), values });
            }
            modules.push(ModuleSnapshot { name: module_name.clone(), entity_ids: entity_ids.clone(), components });
        }

        Ok(MatchSnapshot { match_id: match_id.to_owned(), tick, modules })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_ecs::entity::ComponentId;
    use forge_module::module::Module;
    use forge_module::schema::ComponentManifestEntry;
    use std::sync::Arc;

    fn registry_with_physics() -> ModuleRegistry {
        let registry = ModuleRegistry::new();
        registry
            .register_factory(
                "physics",
                Arc::new(|| {
                    Module::new("physics")
                        .with_component(ComponentManifestEntry { name: "x".to_owned(), cid: ComponentId::new(0) })
                        .with_component(ComponentManifestEntry {
                            name: OWNER_COMPONENT_NAME.to_owned(),
                            cid: ComponentId::new(1),
                        })
                }),
            )
            .unwrap();
        registry
    }

    #[test]
    fn for_match_includes_every_entity() {
        let registry = registry_with_physics();
        let store = ComponentStore::new(8, 4);
        store.attach(EntityId::new(1), ComponentId::new(0), 1.0).unwrap();
        store.attach(EntityId::new(2), ComponentId::new(0), 2.0).unwrap();

        let provider = SnapshotProvider::new(&registry);
        let snapshot = provider
            .for_match("m1", 7, &["physics".to_owned()], &store)
            .unwrap();

        assert_eq!(snapshot.tick, 7);
        assert_eq!(snapshot.modules[0].entity_ids, vec![1, 2]);
        let x = &snapshot.modules[0].components[0];
        assert_eq!(x.values, vec![1.0, 2.0]);
    }

    #[test]
    fn for_match_and_player_filters_by_owner_component() {
        let registry = registry_with_physics();
        let store = ComponentStore::new(8, 4);
        store.attach(EntityId::new(1), ComponentId::new(0), 1.0).unwrap();
        store.attach(EntityId::new(1), ComponentId::new(1), 100.0).unwrap();
        store.attach(EntityId::new(2), ComponentId::new(0), 2.0).unwrap();
        store.attach(EntityId::new(2), ComponentId::new(1), 200.0).unwrap();

        let provider = SnapshotProvider::new(&registry);
        let snapshot = provider
            .for_match_and_player("m1", 7, &["physics".to_owned()], &store, EntityId::new(100))
            .unwrap();

        assert_eq!(snapshot.modules[0].entity_ids, vec![1]);
        let x = &snapshot.modules[0].components[0];
        assert_eq!(x.values, vec![1.0]);
    }

    #[test]
    fn absent_values_are_nan_not_dropped() {
        let registry = registry_with_physics();
        let store = ComponentStore::new(8, 4);
        store.attach(EntityId::new(1), ComponentId::new(0), 1.0).unwrap();
        store.create_entity(EntityId::new(2)).unwrap();

        let provider = SnapshotProvider::new(&registry);
        let snapshot = provider.for_match("m1", 1, &["physics".to_owned()], &store).unwrap();

        assert_eq!(snapshot.modules[0].entity_ids, vec![1, 2]);
        let x = &snapshot.modules[0].components[0];
        assert_eq!(x.values[0], 1.0);
        assert!(x.values[1].is_nan());
    }
}
