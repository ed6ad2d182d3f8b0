//! A container: one isolated simulation host owning its own module
//! registry, match registry, player registry, and a running tick pipeline
//! per match.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use forge_ecs::entity::EntityId;
use forge_ecs::store::ComponentStore;
use forge_module::logic_unit::{LogicUnitManager, LogicUnitRegistry};
use forge_module::module_runtime::ModuleRuntime;
use forge_module::registry::ModuleRegistry;
use serde_json::{Map, Value};

use crate::command::{CommandQueue, CommandResolver};
use crate::error::EngineError;
use crate::history::{SnapshotDelta, SnapshotHistory};
use crate::match_registry::MatchRegistry;
use crate::player::{PlayerRegistry, SessionState};
use crate::resource::ResourceStore;
use crate::snapshot::{MatchSnapshot, SnapshotProvider};
use crate::tick::{GameLoop, TickDiagnostics, TickScheduler};

/// A container's lifecycle. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Stopped,
}

/// Per-match knobs a caller supplies at `create_match` time.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub max_entities: usize,
    pub max_components: usize,
    pub max_commands_per_tick: usize,
    pub max_snapshots: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_entities: 65_536,
            max_components: 256,
            max_commands_per_tick: 1_024,
            max_snapshots: 300,
        }
    }
}

/// Per-match slice of a [`ContainerManager::stats`] snapshot.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MatchStats {
    pub match_name: String,
    pub tick: u64,
    pub entity_count: usize,
    pub command_queue_depth: usize,
}

/// A point-in-time view of container occupancy, grounded in the same
/// counters `heartbeat`/`drain` already track at the node level.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContainerStats {
    pub state: String,
    pub match_count: usize,
    pub player_count: usize,
    pub connected_session_count: usize,
    pub matches: Vec<MatchStats>,
}

/// Per-match slice of a [`ContainerManager::metrics`] snapshot.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MatchMetrics {
    pub match_name: String,
    #[serde(with = "duration_millis")]
    pub last_tick_duration: Duration,
    pub per_system_duration_ms: Vec<(String, u128)>,
    pub per_logic_unit_duration_ms: Vec<(String, u128)>,
    pub commands_processed_total: u64,
    pub commands_failed_total: u64,
}

/// Tick timing and command-processing counters for every running match.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContainerMetrics {
    pub matches: Vec<MatchMetrics>,
}

mod duration_millis {
    use std::time::Duration;

    pub fn serialize<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }
}

struct MatchRuntime {
    component_store: Arc<ComponentStore>,
    command_queue: Arc<CommandQueue>,
    resolver: Arc<CommandResolver>,
    tick_scheduler: Arc<TickScheduler>,
    snapshot_history: Arc<SnapshotHistory>,
    enabled_modules: Vec<String>,
}

/// Owns one simulation host's worth of state: its own module registry,
/// logic-unit registry, match registry, player registry, resources, and a
/// [`MatchRuntime`] per running match. Structural operations (creating or
/// deleting a match, registering or unregistering a module) are serialized
/// through `structural_lock` so two racing callers can't half-apply each
/// other's changes.
pub struct ContainerManager {
    pub modules: Arc<ModuleRegistry>,
    pub logic_units: Arc<LogicUnitRegistry>,
    pub matches: Arc<MatchRegistry>,
    pub players: Arc<PlayerRegistry>,
    pub resources: Arc<ResourceStore>,
    module_runtime: Arc<ModuleRuntime>,
    logic_unit_manager: Arc<LogicUnitManager>,
    state: RwLock<ContainerState>,
    runtimes: RwLock<HashMap<String, MatchRuntime>>,
    structural_lock: Mutex<()>,
}

impl ContainerManager {
    /// A container whose module instances and logic units never poison on
    /// repeated failures (they're logged and retried every tick).
    pub fn new() -> Self {
        Self::with_poison_after(None)
    }

    /// A container whose every module instance and logic unit poisons
    /// after `poison_after` consecutive failures, per match.
    pub fn with_poison_after(poison_after: Option<u32>) -> Self {
        let modules = Arc::new(ModuleRegistry::new());
        let logic_units = Arc::new(LogicUnitRegistry::new());
        Self {
            module_runtime: Arc::new(ModuleRuntime::new(modules.clone(), poison_after)),
            logic_unit_manager: Arc::new(LogicUnitManager::new(logic_units.clone(), poison_after)),
            modules,
            logic_units,
            matches: Arc::new(MatchRegistry::new()),
            players: Arc::new(PlayerRegistry::new()),
            resources: Arc::new(ResourceStore::new()),
            state: RwLock::new(ContainerState::Created),
            runtimes: RwLock::new(HashMap::new()),
            structural_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> ContainerState {
        *self.state.read().expect("container state lock poisoned")
    }

    pub fn start(&self) -> Result<(), EngineError> {
        let mut state = self.state.write().expect("container state lock poisoned");
        match *state {
            ContainerState::Created | ContainerState::Paused => {
                *state = ContainerState::Running;
                Ok(())
            }
            other => Err(EngineError::InvalidState {
                detail: format!("cannot start a container in state {other:?}"),
            }),
        }
    }

    pub fn pause(&self) -> Result<(), EngineError> {
        let mut state = self.state.write().expect("container state lock poisoned");
        if *state != ContainerState::Running {
            return Err(EngineError::InvalidState {
                detail: format!("cannot pause a container in state {:?}", *state),
            });
        }
        *state = ContainerState::Paused;
        Ok(())
    }

    /// Stop the container permanently. Idempotent if already stopped.
    pub fn stop(&self) -> Result<(), EngineError> {
        let mut state = self.state.write().expect("container state lock poisoned");
        if *state == ContainerState::Stopped {
            return Ok(());
        }
        *state = ContainerState::Stopped;
        drop(state);
        for (_, runtime) in self.runtimes.write().expect("runtime map lock poisoned").drain() {
            let _ = runtime.tick_scheduler.stop_auto();
        }
        Ok(())
    }

    fn ensure_not_stopped(&self) -> Result<(), EngineError> {
        if self.state() == ContainerState::Stopped {
            return Err(EngineError::InvalidState { detail: "container is stopped".to_owned() });
        }
        Ok(())
    }

    pub fn create_match(
        &self,
        match_name: &str,
        enabled_modules: Vec<String>,
        enabled_logic_units: Vec<String>,
        config: MatchConfig,
    ) -> Result<(), EngineError> {
        self.ensure_not_stopped()?;
        let _guard = self.structural_lock.lock().expect("structural lock poisoned");

        self.matches.create(
            match_name,
            enabled_modules.clone(),
            enabled_logic_units.clone(),
            &self.modules,
            &self.logic_units,
        )?;

        let component_store = Arc::new(ComponentStore::new(config.max_entities, config.max_components));

        let mut schemas = Vec::new();
        for module_name in &enabled_modules {
            let module = self.modules.peek(module_name)?;
            schemas.extend(module.commands.into_iter().map(|schema| (module_name.clone(), schema)));
        }
        let resolver = Arc::new(CommandResolver::new(schemas));
        let command_queue = Arc::new(CommandQueue::new(config.max_commands_per_tick));
        let snapshot_history = Arc::new(SnapshotHistory::new(config.max_snapshots));

        let history_for_hook = snapshot_history.clone();
        let modules_for_hook = self.modules.clone();
        let store_for_hook = component_store.clone();
        let match_name_owned = match_name.to_owned();
        let enabled_for_hook = enabled_modules.clone();
        let on_tick_complete: Arc<dyn Fn(u64) + Send + Sync> = Arc::new(move |tick| {
            let provider = SnapshotProvider::new(&modules_for_hook);
            match provider.for_match(&match_name_owned, tick, &enabled_for_hook, &store_for_hook) {
                Ok(snapshot) => history_for_hook.record(snapshot),
                Err(e) => tracing::warn!(match_name = match_name_owned.as_str(), error = %e, "auto-snapshot failed"),
            }
        });

        let game_loop = Arc::new(
            GameLoop::new(
                match_name,
                component_store.clone(),
                enabled_modules.clone(),
                self.module_runtime.clone(),
                enabled_logic_units,
                self.logic_unit_manager.clone(),
                command_queue.clone(),
                resolver.clone(),
            )
            .with_on_tick_complete(on_tick_complete),
        );
        let tick_scheduler = Arc::new(TickScheduler::new(game_loop));

        self.runtimes.write().expect("runtime map lock poisoned").insert(
            match_name.to_owned(),
            MatchRuntime {
                component_store,
                command_queue,
                resolver,
                tick_scheduler,
                snapshot_history,
                enabled_modules,
            },
        );
        Ok(())
    }

    pub fn delete_match(&self, match_name: &str) -> Result<(), EngineError> {
        self.ensure_not_stopped()?;
        let _guard = self.structural_lock.lock().expect("structural lock poisoned");

        self.matches.delete(match_name)?;
        self.module_runtime.clear_match(match_name);
        self.logic_unit_manager.clear_match(match_name);
        if let Some(runtime) = self.runtimes.write().expect("runtime map lock poisoned").remove(match_name) {
            let _ = runtime.tick_scheduler.stop_auto();
        }
        Ok(())
    }

    fn runtime(&self, match_name: &str) -> Result<Arc<TickScheduler>, EngineError> {
        self.runtimes
            .read()
            .expect("runtime map lock poisoned")
            .get(match_name)
            .map(|r| r.tick_scheduler.clone())
            .ok_or_else(|| EngineError::NotFound { detail: format!("match '{match_name}' has no runtime") })
    }

    pub fn advance(&self, match_name: &str) -> Result<u64, EngineError> {
        self.runtime(match_name)?.advance()
    }

    pub fn start_auto(&self, match_name: &str, interval: Duration) -> Result<(), EngineError> {
        self.runtime(match_name)?.start_auto(interval)
    }

    pub fn stop_auto(&self, match_name: &str) -> Result<(), EngineError> {
        self.runtime(match_name)?.stop_auto()
    }

    fn ensure_match_exists(&self, match_name: &str) -> Result<(), EngineError> {
        if self.matches.exists(match_name) {
            Ok(())
        } else {
            Err(EngineError::NotFound { detail: format!("match '{match_name}' does not exist") })
        }
    }

    /// Open a session for `(match_name, player_id)`. Rejected if the match
    /// does not exist.
    pub fn connect(&self, match_name: &str, player_id: &str) -> Result<(), EngineError> {
        self.ensure_match_exists(match_name)?;
        self.players.connect(match_name, player_id)
    }

    pub fn disconnect(&self, match_name: &str, player_id: &str) -> Result<(), EngineError> {
        self.ensure_match_exists(match_name)?;
        self.players.disconnect(match_name, player_id)
    }

    pub fn reconnect(&self, match_name: &str, player_id: &str) -> Result<(), EngineError> {
        self.ensure_match_exists(match_name)?;
        self.players.reconnect(match_name, player_id)
    }

    pub fn abandon(&self, match_name: &str, player_id: &str) -> Result<(), EngineError> {
        self.ensure_match_exists(match_name)?;
        self.players.abandon(match_name, player_id)
    }

    pub fn session_state(&self, match_name: &str, player_id: &str) -> Result<SessionState, EngineError> {
        self.ensure_match_exists(match_name)?;
        self.players.session_state(match_name, player_id)
    }

    /// List every logic unit enabled on `match_name`.
    pub fn list_logic_units(&self, match_name: &str) -> Result<Vec<String>, EngineError> {
        Ok(self.matches.get(match_name)?.enabled_logic_units)
    }

    /// Remove a logic unit from the registry. Rejected while any match
    /// still has it enabled.
    pub fn delete_logic_unit(&self, name: &str) -> Result<(), EngineError> {
        Ok(self.logic_units.unregister(name)?)
    }

    pub fn enqueue_command(
        &self,
        match_name: &str,
        producer_id: &str,
        command_name: &str,
        payload: Map<String, Value>,
    ) -> Result<(), EngineError> {
        let runtimes = self.runtimes.read().expect("runtime map lock poisoned");
        let runtime = runtimes
            .get(match_name)
            .ok_or_else(|| EngineError::NotFound { detail: format!("match '{match_name}' has no runtime") })?;
        runtime.command_queue.enqueue(&runtime.resolver, producer_id, command_name, payload)
    }

    pub fn snapshot_for_match(&self, match_name: &str) -> Result<MatchSnapshot, EngineError> {
        let runtimes = self.runtimes.read().expect("runtime map lock poisoned");
        let runtime = runtimes
            .get(match_name)
            .ok_or_else(|| EngineError::NotFound { detail: format!("match '{match_name}' has no runtime") })?;
        let provider = SnapshotProvider::new(&self.modules);
        provider.for_match(
            match_name,
            runtime.tick_scheduler.current_tick(),
            &runtime.enabled_modules,
            &runtime.component_store,
        )
    }

    pub fn snapshot_for_match_and_player(&self, match_name: &str, player_id: &str) -> Result<MatchSnapshot, EngineError> {
        let owner_entity = self
            .players
            .owned_entity(player_id)?
            .ok_or_else(|| EngineError::InvalidState { detail: format!("player '{player_id}' is not bound to an entity") })?;

        let runtimes = self.runtimes.read().expect("runtime map lock poisoned");
        let runtime = runtimes
            .get(match_name)
            .ok_or_else(|| EngineError::NotFound { detail: format!("match '{match_name}' has no runtime") })?;
        let provider = SnapshotProvider::new(&self.modules);
        provider.for_match_and_player(
            match_name,
            runtime.tick_scheduler.current_tick(),
            &runtime.enabled_modules,
            &runtime.component_store,
            owner_entity,
        )
    }

    pub fn snapshot_history(&self, match_name: &str) -> Result<Arc<SnapshotHistory>, EngineError> {
        self.runtimes
            .read()
            .expect("runtime map lock poisoned")
            .get(match_name)
            .map(|r| r.snapshot_history.clone())
            .ok_or_else(|| EngineError::NotFound { detail: format!("match '{match_name}' has no runtime") })
    }

    pub fn snapshot_delta(&self, match_name: &str, from_tick: u64, to_tick: u64) -> Result<SnapshotDelta, EngineError> {
        self.snapshot_history(match_name)?.delta(from_tick, to_tick)
    }

    pub fn component_store(&self, match_name: &str) -> Result<Arc<ComponentStore>, EngineError> {
        self.runtimes
            .read()
            .expect("runtime map lock poisoned")
            .get(match_name)
            .map(|r| r.component_store.clone())
            .ok_or_else(|| EngineError::NotFound { detail: format!("match '{match_name}' has no runtime") })
    }

    pub fn create_entity(&self, match_name: &str, entity: EntityId) -> Result<(), EngineError> {
        Ok(self.component_store(match_name)?.create_entity(entity)?)
    }

    pub fn delete_entity(&self, match_name: &str, entity: EntityId) -> Result<(), EngineError> {
        self.component_store(match_name)?.delete_entity(entity);
        Ok(())
    }

    pub fn stats(&self) -> ContainerStats {
        let runtimes = self.runtimes.read().expect("runtime map lock poisoned");
        let matches = runtimes
            .iter()
            .map(|(name, runtime)| MatchStats {
                match_name: name.clone(),
                tick: runtime.tick_scheduler.current_tick(),
                entity_count: runtime.component_store.entity_count(),
                command_queue_depth: runtime.command_queue.len(),
            })
            .collect();
        ContainerStats {
            state: format!("{:?}", self.state()),
            match_count: runtimes.len(),
            player_count: self.players.count(),
            connected_session_count: self.players.connected_count(),
            matches,
        }
    }

    pub fn metrics(&self) -> ContainerMetrics {
        let runtimes = self.runtimes.read().expect("runtime map lock poisoned");
        let matches = runtimes
            .iter()
            .map(|(name, runtime)| {
                let diag: TickDiagnostics = runtime.tick_scheduler.diagnostics();
                MatchMetrics {
                    match_name: name.clone(),
                    last_tick_duration: diag.total_time,
                    per_system_duration_ms: diag.system_times.into_iter().map(|(n, d)| (n, d.as_millis())).collect(),
                    per_logic_unit_duration_ms: diag
                        .logic_unit_times
                        .into_iter()
                        .map(|(n, d)| (n, d.as_millis()))
                        .collect(),
                    commands_processed_total: diag.commands_processed_total,
                    commands_failed_total: diag.commands_failed_total,
                }
            })
            .collect();
        ContainerMetrics { matches }
    }
}

impl Default for ContainerManager {
    fn default() -> Self {
        Self::new()
    }
}
