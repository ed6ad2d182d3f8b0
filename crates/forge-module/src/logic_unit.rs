//! Logic units: named, per-match objects built from a factory that run a
//! single `onTick` callback every tick, independently of and after the
//! enabled modules' systems. Unlike a [`Module`](crate::module::Module) a
//! logic unit publishes no components and no commands -- it only computes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use forge_ecs::store::ComponentStore;

use crate::error::ModuleError;
use crate::isolate::run_isolated;

/// A per-tick function over the [`ComponentStore`], same shape as a
/// module's [`SystemFn`](crate::module::SystemFn) but run in its own phase.
pub type LogicUnitFn = Arc<dyn Fn(&ComponentStore) -> Result<(), anyhow::Error> + Send + Sync>;

/// One named logic unit instance.
pub struct LogicUnit {
    pub name: String,
    pub on_tick: LogicUnitFn,
}

impl LogicUnit {
    pub fn new(name: impl Into<String>, on_tick: impl Fn(&ComponentStore) -> Result<(), anyhow::Error> + Send + Sync + 'static) -> Self {
        Self { name: name.into(), on_tick: Arc::new(on_tick) }
    }
}

/// A factory that produces a fresh [`LogicUnit`] value.
pub type LogicUnitFactory = Arc<dyn Fn() -> LogicUnit + Send + Sync>;

struct Entry {
    factory: LogicUnitFactory,
    referenced_by: std::collections::HashSet<String>,
}

/// The set of logic units a container knows how to instantiate, by name.
/// Unlike [`ModuleRegistry`](crate::registry::ModuleRegistry) there is no
/// cross-unit namespace to police -- a logic unit publishes nothing another
/// unit could collide with.
pub struct LogicUnitRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl LogicUnitRegistry {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    pub fn register_factory(&self, name: impl Into<String>, factory: LogicUnitFactory) -> Result<(), ModuleError> {
        let name = name.into();
        let mut entries = self.entries.write().expect("logic unit registry lock poisoned");
        if entries.contains_key(&name) {
            return Err(ModuleError::Conflict { detail: format!("logic unit '{name}' is already registered") });
        }
        entries.insert(name, Entry { factory, referenced_by: std::collections::HashSet::new() });
        Ok(())
    }

    /// Remove a logic unit's registration ("delete" in the node-facing
    /// surface). Rejected while any match still references it.
    pub fn unregister(&self, name: &str) -> Result<(), ModuleError> {
        let mut entries = self.entries.write().expect("logic unit registry lock poisoned");
        match entries.get(name) {
            None => Err(ModuleError::NotFound { detail: format!("logic unit '{name}' is not registered") }),
            Some(entry) if !entry.referenced_by.is_empty() => Err(ModuleError::Conflict {
                detail: format!("logic unit '{name}' is referenced by {} match(es)", entry.referenced_by.len()),
            }),
            Some(_) => {
                entries.remove(name);
                Ok(())
            }
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.entries.read().expect("logic unit registry lock poisoned").contains_key(name)
    }

    pub fn list(&self) -> Vec<String> {
        self.entries.read().expect("logic unit registry lock poisoned").keys().cloned().collect()
    }

    /// Instantiate a fresh [`LogicUnit`] by name, marking `match_name` as a
    /// referencing match.
    pub fn instantiate(&self, name: &str, match_name: &str) -> Result<LogicUnit, ModuleError> {
        let mut entries = self.entries.write().expect("logic unit registry lock poisoned");
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| ModuleError::NotFound { detail: format!("logic unit '{name}' is not registered") })?;
        entry.referenced_by.insert(match_name.to_owned());
        Ok((entry.factory)())
    }

    /// Drop `match_name`'s reference to `name`, e.g. when the match is
    /// deleted.
    pub fn release(&self, name: &str, match_name: &str) {
        if let Some(entry) = self.entries.write().expect("logic unit registry lock poisoned").get_mut(name) {
            entry.referenced_by.remove(match_name);
        }
    }
}

impl Default for LogicUnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LogicUnitKey {
    match_name: String,
    unit_name: String,
}

struct LogicUnitInstance {
    unit: LogicUnit,
    consecutive_errors: u32,
    poisoned: bool,
}

/// Caches one [`LogicUnit`] instance per `(match, unit)` pair, lazily built
/// on first tick, and poisons it after too many consecutive `onTick`
/// failures -- the same caching shape as
/// [`ModuleRuntime`](crate::module_runtime::ModuleRuntime), applied to a
/// single-callback unit instead of a multi-system module.
pub struct LogicUnitManager {
    registry: Arc<LogicUnitRegistry>,
    instances: RwLock<HashMap<LogicUnitKey, LogicUnitInstance>>,
    poison_after: Option<u32>,
}

impl LogicUnitManager {
    pub fn new(registry: Arc<LogicUnitRegistry>, poison_after: Option<u32>) -> Self {
        Self { registry, instances: RwLock::new(HashMap::new()), poison_after }
    }

    /// Run the `(match_name, unit_name)` logic unit's `onTick` once,
    /// instantiating it from the registry on first use. A poisoned unit is
    /// skipped silently (it was already logged when it poisoned).
    pub fn on_tick(&self, match_name: &str, unit_name: &str, store: &ComponentStore) -> Result<(), ModuleError> {
        {
            let instances = self.instances.read().expect("logic unit manager lock poisoned");
            if let Some(state) = instances.get(&key(match_name, unit_name)) {
                if state.poisoned {
                    return Ok(());
                }
            }
        }

        self.ensure_instantiated(match_name, unit_name)?;

        let mut instances = self.instances.write().expect("logic unit manager lock poisoned");
        let state = instances.get_mut(&key(match_name, unit_name)).expect("just ensured instantiation");
        if state.poisoned {
            return Ok(());
        }

        let result = run_isolated(|| (state.unit.on_tick)(store));
        if let Err(e) = &result {
            tracing::warn!(match_name, unit_name, error = %e, "logic unit failed this tick");
        }
        self.record_outcome(match_name, unit_name, state, result)
    }

    fn record_outcome(
        &self,
        match_name: &str,
        unit_name: &str,
        state: &mut LogicUnitInstance,
        result: Result<(), anyhow::Error>,
    ) -> Result<(), ModuleError> {
        match result {
            Ok(()) => {
                state.consecutive_errors = 0;
                Ok(())
            }
            Err(e) => {
                state.consecutive_errors += 1;
                if let Some(limit) = self.poison_after {
                    if state.consecutive_errors >= limit {
                        state.poisoned = true;
                        tracing::error!(
                            match_name,
                            unit_name,
                            consecutive_errors = state.consecutive_errors,
                            "logic unit poisoned after repeated failures"
                        );
                    }
                }
                Err(ModuleError::Internal(anyhow::anyhow!(e)))
            }
        }
    }

    fn ensure_instantiated(&self, match_name: &str, unit_name: &str) -> Result<(), ModuleError> {
        {
            let instances = self.instances.read().expect("logic unit manager lock poisoned");
            if instances.contains_key(&key(match_name, unit_name)) {
                return Ok(());
            }
        }
        let unit = self.registry.instantiate(unit_name, match_name)?;
        let mut instances = self.instances.write().expect("logic unit manager lock poisoned");
        instances
            .entry(key(match_name, unit_name))
            .or_insert(LogicUnitInstance { unit, consecutive_errors: 0, poisoned: false });
        Ok(())
    }

    /// Drop every logic unit for a deleted match, releasing its registry
    /// references.
    pub fn clear_match(&self, match_name: &str) {
        let mut instances = self.instances.write().expect("logic unit manager lock poisoned");
        instances.retain(|k, _| {
            if k.match_name == match_name {
                self.registry.release(&k.unit_name, match_name);
                false
            } else {
                true
            }
        });
    }

    pub fn is_poisoned(&self, match_name: &str, unit_name: &str) -> bool {
        self.instances
            .read()
            .expect("logic unit manager lock poisoned")
            .get(&key(match_name, unit_name))
            .map(|s| s.poisoned)
            .unwrap_or(false)
    }
}

fn key(match_name: &str, unit_name: &str) -> LogicUnitKey {
    LogicUnitKey { match_name: match_name.to_owned(), unit_name: unit_name.to_owned() }
}
