//! Lazy per-match instantiation of a module's systems and command handlers,
//! with per-instance error counting and poisoning after too many consecutive
//! failures. This is the registration-order, module-systems phase of a
//! tick -- the caching/poisoning machinery it shares with
//! [`crate::logic_unit::LogicUnitManager`] is the same idea applied to a
//! richer, multi-system unit instead of a single `onTick` function.

use std::collections::HashMap;
use std::sync::RwLock;

use forge_ecs::store::ComponentStore;

use crate::error::ModuleError;
use crate::isolate::run_isolated;
use crate::module::{CommandInvocation, Module};
use crate::registry::ModuleRegistry;

/// Key identifying one running module instance: a module name instantiated
/// for one running match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleRuntimeKey {
    pub match_name: String,
    pub module_name: String,
}

struct ModuleRuntimeState {
    module: Module,
    consecutive_errors: u32,
    poisoned: bool,
}

/// Caches one [`Module`] instance per `(match, module)` pair, lazily built
/// on first tick, and tracks consecutive `onTick` failures so a
/// persistently broken module stops being invoked rather than spamming
/// logs forever.
pub struct ModuleRuntime {
    registry: std::sync::Arc<ModuleRegistry>,
    instances: RwLock<HashMap<ModuleRuntimeKey, ModuleRuntimeState>>,
    /// Consecutive errors before an instance is poisoned. `None` means never
    /// poison -- errors are logged and counted but execution keeps retrying.
    poison_after: Option<u32>,
}

impl ModuleRuntime {
    pub fn new(registry: std::sync::Arc<ModuleRegistry>, poison_after: Option<u32>) -> Self {
        Self { registry, instances: RwLock::new(HashMap::new()), poison_after }
    }

    /// Run every system of the `(match_name, module_name)` instance once, in
    /// registration order, instantiating it from the registry on first use.
    /// A poisoned instance is skipped silently (it was already logged when
    /// it poisoned).
    pub fn on_tick(&self, match_name: &str, module_name: &str, store: &ComponentStore) -> Result<(), ModuleError> {
        {
            let instances = self.instances.read().expect("module runtime lock poisoned");
            if let Some(state) = instances.get(&key(match_name, module_name)) {
                if state.poisoned {
                    return Ok(());
                }
            }
        }

        self.ensure_instantiated(match_name, module_name)?;

        let mut instances = self.instances.write().expect("module runtime lock poisoned");
        let state = instances.get_mut(&key(match_name, module_name)).expect("just ensured instantiation");
        if state.poisoned {
            return Ok(());
        }

        let mut failure = None;
        for (system_name, system) in &state.module.systems {
            if let Err(e) = run_isolated(|| system(store)) {
                tracing::warn!(
                    match_name,
                    module_name,
                    system = system_name.as_str(),
                    error = %e,
                    "module system failed"
                );
                failure = Some(e);
                break;
            }
        }

        self.record_outcome(match_name, module_name, state, failure.map_or(Ok(()), Err))
    }

    /// Run one dequeued command's handler against the `(match_name,
    /// module_name)` instance that owns its schema, instantiating the
    /// instance on first use. A module with a schema but no wired handler,
    /// or a poisoned instance, is a silent no-op.
    pub fn dispatch_command(
        &self,
        match_name: &str,
        module_name: &str,
        command_name: &str,
        store: &ComponentStore,
        invocation: &CommandInvocation,
    ) -> Result<(), ModuleError> {
        {
            let instances = self.instances.read().expect("module runtime lock poisoned");
            if let Some(state) = instances.get(&key(match_name, module_name)) {
                if state.poisoned {
                    return Ok(());
                }
            }
        }

        self.ensure_instantiated(match_name, module_name)?;

        let mut instances = self.instances.write().expect("module runtime lock poisoned");
        let state = instances.get_mut(&key(match_name, module_name)).expect("just ensured instantiation");
        if state.poisoned {
            return Ok(());
        }

        let Some(handler) = state.module.command_handlers.get(command_name).cloned() else {
            return Ok(());
        };

        let result = run_isolated(|| handler(store, invocation));
        if let Err(e) = &result {
            tracing::warn!(match_name, module_name, command = command_name, error = %e, "command handler failed");
        }
        self.record_outcome(match_name, module_name, state, result)
    }

    fn record_outcome(
        &self,
        match_name: &str,
        module_name: &str,
        state: &mut ModuleRuntimeState,
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
                            module_name,
                            consecutive_errors = state.consecutive_errors,
                            "module instance poisoned after repeated failures"
                        );
                    }
                }
                Err(ModuleError::Internal(anyhow::anyhow!(e)))
            }
        }
    }

    fn ensure_instantiated(&self, match_name: &str, module_name: &str) -> Result<(), ModuleError> {
        {
            let instances = self.instances.read().expect("module runtime lock poisoned");
            if instances.contains_key(&key(match_name, module_name)) {
                return Ok(());
            }
        }
        let module = self.registry.instantiate(module_name, match_name)?;
        let mut instances = self.instances.write().expect("module runtime lock poisoned");
        instances.entry(key(match_name, module_name)).or_insert(ModuleRuntimeState {
            module,
            consecutive_errors: 0,
            poisoned: false,
        });
        Ok(())
    }

    /// Drop every instance for a deleted match, releasing its module
    /// references back to the registry.
    pub fn clear_match(&self, match_name: &str) {
        let mut instances = self.instances.write().expect("module runtime lock poisoned");
        instances.retain(|k, _| {
            if k.match_name == match_name {
                self.registry.release(&k.module_name, match_name);
                false
            } else {
                true
            }
        });
    }

    /// Force a single instance to be rebuilt from the registry on its next
    /// tick, e.g. after a module `reload()`.
    pub fn invalidate(&self, match_name: &str, module_name: &str) {
        let mut instances = self.instances.write().expect("module runtime lock poisoned");
        if instances.remove(&key(match_name, module_name)).is_some() {
            self.registry.release(module_name, match_name);
        }
    }

    pub fn is_poisoned(&self, match_name: &str, module_name: &str) -> bool {
        self.instances
            .read()
            .expect("module runtime lock poisoned")
            .get(&key(match_name, module_name))
            .map(|s| s.poisoned)
            .unwrap_or(false)
    }
}

fn key(match_name: &str, module_name: &str) -> ModuleRuntimeKey {
    ModuleRuntimeKey { match_name: match_name.to_owned(), module_name: module_name.to_owned() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn failing_module() -> Module {
        Module::new("broken").with_system("always_fails", |_store: &ComponentStore| {
            Err(anyhow::anyhow!("boom"))
        })
    }

    fn ok_module() -> Module {
        Module::new("fine").with_system("noop", |_store: &ComponentStore| Ok(()))
    }

    #[test]
    fn lazy_instantiation_happens_once() {
        let registry = Arc::new(ModuleRegistry::new());
        registry.register_factory("fine", Arc::new(ok_module)).unwrap();
        let runtime = ModuleRuntime::new(registry, None);
        let store = ComponentStore::new(4, 4);
        runtime.on_tick("m1", "fine", &store).unwrap();
        runtime.on_tick("m1", "fine", &store).unwrap();
    }

    #[test]
    fn poisons_after_consecutive_failures() {
        let registry = Arc::new(ModuleRegistry::new());
        registry.register_factory("broken", Arc::new(failing_module)).unwrap();
        let runtime = ModuleRuntime::new(registry, Some(2));
        let store = ComponentStore::new(4, 4);

        assert!(runtime.on_tick("m1", "broken", &store).is_err());
        assert!(!runtime.is_poisoned("m1", "broken"));
        assert!(runtime.on_tick("m1", "broken", &store).is_err());
        assert!(runtime.is_poisoned("m1", "broken"));

        // Poisoned instances no longer run (and no longer error).
        assert!(runtime.on_tick("m1", "broken", &store).is_ok());
    }

    #[test]
    fn panicking_system_is_isolated_like_an_error() {
        let registry = Arc::new(ModuleRegistry::new());
        registry
            .register_factory(
                "panicky",
                Arc::new(|| {
                    Module::new("panicky")
                        .with_system("trips", |_store: &ComponentStore| panic!("system exploded"))
                }),
            )
            .unwrap();
        let runtime = ModuleRuntime::new(registry, Some(1));
        let store = ComponentStore::new(4, 4);

        let err = runtime.on_tick("m1", "panicky", &store).unwrap_err();
        assert!(matches!(err, ModuleError::Internal(_)));
        assert!(runtime.is_poisoned("m1", "panicky"));
        // Poisoned after one failure; the runtime itself is still usable.
        assert!(runtime.on_tick("m1", "panicky", &store).is_ok());
    }

    #[test]
    fn clear_match_releases_registry_reference() {
        let registry = Arc::new(ModuleRegistry::new());
        registry.register_factory("fine", Arc::new(ok_module)).unwrap();
        let runtime = ModuleRuntime::new(registry.clone(), None);
        let store = ComponentStore::new(4, 4);
        runtime.on_tick("m1", "fine", &store).unwrap();

        runtime.clear_match("m1");
        registry.unregister("fine").unwrap();
    }
}
