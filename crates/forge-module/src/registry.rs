//! Registration and lifecycle of [`Module`]s: in-process factories and
//! loaded artifacts, unified behind one name->module map.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use forge_ecs::entity::ComponentId;

use crate::error::ModuleError;
use crate::module::{Module, ModuleFactory};

struct Entry {
    factory: ModuleFactory,
    /// Names of matches currently holding an instantiated copy of this
    /// module. Non-empty means `unregister` must be rejected.
    referenced_by: HashSet<String>,
}

/// The set of modules a container knows how to instantiate.
///
/// Enforces global uniqueness of component ids, component names, and
/// command names across every registered module -- two modules cannot
/// quietly alias the same numeric component id or the same command name.
pub struct ModuleRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    /// Register an in-process factory under `name`. Building one instance
    /// up front to validate the manifest before accepting the registration.
    pub fn register_factory(
        &self,
        name: impl Into<String>,
        factory: ModuleFactory,
    ) -> Result<(), ModuleError> {
        let name = name.into();
        let probe = factory();
        self.check_conflicts(&name, &probe)?;

        let mut entries = self.entries.write().expect("registry lock poisoned");
        if entries.contains_key(&name) {
            return Err(ModuleError::Conflict {
                detail: format!("module '{name}' is already registered"),
            });
        }
        entries.insert(name, Entry { factory, referenced_by: HashSet::new() });
        Ok(())
    }

    /// Replace an already-registered module's factory in place, keeping its
    /// existing match references intact. Used to push a fixed build of a
    /// module without forcing every referencing match to drop it first.
    pub fn reload(&self, name: &str, factory: ModuleFactory) -> Result<(), ModuleError> {
        let probe = factory();
        self.check_conflicts_excluding(name, &probe)?;

        let mut entries = self.entries.write().expect("registry lock poisoned");
        let entry = entries.get_mut(name).ok_or_else(|| ModuleError::NotFound {
            detail: format!("module '{name}' is not registered"),
        })?;
        entry.factory = factory;
        Ok(())
    }

    /// Remove a module's registration. Rejected while any match still
    /// references it.
    pub fn unregister(&self, name: &str) -> Result<(), ModuleError> {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        match entries.get(name) {
            None => Err(ModuleError::NotFound { detail: format!("module '{name}' is not registered") }),
            Some(entry) if !entry.referenced_by.is_empty() => Err(ModuleError::Conflict {
                detail: format!(
                    "module '{name}' is referenced by {} match(es)",
                    entry.referenced_by.len()
                ),
            }),
            Some(_) => {
                entries.remove(name);
                Ok(())
            }
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.entries.read().expect("registry lock poisoned").contains_key(name)
    }

    pub fn list(&self) -> Vec<String> {
        self.entries.read().expect("registry lock poisoned").keys().cloned().collect()
    }

    /// Instantiate a fresh [`Module`] by name, marking `match_name` as a
    /// referencing match so the module cannot be unregistered out from
    /// under it.
    pub fn instantiate(&self, name: &str, match_name: &str) -> Result<Module, ModuleError> {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        let entry = entries.get_mut(name).ok_or_else(|| ModuleError::NotFound {
            detail: format!("module '{name}' is not registered"),
        })?;
        entry.referenced_by.insert(match_name.to_owned());
        Ok((entry.factory)())
    }

    /// Build a module's manifest (component entries, command schemas)
    /// without marking any match as referencing it. Used by callers that
    /// only need to know what a module publishes, such as the snapshot
    /// layer resolving component names to ids.
    pub fn peek(&self, name: &str) -> Result<Module, ModuleError> {
        let entries = self.entries.read().expect("registry lock poisoned");
        let entry = entries.get(name).ok_or_else(|| ModuleError::NotFound {
            detail: format!("module '{name}' is not registered"),
        })?;
        Ok((entry.factory)())
    }

    /// Drop `match_name`'s reference to `name`, e.g. when the match is
    /// deleted or the module's logic unit is released.
    pub fn release(&self, name: &str, match_name: &str) {
        if let Some(entry) = self.entries.write().expect("registry lock poisoned").get_mut(name) {
            entry.referenced_by.remove(match_name);
        }
    }

    fn check_conflicts(&self, new_name: &str, candidate: &Module) -> Result<(), ModuleError> {
        self.check_conflicts_excluding_impl(Some(new_name), candidate, None)
    }

    fn check_conflicts_excluding(&self, existing_name: &str, candidate: &Module) -> Result<(), ModuleError> {
        self.check_conflicts_excluding_impl(None, candidate, Some(existing_name))
    }

    /// Shared uniqueness check. `reject_if_named` rejects outright if a
    /// module with that name already exists (the register path); `skip_name`
    /// excludes one module's own entries from the collision scan (the
    /// reload path, which is allowed to reuse its own prior ids/names).
    fn check_conflicts_excluding_impl(
        &self,
        reject_if_named: Option<&str>,
        candidate: &Module,
        skip_name: Option<&str>,
    ) -> Result<(), ModuleError> {
        let entries = self.entries.read().expect("registry lock poisoned");

        if let Some(name) = reject_if_named {
            if entries.contains_key(name) {
                return Err(ModuleError::Conflict {
                    detail: format!("module '{name}' is already registered"),
                });
            }
        }

        let mut seen_cids: HashMap<ComponentId, &str> = HashMap::new();
        let mut seen_component_names: HashMap<&str, &str> = HashMap::new();
        let mut seen_commands: HashMap<&str, &str> = HashMap::new();

        for (other_name, other_entry) in entries.iter() {
            if Some(other_name.as_str()) == skip_name {
                continue;
            }
            let other = (other_entry.factory)();
            for c in &other.components {
                seen_cids.insert(c.cid, other_name.as_str());
                seen_component_names.insert(c.name.as_str(), other_name.as_str());
            }
            for cmd in &other.commands {
                seen_commands.insert(cmd.name.as_str(), other_name.as_str());
            }
        }

        for c in &candidate.components {
            if let Some(owner) = seen_cids.get(&c.cid) {
                return Err(ModuleError::Conflict {
                    detail: format!("component id {:?} already used by module '{owner}'", c.cid),
                });
            }
            if let Some(owner) = seen_component_names.get(c.name.as_str()) {
                return Err(ModuleError::Conflict {
                    detail: format!("component name '{}' already used by module '{owner}'", c.name),
                });
            }
        }
        for cmd in &candidate.commands {
            if let Some(owner) = seen_commands.get(cmd.name.as_str()) {
                return Err(ModuleError::Conflict {
                    detail: format!("command '{}' already registered by module '{owner}'", cmd.name),
                });
            }
        }

        Ok(())
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CommandField, CommandSchema, ComponentManifestEntry, ScalarType};
    use std::sync::Arc;

    fn module_with(name: &str, cid: u64, command: Option<&str>) -> Module {
        let mut m = Module::new(name).with_component(ComponentManifestEntry {
            name: format!("{name}.pos"),
            cid: ComponentId::new(cid),
        });
        if let Some(cmd) = command {
            m = m.with_command(CommandSchema {
                name: cmd.to_owned(),
                fields: vec![CommandField { name: "x".to_owned(), ty: ScalarType::Float }],
            });
        }
        m
    }

    #[test]
    fn register_and_instantiate() {
        let registry = ModuleRegistry::new();
        registry
            .register_factory("physics", Arc::new(|| module_with("physics", 0, Some("push"))))
            .unwrap();
        assert!(registry.exists("physics"));
        let instance = registry.instantiate("physics", "match-1").unwrap();
        assert_eq!(instance.name, "physics");
    }

    #[test]
    fn duplicate_component_id_rejected() {
        let registry = ModuleRegistry::new();
        registry.register_factory("a", Arc::new(|| module_with("a", 0, None))).unwrap();
        let err = registry
            .register_factory("b", Arc::new(|| module_with("b", 0, None)))
            .unwrap_err();
        assert_eq!(err.kind(), "Conflict");
    }

    #[test]
    fn duplicate_command_name_rejected() {
        let registry = ModuleRegistry::new();
        registry
            .register_factory("a", Arc::new(|| module_with("a", 0, Some("fire"))))
            .unwrap();
        let err = registry
            .register_factory("b", Arc::new(|| module_with("b", 1, Some("fire"))))
            .unwrap_err();
        assert_eq!(err.kind(), "Conflict");
    }

    #[test]
    fn unregister_blocked_while_referenced() {
        let registry = ModuleRegistry::new();
        registry.register_factory("physics", Arc::new(|| module_with("physics", 0, None))).unwrap();
        registry.instantiate("physics", "match-1").unwrap();
        let err = registry.unregister("physics").unwrap_err();
        assert_eq!(err.kind(), "Conflict");

        registry.release("physics", "match-1");
        registry.unregister("physics").unwrap();
        assert!(!registry.exists("physics"));
    }

    #[test]
    fn reload_keeps_references_and_allows_reusing_own_ids() {
        let registry = ModuleRegistry::new();
        registry.register_factory("physics", Arc::new(|| module_with("physics", 0, None))).unwrap();
        registry.instantiate("physics", "match-1").unwrap();
        registry.reload("physics", Arc::new(|| module_with("physics", 0, None))).unwrap();
        assert!(registry.exists("physics"));
    }

    #[test]
    fn unregister_missing_module_not_found() {
        let registry = ModuleRegistry::new();
        let err = registry.unregister("ghost").unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }
}
