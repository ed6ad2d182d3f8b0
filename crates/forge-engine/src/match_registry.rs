//! Registry of running matches and which modules each one has enabled.

use std::collections::HashMap;
use std::sync::RwLock;

use forge_module::logic_unit::LogicUnitRegistry;
use forge_module::registry::ModuleRegistry;

use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct MatchRecord {
    pub name: String,
    pub enabled_modules: Vec<String>,
    pub enabled_logic_units: Vec<String>,
}

/// Tracks which matches exist and which modules each has enabled.
///
/// Does not itself own the cascading cleanup a deletion implies (dropping
/// sessions, invalidating logic units, clearing snapshot history) --
/// that's [`crate::container::ContainerManager`]'s job, since it's the one
/// holding references to every other component a match touches.
pub struct MatchRegistry {
    matches: RwLock<HashMap<String, MatchRecord>>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self { matches: RwLock::new(HashMap::new()) }
    }

    /// Create a match, enabling the given modules and logic units. Fails if
    /// any named module or logic unit is not known to its respective
    /// registry, or if the match name is taken.
    pub fn create(
        &self,
        name: &str,
        enabled_modules: Vec<String>,
        enabled_logic_units: Vec<String>,
        modules: &ModuleRegistry,
        logic_units: &LogicUnitRegistry,
    ) -> Result<(), EngineError> {
        for module_name in &enabled_modules {
            if !modules.exists(module_name) {
                return Err(EngineError::NotFound {
                    detail: format!("module '{module_name}' is not registered"),
                });
            }
        }
        for unit_name in &enabled_logic_units {
            if !logic_units.exists(unit_name) {
                return Err(EngineError::NotFound {
                    detail: format!("logic unit '{unit_name}' is not registered"),
                });
            }
        }

        let mut matches = self.matches.write().expect("match registry lock poisoned");
        if matches.contains_key(name) {
            return Err(EngineError::Conflict { detail: format!("match '{name}' already exists") });
        }
        matches.insert(name.to_owned(), MatchRecord { name: name.to_owned(), enabled_modules, enabled_logic_units });
        Ok(())
    }

    pub fn delete(&self, name: &str) -> Result<MatchRecord, EngineError> {
        self.matches
            .write()
            .expect("match registry lock poisoned")
            .remove(name)
            .ok_or_else(|| EngineError::NotFound { detail: format!("match '{name}' does not exist") })
    }

    pub fn get(&self, name: &str) -> Result<MatchRecord, EngineError> {
        self.matches
            .read()
            .expect("match registry lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound { detail: format!("match '{name}' does not exist") })
    }

    pub fn exists(&self, name: &str) -> bool {
        self.matches.read().expect("match registry lock poisoned").contains_key(name)
    }

    pub fn list(&self) -> Vec<String> {
        self.matches.read().expect("match registry lock poisoned").keys().cloned().collect()
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}
