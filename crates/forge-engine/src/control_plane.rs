//! The thin facade an external control plane talks to: a node hosting N
//! containers, health reporting, graceful drain, module distribution, and
//! the handful of lifecycle calls a cluster orchestrator is allowed to make
//! without reaching into a container's internals.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use forge_module::module::ModuleFactory;

use crate::container::{ContainerManager, ContainerState, MatchConfig};
use crate::error::EngineError;

#[derive(Debug, Clone, serde::Serialize)]
pub struct NodeMetrics {
    pub container_count: usize,
    pub running_container_count: usize,
    pub total_match_count: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HeartbeatStatus {
    pub node_id: String,
    /// Free container slots: `max_containers - containers hosted now`.
    pub capacity: usize,
    pub metrics: NodeMetrics,
}

/// Where a match created through the control plane landed.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MatchLocator {
    pub node_id: String,
    pub container_id: String,
    pub match_name: String,
}

/// A node: a bounded pool of sealed [`ContainerManager`]s plus the
/// catalog of modules distributed to it. A module distributed to the node
/// is registered into every container it hosts, now and in the future --
/// containers stay structurally isolated from each other, but they all
/// draw from the same node-level module catalog.
pub struct ControlPlane {
    node_id: String,
    max_containers: usize,
    /// Consecutive-failure poison threshold applied to every container
    /// this node creates.
    poison_after: Option<u32>,
    containers: RwLock<HashMap<String, Arc<ContainerManager>>>,
    module_catalog: RwLock<HashMap<String, ModuleFactory>>,
    draining: AtomicBool,
}

impl ControlPlane {
    pub fn new(node_id: impl Into<String>, max_containers: usize) -> Self {
        Self {
            node_id: node_id.into(),
            max_containers,
            poison_after: None,
            containers: RwLock::new(HashMap::new()),
            module_catalog: RwLock::new(HashMap::new()),
            draining: AtomicBool::new(false),
        }
    }

    pub fn with_poison_after(mut self, poison_after: Option<u32>) -> Self {
        self.poison_after = poison_after;
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn heartbeat(&self) -> HeartbeatStatus {
        let containers = self.containers.read().expect("container map lock poisoned");
        let running_container_count =
            containers.values().filter(|c| c.state() == ContainerState::Running).count();
        let total_match_count = containers.values().map(|c| c.matches.list().len()).sum();
        HeartbeatStatus {
            node_id: self.node_id.clone(),
            capacity: self.max_containers.saturating_sub(containers.len()),
            metrics: NodeMetrics {
                container_count: containers.len(),
                running_container_count,
                total_match_count,
            },
        }
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Stop accepting new containers and matches, and pause every running
    /// container. Returns `true` once every container the node hosts has
    /// reached a non-`Running` state, `false` if any refused to pause.
    pub fn drain(&self) -> bool {
        self.draining.store(true, Ordering::SeqCst);
        let containers = self.containers.read().expect("container map lock poisoned");
        let mut all_drained = true;
        for container in containers.values() {
            if container.state() == ContainerState::Running && container.pause().is_err() {
                all_drained = false;
            }
        }
        all_drained
    }

    pub fn create_container(&self, container_id: &str) -> Result<Arc<ContainerManager>, EngineError> {
        if self.is_draining() {
            return Err(EngineError::InvalidState {
                detail: "node is draining: no new containers are accepted".to_owned(),
            });
        }
        let mut containers = self.containers.write().expect("container map lock poisoned");
        if containers.len() >= self.max_containers {
            return Err(EngineError::Overflow {
                detail: format!("node is at capacity: {} containers", self.max_containers),
            });
        }
        if containers.contains_key(container_id) {
            return Err(EngineError::Conflict { detail: format!("container '{container_id}' already exists") });
        }

        let container = Arc::new(ContainerManager::with_poison_after(self.poison_after));
        container.start()?;
        for (name, factory) in self.module_catalog.read().expect("module catalog lock poisoned").iter() {
            let _ = container.modules.register_factory(name, factory.clone());
        }
        containers.insert(container_id.to_owned(), container.clone());
        Ok(container)
    }

    pub fn delete_container(&self, container_id: &str) -> Result<(), EngineError> {
        let container = self
            .containers
            .write()
            .expect("container map lock poisoned")
            .remove(container_id)
            .ok_or_else(|| EngineError::NotFound { detail: format!("container '{container_id}' does not exist") })?;
        container.stop()
    }

    pub fn container(&self, container_id: &str) -> Result<Arc<ContainerManager>, EngineError> {
        self.containers
            .read()
            .expect("container map lock poisoned")
            .get(container_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound { detail: format!("container '{container_id}' does not exist") })
    }

    pub fn list_containers(&self) -> Vec<String> {
        self.containers.read().expect("container map lock poisoned").keys().cloned().collect()
    }

    /// Register a module into the node's catalog and into every container
    /// currently hosted. A container that already has it registered is
    /// left alone rather than treated as an error -- redistribution of an
    /// already-known module is a no-op, not a conflict.
    pub fn distribute_module(&self, name: &str, factory: ModuleFactory) -> Result<(), EngineError> {
        self.module_catalog.write().expect("module catalog lock poisoned").insert(name.to_owned(), factory.clone());
        for container in self.containers.read().expect("container map lock poisoned").values() {
            match container.modules.register_factory(name, factory.clone()) {
                Ok(()) => {}
                Err(e) if e.kind() == "Conflict" && container.modules.exists(name) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    pub fn create_match(
        &self,
        container_id: &str,
        match_name: &str,
        enabled_modules: Vec<String>,
        enabled_logic_units: Vec<String>,
        config: MatchConfig,
    ) -> Result<MatchLocator, EngineError> {
        if self.is_draining() {
            return Err(EngineError::InvalidState {
                detail: "node is draining: no new matches are accepted".to_owned(),
            });
        }
        self.container(container_id)?.create_match(match_name, enabled_modules, enabled_logic_units, config)?;
        Ok(MatchLocator {
            node_id: self.node_id.clone(),
            container_id: container_id.to_owned(),
            match_name: match_name.to_owned(),
        })
    }

    /// Stop a match's auto-advance without deleting its state. Intended
    /// for a graceful end-of-game: snapshot history and module state stay
    /// queryable until [`delete_match`](Self::delete_match) is called.
    pub fn finish_match(&self, container_id: &str, match_name: &str) -> Result<(), EngineError> {
        match self.container(container_id)?.stop_auto(match_name) {
            Ok(()) | Err(EngineError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn delete_match(&self, container_id: &str, match_name: &str) -> Result<(), EngineError> {
        self.container(container_id)?.delete_match(match_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_reports_capacity_and_match_count() {
        let plane = ControlPlane::new("node-1", 2);
        plane.create_container("c1").unwrap();
        plane
            .distribute_module("physics", Arc::new(|| forge_module::module::Module::new("physics")))
            .unwrap();
        plane.create_match("c1", "m1", vec!["physics".to_owned()], vec![], MatchConfig::default()).unwrap();

        let status = plane.heartbeat();
        assert_eq!(status.node_id, "node-1");
        assert_eq!(status.capacity, 1);
        assert_eq!(status.metrics.container_count, 1);
        assert_eq!(status.metrics.total_match_count, 1);
        assert!(!plane.is_draining());
    }

    #[test]
    fn create_container_respects_node_capacity() {
        let plane = ControlPlane::new("node-1", 1);
        plane.create_container("c1").unwrap();
        let err = plane.create_container("c2").unwrap_err();
        assert_eq!(err.kind(), "Overflow");
    }

    #[test]
    fn distribute_module_reaches_future_containers_too() {
        let plane = ControlPlane::new("node-1", 2);
        plane.create_container("c1").unwrap();
        plane
            .distribute_module("physics", Arc::new(|| forge_module::module::Module::new("physics")))
            .unwrap();
        let c2 = plane.create_container("c2").unwrap();
        assert!(c2.modules.exists("physics"));
    }

    #[test]
    fn drain_blocks_new_work_and_pauses_running_containers() {
        let plane = ControlPlane::new("node-1", 1);
        plane.create_container("c1").unwrap();
        assert!(plane.drain());
        assert!(plane.is_draining());
        assert_eq!(plane.container("c1").unwrap().state(), ContainerState::Paused);

        let err = plane.create_container("c2").unwrap_err();
        assert_eq!(err.kind(), "InvalidState");
        let err = plane.create_match("c1", "m1", vec![], vec![], MatchConfig::default()).unwrap_err();
        assert_eq!(err.kind(), "InvalidState");
    }

    #[test]
    fn finish_match_tolerates_no_auto_advance_running() {
        let plane = ControlPlane::new("node-1", 1);
        plane.create_container("c1").unwrap();
        plane
            .distribute_module("physics", Arc::new(|| forge_module::module::Module::new("physics")))
            .unwrap();
        plane.create_match("c1", "m1", vec!["physics".to_owned()], vec![], MatchConfig::default()).unwrap();
        plane.finish_match("c1", "m1").unwrap();
    }
}
