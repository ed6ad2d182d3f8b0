//! Engine core: match and player registries, command intake, the tick
//! pipeline, snapshotting, and the container that wires them all together
//! for a single simulation host.
//!
//! # Quick start
//!
//! ```
//! use forge_engine::prelude::*;
//! use std::sync::Arc;
//!
//! let container = ContainerManager::new();
//! container.start().unwrap();
//! container
//!     .modules
//!     .register_factory("physics", Arc::new(|| forge_module::module::Module::new("physics")))
//!     .unwrap();
//! container
//!     .create_match("match-1", vec!["physics".to_owned()], vec![], MatchConfig::default())
//!     .unwrap();
//! assert_eq!(container.advance("match-1").unwrap(), 1);
//! ```

#![deny(unsafe_code)]

pub mod command;
pub mod container;
pub mod control_plane;
pub mod error;
pub mod history;
pub mod match_registry;
pub mod player;
pub mod resource;
pub mod snapshot;
pub mod tick;

pub use forge_ecs;
pub use forge_module;

pub mod prelude {
    pub use forge_ecs::prelude::*;

    pub use crate::command::{Command, CommandQueue, CommandResolver};
    pub use crate::container::{
        ContainerManager, ContainerMetrics, ContainerState, ContainerStats, MatchConfig, MatchMetrics, MatchStats,
    };
    pub use crate::control_plane::{ControlPlane, HeartbeatStatus, MatchLocator, NodeMetrics};
    pub use crate::error::EngineError;
    pub use crate::history::{compute_delta, values_equal, ComponentDelta, ModuleDelta, SnapshotDelta, SnapshotHistory};
    pub use crate::match_registry::{MatchRecord, MatchRegistry};
    pub use crate::player::{PlayerRegistry, SessionState};
    pub use crate::resource::{Resource, ResourceStore};
    pub use crate::snapshot::{ComponentSnapshot, MatchSnapshot, ModuleSnapshot, SnapshotProvider, OWNER_COMPONENT_NAME};
    pub use crate::tick::{GameLoop, TickDiagnostics, TickScheduler};
}
