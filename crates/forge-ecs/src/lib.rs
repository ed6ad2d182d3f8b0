//! forge-ecs -- fixed-capacity columnar component storage.
//!
//! Unlike a general-purpose archetype ECS, this crate stores exactly one
//! shape of data: a `(entity, component) -> f32` slab with a fixed number
//! of rows and columns, a NaN sentinel for "absent", and caller-supplied
//! entity and component ids. It is deliberately narrow -- ordering,
//! modules, systems, and ticks all live one layer up, in `forge-module`
//! and `forge-engine`.
//!
//! # Quick Start
//!
//! ```
//! use forge_ecs::prelude::*;
//!
//! let store = ComponentStore::new(1024, 64);
//! let id = EntityId::new(1);
//! let position_x = ComponentId::new(100);
//!
//! store.attach(id, position_x, 10.0).unwrap();
//! assert_eq!(store.get(id, position_x), 10.0);
//! assert!(store.has(id, position_x));
//! ```

#![deny(unsafe_code)]

pub mod entity;
pub mod error;
pub mod store;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::entity::{ComponentId, EntityId};
    pub use crate::error::StoreError;
    pub use crate::store::ComponentStore;
}
