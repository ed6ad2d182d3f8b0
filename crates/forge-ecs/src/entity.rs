//! Entity and component identifiers.
//!
//! Unlike a generic archetype ECS, entity identity here is **caller-owned**:
//! the store does not allocate ids, it only allocates the row a given id
//! occupies. A [`ComponentId`] is similarly caller-assigned and only
//! resolved to a dense internal column index inside the store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 64-bit identifier for an entity, unique within a single container.
///
/// `EntityId` carries no generation counter: the store is not responsible
/// for detecting use-after-delete at the type level, only for correctly
/// reusing the underlying row once an id is deleted (see
/// [`ComponentStore::delete_entity`](crate::store::ComponentStore::delete_entity)).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Wrap a raw id.
    #[inline]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw `u64` value.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// A 64-bit identifier for a component, globally unique across the modules
/// loaded into a container.
///
/// The store never interprets a `ComponentId`'s value; it only maps it
/// (lazily, on first attach) to a dense internal column index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub u64);

impl ComponentId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({})", self.0)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ComponentId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}
