//! Loadable simulation modules: component manifests, command schemas,
//! systems, and the registry and per-match caches that run them. Also
//! carries the separate, simpler logic-unit concept: a named per-match
//! object with a single `onTick` callback and no published components.
//!
//! A module is built one of two ways -- an in-process factory
//! ([`registry::ModuleRegistry::register_factory`]), or a packaged WASM
//! artifact loaded through [`artifact::LoadedArtifact`] -- but both
//! produce the same [`module::Module`] shape once instantiated.

#![deny(unsafe_code)]

pub mod artifact;
pub mod error;
mod isolate;
pub mod logic_unit;
pub mod module;
pub mod module_runtime;
pub mod registry;
pub mod schema;

pub mod prelude {
    pub use crate::error::ModuleError;
    pub use crate::logic_unit::{LogicUnit, LogicUnitFactory, LogicUnitFn, LogicUnitManager, LogicUnitRegistry};
    pub use crate::module::{CommandHandlerFn, CommandInvocation, Module, ModuleFactory, SystemFn};
    pub use crate::module_runtime::{ModuleRuntime, ModuleRuntimeKey};
    pub use crate::registry::ModuleRegistry;
    pub use crate::schema::{CommandField, CommandSchema, ComponentManifestEntry, ScalarType};
}
