//! A loaded simulation module: its component manifest, command schemas,
//! systems, and exports.

use std::sync::Arc;

use forge_ecs::store::ComponentStore;
use serde_json::Value;

use crate::schema::{CommandSchema, ComponentManifestEntry};

/// A per-tick function over the [`ComponentStore`]. Systems read and write
/// the store directly (the store already serializes writers internally);
/// there is no separate command-buffer indirection at this layer.
pub type SystemFn = Arc<dyn Fn(&ComponentStore) -> Result<(), anyhow::Error> + Send + Sync>;

/// What a command handler sees: who enqueued it and its schema-validated
/// payload. The command's own name is the key it was looked up under, so
/// it isn't repeated here.
pub struct CommandInvocation {
    pub producer_id: String,
    pub payload: serde_json::Map<String, Value>,
}

/// Executes one command against the store. Dispatched by name to the
/// module that registered the matching [`CommandSchema`] -- "the module
/// that registered it" from the command pipeline's perspective.
pub type CommandHandlerFn = Arc<dyn Fn(&ComponentStore, &CommandInvocation) -> Result<(), anyhow::Error> + Send + Sync>;

/// A named unit bundling a component manifest, systems, command schemas,
/// and optional exports.
///
/// Built either by an in-process factory or by loading a packaged artifact
/// (see [`crate::artifact`]); either path produces the same `Module` shape.
pub struct Module {
    pub name: String,
    pub components: Vec<ComponentManifestEntry>,
    pub commands: Vec<CommandSchema>,
    /// Systems in registration order -- this is also execution order.
    pub systems: Vec<(String, SystemFn)>,
    /// Handler for each command name this module declared a schema for.
    /// A schema with no registered handler is accepted at enqueue time but
    /// silently does nothing when dequeued.
    pub command_handlers: std::collections::HashMap<String, CommandHandlerFn>,
    /// Values other modules may query by capability tag.
    pub exports: std::collections::HashMap<String, Value>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            components: Vec::new(),
            commands: Vec::new(),
            systems: Vec::new(),
            command_handlers: std::collections::HashMap::new(),
            exports: std::collections::HashMap::new(),
        }
    }

    pub fn with_component(mut self, entry: ComponentManifestEntry) -> Self {
        self.components.push(entry);
        self
    }

    pub fn with_command(mut self, schema: CommandSchema) -> Self {
        self.commands.push(schema);
        self
    }

    pub fn with_system(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&ComponentStore) -> Result<(), anyhow::Error> + Send + Sync + 'static,
    ) -> Self {
        self.systems.push((name.into(), Arc::new(f)));
        self
    }

    /// Wire a handler for a command name this module already declared a
    /// schema for. The handler runs once per occurrence of that command in
    /// a tick's drained batch, in drain order.
    pub fn with_command_handler(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&ComponentStore, &CommandInvocation) -> Result<(), anyhow::Error> + Send + Sync + 'static,
    ) -> Self {
        self.command_handlers.insert(name.into(), Arc::new(f));
        self
    }

    pub fn with_export(mut self, tag: impl Into<String>, value: Value) -> Self {
        self.exports.insert(tag.into(), value);
        self
    }
}

/// A factory that produces a fresh [`Module`] value. Registered
/// in-process, or implicit in a loaded artifact's exported build function.
pub type ModuleFactory = Arc<dyn Fn() -> Module + Send + Sync>;
