//! Error types for module loading and execution.

use thiserror::Error;

/// Errors raised by [`ModuleRegistry`](crate::registry::ModuleRegistry) and
/// the systems it runs.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Duplicate component name within a module, duplicate global component
    /// id, or duplicate global command name.
    #[error("conflict: {detail}")]
    Conflict { detail: String },

    /// Referenced module, system, or command does not exist.
    #[error("not found: {detail}")]
    NotFound { detail: String },

    /// A module handler (a system, or the artifact it came from) failed
    /// unexpectedly.
    #[error("internal module error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ModuleError {
    pub fn kind(&self) -> &'static str {
        match self {
            ModuleError::Conflict { .. } => "Conflict",
            ModuleError::NotFound { .. } => "NotFound",
            ModuleError::Internal(_) => "Internal",
        }
    }
}
