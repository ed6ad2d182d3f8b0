//! The transport-level error kinds every external operation resolves to.

use thiserror::Error;

/// Errors raised by the engine's registries, queues, and container
/// lifecycle. Every variant maps to one of the handful of kinds a
/// control-plane caller needs to branch on; the `detail` strings are for
/// logs and diagnostics, not for programmatic matching.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {detail}")]
    NotFound { detail: String },

    #[error("conflict: {detail}")]
    Conflict { detail: String },

    #[error("invalid argument: {detail}")]
    InvalidArgument { detail: String },

    #[error("invalid state: {detail}")]
    InvalidState { detail: String },

    #[error("overflow: {detail}")]
    Overflow { detail: String },

    #[error("out of memory: {detail}")]
    OutOfMemory { detail: String },

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "NotFound",
            EngineError::Conflict { .. } => "Conflict",
            EngineError::InvalidArgument { .. } => "InvalidArgument",
            EngineError::InvalidState { .. } => "InvalidState",
            EngineError::Overflow { .. } => "Overflow",
            EngineError::OutOfMemory { .. } => "OutOfMemory",
            EngineError::Internal(_) => "Internal",
        }
    }
}

impl From<forge_ecs::error::StoreError> for EngineError {
    fn from(e: forge_ecs::error::StoreError) -> Self {
        match e {
            forge_ecs::error::StoreError::OutOfMemory { max_entities } => {
                EngineError::OutOfMemory { detail: format!("store is full at {max_entities} rows") }
            }
            forge_ecs::error::StoreError::OutOfComponentSpace { max_components } => {
                EngineError::OutOfMemory {
                    detail: format!("store has no room for another component column ({max_components} cap)"),
                }
            }
            forge_ecs::error::StoreError::InvalidArgument { detail } => {
                EngineError::InvalidArgument { detail }
            }
        }
    }
}

impl From<forge_module::error::ModuleError> for EngineError {
    fn from(e: forge_module::error::ModuleError) -> Self {
        match e {
            forge_module::error::ModuleError::Conflict { detail } => EngineError::Conflict { detail },
            forge_module::error::ModuleError::NotFound { detail } => EngineError::NotFound { detail },
            forge_module::error::ModuleError::Internal(e) => EngineError::Internal(e),
        }
    }
}
