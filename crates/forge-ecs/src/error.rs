//! Error types for the component store.

use thiserror::Error;

/// Errors raised by [`ComponentStore`](crate::store::ComponentStore) operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Every row is in use and none is reclaimable.
    #[error("component store is full: all {max_entities} rows are in use")]
    OutOfMemory { max_entities: usize },

    /// A new component id was attached but the column cap has been reached.
    #[error("component store has no room for a new component column: cap is {max_components}")]
    OutOfComponentSpace { max_components: usize },

    /// A buffer-length or argument mismatch.
    #[error("invalid argument: {detail}")]
    InvalidArgument { detail: String },
}

impl StoreError {
    /// The transport-level error kind this error maps to.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::OutOfMemory { .. } => "OutOfMemory",
            StoreError::OutOfComponentSpace { .. } => "OutOfComponentSpace",
            StoreError::InvalidArgument { .. } => "InvalidArgument",
        }
    }
}
