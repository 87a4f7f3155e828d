//! Error and status types shared across the engine.

use thiserror::Error;

/// Errors reported by engine resources and data sources.
///
/// Public node and bus operations degrade to `false`/`0` instead of
/// surfacing these; construct-style operations and data-source calls
/// return them directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineError {
    /// One or more arguments were rejected before touching engine state.
    #[error("invalid arguments")]
    InvalidArgs,
    /// The operation is not valid for the resource's current state.
    #[error("invalid operation")]
    InvalidOperation,
    /// The adapter does not implement this optional capability.
    #[error("not implemented")]
    NotImplemented,
    /// The audio device could not be opened or started.
    #[error("device failed")]
    DeviceFailed,
}

/// Status of a construct-style engine operation.
pub type Status = Result<(), EngineError>;
