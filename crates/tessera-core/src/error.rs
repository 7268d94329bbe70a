//! Error types for Tessera

use std::fmt;

use thiserror::Error;

use crate::{ArrangementId, ContextId};

/// Boxed cause carried by wrapped driver failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Direction of a codec call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodecOperation {
    Dump,
    Load,
}

impl fmt::Display for CodecOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecOperation::Dump => f.write_str("dumping"),
            CodecOperation::Load => f.write_str("loading"),
        }
    }
}

/// Core Tessera errors
#[derive(Error, Debug)]
pub enum TesseraError {
    // Construction errors
    #[error("Arrangement construction failed: {0}")]
    ArrangementConstruction(String),

    #[error("Cyclic context parentage: {child} cannot descend from {parent}")]
    CyclicContext { child: ContextId, parent: ContextId },

    #[error("Abstract arrangement cannot be instantiated: {0:?}")]
    AbstractArrangement(ArrangementId),

    // Type errors
    #[error("Arrangement type error: {0}")]
    ArrangementType(String),

    #[error("Context {context} ({kind}) does not support {method}")]
    KindMismatch {
        context: ContextId,
        kind: &'static str,
        method: &'static str,
    },

    #[error("Component stack has no context")]
    NoContext,

    #[error("Unknown context: {0}")]
    UnknownContext(ContextId),

    // Constraint errors
    #[error("Constraint failed: {0}")]
    Constraint(String),

    // Codec errors
    #[error("{operation} failed in the {driver} driver: {source}")]
    Codec {
        driver: String,
        operation: CodecOperation,
        #[source]
        source: BoxError,
    },

    // Driver registry errors
    #[error("Driver {0:?} has already been registered")]
    DriverExists(String),

    #[error("Driver not found: {0:?}")]
    DriverNotFound(String),

    #[error("{kind} is not supported by the {driver} driver")]
    Unsupported { driver: String, kind: String },

    // Stack and record errors
    #[error("Index {index} out of range for length {len}")]
    IndexOutOfRange { index: isize, len: usize },

    #[error("Component already taken: {0}")]
    ComponentTaken(String),

    #[error("Missing value for required field {0:?}")]
    MissingField(String),

    #[error("Unknown field {0:?}")]
    UnknownField(String),

    // Hook errors
    #[error("Observer failed: {0}")]
    Observer(String),

    #[error("Resource manager {manager} failed: {reason}")]
    Resource { manager: String, reason: String },

    #[error("Invalid hook configuration: {0}")]
    HookConfig(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

impl TesseraError {
    /// Wrap a driver-level failure into the library error family
    pub fn codec(
        driver: impl Into<String>,
        operation: CodecOperation,
        source: impl Into<BoxError>,
    ) -> Self {
        TesseraError::Codec {
            driver: driver.into(),
            operation,
            source: source.into(),
        }
    }

    /// Construction errors are raised at declaration time and never retried
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            TesseraError::ArrangementConstruction(_)
                | TesseraError::CyclicContext { .. }
                | TesseraError::AbstractArrangement(_)
        )
    }
}

/// Result type for Tessera operations
pub type TesseraResult<T> = Result<T, TesseraError>;
