//! Driver error taxonomy
//!
//! Every failure in a compile/execute cycle is terminal for that cycle and
//! surfaces as one [`DriverError`]. [`ErrorKind`] collapses the variants into
//! the stage that failed.

use crate::compile::ModuleStage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Backend initialization failed: {0}")]
    BackendInitialization(String),
    #[error("Failed to parse IR: {0}")]
    Parse(String),
    #[error("Module verification failed: {0}")]
    Verification(String),
    #[error("Symbol `{0}` is already defined by a module on this engine")]
    DuplicateSymbol(String),
    #[error("Execution engine rejected module: {0}")]
    Registration(String),
    #[error("Cannot resolve symbols from a module at stage {0:?}")]
    NotFinalized(ModuleStage),
    #[error("Symbol `{0}` not found")]
    SymbolNotFound(String),
    #[error("Symbol `{symbol}` has signature `{found}`, expected `{expected}`")]
    SignatureMismatch {
        symbol: String,
        expected: &'static str,
        found: String,
    },
}

/// Coarse failure stage of a [`DriverError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BackendInitialization,
    Parse,
    Verification,
    Registration,
    SymbolNotFound,
}

impl DriverError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::BackendInitialization(_) => ErrorKind::BackendInitialization,
            DriverError::Parse(_) => ErrorKind::Parse,
            DriverError::Verification(_) => ErrorKind::Verification,
            DriverError::DuplicateSymbol(_) | DriverError::Registration(_) => {
                ErrorKind::Registration
            }
            DriverError::NotFinalized(_)
            | DriverError::SymbolNotFound(_)
            | DriverError::SignatureMismatch { .. } => ErrorKind::SymbolNotFound,
        }
    }
}

/// Result alias used throughout the driver
pub type DriverResult<T> = Result<T, DriverError>;
