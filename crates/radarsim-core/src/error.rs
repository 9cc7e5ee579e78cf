//! Error taxonomy shared by every simulator crate

use crate::table::TableId;
use thiserror::Error;

/// Result type for simulator operations
pub type SimResult<T> = Result<T, SimError>;

/// Errors that can occur while configuring or running a simulation
#[derive(Error, Debug)]
pub enum SimError {
    /// Invalid population, domain, gate or radar request. Raised before any mutation.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A lookup table required by the time stepper is not attached
    #[error("Missing table: {0}")]
    MissingTable(TableId),

    /// Malformed scan pattern specification
    #[error("Scan pattern parse error: {0}")]
    Parse(String),

    /// Device, context or kernel setup failed
    #[error("Accelerator initialization failed: {0}")]
    AcceleratorInit(String),

    /// Device failure after initialization (map, readback, slot exhaustion)
    #[error("Accelerator error: {0}")]
    Accelerator(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimError {
    pub fn config(msg: impl Into<String>) -> Self {
        SimError::Configuration(msg.into())
    }

    /// Errors that must tear the run down rather than degrade
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SimError::Parse(_))
    }
}
