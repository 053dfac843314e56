use thiserror::Error;

use crate::solvers::DiagnosticsReport;

/// Failure of a run-level operation. The derivative pipeline itself
/// never produces errors; invariant violations inside the inner loops
/// are assertion-backed and surface through the diagnostics report at
/// phase boundaries instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Incompatible equation terms, out-of-range material parameters,
    /// mutually exclusive options. Fatal for the run.
    #[error("invalid setup: {0}")]
    InvalidSetup(String),

    /// A quantity is missing or stored with an unexpected type/order.
    #[error("quantity {quantity}: {message}")]
    InvalidQuantity {
        quantity: &'static str,
        message: String,
    },

    /// Invariant violations detected by the diagnostics pass; the
    /// caller typically halves the time step and retries.
    #[error("diagnostics failed: {0}")]
    Diagnostics(DiagnosticsReport),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// A snapshot or configuration file that cannot be interpreted.
    #[error("corrupted input: {0}")]
    Corrupted(String),

    /// Allocation or thread-pool failures. Fatal for the run.
    #[error("resource exhaustion: {0}")]
    Resource(String),
}

impl Error {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Diagnostics(_))
    }
}
