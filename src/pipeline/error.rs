//! Error types and reporting for pipeline stations.

use crate::error::{ErrorKind, LipstreamError};
use std::fmt;
use tracing::{error, warn};

/// Errors that can occur during station processing.
#[derive(Debug)]
pub enum StationError {
    /// Recoverable error that allows the station to continue processing.
    Recoverable(LipstreamError),
    /// Fatal error that requires the station to shut down.
    Fatal(LipstreamError),
}

impl StationError {
    /// The underlying typed error.
    pub fn error(&self) -> &LipstreamError {
        match self {
            StationError::Recoverable(e) | StationError::Fatal(e) => e,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error().kind()
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, StationError::Fatal(_))
    }
}

impl fmt::Display for StationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationError::Recoverable(e) => write!(f, "Recoverable error: {}", e),
            StationError::Fatal(e) => write!(f, "Fatal error: {}", e),
        }
    }
}

impl std::error::Error for StationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error())
    }
}

impl From<LipstreamError> for StationError {
    fn from(e: LipstreamError) -> Self {
        StationError::Recoverable(e)
    }
}

/// Trait for reporting station errors.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error from a station.
    fn report(&self, station: &str, error: &StationError);
}

/// Error reporter that logs through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, station: &str, error: &StationError) {
        match error {
            StationError::Recoverable(e) => {
                warn!(station, kind = ?e.kind(), "{}", e);
            }
            StationError::Fatal(e) => {
                error!(station, kind = ?e.kind(), "{}", e);
            }
        }
    }
}
