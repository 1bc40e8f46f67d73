//! Error module for the Rusty Cosim library.
use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Error types for the library.
#[derive(Debug, PartialEq, Clone)]
pub enum CosimError {
    /// Error for invalid configuration, e.g., unresolved label or missing transformer parameter.
    Configuration(String),
    /// Error for invalid topology, e.g., index out of range or overlapping proxy nodes.
    Topology(String),
    /// Error for invalid parameters, e.g., negative or non-finite delay.
    InvalidParameter(String),
    /// Non-finite value produced by a transformation and clamped to the nearest valid bound.
    NumericGuard(String),
    /// The Peer did not produce its output within the configured wait.
    SynchronizationTimeout {
        what: String,
        waited: Duration,
    },
    /// Error raised by the Peer while building a proxy device.
    DeviceBuild(String),
    /// Error for invalid operation, e.g., invoking an interface before configuring it.
    InvalidOperation(String),
    /// The other end of a channel (or the Peer worker) is gone.
    Disconnected(String),
    /// Error for I/O operations.
    IOError(String),
}

impl CosimError {
    /// Returns true if the caller may recover from the error, e.g., by aborting the run or retrying once.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CosimError::NumericGuard(_) | CosimError::SynchronizationTimeout { .. }
        )
    }
}

impl fmt::Display for CosimError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CosimError::Configuration(e) => write!(f, "Configuration error: {}", e),
            CosimError::Topology(e) => write!(f, "Topology error: {}", e),
            CosimError::InvalidParameter(e) => write!(f, "Invalid parameters: {}", e),
            CosimError::NumericGuard(e) => write!(f, "Non-finite values clamped: {}", e),
            CosimError::SynchronizationTimeout { what, waited } => write!(
                f,
                "Peer unresponsive: no {} after {:.3} s",
                what,
                waited.as_secs_f64()
            ),
            CosimError::DeviceBuild(e) => write!(f, "Device build error: {}", e),
            CosimError::InvalidOperation(e) => write!(f, "Invalid operation: {}", e),
            CosimError::Disconnected(e) => write!(f, "Disconnected: {}", e),
            CosimError::IOError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl Error for CosimError {}
