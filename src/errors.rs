//! Error types for the crate.

use thiserror::Error;

use crate::signals::Signal;

/// Errors surfaced while setting up shutdown handling.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing the OS handler for a watched signal failed.
    #[error("failed to register handler for {signal}: {source}")]
    SignalRegistration {
        signal: Signal,
        source: std::io::Error,
    },
}
