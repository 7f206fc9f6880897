//! Deserializable shutdown configuration.
//!
//! Format-agnostic: the embedding application picks the serde front end and
//! usually nests this under its own config root.

use serde::Deserialize;

use crate::coordinator::{Order, ShutdownCoordinator};
use crate::errors::ShutdownError;
use crate::signals::Signal;

/// Configuration for building a [`ShutdownCoordinator`].
///
/// ```yaml
/// order: first_in_last_done
/// signals: [term, int]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShutdownConfig {
    /// The order in which actions run.
    #[serde(default)]
    pub order: Order,

    /// The signals that trigger shutdown. An empty list disables the
    /// listener entirely.
    #[serde(default = "ShutdownConfig::default_signals")]
    pub signals: Vec<Signal>,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            order: Order::default(),
            signals: Self::default_signals(),
        }
    }
}

impl ShutdownConfig {
    fn default_signals() -> Vec<Signal> {
        vec![Signal::Term, Signal::Int]
    }

    /// Build a coordinator watching the configured signals.
    ///
    /// # Errors
    ///
    /// Fails if a handler for one of the configured signals cannot be
    /// installed.
    pub fn coordinator(&self) -> Result<ShutdownCoordinator, ShutdownError> {
        ShutdownCoordinator::new(self.order, &self.signals)
    }
}
