//! Deterministic, exactly-once shutdown actions.
//!
//! This crate provides:
//!
//! - [`ShutdownCoordinator`]: collects cleanup actions and runs them exactly
//!   once, in a configurable order, when a watched signal arrives or when
//!   shutdown is requested directly
//! - [`Signal`] / [`SignalSource`]: which signals to watch and where they
//!   come from (injectable for tests)
//! - [`PostShutdownStrategy`]: what happens to actions registered after the
//!   trigger has fired
//! - [`ShutdownConfig`]: serde-deserializable configuration
//!
//! # Example
//!
//! ```no_run
//! use winddown::{Order, ShutdownCoordinator, Signal};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), winddown::ShutdownError> {
//!     let coordinator = ShutdownCoordinator::new(
//!         Order::FirstInLastDone,
//!         &[Signal::Term, Signal::Int],
//!     )?;
//!
//!     coordinator.set_on_signal(|signal| println!("received {signal}"));
//!
//!     // First added, last done: the pool outlives everything that uses it.
//!     coordinator.add_action(|| println!("closing connection pool"));
//!     coordinator.add_action(|| println!("flushing in-flight work"));
//!
//!     // ... application work ...
//!
//!     // Runs the actions if no signal arrived first; otherwise waits for
//!     // the signal-triggered run to finish.
//!     coordinator.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod errors;
pub mod signals;

pub use config::ShutdownConfig;
pub use coordinator::{Order, PostShutdownStrategy, ShutdownCoordinator};
pub use errors::ShutdownError;
pub use signals::{OsSignals, Signal, SignalSource};
