//! Signal identifiers and the source the listener subscribes to.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::errors::ShutdownError;

/// A termination-class process signal that can trigger shutdown.
///
/// A variant serializes and deserializes as the lowercase variant name
/// (`"term"`, `"int"`, ...), so a signal list can live in a config file.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    /// The `SIGALRM` Unix signal.
    Alrm,
    /// The `SIGHUP` Unix signal.
    Hup,
    /// The `SIGINT` Unix signal.
    Int,
    /// The `SIGPIPE` Unix signal.
    Pipe,
    /// The `SIGQUIT` Unix signal.
    Quit,
    /// The `SIGTERM` Unix signal.
    Term,
    /// The `SIGUSR1` Unix signal.
    Usr1,
    /// The `SIGUSR2` Unix signal.
    Usr2,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Signal::Alrm => "SIGALRM",
            Signal::Hup => "SIGHUP",
            Signal::Int => "SIGINT",
            Signal::Pipe => "SIGPIPE",
            Signal::Quit => "SIGQUIT",
            Signal::Term => "SIGTERM",
            Signal::Usr1 => "SIGUSR1",
            Signal::Usr2 => "SIGUSR2",
        };

        s.fmt(f)
    }
}

#[cfg(unix)]
impl Signal {
    pub(crate) fn kind(self) -> tokio::signal::unix::SignalKind {
        use tokio::signal::unix::SignalKind;

        match self {
            Signal::Alrm => SignalKind::alarm(),
            Signal::Hup => SignalKind::hangup(),
            Signal::Int => SignalKind::interrupt(),
            Signal::Pipe => SignalKind::pipe(),
            Signal::Quit => SignalKind::quit(),
            Signal::Term => SignalKind::terminate(),
            Signal::Usr1 => SignalKind::user_defined1(),
            Signal::Usr2 => SignalKind::user_defined2(),
        }
    }
}

/// Where watched signals come from.
///
/// Subscribing yields a receiver that delivers watched signals as they
/// arrive; the coordinator only ever consumes the first one. Substituting a
/// synthetic source makes the listener testable without touching the
/// process-global signal handlers.
pub trait SignalSource {
    /// Subscribe to the given signal set.
    ///
    /// Signals outside the set must never be delivered on the returned
    /// receiver. Dropping the receiver is the unsubscribe.
    fn subscribe(&self, signals: &[Signal]) -> Result<mpsc::Receiver<Signal>, ShutdownError>;
}

/// Subscribes to real OS signals through tokio's signal streams.
///
/// Must be used within a tokio runtime: registration installs process-wide
/// handlers and a forwarder task is spawned per watched signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSignals;

#[cfg(unix)]
impl SignalSource for OsSignals {
    fn subscribe(&self, signals: &[Signal]) -> Result<mpsc::Receiver<Signal>, ShutdownError> {
        let (tx, rx) = mpsc::channel(1);

        // Register every handler before spawning anything, so a partial
        // subscription never listens.
        let mut streams = Vec::with_capacity(signals.len());
        for &sig in signals {
            let stream = tokio::signal::unix::signal(sig.kind())
                .map_err(|source| ShutdownError::SignalRegistration { signal: sig, source })?;
            streams.push((sig, stream));
        }

        for (sig, mut stream) in streams {
            let tx = tx.clone();
            tokio::spawn(async move {
                tokio::select! {
                    received = stream.recv() => {
                        if received.is_some() {
                            let _ = tx.try_send(sig);
                        }
                    }
                    _ = tx.closed() => {}
                }
            });
        }

        Ok(rx)
    }
}

#[cfg(not(unix))]
impl SignalSource for OsSignals {
    fn subscribe(&self, signals: &[Signal]) -> Result<mpsc::Receiver<Signal>, ShutdownError> {
        let (tx, rx) = mpsc::channel(1);

        for &sig in signals {
            if sig != Signal::Int {
                log::warn!("signal {} is not supported on this platform; ignoring", sig);
                continue;
            }

            let tx = tx.clone();
            tokio::spawn(async move {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if result.is_ok() {
                            let _ = tx.try_send(Signal::Int);
                        }
                    }
                    _ = tx.closed() => {}
                }
            });
        }

        Ok(rx)
    }
}
