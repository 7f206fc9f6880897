//! The shutdown coordinator: one-time trigger, ordered action run, and
//! admission of actions registered after the trigger.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::errors::ShutdownError;
use crate::signals::{OsSignals, Signal, SignalSource};

/// The order in which registered actions are executed.
///
/// The same order applies to the primary run and to the coordinated
/// post-shutdown queue.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    /// Actions run in the order they were added.
    FirstInFirstDone,
    /// Actions run in the reverse of the order they were added, so the last
    /// resource set up is the first torn down.
    #[default]
    FirstInLastDone,
}

/// What happens to an action registered after shutdown has been triggered.
///
/// The strategy in effect at the moment an action is added decides its fate;
/// changing the strategy later never reaches back to already-admitted
/// actions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum PostShutdownStrategy {
    /// Discard the action. An action added after teardown has begun has no
    /// well-defined place in an already-drained sequence.
    #[default]
    DoNothing,
    /// Run the action immediately on its own blocking task. No ordering
    /// holds between two such actions, and [`ShutdownCoordinator::wait`]
    /// does not cover them.
    RunImmediately,
    /// Queue the action and drain the queue one action at a time on a
    /// blocking task, applying the coordinator's [`Order`] to the queue
    /// contents at each removal. [`ShutdownCoordinator::wait`] does not
    /// cover a still-draining queue.
    RunCoordinately,
}

type Action = Box<dyn FnOnce() + Send + 'static>;
type SignalHook = Box<dyn FnOnce(Signal) + Send + 'static>;

/// Runs registered cleanup actions exactly once, in a deterministic order,
/// when the process receives a watched signal or when shutdown is requested
/// directly.
///
/// The coordinator moves through three states: pending (accumulating
/// actions), running (draining the snapshot taken when the trigger fired),
/// and complete. The transition into running happens at most once no matter
/// how many callers race [`ShutdownCoordinator::shutdown`] with each other or
/// with an arriving signal.
///
/// Actions are executed outside the internal lock, so an action may register
/// further actions or change the post-shutdown strategy without deadlocking.
/// A panicking action is contained and logged; the remaining actions still
/// run. The coordinator does not otherwise observe action failures: code that
/// registers an action handles its own errors.
///
/// Cloning yields another handle to the same coordinator.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    order: Order,
    state: Mutex<State>,
    /// Tells the listener to stop waiting for a signal. Closed idempotently.
    stop_tx: watch::Sender<bool>,
    /// Fired exactly once, after the last primary action returns.
    done_tx: watch::Sender<bool>,
}

#[derive(Default)]
struct State {
    actions: Vec<Action>,
    on_signal: Option<SignalHook>,
    strategy: PostShutdownStrategy,
    triggered: bool,
    draining: bool,
    late_queue: VecDeque<Action>,
}

impl ShutdownCoordinator {
    /// Create a coordinator watching the given signals.
    ///
    /// With an empty signal set no listener is started and shutdown can only
    /// be triggered through [`ShutdownCoordinator::shutdown`]. With a
    /// non-empty set, a background task waits for the first watched signal
    /// and triggers shutdown when it arrives; this requires a running tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Fails if the handler for one of the signals cannot be installed.
    pub fn new(order: Order, signals: &[Signal]) -> Result<Self, ShutdownError> {
        Self::with_source(order, signals, &OsSignals)
    }

    /// Like [`ShutdownCoordinator::new`], but subscribing through the given
    /// source instead of the process-global OS signal handlers.
    pub fn with_source(
        order: Order,
        signals: &[Signal],
        source: &dyn SignalSource,
    ) -> Result<Self, ShutdownError> {
        let (stop_tx, _) = watch::channel(false);
        let (done_tx, _) = watch::channel(false);
        let inner = Arc::new(Inner {
            order,
            state: Mutex::new(State::default()),
            stop_tx,
            done_tx,
        });

        if signals.is_empty() {
            // Nothing to listen for: the stop latch starts out closed.
            inner.close_stop();
        } else {
            let rx = source.subscribe(signals)?;
            tokio::spawn(listen(Arc::clone(&inner), rx));
        }

        Ok(Self { inner })
    }

    /// Register a cleanup action.
    ///
    /// Before the trigger, the action joins the primary sequence. After the
    /// trigger it is routed through the [`PostShutdownStrategy`] in effect
    /// right now and is never part of the primary run.
    pub fn add_action(&self, action: impl FnOnce() + Send + 'static) {
        self.inner.admit(Box::new(action));
    }

    /// Set the hook invoked with the received signal, before the primary run.
    ///
    /// Replaces any previously set hook. The hook never runs for an explicit
    /// [`ShutdownCoordinator::shutdown`], and setting it after a signal has
    /// already been delivered has no effect.
    pub fn set_on_signal(&self, hook: impl FnOnce(Signal) + Send + 'static) {
        self.inner.state.lock().on_signal = Some(Box::new(hook));
    }

    /// Set the strategy for actions added after the trigger.
    ///
    /// Affects only actions added after this call.
    pub fn set_post_shutdown_strategy(&self, strategy: PostShutdownStrategy) {
        self.inner.state.lock().strategy = strategy;
    }

    /// Trigger shutdown and wait for the primary run to finish.
    ///
    /// Idempotent: the first caller (or the signal listener, whichever wins)
    /// executes the actions; every caller, concurrent or later, returns only
    /// once the single run has completed. Also stops the signal listener.
    pub async fn shutdown(&self) {
        self.inner.close_stop();
        self.inner.run().await;
    }

    /// Wait until the primary run has finished.
    ///
    /// Any number of waiters are released together. There is no timeout;
    /// callers race against their own timer if they need one. If no trigger
    /// ever occurs this waits forever.
    pub async fn wait(&self) {
        self.inner.wait_done().await;
    }

    /// Whether the primary run has started.
    pub fn is_triggered(&self) -> bool {
        self.inner.state.lock().triggered
    }

    /// Whether the primary run has finished.
    pub fn is_complete(&self) -> bool {
        *self.inner.done_tx.borrow()
    }
}

impl Inner {
    fn close_stop(&self) {
        // send_replace updates the value even with no receiver subscribed
        // yet; the listener may not have polled for the first time.
        self.stop_tx.send_replace(true);
    }

    async fn wait_done(&self) {
        let mut rx = self.done_tx.subscribe();
        // The sender lives in self, so the channel cannot close under us.
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Take and invoke the on-signal hook, outside the lock.
    fn fire_on_signal(&self, signal: Signal) {
        let hook = self.state.lock().on_signal.take();
        if let Some(hook) = hook {
            hook(signal);
        }
    }

    /// The shared trigger path. The caller that flips `triggered` owns the
    /// run and executes the snapshot taken at that moment; everyone else
    /// waits for completion.
    async fn run(&self) {
        let snapshot = {
            let mut state = self.state.lock();
            if state.triggered {
                None
            } else {
                state.triggered = true;
                Some(std::mem::take(&mut state.actions))
            }
        };

        let Some(actions) = snapshot else {
            self.wait_done().await;
            return;
        };

        log::info!("running {} shutdown actions", actions.len());
        match self.order {
            Order::FirstInFirstDone => actions.into_iter().for_each(run_action),
            Order::FirstInLastDone => actions.into_iter().rev().for_each(run_action),
        }

        // send_replace, not send: the latch must close even when no waiter
        // is currently subscribed, so later wait()/is_complete() calls and
        // losing shutdown() callers observe it.
        self.done_tx.send_replace(true);
        log::info!("shutdown complete");
    }

    /// Append before the trigger; afterwards route through the strategy in
    /// effect at this moment.
    fn admit(self: &Arc<Self>, action: Action) {
        let late = {
            let mut state = self.state.lock();
            if !state.triggered {
                state.actions.push(action);
                return;
            }

            match state.strategy {
                PostShutdownStrategy::DoNothing => {
                    log::debug!("discarding action registered after shutdown");
                    return;
                }
                PostShutdownStrategy::RunImmediately => Late::Spawn(action),
                PostShutdownStrategy::RunCoordinately => {
                    state.late_queue.push_back(action);
                    if state.draining {
                        return;
                    }
                    state.draining = true;
                    Late::StartWorker
                }
            }
        };

        // Spawning happens outside the lock. Actions are arbitrary blocking
        // closures, so they go to the blocking pool instead of a runtime
        // worker.
        match late {
            Late::Spawn(action) => {
                tokio::task::spawn_blocking(move || run_action(action));
            }
            Late::StartWorker => {
                let inner = Arc::clone(self);
                tokio::task::spawn_blocking(move || inner.drain_late_queue());
            }
        }
    }

    /// Drain worker for coordinated late actions. At most one is active; it
    /// exits once the queue is empty. Removal order follows `self.order`
    /// against the queue's contents at each step, so actions admitted while
    /// the worker runs are ordered among themselves.
    fn drain_late_queue(&self) {
        loop {
            let action = {
                let mut state = self.state.lock();
                let next = match self.order {
                    Order::FirstInFirstDone => state.late_queue.pop_front(),
                    Order::FirstInLastDone => state.late_queue.pop_back(),
                };

                match next {
                    Some(action) => action,
                    None => {
                        state.draining = false;
                        break;
                    }
                }
            };

            run_action(action);
        }
    }
}

enum Late {
    Spawn(Action),
    StartWorker,
}

/// Run one action, containing any panic so the remaining actions still run.
fn run_action(action: Action) {
    if catch_unwind(AssertUnwindSafe(action)).is_err() {
        log::error!("a shutdown action panicked; continuing with the remaining actions");
    }
}

/// Background listener: waits for the first watched signal or the stop
/// latch, then funnels into the shared trigger path.
async fn listen(inner: Arc<Inner>, rx: mpsc::Receiver<Signal>) {
    let mut stop = inner.stop_tx.subscribe();
    // Biased: once the stop latch has closed, a signal sitting in the
    // channel must not reach the hook; an explicit shutdown never invokes
    // it.
    let received = tokio::select! {
        biased;
        _ = stop.wait_for(|stopped| *stopped) => None,
        signal = first_signal(rx) => Some(signal),
    };

    inner.close_stop();
    if let Some(signal) = received {
        log::info!("received {}, beginning shutdown", signal);
        inner.fire_on_signal(signal);
    }

    inner.run().await;
}

/// Resolve with the first delivered signal. Never resolves if the source
/// closes without delivering one; the stop latch covers that case.
async fn first_signal(mut rx: mpsc::Receiver<Signal>) -> Signal {
    match rx.recv().await {
        Some(signal) => signal,
        None => std::future::pending().await,
    }
}
