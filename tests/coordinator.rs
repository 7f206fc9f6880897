//! End-to-end tests that deliver real signals to the current process.
//!
//! These tests install process-global signal handlers, so they are
//! serialized and use the user-defined signals to stay out of the test
//! harness's way.

#![cfg(unix)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;
use tokio::time::timeout;
use winddown::{Order, PostShutdownStrategy, ShutdownCoordinator, Signal};

fn raise(signal: nix::sys::signal::Signal) {
    nix::sys::signal::raise(signal).expect("failed to raise signal");
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn signal_invokes_hook_then_runs_actions() {
    let coordinator =
        ShutdownCoordinator::new(Order::FirstInLastDone, &[Signal::Usr1]).unwrap();

    let hooked = Arc::new(AtomicUsize::new(0));
    let hook_count = Arc::clone(&hooked);
    coordinator.set_on_signal(move |signal| {
        assert_eq!(signal, Signal::Usr1);
        hook_count.fetch_add(1, Ordering::SeqCst);
    });

    let ran = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let ran = Arc::clone(&ran);
        coordinator.add_action(move || {
            ran.fetch_add(1, Ordering::SeqCst);
        });
    }

    raise(nix::sys::signal::Signal::SIGUSR1);
    timeout(Duration::from_secs(5), coordinator.wait())
        .await
        .expect("signal did not complete shutdown");

    assert_eq!(hooked.load(Ordering::SeqCst), 1);
    assert_eq!(ran.load(Ordering::SeqCst), 3);
    assert!(coordinator.is_complete());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn signal_racing_explicit_shutdown_runs_once() {
    let coordinator =
        ShutdownCoordinator::new(Order::FirstInFirstDone, &[Signal::Usr2]).unwrap();

    let ran = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let ran = Arc::clone(&ran);
        coordinator.add_action(move || {
            ran.fetch_add(1, Ordering::SeqCst);
        });
    }

    let mut callers = Vec::new();
    for _ in 0..8 {
        let coordinator = coordinator.clone();
        callers.push(tokio::spawn(async move { coordinator.shutdown().await }));
    }
    raise(nix::sys::signal::Signal::SIGUSR2);

    for caller in callers {
        caller.await.unwrap();
    }
    timeout(Duration::from_secs(5), coordinator.wait())
        .await
        .expect("shutdown did not complete");

    // The counter lands on exactly the number of registered actions no
    // matter who won the race.
    assert_eq!(ran.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn unwatched_signal_does_not_trigger() {
    // Keep a handler installed for SIGUSR2 so raising it does not take the
    // test process down; the coordinator itself only watches SIGUSR1.
    let mut guard = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined2())
        .expect("failed to install guard handler");

    let coordinator =
        ShutdownCoordinator::new(Order::FirstInFirstDone, &[Signal::Usr1]).unwrap();
    let hooked = Arc::new(AtomicUsize::new(0));
    let hook_count = Arc::clone(&hooked);
    coordinator.set_on_signal(move |_| {
        hook_count.fetch_add(1, Ordering::SeqCst);
    });

    raise(nix::sys::signal::Signal::SIGUSR2);
    guard.recv().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!coordinator.is_triggered());
    assert_eq!(hooked.load(Ordering::SeqCst), 0);

    // Release the listener so it does not linger across tests.
    coordinator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn late_actions_after_signal_follow_strategy() {
    let coordinator =
        ShutdownCoordinator::new(Order::FirstInFirstDone, &[Signal::Usr1]).unwrap();
    coordinator.add_action(|| {});

    raise(nix::sys::signal::Signal::SIGUSR1);
    timeout(Duration::from_secs(5), coordinator.wait())
        .await
        .expect("signal did not complete shutdown");

    // Default strategy discards.
    let discarded = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&discarded);
    coordinator.add_action(move || {
        count.fetch_add(1, Ordering::SeqCst);
    });

    coordinator.set_post_shutdown_strategy(PostShutdownStrategy::RunImmediately);
    let ran = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&ran);
    coordinator.add_action(move || {
        count.fetch_add(1, Ordering::SeqCst);
    });

    timeout(Duration::from_secs(3), async {
        while ran.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("immediate late action did not run");

    assert_eq!(discarded.load(Ordering::SeqCst), 0);
}
