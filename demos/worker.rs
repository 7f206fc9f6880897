//! A worker process that cleans up after itself on SIGTERM or ctrl-c.
//!
//! Run with `cargo run --example worker`, then press ctrl-c.

use winddown::{Order, ShutdownCoordinator, Signal};

#[tokio::main]
async fn main() -> Result<(), winddown::ShutdownError> {
    env_logger::init();

    let coordinator =
        ShutdownCoordinator::new(Order::FirstInLastDone, &[Signal::Term, Signal::Int])?;
    coordinator.set_on_signal(|signal| log::info!("caught {signal}, shutting down"));

    // First added, last done: the pool outlives everything that uses it.
    coordinator.add_action(|| log::info!("closing connection pool"));
    coordinator.add_action(|| log::info!("flushing in-flight work"));
    coordinator.add_action(|| log::info!("stopping job intake"));

    log::info!("worker up; send SIGTERM or press ctrl-c to stop");
    coordinator.wait().await;
    log::info!("done");
    Ok(())
}
