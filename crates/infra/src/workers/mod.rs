//! Background workers: periodic jobs and bus subscribers, each on its own thread with
//! graceful shutdown.

mod event_subscriber;
mod interest_scheduler;
mod outbox_relay;

use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::debug;

pub use event_subscriber::EventSubscriberWorker;
pub use interest_scheduler::InterestScheduler;
pub use outbox_relay::OutboxRelay;

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Spawn a named thread running `body` with a shutdown receiver.
fn spawn_worker<F>(name: &'static str, body: F) -> io::Result<WorkerHandle>
where
    F: FnOnce(mpsc::Receiver<()>) + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
    let join = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || body(shutdown_rx))?;

    Ok(WorkerHandle {
        name,
        shutdown: shutdown_tx,
        join: Some(join),
    })
}

/// Run `tick` immediately and then every `interval` until shutdown is requested.
fn run_periodically(
    name: &'static str,
    interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
    mut tick: impl FnMut(),
) {
    loop {
        tick();
        match shutdown_rx.recv_timeout(interval) {
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!(worker = name, "worker stopped");
}
