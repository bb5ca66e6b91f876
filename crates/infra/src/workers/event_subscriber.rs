use std::io;
use std::sync::mpsc;
use std::time::Duration;

use tracing::{debug, warn};

use corebank_events::{EventBus, Subscription};

use super::{WorkerHandle, spawn_worker};

/// Consumes bus messages on a dedicated thread (e.g. notification delivery).
///
/// Delivery is at-least-once, so handlers must be idempotent.
#[derive(Debug)]
pub struct EventSubscriberWorker;

impl EventSubscriberWorker {
    /// Subscribes before returning, so no message published afterwards is missed.
    pub fn spawn<M, B, H, E>(name: &'static str, bus: &B, mut handler: H) -> io::Result<WorkerHandle>
    where
        M: Send + 'static,
        B: EventBus<M>,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug + Send + 'static,
    {
        let sub: Subscription<M> = bus.subscribe();
        spawn_worker(name, move |shutdown_rx| {
            worker_loop(name, sub, shutdown_rx, &mut handler)
        })
    }
}

fn worker_loop<M, H, E>(
    name: &'static str,
    sub: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    handler: &mut H,
) where
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Debug,
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => {
                if let Err(err) = handler(msg) {
                    warn!(worker = name, error = ?err, "event handler failed");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!(worker = name, "subscriber stopped");
}
