//! Consumer workers: one named thread per subscription, one message in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{Span, debug, warn};

use crate::delivery::{Delivery, MessageHandler, RetryPolicy, Settlement, deliver};

/// How long a consumer waits for a message before re-checking for shutdown.
pub const POLL_TICK: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("delivery source unavailable: {0}")]
    Unavailable(String),
}

/// Where a consumer pulls deliveries from and reports settlements to.
///
/// Implementations hand out at most one unsettled delivery at a time per
/// consumer; the worker always settles before asking for the next one.
pub trait DeliverySource: Send + 'static {
    /// Wait up to `wait` for the next delivery.
    fn next(&mut self, wait: Duration) -> Result<Option<Delivery>, SourceError>;

    fn settle(&mut self, delivery: &Delivery, settlement: &Settlement) -> Result<(), SourceError>;
}

/// Handle to control and join a background consumer.
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    stop: Arc<AtomicBool>,
    finished: mpsc::Receiver<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawn a consumer thread named `medchain-consumer-<group>`.
    pub fn spawn_consumer<S>(
        group: &str,
        mut source: S,
        handler: Arc<dyn MessageHandler>,
        policy: RetryPolicy,
        log: Span,
    ) -> std::io::Result<Self>
    where
        S: DeliverySource,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let (finished_tx, finished_rx) = mpsc::channel::<()>();
        let name = format!("medchain-consumer-{group}");
        let worker_stop = Arc::clone(&stop);

        let join = thread::Builder::new().name(name.clone()).spawn(move || {
            // Dropped when the loop exits; the handle observes the disconnect.
            let _finished = finished_tx;
            consumer_loop(&mut source, handler.as_ref(), &policy, &worker_stop, &log);
        })?;

        Ok(Self {
            name,
            stop,
            finished: finished_rx,
            join: Some(join),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the consumer to stop after settling its in-flight message.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Wait until `deadline` for the consumer to exit.
    ///
    /// Returns `false` (and detaches the thread) when it is still running.
    pub fn join_until(mut self, deadline: Instant) -> bool {
        self.request_stop();
        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.finished.recv_timeout(remaining) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                if let Some(join) = self.join.take() {
                    let _ = join.join();
                }
                true
            }
            Err(mpsc::RecvTimeoutError::Timeout) => false,
        }
    }
}

fn consumer_loop(
    source: &mut dyn DeliverySource,
    handler: &dyn MessageHandler,
    policy: &RetryPolicy,
    stop: &AtomicBool,
    log: &Span,
) {
    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }

        match source.next(POLL_TICK) {
            Ok(Some(delivery)) => {
                let settlement = deliver(handler, delivery.clone(), policy, log);
                if let Err(err) = source.settle(&delivery, &settlement) {
                    warn!(
                        parent: log,
                        queue = %delivery.queue,
                        message_id = %delivery.message_id,
                        error = ?err,
                        "failed to settle delivery; it may be redelivered"
                    );
                }
            }
            Ok(None) => continue,
            Err(err) => {
                warn!(parent: log, error = ?err, "delivery source failed; backing off");
                thread::sleep(POLL_TICK);
            }
        }
    }
    debug!(parent: log, "consumer stopped");
}
