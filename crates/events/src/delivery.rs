//! Handler-side view of a delivery, and the retry / dead-letter settlement policy.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use thiserror::Error;
use tracing::{Span, error, warn};

use crate::envelope::EventEnvelope;
use crate::topic::Topic;

/// One message handed to a consumer-group handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: Topic,
    pub queue: String,
    pub message_id: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    /// 1-based attempt number for this delivery.
    pub attempt: u32,
}

impl Delivery {
    /// Decode the body as a raw envelope; decoding failures are [`HandlerError::Malformed`].
    pub fn envelope(&self) -> Result<EventEnvelope, HandlerError> {
        EventEnvelope::from_json(&self.body).map_err(|e| HandlerError::Malformed(e.to_string()))
    }
}

/// Outcome classification for a failed handler invocation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The body could not be decoded into the expected event.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The message was understood but cannot be applied (validation, illegal transition).
    #[error("message rejected: {0}")]
    Rejected(String),

    /// A collaborator (store, bus, audit sink) was unavailable.
    #[error("transient failure: {0}")]
    Transient(String),
}

impl HandlerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Transient(_))
    }
}

/// Reaction to one delivery.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError>;
}

impl<F> MessageHandler for F
where
    F: Fn(&Delivery) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        self(delivery)
    }
}

/// Bounded retry for retryable handler failures.
///
/// A delivery is attempted at most `max_attempts` times; between attempts the
/// consumer sleeps `initial_backoff * 2^(attempt-1)`, capped at `max_backoff`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Reject on the first failure.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Sleep before attempt `attempt + 1`.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// How a delivery ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Handler succeeded; remove from the queue.
    Ack { attempts: u32 },
    /// Rejected without requeue; park in the dead-letter store.
    DeadLetter { attempts: u32, reason: String },
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Invoke the handler once; a panic is settled like a permanent rejection.
fn invoke(handler: &dyn MessageHandler, delivery: &Delivery) -> Result<(), HandlerError> {
    panic::catch_unwind(AssertUnwindSafe(|| handler.handle(delivery))).unwrap_or_else(|payload| {
        Err(HandlerError::Rejected(format!(
            "handler panicked: {}",
            panic_message(payload.as_ref())
        )))
    })
}

/// Run `handler` against `delivery` under `policy` and decide its settlement.
///
/// A panicking handler never takes the consumer down with it: the delivery is
/// dead-lettered and the worker moves on.
pub fn deliver(
    handler: &dyn MessageHandler,
    mut delivery: Delivery,
    policy: &RetryPolicy,
    log: &Span,
) -> Settlement {
    let max_attempts = policy.attempts();
    loop {
        match invoke(handler, &delivery) {
            Ok(()) => {
                return Settlement::Ack {
                    attempts: delivery.attempt,
                };
            }
            Err(err) if err.is_retryable() && delivery.attempt < max_attempts => {
                let backoff = policy.backoff_after(delivery.attempt);
                warn!(
                    parent: log,
                    queue = %delivery.queue,
                    routing_key = %delivery.routing_key,
                    attempt = delivery.attempt,
                    max_attempts,
                    error = ?err,
                    "handler failed; retrying"
                );
                if !backoff.is_zero() {
                    std::thread::sleep(backoff);
                }
                delivery.attempt += 1;
            }
            Err(err) => {
                error!(
                    parent: log,
                    queue = %delivery.queue,
                    routing_key = %delivery.routing_key,
                    message_id = %delivery.message_id,
                    attempt = delivery.attempt,
                    error = ?err,
                    "handler failed; rejecting without requeue to dead-letter store"
                );
                return Settlement::DeadLetter {
                    attempts: delivery.attempt,
                    reason: err.to_string(),
                };
            }
        }
    }
}
