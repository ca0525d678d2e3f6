//! In-process durable broker for tests/dev.
//!
//! Models the subset of a topic-exchange broker the services rely on:
//!
//! - one exchange per [`Topic`], declared idempotently
//! - one durable queue per consumer group, bound by pattern; bindings are
//!   deduplicated per (queue, pattern)
//! - fan-out to every matching queue, once per queue
//! - competing consumers on the same queue, prefetch 1 each
//! - a dead-letter store per queue
//!
//! Messages survive consumer restarts within the process, not process restarts.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{Span, debug, info, warn};

use crate::bus::{
    CloseError, ConsumerGroup, MessageBus, OutboundMessage, PublishError, SubscribeError,
    Topology, TopologyError,
};
use crate::delivery::{Delivery, MessageHandler, RetryPolicy, Settlement};
use crate::pattern::BindingPattern;
use crate::topic::Topic;
use crate::worker::{DeliverySource, SourceError, WorkerHandle};

/// Default bound on how long `close()` waits for consumers.
pub const DEFAULT_SHUTDOWN_WINDOW: Duration = Duration::from_secs(30);

/// A message parked after being rejected without requeue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub queue: String,
    pub message_id: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub reason: String,
    pub attempts: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: String,
    routing_key: String,
    body: Vec<u8>,
}

#[derive(Debug, Clone)]
struct Binding {
    queue: String,
    pattern: BindingPattern,
}

#[derive(Debug, Default)]
struct QueueState {
    topic: Option<Topic>,
    ready: VecDeque<StoredMessage>,
    unacked: usize,
    dead_letters: Vec<DeadLetter>,
}

#[derive(Debug, Default)]
struct BrokerState {
    exchanges: HashMap<Topic, Vec<Binding>>,
    queues: HashMap<String, QueueState>,
}

impl BrokerState {
    fn declare_queue(&mut self, topic: Topic, group: &ConsumerGroup) -> bool {
        let Some(bindings) = self.exchanges.get_mut(&topic) else {
            return false;
        };
        let exists = bindings
            .iter()
            .any(|b| b.queue == group.name() && b.pattern == *group.binding());
        if !exists {
            bindings.push(Binding {
                queue: group.name().to_string(),
                pattern: group.binding().clone(),
            });
        }
        let queue = self.queues.entry(group.name().to_string()).or_default();
        queue.topic.get_or_insert(topic);
        true
    }

    fn is_idle(&self) -> bool {
        self.queues
            .values()
            .all(|q| q.ready.is_empty() && q.unacked == 0)
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<BrokerState>,
    /// Signalled when a message becomes ready.
    available: Condvar,
    /// Signalled when a delivery is settled.
    settled: Condvar,
    closed: AtomicBool,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, BrokerState>, String> {
        self.state
            .lock()
            .map_err(|_| "broker state lock poisoned".to_string())
    }
}

/// In-memory topic-exchange broker.
#[derive(Debug)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
    workers: Mutex<Vec<WorkerHandle>>,
    retry: RetryPolicy,
    shutdown_window: Duration,
    log: Span,
}

impl InMemoryBroker {
    pub fn new(log: Span) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            workers: Mutex::new(Vec::new()),
            retry: RetryPolicy::default(),
            shutdown_window: DEFAULT_SHUTDOWN_WINDOW,
            log,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_shutdown_window(mut self, window: Duration) -> Self {
        self.shutdown_window = window;
        self
    }

    /// Messages waiting in `queue` (not counting the one in flight).
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.shared
            .lock()
            .ok()
            .and_then(|s| s.queues.get(queue).map(|q| q.ready.len()))
            .unwrap_or(0)
    }

    pub fn dead_letters(&self, queue: &str) -> Vec<DeadLetter> {
        self.shared
            .lock()
            .ok()
            .and_then(|s| s.queues.get(queue).map(|q| q.dead_letters.clone()))
            .unwrap_or_default()
    }

    /// `(queue, pattern)` pairs bound to `topic`'s exchange.
    pub fn bindings(&self, topic: Topic) -> Vec<(String, String)> {
        self.shared
            .lock()
            .ok()
            .and_then(|s| {
                s.exchanges.get(&topic).map(|bindings| {
                    bindings
                        .iter()
                        .map(|b| (b.queue.clone(), b.pattern.to_string()))
                        .collect()
                })
            })
            .unwrap_or_default()
    }

    pub fn has_exchange(&self, topic: Topic) -> bool {
        self.shared
            .lock()
            .map(|s| s.exchanges.contains_key(&topic))
            .unwrap_or(false)
    }

    /// Block until every queue is drained and nothing is in flight.
    ///
    /// Handlers that publish follow-up events enqueue them before their own
    /// delivery is settled, so an idle broker means the whole cascade is done.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let Ok(mut state) = self.shared.lock() else {
            return false;
        };
        loop {
            if state.is_idle() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.shared.settled.wait_timeout(state, remaining) {
                Ok((guard, _)) => state = guard,
                Err(_) => return false,
            }
        }
    }

    fn ensure_open(&self) -> bool {
        !self.shared.closed.load(Ordering::SeqCst)
    }
}

impl MessageBus for InMemoryBroker {
    fn declare(&self, topology: &Topology) -> Result<(), TopologyError> {
        if !self.ensure_open() {
            return Err(TopologyError::Closed);
        }
        let mut state = self.shared.lock().map_err(TopologyError::Unavailable)?;
        for topic in topology.exchanges() {
            state.exchanges.entry(*topic).or_default();
        }
        for (topic, group) in topology.queues() {
            state.declare_queue(*topic, group);
        }
        debug!(
            parent: &self.log,
            exchanges = topology.exchanges().len(),
            queues = topology.queues().len(),
            "topology declared"
        );
        Ok(())
    }

    fn publish_message(&self, message: OutboundMessage) -> Result<(), PublishError> {
        if !self.ensure_open() {
            return Err(PublishError::Closed);
        }
        if message.is_catch_all() {
            warn!(
                parent: &self.log,
                event_type = %message.event_type,
                topic = %message.topic,
                "event type has no registered routing key; publishing with catch-all key"
            );
        }

        let mut state = self.shared.lock().map_err(PublishError::Unavailable)?;
        let bindings = state
            .exchanges
            .get(&message.topic)
            .ok_or(PublishError::ExchangeNotDeclared(message.topic))?;
        let targets: BTreeSet<String> = bindings
            .iter()
            .filter(|b| b.pattern.matches(&message.routing_key))
            .map(|b| b.queue.clone())
            .collect();

        if targets.is_empty() {
            debug!(
                parent: &self.log,
                routing_key = %message.routing_key,
                topic = %message.topic,
                "no queue bound for routing key"
            );
            return Ok(());
        }

        let stored = StoredMessage {
            message_id: message.message_id.to_string(),
            routing_key: message.routing_key,
            body: message.body,
        };
        for queue in targets {
            state
                .queues
                .entry(queue)
                .or_default()
                .ready
                .push_back(stored.clone());
        }
        drop(state);
        self.shared.available.notify_all();
        Ok(())
    }

    fn subscribe(
        &self,
        topic: Topic,
        group: ConsumerGroup,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), SubscribeError> {
        if !self.ensure_open() {
            return Err(SubscribeError::Closed);
        }
        group.validate()?;

        {
            let mut state = self.shared.lock().map_err(SubscribeError::Unavailable)?;
            if !state.declare_queue(topic, &group) {
                return Err(SubscribeError::ExchangeNotDeclared(topic));
            }
        }

        let source = QueueSource {
            shared: Arc::clone(&self.shared),
            topic,
            queue: group.name().to_string(),
        };
        let worker = WorkerHandle::spawn_consumer(
            group.name(),
            source,
            handler,
            self.retry.clone(),
            self.log.clone(),
        )
        .map_err(|e| SubscribeError::Unavailable(e.to_string()))?;

        info!(
            parent: &self.log,
            queue = group.name(),
            topic = %topic,
            binding = %group.binding(),
            "consumer subscribed"
        );

        self.workers
            .lock()
            .map_err(|_| SubscribeError::Unavailable("worker registry poisoned".into()))?
            .push(worker);
        Ok(())
    }

    fn close(&self) -> Result<(), CloseError> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let workers: Vec<WorkerHandle> = match self.workers.lock() {
            Ok(mut workers) => workers.drain(..).collect(),
            Err(_) => return Err(CloseError::Unavailable("worker registry poisoned".into())),
        };
        for worker in &workers {
            worker.request_stop();
        }
        self.shared.available.notify_all();

        let deadline = Instant::now() + self.shutdown_window;
        let mut lingering = Vec::new();
        for worker in workers {
            let name = worker.name().to_string();
            if !worker.join_until(deadline) {
                lingering.push(name);
            }
        }

        if lingering.is_empty() {
            info!(parent: &self.log, "bus closed");
            Ok(())
        } else {
            warn!(parent: &self.log, consumers = ?lingering, "consumers outlived the shutdown window");
            Err(CloseError::ShutdownTimedOut(lingering))
        }
    }
}

impl Drop for InMemoryBroker {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Pulls from one queue on behalf of one consumer.
struct QueueSource {
    shared: Arc<Shared>,
    topic: Topic,
    queue: String,
}

impl DeliverySource for QueueSource {
    fn next(&mut self, wait: Duration) -> Result<Option<Delivery>, SourceError> {
        let deadline = Instant::now() + wait;
        let mut state = self.shared.lock().map_err(SourceError::Unavailable)?;
        loop {
            if self.shared.closed.load(Ordering::SeqCst) {
                return Ok(None);
            }
            if let Some(queue) = state.queues.get_mut(&self.queue) {
                if let Some(message) = queue.ready.pop_front() {
                    queue.unacked += 1;
                    return Ok(Some(Delivery {
                        topic: self.topic,
                        queue: self.queue.clone(),
                        message_id: message.message_id,
                        routing_key: message.routing_key,
                        body: message.body,
                        attempt: 1,
                    }));
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            state = self
                .shared
                .available
                .wait_timeout(state, remaining)
                .map_err(|_| SourceError::Unavailable("broker state lock poisoned".into()))?
                .0;
        }
    }

    fn settle(&mut self, delivery: &Delivery, settlement: &Settlement) -> Result<(), SourceError> {
        let mut state = self.shared.lock().map_err(SourceError::Unavailable)?;
        let queue = state.queues.entry(self.queue.clone()).or_default();
        queue.unacked = queue.unacked.saturating_sub(1);
        if let Settlement::DeadLetter { attempts, reason } = settlement {
            queue.dead_letters.push(DeadLetter {
                queue: self.queue.clone(),
                message_id: delivery.message_id.clone(),
                routing_key: delivery.routing_key.clone(),
                body: delivery.body.clone(),
                reason: reason.clone(),
                attempts: *attempts,
                dead_lettered_at: Utc::now(),
            });
        }
        drop(state);
        self.shared.settled.notify_all();
        Ok(())
    }
}
