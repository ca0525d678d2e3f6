//! Redis Streams-backed message bus (durable, at-least-once delivery).
//!
//! - **Stream per topic**: `medchain:<topic>` plays the role of the topic exchange
//! - **Consumer group per queue**: the group name is the queue name; the
//!   group's binding pattern is applied on the consumer side and entries that
//!   do not match are acknowledged and skipped
//! - **Pending entries**: a restarted consumer first drains its own pending
//!   list, so entries read but never acknowledged are redelivered
//! - **Dead letters**: `medchain:<group>.dead-letter`, one entry per rejected message

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{Span, debug, info, warn};

use medchain_events::{
    BindingPattern, CloseError, ConsumerGroup, Delivery, DeliverySource, MessageBus,
    MessageHandler, OutboundMessage, PublishError, RetryPolicy, Settlement, SourceError,
    SubscribeError, Topic, Topology, TopologyError, WorkerHandle,
};

const KEY_PREFIX: &str = "medchain";
const DEFAULT_SHUTDOWN_WINDOW: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RedisBusError {
    #[error("redis connection error: {0}")]
    Connection(String),

    #[error("redis command error: {0}")]
    Command(String),
}

impl From<redis::RedisError> for RedisBusError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
            RedisBusError::Connection(err.to_string())
        } else {
            RedisBusError::Command(err.to_string())
        }
    }
}

pub fn stream_key(topic: Topic) -> String {
    format!("{KEY_PREFIX}:{}", topic.as_str())
}

fn dead_letter_key(group: &ConsumerGroup) -> String {
    format!("{KEY_PREFIX}:{}", group.dead_letter_queue())
}

pub struct RedisStreamsBus {
    client: redis::Client,
    publisher: Mutex<redis::Connection>,
    declared: Mutex<HashSet<Topic>>,
    workers: Mutex<Vec<WorkerHandle>>,
    closed: AtomicBool,
    retry: RetryPolicy,
    shutdown_window: Duration,
    log: Span,
}

impl RedisStreamsBus {
    /// Open a client and verify the server answers.
    pub fn connect(redis_url: &str, log: Span) -> Result<Self, RedisBusError> {
        let client = redis::Client::open(redis_url)?;
        let mut conn = client.get_connection()?;
        let _: String = redis::cmd("PING").query(&mut conn)?;
        info!(parent: &log, redis_url, "connected to redis");
        Ok(Self {
            client,
            publisher: Mutex::new(conn),
            declared: Mutex::new(HashSet::new()),
            workers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            retry: RetryPolicy::default(),
            shutdown_window: DEFAULT_SHUTDOWN_WINDOW,
            log,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_shutdown_window(mut self, window: Duration) -> Self {
        self.shutdown_window = window;
        self
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    /// `XGROUP CREATE ... $ MKSTREAM`; an existing group is left untouched.
    fn ensure_group(&self, topic: Topic, group: &ConsumerGroup) -> Result<(), RedisBusError> {
        let mut conn = self.client.get_connection()?;
        let created: redis::RedisResult<String> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream_key(topic))
            .arg(group.name())
            .arg("$")
            .arg("MKSTREAM")
            .query(&mut conn);
        match created {
            Ok(_) => Ok(()),
            Err(err) if err.code() == Some("BUSYGROUP") => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn is_declared(&self, topic: Topic) -> bool {
        self.declared
            .lock()
            .map(|d| d.contains(&topic))
            .unwrap_or(false)
    }
}

impl MessageBus for RedisStreamsBus {
    fn declare(&self, topology: &Topology) -> Result<(), TopologyError> {
        if !self.is_open() {
            return Err(TopologyError::Closed);
        }
        for (topic, group) in topology.queues() {
            self.ensure_group(*topic, group)
                .map_err(|e| TopologyError::Unavailable(e.to_string()))?;
        }
        let mut declared = self
            .declared
            .lock()
            .map_err(|_| TopologyError::Unavailable("topology registry poisoned".into()))?;
        declared.extend(topology.exchanges().iter().copied());
        debug!(
            parent: &self.log,
            exchanges = topology.exchanges().len(),
            queues = topology.queues().len(),
            "topology declared"
        );
        Ok(())
    }

    fn publish_message(&self, message: OutboundMessage) -> Result<(), PublishError> {
        if !self.is_open() {
            return Err(PublishError::Closed);
        }
        if !self.is_declared(message.topic) {
            return Err(PublishError::ExchangeNotDeclared(message.topic));
        }
        if message.is_catch_all() {
            warn!(
                parent: &self.log,
                event_type = %message.event_type,
                topic = %message.topic,
                "event type has no registered routing key; publishing with catch-all key"
            );
        }

        let mut conn = self
            .publisher
            .lock()
            .map_err(|_| PublishError::Unavailable("publisher connection poisoned".into()))?;
        let _: String = redis::cmd("XADD")
            .arg(stream_key(message.topic))
            .arg("*")
            .arg("message_id")
            .arg(message.message_id.to_string())
            .arg("event_type")
            .arg(&message.event_type)
            .arg("routing_key")
            .arg(&message.routing_key)
            .arg("content_type")
            .arg(message.content_type)
            .arg("payload")
            .arg(&message.body[..])
            .query(&mut *conn)
            .map_err(|e| PublishError::Unavailable(format!("XADD failed: {e}")))?;
        Ok(())
    }

    fn subscribe(
        &self,
        topic: Topic,
        group: ConsumerGroup,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), SubscribeError> {
        if !self.is_open() {
            return Err(SubscribeError::Closed);
        }
        if group.name().trim().is_empty() || group.name().chars().any(char::is_whitespace) {
            return Err(SubscribeError::InvalidGroup(group.name().to_string()));
        }
        if !self.is_declared(topic) {
            return Err(SubscribeError::ExchangeNotDeclared(topic));
        }
        self.ensure_group(topic, &group)
            .map_err(|e| SubscribeError::Unavailable(e.to_string()))?;

        let conn = self
            .client
            .get_connection()
            .map_err(|e| SubscribeError::Unavailable(e.to_string()))?;
        let source = StreamSource {
            conn,
            topic,
            stream: stream_key(topic),
            dead_letters: dead_letter_key(&group),
            group: group.name().to_string(),
            consumer: format!("{}-consumer", group.name()),
            binding: group.binding().clone(),
            draining_pending: true,
            log: self.log.clone(),
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
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let workers: Vec<WorkerHandle> = match self.workers.lock() {
            Ok(mut workers) => workers.drain(..).collect(),
            Err(_) => return Err(CloseError::Unavailable("worker registry poisoned".into())),
        };
        for worker in &workers {
            worker.request_stop();
        }

        let deadline = Instant::now() + self.shutdown_window;
        let lingering: Vec<String> = workers
            .into_iter()
            .filter_map(|w| {
                let name = w.name().to_string();
                (!w.join_until(deadline)).then_some(name)
            })
            .collect();

        if lingering.is_empty() {
            info!(parent: &self.log, "bus closed");
            Ok(())
        } else {
            warn!(parent: &self.log, consumers = ?lingering, "consumers outlived the shutdown window");
            Err(CloseError::ShutdownTimedOut(lingering))
        }
    }
}

/// One consumer of one group on one topic stream.
struct StreamSource {
    conn: redis::Connection,
    topic: Topic,
    stream: String,
    dead_letters: String,
    group: String,
    consumer: String,
    binding: BindingPattern,
    draining_pending: bool,
    log: Span,
}

impl StreamSource {
    fn read(&mut self, wait: Duration) -> Result<Option<StreamEntry>, SourceError> {
        let start = if self.draining_pending { "0" } else { ">" };
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP").arg(&self.group).arg(&self.consumer).arg("COUNT").arg(1);
        if !self.draining_pending {
            cmd.arg("BLOCK").arg(wait.as_millis().max(1) as u64);
        }
        cmd.arg("STREAMS").arg(&self.stream).arg(start);

        loop {
            let reply: redis::Value = cmd.query(&mut self.conn).map_err(unavailable)?;
            match parse_read_reply(&reply).into_iter().next() {
                Some(ReadEntry::Live(entry)) => return Ok(Some(entry)),
                Some(ReadEntry::Unreadable(id)) => {
                    // Acked so the pending list moves past it on the next read.
                    warn!(
                        parent: &self.log,
                        queue = %self.group,
                        entry_id = %id,
                        "stream entry without routing key or payload acknowledged"
                    );
                    self.ack(&id)?;
                    if !self.draining_pending {
                        return Ok(None);
                    }
                }
                None => {
                    self.draining_pending = false;
                    return Ok(None);
                }
            }
        }
    }

    fn ack(&mut self, id: &str) -> Result<(), SourceError> {
        let _: i64 = redis::cmd("XACK")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(id)
            .query(&mut self.conn)
            .map_err(unavailable)?;
        Ok(())
    }
}

fn unavailable(err: redis::RedisError) -> SourceError {
    SourceError::Unavailable(err.to_string())
}

impl DeliverySource for StreamSource {
    fn next(&mut self, wait: Duration) -> Result<Option<Delivery>, SourceError> {
        let Some(entry) = self.read(wait)? else {
            return Ok(None);
        };
        if !self.binding.matches(&entry.routing_key) {
            self.ack(&entry.id)?;
            return Ok(None);
        }
        Ok(Some(Delivery {
            topic: self.topic,
            queue: self.group.clone(),
            // The stream entry id is what settlement acknowledges.
            message_id: entry.id,
            routing_key: entry.routing_key,
            body: entry.payload,
            attempt: 1,
        }))
    }

    fn settle(&mut self, delivery: &Delivery, settlement: &Settlement) -> Result<(), SourceError> {
        if let Settlement::DeadLetter { attempts, reason } = settlement {
            let _: String = redis::cmd("XADD")
                .arg(&self.dead_letters)
                .arg("*")
                .arg("entry_id")
                .arg(&delivery.message_id)
                .arg("routing_key")
                .arg(&delivery.routing_key)
                .arg("reason")
                .arg(reason)
                .arg("attempts")
                .arg(*attempts)
                .arg("dead_lettered_at")
                .arg(chrono::Utc::now().to_rfc3339())
                .arg("payload")
                .arg(&delivery.body[..])
                .query(&mut self.conn)
                .map_err(unavailable)?;
        }
        self.ack(&delivery.message_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StreamEntry {
    id: String,
    routing_key: String,
    payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReadEntry {
    Live(StreamEntry),
    /// Still pending but deleted from the stream, or missing its fields.
    Unreadable(String),
}

/// Entries of an `XREADGROUP` reply: `[[stream, [[id, [field, value, ...]], ...]], ...]`.
/// A `Nil` reply (block timeout) yields nothing.
fn parse_read_reply(reply: &redis::Value) -> Vec<ReadEntry> {
    let redis::Value::Bulk(streams) = reply else {
        return Vec::new();
    };
    streams
        .iter()
        .filter_map(|stream| match stream {
            redis::Value::Bulk(parts) => parts.get(1),
            _ => None,
        })
        .filter_map(|entries| match entries {
            redis::Value::Bulk(entries) => Some(entries),
            _ => None,
        })
        .flatten()
        .filter_map(parse_entry)
        .collect()
}

fn parse_entry(entry: &redis::Value) -> Option<ReadEntry> {
    let redis::Value::Bulk(parts) = entry else {
        return None;
    };
    let id = match parts.first()? {
        redis::Value::Data(id) => String::from_utf8_lossy(id).into_owned(),
        _ => return None,
    };
    // Pending entries that were deleted from the stream come back with nil fields.
    let Some(redis::Value::Bulk(fields)) = parts.get(1) else {
        return Some(ReadEntry::Unreadable(id));
    };

    let mut routing_key = None;
    let mut payload = None;
    for pair in fields.chunks(2) {
        if let [redis::Value::Data(name), redis::Value::Data(value)] = pair {
            match name.as_slice() {
                b"routing_key" => routing_key = Some(String::from_utf8_lossy(value).into_owned()),
                b"payload" => payload = Some(value.clone()),
                _ => {}
            }
        }
    }
    match (routing_key, payload) {
        (Some(routing_key), Some(payload)) => Some(ReadEntry::Live(StreamEntry {
            id,
            routing_key,
            payload,
        })),
        _ => Some(ReadEntry::Unreadable(id)),
    }
}
