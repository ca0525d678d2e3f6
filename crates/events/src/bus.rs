//! Durable message-bus contract (mechanics only).
//!
//! The bus is a set of **topic exchanges** (one per [`Topic`]) with
//! **durable queues** bound to them. Each consumer group owns one queue; the
//! queue's binding pattern decides which routing keys it receives.
//!
//! ## Publishing
//!
//! - The envelope is JSON-encoded and marked persistent.
//! - The routing key is derived from the envelope's `event_type` through the
//!   catalog registry. The mapping is total: unknown types go to
//!   [`CATCH_ALL_ROUTING_KEY`] and the adapter logs them; nothing is dropped
//!   silently at the publisher.
//!
//! ## Consuming
//!
//! - Delivery is **at-least-once**; handlers must be idempotent.
//! - Each consumer keeps exactly **one message in flight** (prefetch = 1).
//!   Within a group, handler invocations never overlap and follow publish
//!   order for a single publisher. Different groups run in parallel.
//! - Settlement is decided by the handler result: success acknowledges;
//!   retryable failures are retried in place with bounded backoff; exhausted
//!   or non-retryable failures are rejected without requeue and kept in the
//!   queue's dead-letter store for operator replay.
//!
//! ## Topology
//!
//! Declaring an exchange, queue or binding that already exists is a no-op.
//! Services declare their topology at startup and may do so repeatedly.
//!
//! ## Shutdown
//!
//! `close()` stops intake, lets every consumer settle its in-flight message
//! and joins consumers within a bounded shutdown window.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use medchain_core::EventId;

use crate::catalog::{CATCH_ALL_ROUTING_KEY, CatalogEvent, EventRegistry};
use crate::delivery::MessageHandler;
use crate::envelope::{EnvelopeError, EventEnvelope};
use crate::pattern::BindingPattern;
use crate::topic::Topic;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] EnvelopeError),

    #[error("exchange {0} has not been declared")]
    ExchangeNotDeclared(Topic),

    #[error("bus is closed")]
    Closed,

    #[error("bus unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("exchange {0} has not been declared")]
    ExchangeNotDeclared(Topic),

    #[error("invalid consumer group: {0}")]
    InvalidGroup(String),

    #[error("bus is closed")]
    Closed,

    #[error("bus unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("bus is closed")]
    Closed,

    #[error("bus unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum CloseError {
    #[error("consumers still running after the shutdown window: {0:?}")]
    ShutdownTimedOut(Vec<String>),

    #[error("bus unavailable: {0}")]
    Unavailable(String),
}

/// A named consumer group and the pattern its durable queue is bound with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerGroup {
    name: String,
    binding: BindingPattern,
}

impl ConsumerGroup {
    /// A group bound with `#` (every routing key on the topic).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binding: BindingPattern::all(),
        }
    }

    pub fn bound_to(mut self, binding: BindingPattern) -> Self {
        self.binding = binding;
        self
    }

    /// Name of the group; also the name of its durable queue.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn binding(&self) -> &BindingPattern {
        &self.binding
    }

    pub fn dead_letter_queue(&self) -> String {
        format!("{}.dead-letter", self.name)
    }

    pub(crate) fn validate(&self) -> Result<(), SubscribeError> {
        if self.name.trim().is_empty() {
            return Err(SubscribeError::InvalidGroup("name must not be empty".into()));
        }
        if self.name.chars().any(char::is_whitespace) {
            return Err(SubscribeError::InvalidGroup(format!(
                "name {:?} must not contain whitespace",
                self.name
            )));
        }
        Ok(())
    }
}

/// Exchanges and queues a service declares at startup.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    exchanges: Vec<Topic>,
    queues: Vec<(Topic, ConsumerGroup)>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fixed topic as a durable topic exchange.
    pub fn standard() -> Self {
        Topic::ALL.iter().fold(Self::new(), |t, topic| t.exchange(*topic))
    }

    pub fn exchange(mut self, topic: Topic) -> Self {
        if !self.exchanges.contains(&topic) {
            self.exchanges.push(topic);
        }
        self
    }

    pub fn queue(mut self, topic: Topic, group: ConsumerGroup) -> Self {
        self = self.exchange(topic);
        self.queues.push((topic, group));
        self
    }

    pub fn exchanges(&self) -> &[Topic] {
        &self.exchanges
    }

    pub fn queues(&self) -> &[(Topic, ConsumerGroup)] {
        &self.queues
    }
}

/// An encoded, routed message ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: Topic,
    pub message_id: EventId,
    pub event_type: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub persistent: bool,
    pub content_type: &'static str,
}

impl OutboundMessage {
    pub fn from_envelope<P: Serialize>(
        topic: Topic,
        envelope: &EventEnvelope<P>,
    ) -> Result<Self, EnvelopeError> {
        Ok(Self {
            topic,
            message_id: envelope.event_id(),
            event_type: envelope.event_type().to_string(),
            routing_key: EventRegistry::global()
                .routing_key(envelope.event_type())
                .to_string(),
            body: envelope.to_json()?,
            persistent: true,
            content_type: "application/json",
        })
    }

    /// True when the registry did not know the event type.
    pub fn is_catch_all(&self) -> bool {
        self.routing_key == CATCH_ALL_ROUTING_KEY
    }
}

/// Durable publish/subscribe transport.
pub trait MessageBus: Send + Sync {
    /// Idempotently declare exchanges, queues and bindings.
    fn declare(&self, topology: &Topology) -> Result<(), TopologyError>;

    fn publish_message(&self, message: OutboundMessage) -> Result<(), PublishError>;

    /// Declare the group's queue and binding, then start a consumer for it.
    fn subscribe(
        &self,
        topic: Topic,
        group: ConsumerGroup,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), SubscribeError>;

    /// Stop consuming, settle in-flight messages and release the transport.
    fn close(&self) -> Result<(), CloseError>;
}

impl<B> MessageBus for Arc<B>
where
    B: MessageBus + ?Sized,
{
    fn declare(&self, topology: &Topology) -> Result<(), TopologyError> {
        (**self).declare(topology)
    }

    fn publish_message(&self, message: OutboundMessage) -> Result<(), PublishError> {
        (**self).publish_message(message)
    }

    fn subscribe(
        &self,
        topic: Topic,
        group: ConsumerGroup,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), SubscribeError> {
        (**self).subscribe(topic, group, handler)
    }

    fn close(&self) -> Result<(), CloseError> {
        (**self).close()
    }
}

/// Envelope-level helpers on top of [`MessageBus`].
pub trait MessageBusExt: MessageBus {
    /// Encode `envelope` and publish it on `topic`.
    fn publish<P: Serialize>(
        &self,
        topic: Topic,
        envelope: &EventEnvelope<P>,
    ) -> Result<(), PublishError> {
        let message = OutboundMessage::from_envelope(topic, envelope)?;
        self.publish_message(message)
    }

    /// Publish a catalog event on the topic its catalog entry assigns.
    fn emit<P: CatalogEvent>(&self, envelope: &EventEnvelope<P>) -> Result<(), PublishError> {
        self.publish(P::KIND.topic, envelope)
    }
}

impl<B: MessageBus + ?Sized> MessageBusExt for B {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::stock::StockLow;
    use crate::envelope::Subject;
    use chrono::Utc;

    #[test]
    fn outbound_message_routes_by_registry() {
        let envelope = EventEnvelope::new(
            "sku-1",
            StockLow {
                product_name: "Insulin".into(),
                current_stock: 2,
                reorder_point: 10,
                max_stock: 50,
                required_quantity: 48,
            },
            Utc::now(),
        );
        let message = OutboundMessage::from_envelope(Topic::StockEvents, &envelope).unwrap();
        assert_eq!(message.routing_key, "stock.bajo");
        assert!(message.persistent);
        assert_eq!(message.content_type, "application/json");
        assert!(!message.is_catch_all());
    }

    #[test]
    fn unknown_event_type_is_routed_to_catch_all() {
        let envelope = EventEnvelope::raw(
            "inventario.recuento",
            Subject::Product("sku-1".into()),
            serde_json::json!({}),
            Utc::now(),
        );
        let message = OutboundMessage::from_envelope(Topic::StockEvents, &envelope).unwrap();
        assert_eq!(message.routing_key, CATCH_ALL_ROUTING_KEY);
        assert!(message.is_catch_all());
    }

    #[test]
    fn consumer_group_validation() {
        assert!(ConsumerGroup::new("purchase-order-stock-bajo").validate().is_ok());
        assert!(ConsumerGroup::new("  ").validate().is_err());
        assert!(ConsumerGroup::new("bad name").validate().is_err());
        assert_eq!(
            ConsumerGroup::new("supplier-order-generated").dead_letter_queue(),
            "supplier-order-generated.dead-letter"
        );
    }

    #[test]
    fn standard_topology_declares_every_topic_once() {
        let topology = Topology::standard().exchange(Topic::OrderEvents);
        assert_eq!(topology.exchanges().len(), Topic::ALL.len());
    }
}
