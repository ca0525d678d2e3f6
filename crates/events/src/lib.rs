//! Event catalog and durable message-bus contract shared by both services.
//!
//! - `catalog`: every event type, its payload schema, topic and routing key
//! - `envelope`: the JSON wire envelope (`event_id`, `event_type`, `<subject>_id`, `timestamp`, `data`)
//! - `bus`: the publish/subscribe/close contract and its error types
//! - `delivery` / `worker`: per-consumer-group workers with bounded retry and dead-lettering
//! - `in_memory_bus`: a durable-in-process broker implementing the contract

pub mod bus;
pub mod catalog;
pub mod delivery;
pub mod envelope;
pub mod in_memory_bus;
pub mod pattern;
pub mod topic;
pub mod worker;

pub use bus::{
    CloseError, ConsumerGroup, MessageBus, MessageBusExt, OutboundMessage, PublishError,
    SubscribeError, Topology, TopologyError,
};
pub use catalog::{CatalogEvent, EventKind, EventRegistry, SubjectKind, CATCH_ALL_ROUTING_KEY};
pub use delivery::{Delivery, HandlerError, MessageHandler, RetryPolicy, Settlement};
pub use envelope::{EnvelopeError, EventEnvelope, Subject};
pub use in_memory_bus::{DeadLetter, InMemoryBroker};
pub use pattern::{BindingPattern, PatternError};
pub use topic::Topic;
pub use worker::{DeliverySource, SourceError, WorkerHandle};
