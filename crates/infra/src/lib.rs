//! Infrastructure layer: storage, audit sink, services, choreography wiring, config.
//!
//! - `store`: the generic keyed-record store and the open-order index
//! - `audit`: the write-only audit sink
//! - `services`: order, product and supplier use cases over the store and bus
//! - `choreography`: bus handlers that turn deliveries into service calls
//! - `runtime`: topology, subscriptions and process assembly
//! - `event_bus`: broker-backed bus implementations (Redis Streams, feature `redis`)

pub mod audit;
pub mod choreography;
pub mod config;
pub mod event_bus;
pub mod runtime;
pub mod services;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use audit::{AuditError, AuditSink, StoreAuditSink};
pub use config::{BusKind, Settings};
pub use runtime::{Runtime, RuntimeError};
pub use services::{ErrorKind, OrderService, ProductService, ServiceError, SupplierService};
pub use store::{InMemoryKeyedStore, KeyedStore, OpenOrderIndex, Record, StoreError};
