//! `medchain-core`: shared domain vocabulary for the purchasing and supplier services.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the error taxonomy, order priorities and the aggregate root trait.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod priority;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{EventId, OrderId, OrderItemId, ProductId, SupplierId, TraceId};
pub use priority::Priority;
