//! Use cases over the keyed store, the audit sink and the message bus.
//!
//! Services are synchronous and hold no state of their own beyond the
//! open-order index. Every successful transition is persisted first and then
//! published; a publish failure after a successful write is reported to the
//! caller (at-least-once: a retry may observe the already-written state).

use thiserror::Error;

use medchain_core::DomainError;
use medchain_events::PublishError;

use crate::audit::AuditError;
use crate::store::StoreError;

pub mod orders;
pub mod products;
pub mod suppliers;

#[cfg(test)]
pub(crate) mod testing;

pub use orders::{CreateOrder, OrderService};
pub use products::ProductService;
pub use suppliers::{EvaluateSupplier, SupplierService};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to publish event: {0}")]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Audit(#[from] AuditError),
}

/// Coarse classification shared by the bus handlers and the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    InvalidTransition,
    Conflict,
    /// A collaborator is unavailable; retrying may succeed.
    Transient,
    Internal,
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Domain(err) => match err {
                DomainError::Validation(_) | DomainError::InvalidId(_) => ErrorKind::Validation,
                DomainError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
                DomainError::NotFound => ErrorKind::NotFound,
                DomainError::Conflict(_) => ErrorKind::Conflict,
            },
            ServiceError::Store(err) => match err {
                StoreError::NotFound { .. } => ErrorKind::NotFound,
                StoreError::Conflict { .. } => ErrorKind::Conflict,
                StoreError::Unavailable(_) => ErrorKind::Transient,
                StoreError::UnknownIndex { .. } => ErrorKind::Internal,
            },
            ServiceError::Publish(err) => match err {
                PublishError::Unavailable(_) | PublishError::Closed => ErrorKind::Transient,
                PublishError::Encode(_) | PublishError::ExchangeNotDeclared(_) => ErrorKind::Internal,
            },
            ServiceError::Audit(err) => {
                if err.is_transient() {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Internal
                }
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
