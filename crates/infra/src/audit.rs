//! Write-only audit sink for supplier changes.

use std::sync::Arc;

use thiserror::Error;

use medchain_suppliers::AuditTrace;

use crate::store::{KeyedStore, StoreError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("audit trace rejected: {0}")]
    Rejected(String),
}

impl AuditError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AuditError::Unavailable(_))
    }
}

impl From<StoreError> for AuditError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Unavailable(msg) => AuditError::Unavailable(msg),
            other => AuditError::Rejected(other.to_string()),
        }
    }
}

/// Destination for audit traces. Traces are appended, never changed.
pub trait AuditSink: Send + Sync {
    fn append(&self, trace: AuditTrace) -> Result<(), AuditError>;
}

impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    fn append(&self, trace: AuditTrace) -> Result<(), AuditError> {
        (**self).append(trace)
    }
}

/// Sink that appends into the keyed store's audit collection.
#[derive(Debug, Clone)]
pub struct StoreAuditSink<S> {
    store: S,
}

impl<S> StoreAuditSink<S>
where
    S: KeyedStore<AuditTrace>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S> AuditSink for StoreAuditSink<S>
where
    S: KeyedStore<AuditTrace>,
{
    fn append(&self, trace: AuditTrace) -> Result<(), AuditError> {
        Ok(self.store.create(trace)?)
    }
}
