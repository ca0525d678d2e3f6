use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use medchain_core::EventId;

use crate::catalog::{CatalogEvent, EventKind, EventRegistry, SubjectKind};

/// Failure to encode or decode an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("envelope json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    #[error("event {event_type} must carry {expected}")]
    SubjectMismatch {
        event_type: String,
        expected: &'static str,
    },
}

/// The `<subject>_id` field of an envelope.
///
/// Flattened into the envelope, so exactly one of `orden_id`, `proveedor_id`
/// or `producto_id` appears at the top level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Subject {
    #[serde(rename = "orden_id")]
    Order(String),
    #[serde(rename = "proveedor_id")]
    Supplier(String),
    #[serde(rename = "producto_id")]
    Product(String),
}

impl Subject {
    pub fn of(kind: SubjectKind, id: impl Into<String>) -> Self {
        match kind {
            SubjectKind::Order => Subject::Order(id.into()),
            SubjectKind::Supplier => Subject::Supplier(id.into()),
            SubjectKind::Product => Subject::Product(id.into()),
        }
    }

    pub fn kind(&self) -> SubjectKind {
        match self {
            Subject::Order(_) => SubjectKind::Order,
            Subject::Supplier(_) => SubjectKind::Supplier,
            Subject::Product(_) => SubjectKind::Product,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Subject::Order(id) | Subject::Supplier(id) | Subject::Product(id) => id,
        }
    }
}

/// Wire envelope for every event exchanged between the services.
///
/// JSON shape:
/// `{event_id, event_type, <subject>_id, timestamp (RFC3339), [source], data}`.
///
/// Notes:
/// - `event_id` is globally unique; envelopes are immutable once published.
/// - `source` is only present on signals from outside the trust boundary.
/// - `data` defaults to raw JSON so consumers can inspect `event_type` before
///   committing to a payload type (see [`EventEnvelope::into_typed`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<P = serde_json::Value> {
    event_id: EventId,
    event_type: String,
    #[serde(flatten)]
    subject: Subject,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    data: P,
}

impl<P: CatalogEvent> EventEnvelope<P> {
    /// Wrap a catalog payload; `event_type` and subject family come from `P::KIND`.
    pub fn new(subject_id: impl Into<String>, data: P, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: P::KIND.event_type.to_string(),
            subject: Subject::of(P::KIND.subject, subject_id),
            timestamp,
            source: None,
            data,
        }
    }
}

impl<P> EventEnvelope<P> {
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_event_id(mut self, event_id: EventId) -> Self {
        self.event_id = event_id;
        self
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn subject_id(&self) -> &str {
        self.subject.id()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn data(&self) -> &P {
        &self.data
    }

    pub fn into_data(self) -> P {
        self.data
    }

    /// Catalog entry for this envelope's `event_type`, if registered.
    pub fn kind(&self) -> Option<&'static EventKind> {
        EventRegistry::global().lookup(&self.event_type)
    }
}

impl<P: Serialize> EventEnvelope<P> {
    pub fn to_json(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl EventEnvelope<serde_json::Value> {
    /// Decode an envelope without committing to a payload type.
    pub fn from_json(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Build an envelope for an arbitrary event type (used by producers that
    /// relay signals the catalog may not know).
    pub fn raw(
        event_type: impl Into<String>,
        subject: Subject,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: event_type.into(),
            subject,
            timestamp,
            source: None,
            data,
        }
    }

    /// Commit to payload type `P`, checking both the tag and the subject family.
    pub fn into_typed<P: CatalogEvent>(self) -> Result<EventEnvelope<P>, EnvelopeError> {
        if self.event_type != P::KIND.event_type {
            return Err(EnvelopeError::TypeMismatch {
                expected: P::KIND.event_type,
                found: self.event_type,
            });
        }
        if self.subject.kind() != P::KIND.subject {
            return Err(EnvelopeError::SubjectMismatch {
                event_type: self.event_type,
                expected: P::KIND.subject.field_name(),
            });
        }
        let data = serde_json::from_value(self.data)?;
        Ok(EventEnvelope {
            event_id: self.event_id,
            event_type: self.event_type,
            subject: self.subject,
            timestamp: self.timestamp,
            source: self.source,
            data,
        })
    }
}
