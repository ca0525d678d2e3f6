//! Append-only audit trail of supplier changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use medchain_core::TraceId;

/// Actor recorded for changes made by event handlers.
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    #[serde(rename = "CREACION")]
    Creation,
    #[serde(rename = "ACTUALIZACION")]
    Update,
    #[serde(rename = "EVALUACION")]
    Evaluation,
    #[serde(rename = "SUSPENSION")]
    Suspension,
    #[serde(rename = "ACTIVACION")]
    Activation,
    #[serde(rename = "DESACTIVACION")]
    Deactivation,
    #[serde(rename = "ORDEN_CONFIRMADA")]
    OrderConfirmed,
    #[serde(rename = "ORDEN_RECIBIDA")]
    OrderReceived,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Creation => "CREACION",
            ChangeType::Update => "ACTUALIZACION",
            ChangeType::Evaluation => "EVALUACION",
            ChangeType::Suspension => "SUSPENSION",
            ChangeType::Activation => "ACTIVACION",
            ChangeType::Deactivation => "DESACTIVACION",
            ChangeType::OrderConfirmed => "ORDEN_CONFIRMADA",
            ChangeType::OrderReceived => "ORDEN_RECIBIDA",
        }
    }
}

impl core::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditTrace {
    pub trace_id: TraceId,
    pub subject_id: String,
    pub change_type: ChangeType,
    pub description: String,
    pub old_value: String,
    pub new_value: String,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditTrace {
    pub fn new(
        subject_id: impl Into<String>,
        change_type: ChangeType,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            trace_id: TraceId::new(),
            subject_id: subject_id.into(),
            change_type,
            description: description.into(),
            old_value: String::new(),
            new_value: String::new(),
            actor: SYSTEM_ACTOR.to_string(),
            timestamp,
        }
    }

    pub fn values(mut self, old_value: impl Into<String>, new_value: impl Into<String>) -> Self {
        self.old_value = old_value.into();
        self.new_value = new_value.into();
        self
    }

    pub fn by(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traces_default_to_the_system_actor() {
        let trace = AuditTrace::new("s-1", ChangeType::OrderConfirmed, "order confirmed", Utc::now())
            .values("", "ORD-20240101-abcdef12");
        assert_eq!(trace.actor, SYSTEM_ACTOR);
        assert_eq!(trace.new_value, "ORD-20240101-abcdef12");
        assert_eq!(
            serde_json::to_value(trace.change_type).unwrap(),
            serde_json::json!("ORDEN_CONFIRMADA")
        );
    }
}
