//! Purchase-order priority shared by both services.

use serde::{Deserialize, Serialize};

/// Urgency of a purchase order, ordered from least to most urgent.
///
/// Serialized with the labels the order and supplier services exchange on the
/// wire (`BAJA`, `MEDIA`, `ALTA`, `CRITICA`); English labels are accepted on
/// input.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    #[serde(rename = "BAJA", alias = "LOW")]
    Low,
    #[serde(rename = "MEDIA", alias = "MEDIUM")]
    Medium,
    #[serde(rename = "ALTA", alias = "HIGH")]
    High,
    #[serde(rename = "CRITICA", alias = "CRITICAL")]
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "BAJA",
            Priority::Medium => "MEDIA",
            Priority::High => "ALTA",
            Priority::Critical => "CRITICA",
        }
    }

    /// Map a free-text priority label from an untrusted producer.
    ///
    /// Unrecognised or missing labels fall back to `Medium`.
    pub fn from_external_label(label: Option<&str>) -> Priority {
        let Some(label) = label else {
            return Priority::Medium;
        };
        match label.trim().to_ascii_uppercase().as_str() {
            "ALTA" | "HIGH" | "URGENTE" => Priority::High,
            "MEDIA" | "MEDIUM" | "NORMAL" => Priority::Medium,
            "BAJA" | "LOW" => Priority::Low,
            "CRITICA" | "CRÍTICA" | "CRITICAL" => Priority::Critical,
            _ => Priority::Medium,
        }
    }
}

impl core::fmt::Display for Priority {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
