//! Fixed set of topics (exchanges) the services communicate over.

use serde::{Deserialize, Serialize};

/// A topic exchange. The set is fixed; topics are never created dynamically.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    /// Purchase-order lifecycle.
    OrderEvents,
    /// Supplier lifecycle and supplier requests.
    SupplierEvents,
    /// Stock / inventory signals produced inside the deployment.
    StockEvents,
    /// Operator-facing notices (e.g. certifications about to expire).
    NotificationEvents,
    /// Signals from systems outside the trust boundary.
    ExternalEvents,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Topic::OrderEvents,
        Topic::SupplierEvents,
        Topic::StockEvents,
        Topic::NotificationEvents,
        Topic::ExternalEvents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::OrderEvents => "order-events",
            Topic::SupplierEvents => "supplier-events",
            Topic::StockEvents => "stock-events",
            Topic::NotificationEvents => "notification-events",
            Topic::ExternalEvents => "external-events",
        }
    }
}

impl core::fmt::Display for Topic {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
