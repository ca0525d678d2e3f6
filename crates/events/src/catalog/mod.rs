//! Domain event catalog: the vocabulary shared by the purchasing and supplier services.
//!
//! Every event type is described once by an [`EventKind`] entry (stable
//! `event_type` tag, routing key, topic and subject family). Payload structs
//! name their entry through [`CatalogEvent::KIND`], and [`EventRegistry`] is
//! keyed by the `event_type` string, so routing never depends on matching
//! concrete Rust types.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::topic::Topic;

pub mod external;
pub mod orders;
pub mod stock;
pub mod suppliers;

/// Routing key used for event types the registry does not know.
pub const CATCH_ALL_ROUTING_KEY: &str = "unknown";

/// Which identifier an envelope is about; decides the `<subject>_id` wire field.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SubjectKind {
    Order,
    Supplier,
    Product,
}

impl SubjectKind {
    /// Name of the top-level envelope field carrying the subject id.
    pub fn field_name(&self) -> &'static str {
        match self {
            SubjectKind::Order => "orden_id",
            SubjectKind::Supplier => "proveedor_id",
            SubjectKind::Product => "producto_id",
        }
    }
}

/// Catalog entry for one event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventKind {
    /// Human name used in logs and docs (e.g. `OrderGenerated`).
    pub name: &'static str,
    /// Stable wire tag carried in the envelope's `event_type`.
    pub event_type: &'static str,
    pub routing_key: &'static str,
    pub topic: Topic,
    pub subject: SubjectKind,
}

/// A typed payload that belongs to the catalog.
pub trait CatalogEvent: Serialize + DeserializeOwned {
    const KIND: &'static EventKind;
}

/// Every registered event type.
pub const CATALOG: &[&EventKind] = &[
    &orders::ORDER_GENERATED,
    &orders::ORDER_SENT,
    &orders::ORDER_CONFIRMED,
    &orders::ORDER_RECEIVED,
    &orders::ORDER_CANCELLED,
    &stock::STOCK_LOW,
    &stock::BATCH_DAMAGED,
    &stock::DEMAND_FORECAST_HIGH,
    &suppliers::SUPPLIER_QUALIFIED,
    &suppliers::SUPPLIER_SUSPENDED,
    &suppliers::SUPPLIER_ACTIVATED,
    &suppliers::SUPPLIER_DEACTIVATED,
    &suppliers::EVALUATION_UPDATED,
    &suppliers::SUPPLIER_REQUEST,
    &suppliers::CERTIFICATION_EXPIRING,
    &external::STOCK_LOW_EXTERNAL,
    &external::DEMAND_HIGH_EXTERNAL,
    &external::BATCH_DAMAGED_EXTERNAL,
    &external::INVENTORY_ALERT_EXTERNAL,
];

/// Lookup table from `event_type` tag to catalog entry.
#[derive(Debug, Clone)]
pub struct EventRegistry {
    by_type: HashMap<&'static str, &'static EventKind>,
}

impl EventRegistry {
    /// Build a registry from catalog entries. The first entry for a tag wins.
    pub fn new(kinds: &[&'static EventKind]) -> Self {
        let mut by_type = HashMap::with_capacity(kinds.len());
        for kind in kinds {
            by_type.entry(kind.event_type).or_insert(*kind);
        }
        Self { by_type }
    }

    /// The registry built from [`CATALOG`].
    pub fn global() -> &'static EventRegistry {
        static REGISTRY: OnceLock<EventRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| EventRegistry::new(CATALOG))
    }

    pub fn lookup(&self, event_type: &str) -> Option<&'static EventKind> {
        self.by_type.get(event_type).copied()
    }

    /// Routing key for an event type; unknown types map to [`CATCH_ALL_ROUTING_KEY`].
    pub fn routing_key(&self, event_type: &str) -> &'static str {
        self.lookup(event_type)
            .map(|kind| kind.routing_key)
            .unwrap_or(CATCH_ALL_ROUTING_KEY)
    }

    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static EventKind> + '_ {
        self.by_type.values().copied()
    }
}

/// Routing key for `event_type` according to the global registry.
pub fn routing_key(event_type: &str) -> &'static str {
    EventRegistry::global().routing_key(event_type)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use proptest::prelude::*;

    #[test]
    fn event_types_and_routing_keys_are_unique() {
        let types: HashSet<_> = CATALOG.iter().map(|k| k.event_type).collect();
        let keys: HashSet<_> = CATALOG.iter().map(|k| k.routing_key).collect();
        assert_eq!(types.len(), CATALOG.len());
        assert_eq!(keys.len(), CATALOG.len());
        assert_eq!(EventRegistry::global().len(), CATALOG.len());
    }

    #[test]
    fn no_catalog_entry_uses_the_catch_all_key() {
        for kind in CATALOG {
            assert_ne!(kind.routing_key, CATCH_ALL_ROUTING_KEY, "{}", kind.name);
        }
    }

    #[test]
    fn payload_kinds_are_registered() {
        let registry = EventRegistry::global();
        let kinds: [&EventKind; 19] = [
            <orders::OrderGenerated as CatalogEvent>::KIND,
            <orders::OrderSent as CatalogEvent>::KIND,
            <orders::OrderConfirmed as CatalogEvent>::KIND,
            <orders::OrderReceived as CatalogEvent>::KIND,
            <orders::OrderCancelled as CatalogEvent>::KIND,
            <stock::StockLow as CatalogEvent>::KIND,
            <stock::BatchDamaged as CatalogEvent>::KIND,
            <stock::DemandForecastHigh as CatalogEvent>::KIND,
            <suppliers::SupplierQualified as CatalogEvent>::KIND,
            <suppliers::SupplierSuspended as CatalogEvent>::KIND,
            <suppliers::SupplierActivated as CatalogEvent>::KIND,
            <suppliers::SupplierDeactivated as CatalogEvent>::KIND,
            <suppliers::EvaluationUpdated as CatalogEvent>::KIND,
            <suppliers::SupplierRequest as CatalogEvent>::KIND,
            <suppliers::CertificationExpiring as CatalogEvent>::KIND,
            <external::StockLowExternal as CatalogEvent>::KIND,
            <external::DemandHighExternal as CatalogEvent>::KIND,
            <external::BatchDamagedExternal as CatalogEvent>::KIND,
            <external::InventoryAlertExternal as CatalogEvent>::KIND,
        ];
        for kind in kinds {
            assert_eq!(registry.lookup(kind.event_type), Some(kind), "{}", kind.name);
        }
    }

    #[test]
    fn known_routing_keys() {
        assert_eq!(routing_key("orden_compra.generada"), "orden.generada");
        assert_eq!(routing_key("stock.bajo"), "stock.bajo");
        assert_eq!(routing_key("lote.danado"), "stock.lote_danado");
        assert_eq!(routing_key("stock_bajo_externo"), "external.stock.bajo");
        assert_eq!(routing_key("evaluacion.actualizada"), "proveedor.evaluacion.actualizada");
    }

    #[test]
    fn unknown_event_type_routes_to_catch_all() {
        assert_eq!(routing_key("orden_compra.perdida"), CATCH_ALL_ROUTING_KEY);
        assert_eq!(routing_key(""), CATCH_ALL_ROUTING_KEY);
    }

    #[test]
    fn topics_follow_event_family() {
        for kind in CATALOG {
            let expected_prefix = match kind.topic {
                Topic::OrderEvents => "orden.",
                Topic::StockEvents => "stock.",
                Topic::SupplierEvents | Topic::NotificationEvents => "proveedor.",
                Topic::ExternalEvents => "external.",
            };
            assert!(
                kind.routing_key.starts_with(expected_prefix),
                "{} routes to {} on {}",
                kind.name,
                kind.routing_key,
                kind.topic
            );
        }
    }

    proptest! {
        /// Property: routing is a pure, total, stable function of the event type.
        #[test]
        fn routing_key_is_deterministic(idx in 0usize..CATALOG.len(), noise in "[a-z_.]{0,24}") {
            let kind = CATALOG[idx];
            let first = routing_key(kind.event_type);
            let second = EventRegistry::new(CATALOG).routing_key(kind.event_type);
            prop_assert_eq!(first, kind.routing_key);
            prop_assert_eq!(first, second);

            let unknown = routing_key(&noise);
            prop_assert_eq!(unknown, routing_key(&noise));
            if EventRegistry::global().lookup(&noise).is_none() {
                prop_assert_eq!(unknown, CATCH_ALL_ROUTING_KEY);
            }
        }
    }
}
