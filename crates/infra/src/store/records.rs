//! Secondary keys of the stored domain records.

use medchain_core::{AggregateRoot, OrderId, ProductId, SupplierId, TraceId};
use medchain_purchasing::{Product, PurchaseOrder};
use medchain_suppliers::{AuditTrace, Supplier};

use super::Record;

/// Index names accepted by [`super::KeyedStore::query`].
pub mod index {
    pub const STATE: &str = "state";
    pub const SUPPLIER_ID: &str = "supplier_id";
    pub const PRODUCT_ID: &str = "product_id";
    pub const CERTIFICATION: &str = "certification";
    pub const COLD_CHAIN: &str = "cold_chain";
    pub const SUBJECT_ID: &str = "subject_id";
    pub const CHANGE_TYPE: &str = "change_type";
}

impl Record for PurchaseOrder {
    type Key = OrderId;
    const COLLECTION: &'static str = "purchase_order";
    const INDEXES: &'static [&'static str] = &[index::STATE, index::SUPPLIER_ID, index::PRODUCT_ID];

    fn key(&self) -> OrderId {
        *self.id()
    }

    fn version(&self) -> u64 {
        AggregateRoot::version(self)
    }

    fn index_values(&self, name: &str) -> Vec<String> {
        match name {
            index::STATE => vec![self.state().as_str().to_string()],
            index::SUPPLIER_ID => self.supplier_id().map(|s| s.to_string()).into_iter().collect(),
            index::PRODUCT_ID => {
                let mut ids: Vec<String> = self.product_ids().map(|p| p.to_string()).collect();
                ids.sort();
                ids.dedup();
                ids
            }
            _ => Vec::new(),
        }
    }
}

impl Record for Supplier {
    type Key = SupplierId;
    const COLLECTION: &'static str = "supplier";
    const INDEXES: &'static [&'static str] = &[index::STATE, index::CERTIFICATION, index::COLD_CHAIN];

    fn key(&self) -> SupplierId {
        self.id_typed()
    }

    fn version(&self) -> u64 {
        AggregateRoot::version(self)
    }

    fn index_values(&self, name: &str) -> Vec<String> {
        match name {
            index::STATE => vec![self.state().as_str().to_string()],
            index::CERTIFICATION => self
                .certifications()
                .iter()
                .map(|c| c.certification_type.to_ascii_uppercase())
                .collect(),
            index::COLD_CHAIN => vec![self.has_cold_chain().to_string()],
            _ => Vec::new(),
        }
    }
}

impl Record for Product {
    type Key = ProductId;
    const COLLECTION: &'static str = "product";
    const INDEXES: &'static [&'static str] = &[index::COLD_CHAIN];

    fn key(&self) -> ProductId {
        self.id().clone()
    }

    fn version(&self) -> u64 {
        AggregateRoot::version(self)
    }

    fn index_values(&self, name: &str) -> Vec<String> {
        match name {
            index::COLD_CHAIN => vec![self.requires_cold_chain().to_string()],
            _ => Vec::new(),
        }
    }
}

impl Record for AuditTrace {
    type Key = TraceId;
    const COLLECTION: &'static str = "audit_trace";
    const INDEXES: &'static [&'static str] = &[index::SUBJECT_ID, index::CHANGE_TYPE];

    fn key(&self) -> TraceId {
        self.trace_id
    }

    /// Traces are immutable.
    fn version(&self) -> u64 {
        1
    }

    fn index_values(&self, name: &str) -> Vec<String> {
        match name {
            index::SUBJECT_ID => vec![self.subject_id.clone()],
            index::CHANGE_TYPE => vec![self.change_type.as_str().to_string()],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use medchain_core::{ExpectedVersion, Priority};
    use medchain_purchasing::{GenerateOrder, NewOrderItem, OrderState};
    use medchain_suppliers::ChangeType;

    use super::*;
    use crate::store::{InMemoryKeyedStore, KeyedStore};

    fn order(products: &[&str]) -> PurchaseOrder {
        let (order, _) = PurchaseOrder::generate(
            GenerateOrder {
                order_id: OrderId::new(),
                supplier_id: None,
                reason: "restock".into(),
                priority: Priority::Medium,
                items: products
                    .iter()
                    .map(|p| NewOrderItem {
                        product_id: ProductId::new(*p).unwrap(),
                        quantity: 5,
                        unit_price: 2.0,
                        required_temperature: 0.0,
                    })
                    .collect(),
                tag: None,
            },
            Utc::now(),
        )
        .unwrap();
        order
    }

    #[test]
    fn orders_are_queryable_by_state_and_every_product() {
        let store = InMemoryKeyedStore::new();
        let o = order(&["sku-1", "sku-2", "sku-1"]);
        store.create(o.clone()).unwrap();

        assert_eq!(o.index_values(index::PRODUCT_ID), vec!["sku-1", "sku-2"]);
        assert_eq!(store.query(index::PRODUCT_ID, "sku-2").unwrap().len(), 1);
        assert_eq!(store.query(index::STATE, OrderState::Generated.as_str()).unwrap().len(), 1);

        let mut sent = o.clone();
        sent.cancel(None, Utc::now()).unwrap();
        store
            .update(sent, ExpectedVersion::Exact(AggregateRoot::version(&o)))
            .unwrap();
        assert!(store.query(index::STATE, "GENERADA").unwrap().is_empty());
        assert_eq!(store.query(index::STATE, "CANCELADA").unwrap().len(), 1);
    }

    #[test]
    fn unassigned_orders_have_no_supplier_key() {
        assert!(order(&["sku-1"]).index_values(index::SUPPLIER_ID).is_empty());
    }

    #[test]
    fn audit_traces_are_keyed_by_subject() {
        let store = InMemoryKeyedStore::new();
        let now = Utc::now();
        store.create(AuditTrace::new("sup-1", ChangeType::Creation, "registered", now)).unwrap();
        store.create(AuditTrace::new("sup-2", ChangeType::Creation, "registered", now)).unwrap();
        store.create(AuditTrace::new("sup-1", ChangeType::Suspension, "suspended", now)).unwrap();

        let trail = store.query(index::SUBJECT_ID, "sup-1").unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[1].change_type, ChangeType::Suspension);
        assert_eq!(store.query(index::CHANGE_TYPE, "CREACION").unwrap().len(), 2);
    }
}
