//! Shared wiring for service tests: in-memory stores, an in-memory broker with
//! one probe queue per topic, and the three services built on top of them.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::Span;

use medchain_core::{ProductId, SupplierId};
use medchain_events::{ConsumerGroup, InMemoryBroker, MessageBus, Topic, Topology};
use medchain_purchasing::{NewProduct, Product, PurchaseOrder};
use medchain_suppliers::{
    AuditTrace, Certification, LogisticsCapability, RegisterSupplier, Supplier,
};

use super::{OrderService, ProductService, SupplierService};
use crate::audit::{AuditError, AuditSink, StoreAuditSink};
use crate::store::{InMemoryKeyedStore, OpenOrderIndex};

pub(crate) struct Fixture {
    pub broker: Arc<InMemoryBroker>,
    pub order_store: Arc<InMemoryKeyedStore<PurchaseOrder>>,
    pub product_store: Arc<InMemoryKeyedStore<Product>>,
    pub supplier_store: Arc<InMemoryKeyedStore<Supplier>>,
    pub trace_store: Arc<InMemoryKeyedStore<AuditTrace>>,
    pub open_orders: Arc<OpenOrderIndex>,
    pub orders: Arc<OrderService>,
    pub products: Arc<ProductService>,
    pub suppliers: Arc<SupplierService>,
}

struct FailingSink(AuditError);

impl AuditSink for FailingSink {
    fn append(&self, _trace: AuditTrace) -> Result<(), AuditError> {
        Err(self.0.clone())
    }
}

impl Fixture {
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_audit_failure(err: AuditError) -> Self {
        Self::build(Some(err))
    }

    fn build(audit_failure: Option<AuditError>) -> Self {
        let broker = Arc::new(InMemoryBroker::new(Span::none()));
        let topology = Topic::ALL.iter().fold(Topology::standard(), |t, topic| {
            t.queue(*topic, ConsumerGroup::new(probe(*topic)))
        });
        broker.declare(&topology).unwrap();

        let order_store = Arc::new(InMemoryKeyedStore::<PurchaseOrder>::new());
        let product_store = Arc::new(InMemoryKeyedStore::<Product>::new());
        let supplier_store = Arc::new(InMemoryKeyedStore::<Supplier>::new());
        let trace_store = Arc::new(InMemoryKeyedStore::<AuditTrace>::new());
        let open_orders = Arc::new(OpenOrderIndex::new());

        let audit: Arc<dyn AuditSink> = match audit_failure {
            Some(err) => Arc::new(FailingSink(err)),
            None => Arc::new(StoreAuditSink::new(Arc::clone(&trace_store))),
        };

        let orders = Arc::new(OrderService::new(
            order_store.clone(),
            product_store.clone(),
            Arc::clone(&open_orders),
            broker.clone(),
            Span::none(),
        ));
        let products = Arc::new(ProductService::new(product_store.clone(), broker.clone(), Span::none()));
        let suppliers = Arc::new(SupplierService::new(
            supplier_store.clone(),
            trace_store.clone(),
            audit,
            broker.clone(),
            Span::none(),
        ));

        Self {
            broker,
            order_store,
            product_store,
            supplier_store,
            trace_store,
            open_orders,
            orders,
            products,
            suppliers,
        }
    }

    pub fn new_product(id: &str, stock: i64, reorder_point: i64, max_stock: i64) -> NewProduct {
        NewProduct {
            product_id: ProductId::new(id).unwrap(),
            name: format!("Product {id}"),
            current_stock: stock,
            reorder_point,
            max_stock,
            unit_cost: 4.5,
            storage: None,
        }
    }

    /// Register a product and return its id.
    pub fn product(&self, id: &str, stock: i64, reorder_point: i64, max_stock: i64) -> ProductId {
        self.products
            .register(Self::new_product(id, stock, reorder_point, max_stock), Utc::now())
            .unwrap();
        ProductId::new(id).unwrap()
    }

    /// Register an active cold-chain supplier and return its id.
    pub fn supplier(&self, legal_name: &str, now: DateTime<Utc>) -> SupplierId {
        self.suppliers
            .register(registration(legal_name, now), "test", now)
            .unwrap()
            .id_typed()
    }

    pub fn certification(kind: &str, expires_at: DateTime<Utc>) -> Certification {
        Certification {
            certification_type: kind.into(),
            number: format!("{kind}-001"),
            issuing_authority: "INVIMA".into(),
            issued_at: expires_at - Duration::days(365),
            expires_at,
        }
    }

    /// Events published on `topic` so far.
    pub fn published(&self, topic: Topic) -> usize {
        self.broker.queue_depth(&probe(topic))
    }
}

fn probe(topic: Topic) -> String {
    format!("probe.{}", topic.as_str())
}

pub(crate) fn registration(legal_name: &str, now: DateTime<Utc>) -> RegisterSupplier {
    RegisterSupplier {
        supplier_id: SupplierId::new(),
        legal_name: legal_name.into(),
        business_name: legal_name.into(),
        tax_id: "900123456".into(),
        contacts: vec![],
        offered_products: vec![],
        certifications: vec![Fixture::certification("BPM", now + Duration::days(365))],
        logistics: Some(LogisticsCapability {
            cold_chain: true,
            min_temperature: 2.0,
            max_temperature: 8.0,
            average_lead_time_days: 3,
            storage_capacity: 1000,
            coverage_zones: vec!["norte".into()],
        }),
        evaluation: None,
    }
}
