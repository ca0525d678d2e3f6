//! Process assembly: stores, services, the bus topology and the consumer
//! groups that wire the purchasing and supplier sides together.

use std::sync::Arc;

use thiserror::Error;
use tracing::{Span, info, info_span};

use medchain_events::{
    BindingPattern, CloseError, ConsumerGroup, InMemoryBroker, MessageBus, MessageHandler,
    PatternError, SubscribeError, Topic, Topology, TopologyError,
};
use medchain_purchasing::{Product, PurchaseOrder};
use medchain_suppliers::{AuditTrace, Supplier};

use crate::audit::{AuditSink, StoreAuditSink};
use crate::choreography::{
    ExternalSignalHandler, OrderAuditHandler, OrderGeneratedHandler, StockSignalHandler,
    SupplierRequestHandler,
};
use crate::config::{BusKind, Settings};
use crate::services::{OrderService, ProductService, ServiceError, SupplierService};
use crate::store::{InMemoryKeyedStore, KeyedStore, OpenOrderIndex};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to declare topology: {0}")]
    Topology(#[from] TopologyError),

    #[error("failed to subscribe: {0}")]
    Subscribe(#[from] SubscribeError),

    #[error("invalid binding pattern: {0}")]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("failed to close bus: {0}")]
    Close(#[from] CloseError),

    #[error("bus unavailable: {0}")]
    BusUnavailable(String),
}

/// Which handler serves a consumer group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    StockSignal,
    ExternalSignal,
    SupplierRequest,
    OrderGenerated,
    OrderAudit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    pub topic: Topic,
    pub group: &'static str,
    pub binding: &'static str,
    pub role: Role,
}

const fn sub(topic: Topic, group: &'static str, binding: &'static str, role: Role) -> Subscription {
    Subscription {
        topic,
        group,
        binding,
        role,
    }
}

/// Every consumer group the process runs. Group name doubles as queue name.
pub const SUBSCRIPTIONS: [Subscription; 8] = [
    sub(Topic::StockEvents, "purchase-order-stock-bajo", "stock.bajo", Role::StockSignal),
    sub(Topic::StockEvents, "purchase-order-lote-danado", "stock.lote_danado", Role::StockSignal),
    sub(Topic::StockEvents, "purchase-order-demanda-alta", "stock.demanda_alta", Role::StockSignal),
    sub(Topic::ExternalEvents, "purchase-order-external", "external.#", Role::ExternalSignal),
    sub(Topic::SupplierEvents, "purchase-order-supplier-request", "proveedor.solicitud", Role::SupplierRequest),
    sub(Topic::OrderEvents, "supplier-order-generated", "orden.generada", Role::OrderGenerated),
    sub(Topic::OrderEvents, "supplier-order-confirmed", "orden.confirmada", Role::OrderAudit),
    sub(Topic::OrderEvents, "supplier-order-received", "orden.recibida", Role::OrderAudit),
];

impl Subscription {
    pub fn consumer_group(&self) -> Result<ConsumerGroup, PatternError> {
        Ok(ConsumerGroup::new(self.group).bound_to(BindingPattern::new(self.binding)?))
    }
}

/// Every exchange plus every consumer group's queue and binding.
pub fn topology() -> Result<Topology, PatternError> {
    SUBSCRIPTIONS.iter().try_fold(Topology::standard(), |t, s| {
        Ok(t.queue(s.topic, s.consumer_group()?))
    })
}

/// Build the bus selected by `settings`.
pub fn connect_bus(settings: &Settings, log: &Span) -> Result<Arc<dyn MessageBus>, RuntimeError> {
    let span = info_span!(parent: log, "bus", kind = ?settings.bus);
    match settings.bus {
        BusKind::Memory => Ok(Arc::new(
            InMemoryBroker::new(span)
                .with_retry_policy(settings.retry_policy())
                .with_shutdown_window(settings.shutdown_window),
        )),
        #[cfg(feature = "redis")]
        BusKind::Redis => {
            let bus = crate::event_bus::RedisStreamsBus::connect(&settings.redis_url, span)
                .map_err(|e| RuntimeError::BusUnavailable(e.to_string()))?
                .with_retry_policy(settings.retry_policy())
                .with_shutdown_window(settings.shutdown_window);
            Ok(Arc::new(bus))
        }
        #[cfg(not(feature = "redis"))]
        BusKind::Redis => Err(RuntimeError::BusUnavailable(
            "built without the `redis` feature".to_string(),
        )),
    }
}

/// Services and their wiring onto the bus.
pub struct Runtime {
    bus: Arc<dyn MessageBus>,
    pub orders: Arc<OrderService>,
    pub products: Arc<ProductService>,
    pub suppliers: Arc<SupplierService>,
    log: Span,
}

impl Runtime {
    /// Wire in-memory stores and the services over `bus`. Nothing is
    /// declared or consumed until [`Runtime::start`].
    pub fn assemble(bus: Arc<dyn MessageBus>, settings: &Settings, log: &Span) -> Self {
        let orders_store: Arc<dyn KeyedStore<PurchaseOrder>> = Arc::new(InMemoryKeyedStore::new());
        let products_store: Arc<dyn KeyedStore<Product>> = Arc::new(InMemoryKeyedStore::new());
        let suppliers_store: Arc<dyn KeyedStore<Supplier>> = Arc::new(InMemoryKeyedStore::new());
        let traces: Arc<dyn KeyedStore<AuditTrace>> = Arc::new(InMemoryKeyedStore::new());
        let audit: Arc<dyn AuditSink> = Arc::new(StoreAuditSink::new(Arc::clone(&traces)));

        let orders = OrderService::new(
            orders_store,
            Arc::clone(&products_store),
            Arc::new(OpenOrderIndex::new()),
            Arc::clone(&bus),
            info_span!(parent: log, "orders"),
        )
        .with_policy(settings.reorder_policy());
        let products = ProductService::new(
            products_store,
            Arc::clone(&bus),
            info_span!(parent: log, "products"),
        );
        let suppliers = SupplierService::new(
            suppliers_store,
            traces,
            audit,
            Arc::clone(&bus),
            info_span!(parent: log, "suppliers"),
        )
        .with_expiry_window(settings.cert_expiry_window());

        Self {
            bus,
            orders: Arc::new(orders),
            products: Arc::new(products),
            suppliers: Arc::new(suppliers),
            log: log.clone(),
        }
    }

    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }

    /// Declare the topology, rebuild the open-order index and start every
    /// consumer group. Safe to call against a bus that already has the
    /// topology.
    pub fn start(&self) -> Result<(), RuntimeError> {
        self.bus.declare(&topology()?)?;
        let open_orders = self.orders.rebuild_index()?;

        for subscription in &SUBSCRIPTIONS {
            let handler = self.handler_for(subscription);
            self.bus
                .subscribe(subscription.topic, subscription.consumer_group()?, handler)?;
        }
        info!(
            parent: &self.log,
            consumer_groups = SUBSCRIPTIONS.len(),
            open_orders,
            "runtime started"
        );
        Ok(())
    }

    /// Stop consumers and release the bus.
    pub fn shutdown(&self) -> Result<(), RuntimeError> {
        self.bus.close()?;
        info!(parent: &self.log, "runtime stopped");
        Ok(())
    }

    fn handler_for(&self, subscription: &Subscription) -> Arc<dyn MessageHandler> {
        let span = info_span!(parent: &self.log, "consumer", group = subscription.group);
        match subscription.role {
            Role::StockSignal => Arc::new(StockSignalHandler::new(Arc::clone(&self.orders), span)),
            Role::ExternalSignal => Arc::new(ExternalSignalHandler::new(Arc::clone(&self.orders), span)),
            Role::SupplierRequest => Arc::new(SupplierRequestHandler::new(Arc::clone(&self.orders), span)),
            Role::OrderGenerated => Arc::new(OrderGeneratedHandler::new(Arc::clone(&self.suppliers), span)),
            Role::OrderAudit => Arc::new(OrderAuditHandler::new(Arc::clone(&self.suppliers), span)),
        }
    }
}
