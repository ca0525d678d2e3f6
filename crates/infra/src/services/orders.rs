//! Purchase-order use cases: explicit creation, lifecycle transitions,
//! auto-generation from reorder signals and supplier assignment.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{Span, info, warn};

use medchain_core::{
    AggregateRoot, DomainError, DomainResult, ExpectedVersion, OrderId, Priority, SupplierId,
};
use medchain_events::catalog::orders::OrderGenerated;
use medchain_events::catalog::suppliers::SupplierRequest;
use medchain_events::{CatalogEvent, EventEnvelope, MessageBus, MessageBusExt};
use medchain_purchasing::{
    GenerateOrder, NewOrderItem, OrderState, Product, PurchaseOrder, ReorderDecision,
    ReorderPolicy, ReorderSignal, SkipReason, SupplierEvaluation, decide,
};

use super::{ServiceError, ServiceResult};
use crate::store::{Claim, KeyedStore, OpenOrderIndex, index};

/// Explicit order request (HTTP `POST /orders`).
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOrder {
    pub supplier_id: Option<SupplierId>,
    pub reason: String,
    pub priority: Priority,
    pub items: Vec<NewOrderItem>,
}

pub struct OrderService {
    orders: Arc<dyn KeyedStore<PurchaseOrder>>,
    products: Arc<dyn KeyedStore<Product>>,
    open_orders: Arc<OpenOrderIndex>,
    bus: Arc<dyn MessageBus>,
    policy: ReorderPolicy,
    log: Span,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn KeyedStore<PurchaseOrder>>,
        products: Arc<dyn KeyedStore<Product>>,
        open_orders: Arc<OpenOrderIndex>,
        bus: Arc<dyn MessageBus>,
        log: Span,
    ) -> Self {
        Self {
            orders,
            products,
            open_orders,
            bus,
            policy: ReorderPolicy::default(),
            log,
        }
    }

    pub fn with_policy(mut self, policy: ReorderPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &ReorderPolicy {
        &self.policy
    }

    pub fn create_order(&self, cmd: CreateOrder, now: DateTime<Utc>) -> ServiceResult<PurchaseOrder> {
        let (order, event) = PurchaseOrder::generate(
            GenerateOrder {
                order_id: OrderId::new(),
                supplier_id: cmd.supplier_id,
                reason: cmd.reason,
                priority: cmd.priority,
                items: cmd.items,
                tag: None,
            },
            now,
        )?;
        self.orders.create(order.clone())?;
        self.open_orders.sync(&order)?;
        self.publish_generated(&order, event, now)?;
        Ok(order)
    }

    pub fn get(&self, id: OrderId) -> ServiceResult<PurchaseOrder> {
        self.orders
            .get(&id)?
            .ok_or_else(|| DomainError::not_found().into())
    }

    pub fn list(&self, state: Option<OrderState>) -> ServiceResult<Vec<PurchaseOrder>> {
        Ok(match state {
            Some(state) => self.orders.query(index::STATE, state.as_str())?,
            None => self.orders.list()?,
        })
    }

    pub fn send(&self, id: OrderId, now: DateTime<Utc>) -> ServiceResult<PurchaseOrder> {
        self.transition(id, now, |order| order.send(now))
    }

    pub fn confirm(&self, id: OrderId, now: DateTime<Utc>) -> ServiceResult<PurchaseOrder> {
        self.transition(id, now, |order| order.confirm(now))
    }

    pub fn receive(&self, id: OrderId, now: DateTime<Utc>) -> ServiceResult<PurchaseOrder> {
        self.transition(id, now, |order| order.receive(now))
    }

    pub fn cancel(
        &self,
        id: OrderId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> ServiceResult<PurchaseOrder> {
        self.transition(id, now, |order| order.cancel(reason, now))
    }

    /// Load, apply one state-machine step, persist, then publish its event.
    fn transition<E, F>(&self, id: OrderId, now: DateTime<Utc>, apply: F) -> ServiceResult<PurchaseOrder>
    where
        E: CatalogEvent,
        F: FnOnce(&mut PurchaseOrder) -> DomainResult<E>,
    {
        let mut order = self.get(id)?;
        let expected = ExpectedVersion::Exact(AggregateRoot::version(&order));
        let from = order.state();

        let event = apply(&mut order)?;
        self.orders.update(order.clone(), expected)?;
        self.open_orders.sync(&order)?;
        self.bus.emit(&EventEnvelope::new(id.to_string(), event, now))?;

        info!(
            parent: &self.log,
            order_id = %id,
            order_number = order.order_number(),
            from = %from,
            to = %order.state(),
            event_type = E::KIND.event_type,
            "order state changed"
        );
        Ok(order)
    }

    fn publish_generated(
        &self,
        order: &PurchaseOrder,
        event: OrderGenerated,
        now: DateTime<Utc>,
    ) -> ServiceResult<()> {
        self.bus.emit(&EventEnvelope::new(order.id().to_string(), event, now))?;
        info!(
            parent: &self.log,
            order_id = %order.id(),
            order_number = order.order_number(),
            priority = %order.priority(),
            total_items = order.items().len(),
            total_value = order.total_value(),
            reason = order.reason(),
            "order generated"
        );
        Ok(())
    }

    /// Publish `OrderGenerated` again for an open order that still has no
    /// supplier. Covers an order that was stored but whose announcement failed.
    fn reannounce_unassigned(&self, id: OrderId, now: DateTime<Utc>) -> ServiceResult<()> {
        let Some(order) = self.orders.get(&id)? else {
            return Ok(());
        };
        if order.state() != OrderState::Generated || order.supplier_id().is_some() {
            info!(
                parent: &self.log,
                order_id = %id,
                state = %order.state(),
                "open order already covers the product; no order generated"
            );
            return Ok(());
        }
        self.bus
            .emit(&EventEnvelope::new(order.id().to_string(), order.generated_event(), now))?;
        info!(
            parent: &self.log,
            order_id = %id,
            order_number = order.order_number(),
            "open order still unassigned; generation re-announced"
        );
        Ok(())
    }

    /// Run the auto-generation engine for one signal.
    ///
    /// Returns the new order, or `None` when the signal was a no-op (unknown
    /// product, open order already covering it, low confidence, nothing to buy).
    pub fn process_signal(
        &self,
        signal: &ReorderSignal,
        now: DateTime<Utc>,
    ) -> ServiceResult<Option<PurchaseOrder>> {
        let source = signal.source.as_deref().unwrap_or("internal");
        let Some(product) = self.products.get(&signal.product_id)? else {
            warn!(
                parent: &self.log,
                product_id = %signal.product_id,
                trigger = signal.trigger.kind(),
                source,
                "signal for unknown product ignored"
            );
            return Ok(None);
        };

        let open = self.open_orders.open_order_for(&signal.product_id)?;
        let plan = match decide(signal, &product, open, &self.policy) {
            ReorderDecision::Create(plan) => plan,
            ReorderDecision::Skip(SkipReason::DuplicateOpenOrder(existing)) => {
                self.reannounce_unassigned(existing, now)?;
                return Ok(None);
            }
            ReorderDecision::Skip(reason) => {
                info!(
                    parent: &self.log,
                    product_id = %signal.product_id,
                    trigger = signal.trigger.kind(),
                    source,
                    reason = %reason,
                    "signal recorded; no order generated"
                );
                return Ok(None);
            }
        };

        let order_id = OrderId::new();
        let product_id = plan.product_id.clone();
        if let Claim::Held(existing) = self.open_orders.try_claim(&product_id, order_id)? {
            info!(
                parent: &self.log,
                product_id = %product_id,
                existing_order_id = %existing,
                "open order claimed concurrently; no order generated"
            );
            return Ok(None);
        }

        let generated = PurchaseOrder::generate(plan.into_command(order_id, None), now)
            .map_err(ServiceError::from)
            .and_then(|(order, event)| {
                self.orders.create(order.clone())?;
                Ok((order, event))
            });
        let (order, event) = match generated {
            Ok(generated) => generated,
            Err(err) => {
                if let Err(release_err) = self.open_orders.release(&product_id, order_id) {
                    warn!(
                        parent: &self.log,
                        product_id = %product_id,
                        error = ?release_err,
                        "failed to release open-order claim"
                    );
                }
                return Err(err);
            }
        };

        self.publish_generated(&order, event, now)?;
        Ok(Some(order))
    }

    /// Assign the best-ranked candidate of a supplier request, if the order
    /// still waits for one.
    pub fn assign_from_request(
        &self,
        id: OrderId,
        request: &SupplierRequest,
        now: DateTime<Utc>,
    ) -> ServiceResult<Option<PurchaseOrder>> {
        let Some(mut order) = self.orders.get(&id)? else {
            warn!(parent: &self.log, order_id = %id, "supplier request for unknown order ignored");
            return Ok(None);
        };
        if order.state() != OrderState::Generated || order.supplier_id().is_some() {
            info!(
                parent: &self.log,
                order_id = %id,
                state = %order.state(),
                "order no longer awaits a supplier; request ignored"
            );
            return Ok(None);
        }
        let Some(best) = request.candidates.first() else {
            warn!(parent: &self.log, order_id = %id, "supplier request carries no candidates");
            return Ok(None);
        };

        let expected = ExpectedVersion::Exact(AggregateRoot::version(&order));
        order.assign_supplier(
            best.supplier_id,
            Some(SupplierEvaluation {
                general_score: best.general_score,
                average_lead_time_days: best.average_lead_time_days,
                evaluated_at: now,
            }),
            now,
        )?;
        self.orders.update(order.clone(), expected)?;

        info!(
            parent: &self.log,
            order_id = %id,
            supplier_id = %best.supplier_id,
            candidates = request.candidates.len(),
            "supplier assigned"
        );
        Ok(Some(order))
    }

    /// Rebuild the open-order index from the store; returns the open orders found.
    pub fn rebuild_index(&self) -> ServiceResult<usize> {
        let open = self.orders.query(index::STATE, OrderState::Generated.as_str())?;
        let count = self.open_orders.rebuild(&open)?;
        info!(parent: &self.log, open_orders = count, "open-order index rebuilt");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

    use medchain_core::ProductId;
    use medchain_events::catalog::suppliers::SupplierCandidate;
    use medchain_events::{
        CloseError, ConsumerGroup, InMemoryBroker, MessageHandler, OutboundMessage, PublishError,
        SubscribeError, Topic, Topology, TopologyError,
    };
    use medchain_purchasing::{OrderTag, Trigger};

    use super::*;
    use crate::services::ErrorKind;
    use crate::services::testing::Fixture;

    fn low_stock(product: &str, current: i64) -> ReorderSignal {
        ReorderSignal::internal(
            ProductId::new(product).unwrap(),
            Trigger::StockLow {
                current_stock: Some(current),
                reorder_point: None,
                max_stock: None,
                declared_priority: None,
            },
        )
    }

    fn request_for(order: &PurchaseOrder, best: SupplierId) -> SupplierRequest {
        SupplierRequest {
            order_number: order.order_number().to_string(),
            priority: order.priority(),
            reason: order.reason().to_string(),
            total_items: order.items().len(),
            total_value: order.total_value(),
            special_requirements: vec![],
            required_products: vec![],
            candidates: vec![SupplierCandidate {
                supplier_id: best,
                general_score: 90.0,
                average_lead_time_days: 2,
            }],
        }
    }

    #[test]
    fn low_stock_signal_generates_one_order_and_publishes_it() {
        let fx = Fixture::new();
        fx.product("sku-1", 2, 10, 50);

        let order = fx.orders.process_signal(&low_stock("sku-1", 2), Utc::now()).unwrap().unwrap();
        assert_eq!(order.state(), OrderState::Generated);
        assert_eq!(order.priority(), Priority::High);
        assert_eq!(order.items()[0].quantity_requested, 48);
        assert_eq!(order.items()[0].unit_price, 4.5);
        assert_eq!(fx.published(Topic::OrderEvents), 1);
    }

    #[test]
    fn repeated_signal_for_open_product_is_a_no_op() {
        let fx = Fixture::new();
        fx.product("sku-1", 2, 10, 50);
        let now = Utc::now();

        let first = fx.orders.process_signal(&low_stock("sku-1", 2), now).unwrap().unwrap();
        fx.orders
            .assign_from_request(*first.id(), &request_for(&first, SupplierId::new()), now)
            .unwrap();

        let second = fx.orders.process_signal(&low_stock("sku-1", 1), now).unwrap();
        assert!(second.is_none());
        assert_eq!(fx.orders.list(None).unwrap().len(), 1);
        assert_eq!(fx.published(Topic::OrderEvents), 1);
    }

    #[test]
    fn repeated_signal_reannounces_an_unassigned_open_order() {
        let fx = Fixture::new();
        fx.product("sku-1", 2, 10, 50);
        let now = Utc::now();

        fx.orders.process_signal(&low_stock("sku-1", 2), now).unwrap().unwrap();
        assert!(fx.orders.process_signal(&low_stock("sku-1", 2), now).unwrap().is_none());
        assert_eq!(fx.orders.list(None).unwrap().len(), 1);
        assert_eq!(fx.published(Topic::OrderEvents), 2);
    }

    /// Refuses the first `OrderGenerated` publish, then delegates.
    struct RefuseFirstGenerated {
        inner: Arc<InMemoryBroker>,
        refused: AtomicBool,
    }

    impl MessageBus for RefuseFirstGenerated {
        fn declare(&self, topology: &Topology) -> Result<(), TopologyError> {
            self.inner.declare(topology)
        }

        fn publish_message(&self, message: OutboundMessage) -> Result<(), PublishError> {
            if message.event_type == OrderGenerated::KIND.event_type
                && !self.refused.swap(true, AtomicOrdering::SeqCst)
            {
                return Err(PublishError::Unavailable("connection reset".into()));
            }
            self.inner.publish_message(message)
        }

        fn subscribe(
            &self,
            topic: Topic,
            group: ConsumerGroup,
            handler: Arc<dyn MessageHandler>,
        ) -> Result<(), SubscribeError> {
            self.inner.subscribe(topic, group, handler)
        }

        fn close(&self) -> Result<(), CloseError> {
            self.inner.close()
        }
    }

    #[test]
    fn order_is_announced_on_retry_after_a_failed_publish() {
        let fx = Fixture::new();
        fx.product("sku-1", 2, 10, 50);
        let bus = Arc::new(RefuseFirstGenerated {
            inner: Arc::clone(&fx.broker),
            refused: AtomicBool::new(false),
        });
        let orders = OrderService::new(
            fx.order_store.clone(),
            fx.product_store.clone(),
            Arc::clone(&fx.open_orders),
            bus,
            Span::none(),
        );
        let now = Utc::now();

        let err = orders.process_signal(&low_stock("sku-1", 2), now).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert_eq!(fx.published(Topic::OrderEvents), 0);

        // Redelivery of the same signal finds the stored order and announces it.
        assert!(orders.process_signal(&low_stock("sku-1", 2), now).unwrap().is_none());
        assert_eq!(orders.list(None).unwrap().len(), 1);
        assert_eq!(fx.published(Topic::OrderEvents), 1);
    }

    #[test]
    fn cancelling_the_open_order_allows_a_new_one() {
        let fx = Fixture::new();
        fx.product("sku-1", 2, 10, 50);
        let now = Utc::now();

        let first = fx.orders.process_signal(&low_stock("sku-1", 2), now).unwrap().unwrap();
        fx.orders.cancel(*first.id(), Some("wrong product".into()), now).unwrap();
        assert!(fx.orders.process_signal(&low_stock("sku-1", 2), now).unwrap().is_some());
    }

    #[test]
    fn unknown_product_is_a_benign_no_op() {
        let fx = Fixture::new();
        assert!(fx.orders.process_signal(&low_stock("ghost", 0), Utc::now()).unwrap().is_none());
        assert_eq!(fx.published(Topic::OrderEvents), 0);
    }

    #[test]
    fn external_signals_produce_tagged_unassigned_orders() {
        let fx = Fixture::new();
        fx.product("sku-1", 2, 10, 50);
        let signal = ReorderSignal::external(
            ProductId::new("sku-1").unwrap(),
            Trigger::DemandForecast {
                forecast_demand: 120,
                current_stock: Some(20),
                confidence: Some(0.95),
                declared_priority: None,
            },
            "forecasting",
        );
        let order = fx.orders.process_signal(&signal, Utc::now()).unwrap().unwrap();
        assert!(order.order_number().contains(&format!("-{}-", OrderTag::Demand.as_str())));
        assert_eq!(order.supplier_id(), None);
        assert_eq!(order.items()[0].quantity_requested, 100);
    }

    #[test]
    fn transitions_follow_the_lifecycle_and_publish() {
        let fx = Fixture::new();
        let now = Utc::now();
        let supplier = SupplierId::new();
        let order = fx
            .orders
            .create_order(
                CreateOrder {
                    supplier_id: Some(supplier),
                    reason: "manual".into(),
                    priority: Priority::Low,
                    items: vec![NewOrderItem {
                        product_id: ProductId::new("sku-9").unwrap(),
                        quantity: 3,
                        unit_price: 10.0,
                        required_temperature: 0.0,
                    }],
                },
                now,
            )
            .unwrap();
        let id = *order.id();

        fx.orders.send(id, now).unwrap();
        fx.orders.confirm(id, now).unwrap();
        let received = fx.orders.receive(id, now).unwrap();
        assert_eq!(received.state(), OrderState::Received);
        assert_eq!(fx.published(Topic::OrderEvents), 4);

        let err = fx.orders.cancel(id, None, now).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(fx.orders.list(Some(OrderState::Received)).unwrap().len(), 1);
    }

    #[test]
    fn missing_order_is_not_found() {
        let fx = Fixture::new();
        let err = fx.orders.confirm(OrderId::new(), Utc::now()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn supplier_request_assigns_top_candidate_once() {
        let fx = Fixture::new();
        fx.product("sku-1", 0, 10, 50);
        let now = Utc::now();
        let order = fx.orders.process_signal(&low_stock("sku-1", 0), now).unwrap().unwrap();

        let best = SupplierId::new();
        let mut request = request_for(&order, best);
        request.candidates.push(SupplierCandidate {
            supplier_id: SupplierId::new(),
            general_score: 80.0,
            average_lead_time_days: 1,
        });

        let assigned = fx.orders.assign_from_request(*order.id(), &request, now).unwrap().unwrap();
        assert_eq!(assigned.supplier_id(), Some(best));
        assert_eq!(assigned.supplier_evaluation().unwrap().general_score, 90.0);
        assert!(fx.orders.assign_from_request(*order.id(), &request, now).unwrap().is_none());
        assert!(fx.orders.assign_from_request(OrderId::new(), &request, now).unwrap().is_none());
    }

    #[test]
    fn index_is_rebuilt_from_open_orders() {
        let fx = Fixture::new();
        fx.product("sku-1", 2, 10, 50);
        fx.product("sku-2", 2, 10, 50);
        let now = Utc::now();
        fx.orders.process_signal(&low_stock("sku-1", 2), now).unwrap();
        let cancelled = fx.orders.process_signal(&low_stock("sku-2", 2), now).unwrap().unwrap();
        fx.orders.cancel(*cancelled.id(), None, now).unwrap();

        assert_eq!(fx.orders.rebuild_index().unwrap(), 1);
    }
}
