//! Integration tests for the full choreography over the in-memory broker.
//!
//! Tests: signal → OrderService → bus → supplier side → bus → assignment
//!
//! Verifies:
//! - Duplicate signals produce a single order
//! - External forecasts respect the confidence threshold
//! - Topology declaration is idempotent
//! - Poison messages are dead-lettered, not retried forever
//! - Out-of-range stock figures never stop a consumer
//! - Order lifecycle events reach the supplier audit trail

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::json;
    use tracing::Span;

    use medchain_core::{AggregateRoot, EventId};
    use medchain_events::catalog::stock::StockLow;
    use medchain_events::{
        EventEnvelope, InMemoryBroker, MessageBus, MessageBusExt, OutboundMessage, RetryPolicy,
        Subject, Topic,
    };
    use medchain_purchasing::{NewProduct, OrderState};
    use medchain_suppliers::ChangeType;

    use crate::config::Settings;
    use crate::runtime::{Runtime, topology};
    use crate::services::testing::registration;

    const IDLE: Duration = Duration::from_secs(5);

    fn setup() -> (Runtime, Arc<InMemoryBroker>) {
        let broker = Arc::new(
            InMemoryBroker::new(Span::none()).with_retry_policy(RetryPolicy::immediate(3)),
        );
        let runtime = Runtime::assemble(broker.clone(), &Settings::default(), &Span::none());
        runtime.start().unwrap();
        (runtime, broker)
    }

    fn register_product(runtime: &Runtime, id: &str, stock: i64) {
        runtime
            .products
            .register(
                NewProduct {
                    product_id: id.parse().unwrap(),
                    name: format!("Product {id}"),
                    current_stock: stock,
                    reorder_point: 10,
                    max_stock: 50,
                    unit_cost: 3.0,
                    storage: None,
                },
                Utc::now(),
            )
            .unwrap();
    }

    fn stock_low(product: &str, current: i64) -> EventEnvelope<StockLow> {
        EventEnvelope::new(
            product,
            StockLow {
                product_name: format!("Product {product}"),
                current_stock: current,
                reorder_point: 10,
                max_stock: 50,
                required_quantity: 50 - current,
            },
            Utc::now(),
        )
    }

    fn external_forecast(product: &str, confidence: f64) -> EventEnvelope {
        EventEnvelope::raw(
            "demanda_alta_externa",
            Subject::Product(product.into()),
            json!({
                "demanda_pronosticada": 80,
                "stock_actual": 20,
                "confianza_pronostico": confidence,
            }),
            Utc::now(),
        )
        .with_source("forecasting")
    }

    #[test]
    fn duplicate_signals_yield_one_order() {
        let (runtime, broker) = setup();
        register_product(&runtime, "sku-1", 4);

        broker.emit(&stock_low("sku-1", 4)).unwrap();
        broker.emit(&stock_low("sku-1", 4)).unwrap();
        assert!(broker.wait_until_idle(IDLE));

        let orders = runtime.orders.list(None).unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].state(), OrderState::Generated);
        assert_eq!(orders[0].items()[0].quantity_requested, 46);
    }

    #[test]
    fn external_forecast_needs_threshold_confidence() {
        let (runtime, broker) = setup();
        register_product(&runtime, "sku-low", 20);
        register_product(&runtime, "sku-ok", 20);

        broker
            .publish(Topic::ExternalEvents, &external_forecast("sku-low", 0.79))
            .unwrap();
        broker
            .publish(Topic::ExternalEvents, &external_forecast("sku-ok", 0.80))
            .unwrap();
        assert!(broker.wait_until_idle(IDLE));

        let orders = runtime.orders.list(None).unwrap();
        assert_eq!(orders.len(), 1);
        assert!(orders[0].contains_product(&"sku-ok".parse().unwrap()));
        assert_eq!(orders[0].items()[0].quantity_requested, 60);
    }

    #[test]
    fn redeclaring_topology_changes_nothing() {
        let (_runtime, broker) = setup();
        let before = broker.bindings(Topic::StockEvents);
        broker.declare(&topology().unwrap()).unwrap();
        broker.declare(&topology().unwrap()).unwrap();
        assert_eq!(broker.bindings(Topic::StockEvents), before);
        assert_eq!(before.len(), 3);
    }

    #[test]
    fn poison_message_is_dead_lettered() {
        let (runtime, broker) = setup();
        register_product(&runtime, "sku-1", 4);

        broker
            .publish_message(OutboundMessage {
                topic: Topic::StockEvents,
                message_id: EventId::new(),
                event_type: "stock.bajo".into(),
                routing_key: "stock.bajo".into(),
                body: b"{not json".to_vec(),
                persistent: true,
                content_type: "application/json",
            })
            .unwrap();
        broker.emit(&stock_low("sku-1", 4)).unwrap();
        assert!(broker.wait_until_idle(IDLE));

        let dead = broker.dead_letters("purchase-order-stock-bajo");
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 1);
        // The consumer kept going after the poison message.
        assert_eq!(runtime.orders.list(None).unwrap().len(), 1);
    }

    #[test]
    fn extreme_stock_figures_do_not_stop_consumers() {
        let (runtime, broker) = setup();
        for id in ["sku-1", "sku-2", "sku-3", "sku-4"] {
            register_product(&runtime, id, 20);
        }

        let hostile = EventEnvelope::raw(
            "stock_bajo_externo",
            Subject::Product("sku-1".into()),
            json!({ "stock_actual": -9_223_372_036_854_775_807i64, "stock_maximo": 50 }),
            Utc::now(),
        )
        .with_source("wms");
        broker.publish(Topic::ExternalEvents, &hostile).unwrap();

        let forged = EventEnvelope::new(
            "sku-2",
            StockLow {
                product_name: "Product sku-2".into(),
                current_stock: i64::MIN + 1,
                reorder_point: 10,
                max_stock: 50,
                required_quantity: 0,
            },
            Utc::now(),
        );
        broker.emit(&forged).unwrap();

        let valid = EventEnvelope::raw(
            "stock_bajo_externo",
            Subject::Product("sku-3".into()),
            json!({ "stock_actual": 4, "stock_maximo": 50 }),
            Utc::now(),
        )
        .with_source("wms");
        broker.publish(Topic::ExternalEvents, &valid).unwrap();
        broker.emit(&stock_low("sku-4", 4)).unwrap();
        assert!(broker.wait_until_idle(IDLE));

        let dead = broker.dead_letters("purchase-order-external");
        assert_eq!(dead.len(), 1);
        assert!(dead[0].reason.contains("stock_actual"), "{}", dead[0].reason);
        assert!(broker.dead_letters("purchase-order-stock-bajo").is_empty());

        let orders = runtime.orders.list(None).unwrap();
        assert_eq!(orders.len(), 2);
        assert!(orders.iter().any(|o| o.contains_product(&"sku-3".parse().unwrap())));
        assert!(orders.iter().any(|o| o.contains_product(&"sku-4".parse().unwrap())));
    }

    #[test]
    fn unsupported_external_event_is_acknowledged() {
        let (runtime, broker) = setup();
        register_product(&runtime, "sku-1", 4);

        let envelope = EventEnvelope::raw(
            "inventario_misterioso",
            Subject::Product("sku-1".into()),
            json!({}),
            Utc::now(),
        );
        broker
            .publish_message(OutboundMessage {
                routing_key: "external.misterioso".into(),
                ..OutboundMessage::from_envelope(Topic::ExternalEvents, &envelope).unwrap()
            })
            .unwrap();
        assert!(broker.wait_until_idle(IDLE));

        assert!(broker.dead_letters("purchase-order-external").is_empty());
        assert!(runtime.orders.list(None).unwrap().is_empty());
    }

    #[test]
    fn supplier_round_trip_assigns_and_audits() {
        let (runtime, broker) = setup();
        let now = Utc::now();
        let supplier = runtime
            .suppliers
            .register(registration("Farma Andina", now), "ops", now)
            .unwrap();
        register_product(&runtime, "sku-1", 0);

        broker.emit(&stock_low("sku-1", 0)).unwrap();
        assert!(broker.wait_until_idle(IDLE));

        let order = runtime.orders.list(None).unwrap().remove(0);
        assert_eq!(order.supplier_id(), Some(supplier.id_typed()));
        let id = *order.id();

        runtime.orders.send(id, Utc::now()).unwrap();
        runtime.orders.confirm(id, Utc::now()).unwrap();
        // Confirmed and received are consumed by different groups.
        assert!(broker.wait_until_idle(IDLE));
        runtime.orders.receive(id, Utc::now()).unwrap();
        assert!(broker.wait_until_idle(IDLE));

        let kinds: Vec<ChangeType> = runtime
            .suppliers
            .audit_trail(supplier.id_typed())
            .unwrap()
            .into_iter()
            .map(|t| t.change_type)
            .collect();
        assert_eq!(
            kinds,
            vec![ChangeType::Creation, ChangeType::OrderConfirmed, ChangeType::OrderReceived]
        );
    }

    #[test]
    fn generated_order_without_active_suppliers_stays_unassigned() {
        let (runtime, broker) = setup();
        register_product(&runtime, "sku-1", 0);

        broker.emit(&stock_low("sku-1", 0)).unwrap();
        assert!(broker.wait_until_idle(IDLE));

        let order = runtime.orders.list(None).unwrap().remove(0);
        assert_eq!(order.supplier_id(), None);
        assert!(broker.dead_letters("supplier-order-generated").is_empty());
    }

    #[test]
    fn shutdown_closes_the_bus() {
        let (runtime, broker) = setup();
        runtime.shutdown().unwrap();
        assert!(broker.emit(&stock_low("sku-1", 4)).is_err());
    }
}
