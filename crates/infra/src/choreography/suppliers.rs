//! Supplier-side handlers for order lifecycle events.

use std::sync::Arc;

use chrono::Utc;
use tracing::Span;

use medchain_events::catalog::orders::{OrderConfirmed, OrderGenerated, OrderReceived};
use medchain_events::{CatalogEvent, Delivery, HandlerError, MessageHandler};

use super::{ignore, settle};
use crate::services::SupplierService;

/// Generated orders: rank suppliers and publish a SupplierRequest.
pub struct OrderGeneratedHandler {
    suppliers: Arc<SupplierService>,
    log: Span,
}

impl OrderGeneratedHandler {
    pub fn new(suppliers: Arc<SupplierService>, log: Span) -> Self {
        Self { suppliers, log }
    }
}

impl MessageHandler for OrderGeneratedHandler {
    fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let envelope = delivery
            .envelope()?
            .into_typed::<OrderGenerated>()
            .map_err(|e| HandlerError::Malformed(e.to_string()))?;
        settle(
            &self.log,
            delivery,
            self.suppliers
                .request_suppliers(envelope.subject_id(), envelope.data(), Utc::now()),
        )
    }
}

/// Confirmed and received orders: append to the assigned supplier's audit trail.
pub struct OrderAuditHandler {
    suppliers: Arc<SupplierService>,
    log: Span,
}

impl OrderAuditHandler {
    pub fn new(suppliers: Arc<SupplierService>, log: Span) -> Self {
        Self { suppliers, log }
    }
}

impl MessageHandler for OrderAuditHandler {
    fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let envelope = delivery.envelope()?;
        let event_type = envelope.event_type().to_string();
        let malformed = |e: medchain_events::EnvelopeError| HandlerError::Malformed(e.to_string());

        if event_type == OrderConfirmed::KIND.event_type {
            let event = envelope.into_typed::<OrderConfirmed>().map_err(malformed)?;
            settle(&self.log, delivery, self.suppliers.record_order_confirmed(event.data()))
        } else if event_type == OrderReceived::KIND.event_type {
            let event = envelope.into_typed::<OrderReceived>().map_err(malformed)?;
            settle(&self.log, delivery, self.suppliers.record_order_received(event.data()))
        } else {
            ignore(&self.log, delivery, &event_type)
        }
    }
}

#[cfg(test)]
mod tests {
    use medchain_core::{OrderId, Priority, ProductId};
    use medchain_events::catalog::orders::OrderLine;
    use medchain_events::{EventEnvelope, Topic};
    use medchain_suppliers::ChangeType;

    use super::*;
    use crate::choreography::tests::delivery;
    use crate::services::testing::Fixture;

    #[test]
    fn generated_order_produces_supplier_request() {
        let fx = Fixture::new();
        let now = Utc::now();
        fx.supplier("Acme Pharma", now);
        let before = fx.published(Topic::SupplierEvents);

        let envelope = EventEnvelope::new(
            OrderId::new().to_string(),
            OrderGenerated {
                order_number: "ORD-20260101-abcdef12".into(),
                supplier_id: None,
                reason: "stock low".into(),
                priority: Priority::High,
                total_items: 1,
                total_value: 20.0,
                items: vec![OrderLine {
                    product_id: ProductId::new("sku-1").unwrap(),
                    quantity: 10,
                    unit_price: 2.0,
                    required_temperature: 4.0,
                }],
            },
            now,
        );
        OrderGeneratedHandler::new(fx.suppliers.clone(), Span::none())
            .handle(&delivery(Topic::OrderEvents, "orden.generada", envelope.to_json().unwrap()))
            .unwrap();
        assert_eq!(fx.published(Topic::SupplierEvents), before + 1);
    }

    #[test]
    fn received_order_is_audited() {
        let fx = Fixture::new();
        let now = Utc::now();
        let id = fx.supplier("Acme Pharma", now);

        let envelope = EventEnvelope::new(
            OrderId::new().to_string(),
            OrderReceived {
                order_number: "ORD-1".into(),
                supplier_id: Some(id),
                received_at: now,
            },
            now,
        );
        OrderAuditHandler::new(fx.suppliers.clone(), Span::none())
            .handle(&delivery(Topic::OrderEvents, "orden.recibida", envelope.to_json().unwrap()))
            .unwrap();

        let trail = fx.suppliers.audit_trail(id).unwrap();
        assert_eq!(trail.last().unwrap().change_type, ChangeType::OrderReceived);
    }

    #[test]
    fn payload_of_wrong_shape_is_malformed() {
        let fx = Fixture::new();
        let envelope = EventEnvelope::raw(
            "orden.confirmada",
            medchain_events::Subject::Order(OrderId::new().to_string()),
            serde_json::json!({"fecha_confirmacion": 17}),
            Utc::now(),
        );
        let err = OrderAuditHandler::new(fx.suppliers.clone(), Span::none())
            .handle(&delivery(Topic::OrderEvents, "orden.confirmada", envelope.to_json().unwrap()))
            .unwrap_err();
        assert!(matches!(err, HandlerError::Malformed(_)));
    }
}
