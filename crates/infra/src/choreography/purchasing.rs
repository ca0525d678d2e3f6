//! Purchasing-side handlers: internal stock signals, external signals and
//! supplier requests.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use tracing::{Span, debug, warn};

use medchain_core::{OrderId, ProductId};
use medchain_events::catalog::stock::{BatchDamaged, DemandForecastHigh, StockLow};
use medchain_events::catalog::suppliers::SupplierRequest;
use medchain_events::{CatalogEvent, Delivery, EventEnvelope, HandlerError, MessageHandler};
use medchain_purchasing::{GatewayError, ReorderSignal, Trigger, normalize};

use super::{ignore, settle};
use crate::services::OrderService;

fn malformed(err: impl std::fmt::Display) -> HandlerError {
    HandlerError::Malformed(err.to_string())
}

/// Translate an internal stock event into a reorder signal.
///
/// `Ok(None)` for event types that are not stock signals.
pub fn internal_signal(envelope: EventEnvelope) -> Result<Option<ReorderSignal>, HandlerError> {
    let product_id = ProductId::new(envelope.subject_id()).map_err(malformed)?;
    let event_type = envelope.event_type().to_string();

    let trigger = match event_type.as_str() {
        t if t == StockLow::KIND.event_type => {
            let data = envelope.into_typed::<StockLow>().map_err(malformed)?.into_data();
            Trigger::StockLow {
                current_stock: Some(data.current_stock),
                reorder_point: Some(data.reorder_point),
                max_stock: Some(data.max_stock),
                declared_priority: None,
            }
        }
        t if t == BatchDamaged::KIND.event_type => {
            let data = envelope.into_typed::<BatchDamaged>().map_err(malformed)?.into_data();
            Trigger::BatchDamaged {
                batch_id: data.batch_id,
                damaged_quantity: data.damaged_quantity,
                required_temperature: (data.required_temperature != 0.0)
                    .then_some(data.required_temperature),
            }
        }
        t if t == DemandForecastHigh::KIND.event_type => {
            let data = envelope
                .into_typed::<DemandForecastHigh>()
                .map_err(malformed)?
                .into_data();
            Trigger::DemandForecast {
                forecast_demand: data.forecast_demand,
                current_stock: Some(data.current_stock),
                confidence: Some(data.confidence),
                declared_priority: data.priority,
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(ReorderSignal::internal(product_id, trigger)))
}

/// Stock signals from inside the deployment (`stock-events`).
pub struct StockSignalHandler {
    orders: Arc<OrderService>,
    log: Span,
}

impl StockSignalHandler {
    pub fn new(orders: Arc<OrderService>, log: Span) -> Self {
        Self { orders, log }
    }
}

impl MessageHandler for StockSignalHandler {
    fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let envelope = delivery.envelope()?;
        let event_type = envelope.event_type().to_string();
        let Some(signal) = internal_signal(envelope)? else {
            return ignore(&self.log, delivery, &event_type);
        };
        debug!(
            parent: &self.log,
            product_id = %signal.product_id,
            trigger = signal.trigger.kind(),
            attempt = delivery.attempt,
            "stock signal received"
        );
        settle(&self.log, delivery, self.orders.process_signal(&signal, Utc::now()))
    }
}

/// Signals from outside the trust boundary (`external-events`).
///
/// Unsupported event types are acknowledged with a warning.
pub struct ExternalSignalHandler {
    orders: Arc<OrderService>,
    log: Span,
}

impl ExternalSignalHandler {
    pub fn new(orders: Arc<OrderService>, log: Span) -> Self {
        Self { orders, log }
    }
}

impl MessageHandler for ExternalSignalHandler {
    fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let envelope = delivery.envelope()?;
        let signal = match normalize(envelope) {
            Ok(signal) => signal,
            Err(GatewayError::UnknownEventType(event_type)) => {
                warn!(
                    parent: &self.log,
                    message_id = %delivery.message_id,
                    event_type = %event_type,
                    "unsupported external event type ignored"
                );
                return Ok(());
            }
            Err(err) => return Err(malformed(err)),
        };
        debug!(
            parent: &self.log,
            product_id = %signal.product_id,
            trigger = signal.trigger.kind(),
            source = signal.source.as_deref().unwrap_or_default(),
            "external signal received"
        );
        settle(&self.log, delivery, self.orders.process_signal(&signal, Utc::now()))
    }
}

/// Supplier requests published for generated orders; assigns the best candidate.
pub struct SupplierRequestHandler {
    orders: Arc<OrderService>,
    log: Span,
}

impl SupplierRequestHandler {
    pub fn new(orders: Arc<OrderService>, log: Span) -> Self {
        Self { orders, log }
    }
}

impl MessageHandler for SupplierRequestHandler {
    fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let envelope = delivery
            .envelope()?
            .into_typed::<SupplierRequest>()
            .map_err(malformed)?;
        let order_id = OrderId::from_str(envelope.subject_id()).map_err(malformed)?;
        let request = envelope.into_data();
        settle(
            &self.log,
            delivery,
            self.orders.assign_from_request(order_id, &request, Utc::now()),
        )
    }
}
