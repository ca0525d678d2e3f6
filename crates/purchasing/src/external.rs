//! Normalisation of signals from outside the trust boundary into reorder signals.
//!
//! External producers only get to pick from a fixed set of `event_type` tags;
//! anything else is refused rather than guessed at.

use thiserror::Error;

use medchain_core::{DomainError, Priority, ProductId};
use medchain_events::catalog::external::{
    BatchDamagedExternal, DemandHighExternal, InventoryAlertExternal, StockLowExternal,
    BATCH_DAMAGED_EXTERNAL, DEMAND_HIGH_EXTERNAL, INVENTORY_ALERT_EXTERNAL, STOCK_LOW_EXTERNAL,
};
use medchain_events::{CatalogEvent, EnvelopeError, EventEnvelope};

use crate::reorder::{ReorderSignal, Trigger};

/// Source recorded when an external producer does not name itself.
pub const UNKNOWN_SOURCE: &str = "external";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unsupported external event type {0:?}")]
    UnknownEventType(String),

    #[error("malformed external event: {0}")]
    Decode(#[from] EnvelopeError),

    #[error("invalid product reference: {0}")]
    InvalidProduct(#[from] DomainError),

    #[error("{field} must not be negative, got {value}")]
    NegativeFigure { field: &'static str, value: i64 },
}

/// External event tags this gateway understands.
pub fn supported_event_types() -> [&'static str; 4] {
    [
        STOCK_LOW_EXTERNAL.event_type,
        DEMAND_HIGH_EXTERNAL.event_type,
        BATCH_DAMAGED_EXTERNAL.event_type,
        INVENTORY_ALERT_EXTERNAL.event_type,
    ]
}

fn non_negative(field: &'static str, value: i64) -> Result<i64, GatewayError> {
    if value < 0 {
        return Err(GatewayError::NegativeFigure { field, value });
    }
    Ok(value)
}

fn non_negative_opt(field: &'static str, value: Option<i64>) -> Result<Option<i64>, GatewayError> {
    value.map(|v| non_negative(field, v)).transpose()
}

fn declared(label: Option<&str>) -> Option<Priority> {
    label.map(|l| Priority::from_external_label(Some(l)))
}

/// Turn an external envelope into a reorder signal for the engine.
pub fn normalize(envelope: EventEnvelope) -> Result<ReorderSignal, GatewayError> {
    let source = envelope.source().unwrap_or(UNKNOWN_SOURCE).to_string();
    let product_id = ProductId::new(envelope.subject_id())?;

    let event_type = envelope.event_type().to_string();

    let trigger = match event_type.as_str() {
        t if t == StockLowExternal::KIND.event_type => {
            let data = envelope.into_typed::<StockLowExternal>()?.into_data();
            Trigger::StockLow {
                current_stock: Some(non_negative("stock_actual", data.current_stock)?),
                reorder_point: non_negative_opt("punto_reorden", data.reorder_point)?,
                max_stock: non_negative_opt("stock_maximo", data.max_stock)?,
                declared_priority: declared(data.priority.as_deref().or(data.urgency.as_deref())),
            }
        }
        t if t == DemandHighExternal::KIND.event_type => {
            let data = envelope.into_typed::<DemandHighExternal>()?.into_data();
            Trigger::DemandForecast {
                forecast_demand: non_negative("demanda_pronosticada", data.forecast_demand)?,
                current_stock: non_negative_opt("stock_actual", data.current_stock)?,
                confidence: data.confidence,
                declared_priority: declared(data.priority.as_deref()),
            }
        }
        t if t == BatchDamagedExternal::KIND.event_type => {
            let data = envelope.into_typed::<BatchDamagedExternal>()?.into_data();
            Trigger::BatchDamaged {
                batch_id: data.batch_id,
                damaged_quantity: non_negative("cantidad_danada", data.damaged_quantity)?,
                required_temperature: data.required_temperature,
            }
        }
        t if t == InventoryAlertExternal::KIND.event_type => {
            let data = envelope.into_typed::<InventoryAlertExternal>()?.into_data();
            Trigger::InventoryAlert {
                alert_type: data.alert_type,
                current_stock: non_negative_opt("stock_actual", data.current_stock)?,
                requested: non_negative("cantidad_requerida", data.required_quantity)?,
                declared_priority: declared(data.priority.as_deref()),
            }
        }
        other => return Err(GatewayError::UnknownEventType(other.to_string())),
    };

    Ok(ReorderSignal::external(product_id, trigger, source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use medchain_events::Subject;
    use serde_json::json;

    fn external(event_type: &str, data: serde_json::Value) -> EventEnvelope {
        EventEnvelope::raw(event_type, Subject::Product("sku-1".into()), data, Utc::now())
            .with_source("warehouse-sensors")
    }

    #[test]
    fn stock_low_uses_priority_or_urgency_label() {
        let signal = normalize(external(
            "stock_bajo_externo",
            json!({"stock_actual": 3, "cantidad_requerida": 40, "urgencia": "urgente"}),
        ))
        .unwrap();
        assert_eq!(signal.source.as_deref(), Some("warehouse-sensors"));
        assert_eq!(
            signal.trigger,
            Trigger::StockLow {
                current_stock: Some(3),
                reorder_point: None,
                max_stock: None,
                declared_priority: Some(Priority::High),
            }
        );
    }

    #[test]
    fn demand_keeps_declared_confidence() {
        let signal = normalize(external(
            "demanda_alta_externa",
            json!({"demanda_pronosticada": 100, "confianza_pronostico": 0.85}),
        ))
        .unwrap();
        match signal.trigger {
            Trigger::DemandForecast { confidence, declared_priority, .. } => {
                assert_eq!(confidence, Some(0.85));
                assert_eq!(declared_priority, None);
            }
            other => panic!("unexpected trigger {other:?}"),
        }
    }

    #[test]
    fn batch_and_alert_are_normalized() {
        let batch = normalize(external(
            "lote_danado_externo",
            json!({"lote_id": "L-9", "cantidad_danada": 12, "temperatura_requerida": 4.0}),
        ))
        .unwrap();
        assert!(matches!(batch.trigger, Trigger::BatchDamaged { damaged_quantity: 12, .. }));

        let alert = normalize(external(
            "alerta_inventario_externa",
            json!({"tipo_alerta": "VENCIMIENTO", "cantidad_requerida": 5, "prioridad": "BAJA"}),
        ))
        .unwrap();
        assert!(matches!(
            alert.trigger,
            Trigger::InventoryAlert { requested: 5, declared_priority: Some(Priority::Low), .. }
        ));
    }

    #[test]
    fn unknown_types_are_refused() {
        let err = normalize(external("recuento_externo", json!({}))).unwrap_err();
        assert!(matches!(err, GatewayError::UnknownEventType(t) if t == "recuento_externo"));
    }

    #[test]
    fn negative_figures_are_refused() {
        let err = normalize(external(
            "stock_bajo_externo",
            json!({"stock_actual": -9_223_372_036_854_775_807i64, "stock_maximo": 50}),
        ))
        .unwrap_err();
        assert!(matches!(err, GatewayError::NegativeFigure { field: "stock_actual", .. }));

        let err = normalize(external(
            "demanda_alta_externa",
            json!({"demanda_pronosticada": 100, "stock_actual": -1, "confianza_pronostico": 0.9}),
        ))
        .unwrap_err();
        assert!(matches!(err, GatewayError::NegativeFigure { field: "stock_actual", value: -1 }));

        let err = normalize(external(
            "lote_danado_externo",
            json!({"lote_id": "L-2", "cantidad_danada": -3}),
        ))
        .unwrap_err();
        assert!(matches!(err, GatewayError::NegativeFigure { field: "cantidad_danada", .. }));
    }

    #[test]
    fn malformed_payloads_and_missing_source() {
        let err = normalize(external("stock_bajo_externo", json!({"stock_actual": "lots"}))).unwrap_err();
        assert!(matches!(err, GatewayError::Decode(_)));

        let anonymous = EventEnvelope::raw(
            "lote_danado_externo",
            Subject::Product("sku-1".into()),
            json!({"lote_id": "L-1", "cantidad_danada": 1}),
            Utc::now(),
        );
        assert_eq!(normalize(anonymous).unwrap().source.as_deref(), Some(UNKNOWN_SOURCE));
    }
}
