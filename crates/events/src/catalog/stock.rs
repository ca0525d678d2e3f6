//! Stock and inventory signals produced inside the deployment (`stock-events` topic).

use serde::{Deserialize, Serialize};

use medchain_core::Priority;

use super::{CatalogEvent, EventKind, SubjectKind};
use crate::topic::Topic;

pub const STOCK_LOW: EventKind = EventKind {
    name: "StockLow",
    event_type: "stock.bajo",
    routing_key: "stock.bajo",
    topic: Topic::StockEvents,
    subject: SubjectKind::Product,
};

pub const BATCH_DAMAGED: EventKind = EventKind {
    name: "BatchDamaged",
    event_type: "lote.danado",
    routing_key: "stock.lote_danado",
    topic: Topic::StockEvents,
    subject: SubjectKind::Product,
};

pub const DEMAND_FORECAST_HIGH: EventKind = EventKind {
    name: "DemandForecastHigh",
    event_type: "pronostico.demanda_alta",
    routing_key: "stock.demanda_alta",
    topic: Topic::StockEvents,
    subject: SubjectKind::Product,
};

/// Stock fell to or below the product's reorder point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLow {
    #[serde(rename = "nombre_producto", default)]
    pub product_name: String,
    #[serde(rename = "stock_actual")]
    pub current_stock: i64,
    #[serde(rename = "punto_reorden")]
    pub reorder_point: i64,
    #[serde(rename = "stock_maximo")]
    pub max_stock: i64,
    #[serde(rename = "cantidad_requerida", default)]
    pub required_quantity: i64,
}

impl CatalogEvent for StockLow {
    const KIND: &'static EventKind = &STOCK_LOW;
}

/// A batch was lost (e.g. a cold-chain temperature excursion).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchDamaged {
    #[serde(rename = "nombre_producto", default)]
    pub product_name: String,
    #[serde(rename = "lote_id")]
    pub batch_id: String,
    #[serde(rename = "cantidad_danada")]
    pub damaged_quantity: i64,
    #[serde(rename = "temperatura_registrada", default)]
    pub recorded_temperature: f64,
    #[serde(rename = "temperatura_requerida", default)]
    pub required_temperature: f64,
    #[serde(rename = "motivo_danio", default)]
    pub damage_reason: String,
}

impl CatalogEvent for BatchDamaged {
    const KIND: &'static EventKind = &BATCH_DAMAGED;
}

/// Forecasted demand exceeds what is on hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandForecastHigh {
    #[serde(rename = "nombre_producto", default)]
    pub product_name: String,
    #[serde(rename = "demanda_pronosticada")]
    pub forecast_demand: i64,
    #[serde(rename = "stock_actual")]
    pub current_stock: i64,
    #[serde(rename = "cantidad_requerida", default)]
    pub required_quantity: i64,
    #[serde(rename = "confianza_pronostico", default)]
    pub confidence: f64,
    #[serde(rename = "prioridad", default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl CatalogEvent for DemandForecastHigh {
    const KIND: &'static EventKind = &DEMAND_FORECAST_HIGH;
}
