//! Signals from systems outside the trust boundary (`external-events` topic).
//!
//! Field sets follow what external producers actually send: priorities and
//! urgencies are free text, most numbers are optional. Normalisation into
//! internal triggers happens on the purchasing side.

use serde::{Deserialize, Serialize};

use super::{CatalogEvent, EventKind, SubjectKind};
use crate::topic::Topic;

pub const STOCK_LOW_EXTERNAL: EventKind = EventKind {
    name: "StockLowExternal",
    event_type: "stock_bajo_externo",
    routing_key: "external.stock.bajo",
    topic: Topic::ExternalEvents,
    subject: SubjectKind::Product,
};

pub const DEMAND_HIGH_EXTERNAL: EventKind = EventKind {
    name: "DemandHighExternal",
    event_type: "demanda_alta_externa",
    routing_key: "external.demanda.alta",
    topic: Topic::ExternalEvents,
    subject: SubjectKind::Product,
};

pub const BATCH_DAMAGED_EXTERNAL: EventKind = EventKind {
    name: "BatchDamagedExternal",
    event_type: "lote_danado_externo",
    routing_key: "external.lote.danado",
    topic: Topic::ExternalEvents,
    subject: SubjectKind::Product,
};

pub const INVENTORY_ALERT_EXTERNAL: EventKind = EventKind {
    name: "InventoryAlertExternal",
    event_type: "alerta_inventario_externa",
    routing_key: "external.alerta.inventario",
    topic: Topic::ExternalEvents,
    subject: SubjectKind::Product,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLowExternal {
    #[serde(rename = "nombre_producto", default)]
    pub product_name: String,
    #[serde(rename = "stock_actual")]
    pub current_stock: i64,
    #[serde(rename = "punto_reorden", default)]
    pub reorder_point: Option<i64>,
    #[serde(rename = "stock_maximo", default)]
    pub max_stock: Option<i64>,
    #[serde(rename = "cantidad_requerida", default)]
    pub required_quantity: i64,
    #[serde(rename = "prioridad", default)]
    pub priority: Option<String>,
    #[serde(rename = "urgencia", default)]
    pub urgency: Option<String>,
}

impl CatalogEvent for StockLowExternal {
    const KIND: &'static EventKind = &STOCK_LOW_EXTERNAL;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandHighExternal {
    #[serde(rename = "nombre_producto", default)]
    pub product_name: String,
    #[serde(rename = "demanda_pronosticada")]
    pub forecast_demand: i64,
    #[serde(rename = "stock_actual", default)]
    pub current_stock: Option<i64>,
    #[serde(rename = "cantidad_requerida", default)]
    pub required_quantity: i64,
    #[serde(rename = "confianza_pronostico", default)]
    pub confidence: Option<f64>,
    #[serde(rename = "prioridad", default)]
    pub priority: Option<String>,
}

impl CatalogEvent for DemandHighExternal {
    const KIND: &'static EventKind = &DEMAND_HIGH_EXTERNAL;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchDamagedExternal {
    #[serde(rename = "nombre_producto", default)]
    pub product_name: String,
    #[serde(rename = "lote_id")]
    pub batch_id: String,
    #[serde(rename = "cantidad_danada")]
    pub damaged_quantity: i64,
    #[serde(rename = "temperatura_registrada", default)]
    pub recorded_temperature: Option<f64>,
    #[serde(rename = "temperatura_requerida", default)]
    pub required_temperature: Option<f64>,
    #[serde(rename = "urgencia", default)]
    pub urgency: Option<String>,
}

impl CatalogEvent for BatchDamagedExternal {
    const KIND: &'static EventKind = &BATCH_DAMAGED_EXTERNAL;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryAlertExternal {
    #[serde(rename = "tipo_alerta")]
    pub alert_type: String,
    #[serde(rename = "stock_actual", default)]
    pub current_stock: Option<i64>,
    #[serde(rename = "cantidad_requerida", default)]
    pub required_quantity: i64,
    #[serde(rename = "prioridad", default)]
    pub priority: Option<String>,
}

impl CatalogEvent for InventoryAlertExternal {
    const KIND: &'static EventKind = &INVENTORY_ALERT_EXTERNAL;
}
