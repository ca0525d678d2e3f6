//! Purchase-order lifecycle events (`order-events` topic).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use medchain_core::{Priority, ProductId, SupplierId};

use super::{CatalogEvent, EventKind, SubjectKind};
use crate::topic::Topic;

pub const ORDER_GENERATED: EventKind = EventKind {
    name: "OrderGenerated",
    event_type: "orden_compra.generada",
    routing_key: "orden.generada",
    topic: Topic::OrderEvents,
    subject: SubjectKind::Order,
};

pub const ORDER_SENT: EventKind = EventKind {
    name: "OrderSent",
    event_type: "orden_compra.enviada",
    routing_key: "orden.enviada",
    topic: Topic::OrderEvents,
    subject: SubjectKind::Order,
};

pub const ORDER_CONFIRMED: EventKind = EventKind {
    name: "OrderConfirmed",
    event_type: "orden_compra.confirmada",
    routing_key: "orden.confirmada",
    topic: Topic::OrderEvents,
    subject: SubjectKind::Order,
};

pub const ORDER_RECEIVED: EventKind = EventKind {
    name: "OrderReceived",
    event_type: "orden_compra.recibida",
    routing_key: "orden.recibida",
    topic: Topic::OrderEvents,
    subject: SubjectKind::Order,
};

pub const ORDER_CANCELLED: EventKind = EventKind {
    name: "OrderCancelled",
    event_type: "orden_compra.cancelada",
    routing_key: "orden.cancelada",
    topic: Topic::OrderEvents,
    subject: SubjectKind::Order,
};

/// One requested product as carried by order events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    #[serde(rename = "producto_id")]
    pub product_id: ProductId,
    #[serde(rename = "cantidad_solicitada")]
    pub quantity: i64,
    #[serde(rename = "precio_unitario")]
    pub unit_price: f64,
    #[serde(rename = "temperatura_requerida", default)]
    pub required_temperature: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderGenerated {
    #[serde(rename = "numero_orden")]
    pub order_number: String,
    #[serde(rename = "proveedor_id")]
    pub supplier_id: Option<SupplierId>,
    #[serde(rename = "motivo_generacion")]
    pub reason: String,
    #[serde(rename = "prioridad")]
    pub priority: Priority,
    pub total_items: usize,
    #[serde(rename = "valor_total")]
    pub total_value: f64,
    #[serde(default)]
    pub items: Vec<OrderLine>,
}

impl CatalogEvent for OrderGenerated {
    const KIND: &'static EventKind = &ORDER_GENERATED;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSent {
    #[serde(rename = "numero_orden")]
    pub order_number: String,
    #[serde(rename = "proveedor_id")]
    pub supplier_id: Option<SupplierId>,
    #[serde(rename = "fecha_envio")]
    pub sent_at: DateTime<Utc>,
}

impl CatalogEvent for OrderSent {
    const KIND: &'static EventKind = &ORDER_SENT;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderConfirmed {
    #[serde(rename = "numero_orden")]
    pub order_number: String,
    #[serde(rename = "proveedor_id")]
    pub supplier_id: Option<SupplierId>,
    #[serde(rename = "fecha_confirmacion")]
    pub confirmed_at: DateTime<Utc>,
}

impl CatalogEvent for OrderConfirmed {
    const KIND: &'static EventKind = &ORDER_CONFIRMED;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReceived {
    #[serde(rename = "numero_orden")]
    pub order_number: String,
    #[serde(rename = "proveedor_id")]
    pub supplier_id: Option<SupplierId>,
    #[serde(rename = "fecha_recepcion")]
    pub received_at: DateTime<Utc>,
}

impl CatalogEvent for OrderReceived {
    const KIND: &'static EventKind = &ORDER_RECEIVED;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelled {
    #[serde(rename = "numero_orden")]
    pub order_number: String,
    #[serde(rename = "proveedor_id")]
    pub supplier_id: Option<SupplierId>,
    #[serde(rename = "estado_anterior")]
    pub previous_state: String,
    #[serde(rename = "motivo_cancelacion", default)]
    pub reason: Option<String>,
    #[serde(rename = "fecha_cancelacion")]
    pub cancelled_at: DateTime<Utc>,
}

impl CatalogEvent for OrderCancelled {
    const KIND: &'static EventKind = &ORDER_CANCELLED;
}
