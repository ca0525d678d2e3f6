//! Supplier lifecycle events (`supplier-events`) and operator notices (`notification-events`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use medchain_core::{Priority, ProductId, SupplierId};

use super::{CatalogEvent, EventKind, SubjectKind};
use crate::topic::Topic;

pub const SUPPLIER_QUALIFIED: EventKind = EventKind {
    name: "SupplierQualified",
    event_type: "proveedor.calificado",
    routing_key: "proveedor.calificado",
    topic: Topic::SupplierEvents,
    subject: SubjectKind::Supplier,
};

pub const SUPPLIER_SUSPENDED: EventKind = EventKind {
    name: "SupplierSuspended",
    event_type: "proveedor.suspendido",
    routing_key: "proveedor.suspendido",
    topic: Topic::SupplierEvents,
    subject: SubjectKind::Supplier,
};

pub const SUPPLIER_ACTIVATED: EventKind = EventKind {
    name: "SupplierActivated",
    event_type: "proveedor.activado",
    routing_key: "proveedor.activado",
    topic: Topic::SupplierEvents,
    subject: SubjectKind::Supplier,
};

pub const SUPPLIER_DEACTIVATED: EventKind = EventKind {
    name: "SupplierDeactivated",
    event_type: "proveedor.desactivado",
    routing_key: "proveedor.desactivado",
    topic: Topic::SupplierEvents,
    subject: SubjectKind::Supplier,
};

pub const EVALUATION_UPDATED: EventKind = EventKind {
    name: "EvaluationUpdated",
    event_type: "evaluacion.actualizada",
    routing_key: "proveedor.evaluacion.actualizada",
    topic: Topic::SupplierEvents,
    subject: SubjectKind::Supplier,
};

pub const SUPPLIER_REQUEST: EventKind = EventKind {
    name: "SupplierRequest",
    event_type: "proveedor.solicitud",
    routing_key: "proveedor.solicitud",
    topic: Topic::SupplierEvents,
    subject: SubjectKind::Order,
};

pub const CERTIFICATION_EXPIRING: EventKind = EventKind {
    name: "CertificationExpiring",
    event_type: "certificacion.por_vencer",
    routing_key: "proveedor.certificacion.por_vencer",
    topic: Topic::NotificationEvents,
    subject: SubjectKind::Supplier,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierQualified {
    #[serde(rename = "nombre_legal")]
    pub legal_name: String,
    #[serde(rename = "razon_social")]
    pub business_name: String,
    #[serde(rename = "score_general")]
    pub general_score: f64,
    #[serde(rename = "certificaciones")]
    pub certifications: Vec<String>,
    #[serde(rename = "capacidad_cadena_frio")]
    pub cold_chain: bool,
}

impl CatalogEvent for SupplierQualified {
    const KIND: &'static EventKind = &SUPPLIER_QUALIFIED;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierSuspended {
    #[serde(rename = "motivo_suspension")]
    pub reason: String,
    #[serde(rename = "fecha_suspension")]
    pub suspended_at: DateTime<Utc>,
}

impl CatalogEvent for SupplierSuspended {
    const KIND: &'static EventKind = &SUPPLIER_SUSPENDED;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierActivated {
    #[serde(rename = "nombre_legal")]
    pub legal_name: String,
    #[serde(rename = "score_general")]
    pub general_score: f64,
    #[serde(rename = "fecha_activacion")]
    pub activated_at: DateTime<Utc>,
}

impl CatalogEvent for SupplierActivated {
    const KIND: &'static EventKind = &SUPPLIER_ACTIVATED;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierDeactivated {
    #[serde(rename = "motivo")]
    pub reason: String,
    #[serde(rename = "fecha_desactivacion")]
    pub deactivated_at: DateTime<Utc>,
}

impl CatalogEvent for SupplierDeactivated {
    const KIND: &'static EventKind = &SUPPLIER_DEACTIVATED;
}

/// Carries both the replaced and the new general score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationUpdated {
    #[serde(rename = "score_anterior")]
    pub previous_score: f64,
    #[serde(rename = "score_nuevo")]
    pub new_score: f64,
    #[serde(rename = "cumplimiento_plazos")]
    pub on_time_delivery: f64,
    #[serde(rename = "calidad_productos")]
    pub product_quality: f64,
    #[serde(rename = "respuesta_emergencias")]
    pub emergency_response: f64,
}

impl CatalogEvent for EvaluationUpdated {
    const KIND: &'static EventKind = &EVALUATION_UPDATED;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredProduct {
    #[serde(rename = "producto_id")]
    pub product_id: ProductId,
    #[serde(rename = "cantidad_requerida")]
    pub quantity: i64,
    #[serde(rename = "precio_unitario")]
    pub unit_price: f64,
    #[serde(rename = "temperatura_requerida")]
    pub required_temperature: f64,
    #[serde(rename = "requiere_cadena_frio")]
    pub cold_chain_required: bool,
}

/// A ranked supplier the supplier service considers able to fulfil an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierCandidate {
    #[serde(rename = "proveedor_id")]
    pub supplier_id: SupplierId,
    #[serde(rename = "score_general")]
    pub general_score: f64,
    #[serde(rename = "tiempo_entrega_promedio")]
    pub average_lead_time_days: u32,
}

/// The supplier service's answer to a generated order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierRequest {
    #[serde(rename = "numero_orden")]
    pub order_number: String,
    #[serde(rename = "prioridad")]
    pub priority: Priority,
    #[serde(rename = "motivo_generacion")]
    pub reason: String,
    pub total_items: usize,
    #[serde(rename = "valor_total")]
    pub total_value: f64,
    #[serde(rename = "requisitos_especiales")]
    pub special_requirements: Vec<String>,
    #[serde(rename = "productos_requeridos")]
    pub required_products: Vec<RequiredProduct>,
    #[serde(rename = "candidatos", default)]
    pub candidates: Vec<SupplierCandidate>,
}

impl CatalogEvent for SupplierRequest {
    const KIND: &'static EventKind = &SUPPLIER_REQUEST;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificationExpiring {
    #[serde(rename = "certificacion_id")]
    pub certificate_number: String,
    #[serde(rename = "tipo_certificacion")]
    pub certification_type: String,
    #[serde(rename = "fecha_vencimiento")]
    pub expires_at: DateTime<Utc>,
    #[serde(rename = "dias_restantes")]
    pub days_remaining: i64,
}

impl CatalogEvent for CertificationExpiring {
    const KIND: &'static EventKind = &CERTIFICATION_EXPIRING;
}
