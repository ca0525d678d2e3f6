use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use medchain_core::{AggregateRoot, DomainResult, Priority, SupplierId};
use medchain_infra::services::{CreateOrder, EvaluateSupplier};
use medchain_purchasing::{NewOrderItem, Product, PurchaseOrder};
use medchain_suppliers::{
    Certification, Contact, LogisticsCapability, OfferedProduct, PerformanceEvaluation,
    RegisterSupplier, Supplier, SupplierUpdate,
};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub supplier_id: Option<SupplierId>,
    pub reason: String,
    pub priority: Option<Priority>,
    pub items: Vec<NewOrderItem>,
}

impl From<CreateOrderRequest> for CreateOrder {
    fn from(body: CreateOrderRequest) -> Self {
        CreateOrder {
            supplier_id: body.supplier_id,
            reason: body.reason,
            priority: body.priority.unwrap_or(Priority::Medium),
            items: body.items,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

/// `?state=` filter shared by the order and supplier listings.
#[derive(Debug, Default, Deserialize)]
pub struct StateQuery {
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecordStockRequest {
    pub current_stock: i64,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateSupplierRequest {
    pub on_time_delivery: f64,
    pub product_quality: f64,
    pub emergency_response: f64,
}

impl From<EvaluateSupplierRequest> for EvaluateSupplier {
    fn from(body: EvaluateSupplierRequest) -> Self {
        EvaluateSupplier {
            on_time_delivery: body.on_time_delivery,
            product_quality: body.product_quality,
            emergency_response: body.emergency_response,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterSupplierRequest {
    pub legal_name: String,
    pub business_name: Option<String>,
    pub tax_id: String,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub offered_products: Vec<OfferedProduct>,
    #[serde(default)]
    pub certifications: Vec<Certification>,
    pub logistics: Option<LogisticsCapability>,
    pub evaluation: Option<EvaluateSupplierRequest>,
}

impl RegisterSupplierRequest {
    /// Build the registration command; the business name defaults to the legal name.
    pub fn into_command(self, now: DateTime<Utc>) -> DomainResult<RegisterSupplier> {
        let evaluation = self
            .evaluation
            .map(|e| {
                PerformanceEvaluation::new(e.on_time_delivery, e.product_quality, e.emergency_response, now)
            })
            .transpose()?;
        Ok(RegisterSupplier {
            supplier_id: SupplierId::new(),
            business_name: self.business_name.unwrap_or_else(|| self.legal_name.clone()),
            legal_name: self.legal_name,
            tax_id: self.tax_id,
            contacts: self.contacts,
            offered_products: self.offered_products,
            certifications: self.certifications,
            logistics: self.logistics,
            evaluation,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateSupplierRequest {
    pub legal_name: Option<String>,
    pub business_name: Option<String>,
    pub contacts: Option<Vec<Contact>>,
    pub offered_products: Option<Vec<OfferedProduct>>,
    pub certifications: Option<Vec<Certification>>,
    pub logistics: Option<LogisticsCapability>,
}

impl From<UpdateSupplierRequest> for SupplierUpdate {
    fn from(body: UpdateSupplierRequest) -> Self {
        SupplierUpdate {
            legal_name: body.legal_name,
            business_name: body.business_name,
            contacts: body.contacts,
            offered_products: body.offered_products,
            certifications: body.certifications,
            logistics: body.logistics,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

/// Body of a simulated external signal: the product it concerns, an
/// optional producer name, and the event's own fields.
#[derive(Debug, Deserialize)]
pub struct ExternalSignalRequest<P> {
    pub product_id: String,
    pub source: Option<String>,
    #[serde(flatten)]
    pub data: P,
}

// -------------------------
// Response mapping
// -------------------------

pub fn order_to_json(order: &PurchaseOrder) -> Value {
    json!({
        "id": order.id().to_string(),
        "order_number": order.order_number(),
        "supplier_id": order.supplier_id().map(|s| s.to_string()),
        "state": order.state(),
        "priority": order.priority(),
        "reason": order.reason(),
        "items": order.items(),
        "total_value": order.total_value(),
        "supplier_evaluation": order.supplier_evaluation(),
        "generated_at": order.generated_at(),
        "updated_at": order.updated_at(),
        "version": order.version(),
    })
}

pub fn product_to_json(product: &Product) -> Value {
    json!({
        "id": product.id().as_str(),
        "name": product.name(),
        "current_stock": product.current_stock(),
        "reorder_point": product.reorder_point(),
        "max_stock": product.max_stock(),
        "unit_cost": product.unit_cost(),
        "storage": product.storage(),
        "low_stock": product.is_low_stock(),
        "updated_at": product.updated_at(),
    })
}

pub fn supplier_to_json(supplier: &Supplier, now: DateTime<Utc>) -> Value {
    let certifications = supplier
        .certifications()
        .iter()
        .map(|c| {
            json!({
                "certification_type": c.certification_type,
                "number": c.number,
                "issuing_authority": c.issuing_authority,
                "issued_at": c.issued_at,
                "expires_at": c.expires_at,
                "status": c.status(now),
                "days_remaining": c.days_remaining(now),
            })
        })
        .collect::<Vec<_>>();

    json!({
        "id": supplier.id_typed().to_string(),
        "legal_name": supplier.legal_name(),
        "business_name": supplier.business_name(),
        "tax_id": supplier.tax_id(),
        "state": supplier.state(),
        "general_score": supplier.general_score(),
        "cold_chain": supplier.has_cold_chain(),
        "contacts": supplier.contacts(),
        "offered_products": supplier.offered_products(),
        "certifications": certifications,
        "evaluation": supplier.evaluation(),
        "logistics": supplier.logistics(),
        "registered_at": supplier.registered_at(),
        "updated_at": supplier.updated_at(),
    })
}
