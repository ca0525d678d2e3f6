//! Auto-generation decisions: whether a signal about a product warrants a
//! new purchase order, and what that order looks like.
//!
//! Everything here is pure. Looking up the product, checking the open-order
//! index and persisting the result are the caller's job.

use serde::{Deserialize, Serialize};

use medchain_core::{OrderId, Priority, ProductId, SupplierId};

use crate::order::{GenerateOrder, NewOrderItem, OrderTag};
use crate::product::Product;

/// Minimum declared confidence for acting on an untrusted demand forecast.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.80;

/// Condition that may call for restocking a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Trigger {
    StockLow {
        current_stock: Option<i64>,
        reorder_point: Option<i64>,
        max_stock: Option<i64>,
        declared_priority: Option<Priority>,
    },
    BatchDamaged {
        batch_id: String,
        damaged_quantity: i64,
        required_temperature: Option<f64>,
    },
    DemandForecast {
        forecast_demand: i64,
        current_stock: Option<i64>,
        confidence: Option<f64>,
        declared_priority: Option<Priority>,
    },
    InventoryAlert {
        alert_type: String,
        current_stock: Option<i64>,
        requested: i64,
        declared_priority: Option<Priority>,
    },
}

impl Trigger {
    pub fn kind(&self) -> &'static str {
        match self {
            Trigger::StockLow { .. } => "stock_low",
            Trigger::BatchDamaged { .. } => "batch_damaged",
            Trigger::DemandForecast { .. } => "demand_forecast",
            Trigger::InventoryAlert { .. } => "inventory_alert",
        }
    }

    fn tag(&self) -> OrderTag {
        match self {
            Trigger::StockLow { .. } => OrderTag::Stock,
            Trigger::BatchDamaged { .. } => OrderTag::Batch,
            Trigger::DemandForecast { .. } => OrderTag::Demand,
            Trigger::InventoryAlert { .. } => OrderTag::Alert,
        }
    }
}

/// A trigger about one product, plus where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReorderSignal {
    pub product_id: ProductId,
    pub trigger: Trigger,
    /// Producing system, for signals from outside the trust boundary.
    pub source: Option<String>,
}

impl ReorderSignal {
    pub fn internal(product_id: ProductId, trigger: Trigger) -> Self {
        Self {
            product_id,
            trigger,
            source: None,
        }
    }

    pub fn external(product_id: ProductId, trigger: Trigger, source: impl Into<String>) -> Self {
        Self {
            product_id,
            trigger,
            source: Some(source.into()),
        }
    }

    pub fn is_external(&self) -> bool {
        self.source.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReorderPolicy {
    pub confidence_threshold: f64,
}

impl Default for ReorderPolicy {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

/// What a new order for the signal should contain.
#[derive(Debug, Clone, PartialEq)]
pub struct ReorderPlan {
    pub product_id: ProductId,
    pub quantity: i64,
    pub priority: Priority,
    pub unit_price: f64,
    pub required_temperature: f64,
    pub reason: String,
    pub tag: Option<OrderTag>,
}

impl ReorderPlan {
    pub fn into_command(self, order_id: OrderId, supplier_id: Option<SupplierId>) -> GenerateOrder {
        GenerateOrder {
            order_id,
            supplier_id,
            reason: self.reason,
            priority: self.priority,
            items: vec![NewOrderItem {
                product_id: self.product_id,
                quantity: self.quantity,
                unit_price: self.unit_price,
                required_temperature: self.required_temperature,
            }],
            tag: self.tag,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// An order in `Generated` already covers the product.
    DuplicateOpenOrder(OrderId),
    NonPositiveQuantity(i64),
    BelowConfidence { confidence: f64, threshold: f64 },
    /// The reported figures do not yield a representable quantity.
    QuantityOutOfRange,
}

impl core::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SkipReason::DuplicateOpenOrder(id) => write!(f, "open order {id} already covers the product"),
            SkipReason::NonPositiveQuantity(q) => write!(f, "computed quantity {q} is not positive"),
            SkipReason::BelowConfidence { confidence, threshold } => {
                write!(f, "forecast confidence {confidence:.2} below threshold {threshold:.2}")
            }
            SkipReason::QuantityOutOfRange => write!(f, "reported figures overflow the order quantity"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReorderDecision {
    Create(ReorderPlan),
    Skip(SkipReason),
}

/// Priority for stock-driven triggers.
pub fn stock_priority(current_stock: i64, reorder_point: i64) -> Priority {
    if current_stock <= 0 {
        Priority::Critical
    } else if current_stock <= reorder_point / 2 {
        Priority::High
    } else {
        Priority::Medium
    }
}

/// Decide whether `signal` should produce a new order for `product`.
///
/// `open_order` is an order in `Generated` that already contains the product,
/// if the caller found one.
pub fn decide(
    signal: &ReorderSignal,
    product: &Product,
    open_order: Option<OrderId>,
    policy: &ReorderPolicy,
) -> ReorderDecision {
    if let Some(existing) = open_order {
        return ReorderDecision::Skip(SkipReason::DuplicateOpenOrder(existing));
    }

    let mut required_temperature = product.required_temperature();

    let (quantity, priority, reason) = match &signal.trigger {
        Trigger::StockLow {
            current_stock,
            reorder_point,
            max_stock,
            declared_priority,
        } => {
            let current = current_stock.unwrap_or(product.current_stock());
            let reorder = reorder_point.unwrap_or(product.reorder_point());
            let max = max_stock.unwrap_or(product.max_stock());
            let computed = stock_priority(current, reorder);
            let priority = declared_priority.map_or(computed, |declared| computed.max(declared));
            (
                max.checked_sub(current),
                priority,
                format!("stock low: {current} on hand, reorder point {reorder}"),
            )
        }
        Trigger::BatchDamaged {
            batch_id,
            damaged_quantity,
            required_temperature: batch_temperature,
        } => {
            if let Some(t) = batch_temperature {
                required_temperature = *t;
            }
            (
                Some(*damaged_quantity),
                Priority::High,
                format!("batch {batch_id} damaged: {damaged_quantity} units lost"),
            )
        }
        Trigger::DemandForecast {
            forecast_demand,
            current_stock,
            confidence,
            declared_priority,
        } => {
            if signal.is_external() {
                let confidence = confidence.unwrap_or(0.0);
                if confidence < policy.confidence_threshold {
                    return ReorderDecision::Skip(SkipReason::BelowConfidence {
                        confidence,
                        threshold: policy.confidence_threshold,
                    });
                }
            }
            let current = current_stock.unwrap_or(product.current_stock());
            (
                forecast_demand.checked_sub(current),
                declared_priority.unwrap_or(Priority::Medium),
                format!("demand forecast {forecast_demand} exceeds stock {current}"),
            )
        }
        Trigger::InventoryAlert {
            alert_type,
            current_stock,
            requested,
            declared_priority,
        } => {
            let quantity = if *requested > 0 {
                Some(*requested)
            } else {
                product
                    .max_stock()
                    .checked_sub(current_stock.unwrap_or(product.current_stock()))
            };
            (
                quantity,
                declared_priority.unwrap_or(Priority::Medium),
                format!("inventory alert {alert_type}"),
            )
        }
    };

    let Some(quantity) = quantity else {
        return ReorderDecision::Skip(SkipReason::QuantityOutOfRange);
    };
    if quantity <= 0 {
        return ReorderDecision::Skip(SkipReason::NonPositiveQuantity(quantity));
    }

    let reason = match &signal.source {
        Some(source) => format!("{reason} (reported by {source})"),
        None => reason,
    };

    ReorderDecision::Create(ReorderPlan {
        product_id: signal.product_id.clone(),
        quantity,
        priority,
        unit_price: product.unit_cost(),
        required_temperature,
        reason,
        tag: signal.is_external().then(|| signal.trigger.tag()),
    })
}
