use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use medchain_core::{
    AggregateRoot, DomainError, DomainResult, OrderId, OrderItemId, Priority, ProductId,
    SupplierId,
};
use medchain_events::catalog::orders::{
    OrderCancelled, OrderConfirmed, OrderGenerated, OrderLine, OrderReceived, OrderSent,
};

/// Purchase order lifecycle.
///
/// ```text
/// Generated -> Sent -> Confirmed -> Received
///     |          |         |
///     +----------+---------+--> Cancelled
/// ```
///
/// `confirm` is also legal straight from `Generated` (suppliers may confirm
/// before the order is formally sent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    #[serde(rename = "GENERADA")]
    Generated,
    #[serde(rename = "ENVIADA")]
    Sent,
    #[serde(rename = "CONFIRMADA")]
    Confirmed,
    #[serde(rename = "RECIBIDA")]
    Received,
    #[serde(rename = "CANCELADA")]
    Cancelled,
}

impl OrderState {
    pub const ALL: [OrderState; 5] = [
        OrderState::Generated,
        OrderState::Sent,
        OrderState::Confirmed,
        OrderState::Received,
        OrderState::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Generated => "GENERADA",
            OrderState::Sent => "ENVIADA",
            OrderState::Confirmed => "CONFIRMADA",
            OrderState::Received => "RECIBIDA",
            OrderState::Cancelled => "CANCELADA",
        }
    }

    pub fn can_send(self) -> bool {
        matches!(self, OrderState::Generated)
    }

    pub fn can_confirm(self) -> bool {
        matches!(self, OrderState::Generated | OrderState::Sent)
    }

    pub fn can_receive(self) -> bool {
        matches!(self, OrderState::Confirmed)
    }

    pub fn can_cancel(self) -> bool {
        !self.is_terminal()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderState::Received | OrderState::Cancelled)
    }

    /// Orders in this state count against the reorder deduplication guard.
    pub fn is_open(self) -> bool {
        matches!(self, OrderState::Generated)
    }
}

impl core::fmt::Display for OrderState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        OrderState::ALL
            .into_iter()
            .find(|state| state.as_str() == upper)
            .or(match upper.as_str() {
                "GENERATED" => Some(OrderState::Generated),
                "SENT" => Some(OrderState::Sent),
                "CONFIRMED" => Some(OrderState::Confirmed),
                "RECEIVED" => Some(OrderState::Received),
                "CANCELLED" => Some(OrderState::Cancelled),
                _ => None,
            })
            .ok_or_else(|| DomainError::validation(format!("unknown order state {s:?}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemState {
    #[serde(rename = "PENDIENTE")]
    Pending,
    #[serde(rename = "CONFIRMADO")]
    Confirmed,
    #[serde(rename = "RECIBIDO")]
    Received,
    #[serde(rename = "CANCELADO")]
    Cancelled,
}

/// Line item of a purchase order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub item_id: OrderItemId,
    pub product_id: ProductId,
    pub quantity_requested: i64,
    pub unit_price: f64,
    pub required_temperature: f64,
    pub state: ItemState,
}

impl OrderItem {
    pub fn line_value(&self) -> f64 {
        self.unit_price * self.quantity_requested as f64
    }

    fn as_line(&self) -> OrderLine {
        OrderLine {
            product_id: self.product_id.clone(),
            quantity: self.quantity_requested,
            unit_price: self.unit_price,
            required_temperature: self.required_temperature,
        }
    }
}

/// Input for one item of a new order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: f64,
    #[serde(default)]
    pub required_temperature: f64,
}

/// Snapshot of the supplier's standing when it was assigned to the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierEvaluation {
    pub general_score: f64,
    pub average_lead_time_days: u32,
    pub evaluated_at: DateTime<Utc>,
}

/// Marks orders created from signals outside the trust boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderTag {
    Stock,
    Demand,
    Batch,
    Alert,
}

impl OrderTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderTag::Stock => "STOCK",
            OrderTag::Demand => "DEMANDA",
            OrderTag::Batch => "LOTE",
            OrderTag::Alert => "ALERTA",
        }
    }
}

/// `ORD-YYYYMMDD-xxxxxxxx`, or `ORD-YYYYMMDD-<TAG>-xxxxxxxx` for tagged orders.
pub fn order_number(at: DateTime<Utc>, tag: Option<OrderTag>) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    let suffix = &uuid[..8];
    let date = at.format("%Y%m%d");
    match tag {
        Some(tag) => format!("ORD-{date}-{}-{suffix}", tag.as_str()),
        None => format!("ORD-{date}-{suffix}"),
    }
}

/// Everything needed to bring a new order into existence.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOrder {
    pub order_id: OrderId,
    pub supplier_id: Option<SupplierId>,
    pub reason: String,
    pub priority: Priority,
    pub items: Vec<NewOrderItem>,
    pub tag: Option<OrderTag>,
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    id: OrderId,
    order_number: String,
    supplier_id: Option<SupplierId>,
    state: OrderState,
    priority: Priority,
    reason: String,
    items: Vec<OrderItem>,
    supplier_evaluation: Option<SupplierEvaluation>,
    generated_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl PurchaseOrder {
    /// Create an order in `Generated`, returning it with its OrderGenerated payload.
    pub fn generate(cmd: GenerateOrder, now: DateTime<Utc>) -> DomainResult<(Self, OrderGenerated)> {
        if cmd.items.is_empty() {
            return Err(DomainError::validation("order must contain at least one item"));
        }
        for item in &cmd.items {
            if item.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "quantity for product {} must be positive",
                    item.product_id
                )));
            }
            if !item.unit_price.is_finite() || item.unit_price < 0.0 {
                return Err(DomainError::validation(format!(
                    "unit price for product {} must not be negative",
                    item.product_id
                )));
            }
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("generation reason must not be empty"));
        }

        let items = cmd
            .items
            .into_iter()
            .map(|item| OrderItem {
                item_id: OrderItemId::new(),
                product_id: item.product_id,
                quantity_requested: item.quantity,
                unit_price: item.unit_price,
                required_temperature: item.required_temperature,
                state: ItemState::Pending,
            })
            .collect();

        let order = Self {
            id: cmd.order_id,
            order_number: order_number(now, cmd.tag),
            supplier_id: cmd.supplier_id,
            state: OrderState::Generated,
            priority: cmd.priority,
            reason: cmd.reason,
            items,
            supplier_evaluation: None,
            generated_at: now,
            updated_at: now,
            version: 1,
        };
        let event = order.generated_event();
        Ok((order, event))
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn state(&self) -> OrderState {
        self.state
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn supplier_evaluation(&self) -> Option<&SupplierEvaluation> {
        self.supplier_evaluation.as_ref()
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn total_value(&self) -> f64 {
        self.items.iter().map(OrderItem::line_value).sum()
    }

    pub fn contains_product(&self, product_id: &ProductId) -> bool {
        self.items.iter().any(|i| &i.product_id == product_id)
    }

    pub fn product_ids(&self) -> impl Iterator<Item = &ProductId> {
        self.items.iter().map(|i| &i.product_id)
    }

    /// The OrderGenerated payload describing this order as it stands.
    pub fn generated_event(&self) -> OrderGenerated {
        OrderGenerated {
            order_number: self.order_number.clone(),
            supplier_id: self.supplier_id,
            reason: self.reason.clone(),
            priority: self.priority,
            total_items: self.items.len(),
            total_value: self.total_value(),
            items: self.items.iter().map(OrderItem::as_line).collect(),
        }
    }

    /// Attach a supplier to a still-unassigned `Generated` order.
    pub fn assign_supplier(
        &mut self,
        supplier_id: SupplierId,
        evaluation: Option<SupplierEvaluation>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if self.state != OrderState::Generated {
            return Err(DomainError::invalid_transition(
                "purchase order",
                self.state,
                "assign a supplier to",
            ));
        }
        if let Some(existing) = self.supplier_id {
            return Err(DomainError::conflict(format!(
                "order {} already assigned to supplier {existing}",
                self.order_number
            )));
        }
        self.supplier_id = Some(supplier_id);
        self.supplier_evaluation = evaluation;
        self.touch(now);
        Ok(())
    }

    pub fn send(&mut self, now: DateTime<Utc>) -> DomainResult<OrderSent> {
        self.ensure(self.state.can_send(), "send")?;
        let Some(supplier_id) = self.supplier_id else {
            return Err(DomainError::validation(
                "an order cannot be sent before a supplier is assigned",
            ));
        };
        self.state = OrderState::Sent;
        self.touch(now);
        Ok(OrderSent {
            order_number: self.order_number.clone(),
            supplier_id: Some(supplier_id),
            sent_at: now,
        })
    }

    pub fn confirm(&mut self, now: DateTime<Utc>) -> DomainResult<OrderConfirmed> {
        self.ensure(self.state.can_confirm(), "confirm")?;
        self.state = OrderState::Confirmed;
        self.cascade(ItemState::Pending, ItemState::Confirmed);
        self.touch(now);
        Ok(OrderConfirmed {
            order_number: self.order_number.clone(),
            supplier_id: self.supplier_id,
            confirmed_at: now,
        })
    }

    pub fn receive(&mut self, now: DateTime<Utc>) -> DomainResult<OrderReceived> {
        self.ensure(self.state.can_receive(), "receive")?;
        self.state = OrderState::Received;
        self.cascade(ItemState::Confirmed, ItemState::Received);
        self.touch(now);
        Ok(OrderReceived {
            order_number: self.order_number.clone(),
            supplier_id: self.supplier_id,
            received_at: now,
        })
    }

    pub fn cancel(
        &mut self,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<OrderCancelled> {
        self.ensure(self.state.can_cancel(), "cancel")?;
        let previous = self.state;
        self.state = OrderState::Cancelled;
        for item in &mut self.items {
            if item.state != ItemState::Received {
                item.state = ItemState::Cancelled;
            }
        }
        self.touch(now);
        Ok(OrderCancelled {
            order_number: self.order_number.clone(),
            supplier_id: self.supplier_id,
            previous_state: previous.as_str().to_string(),
            reason,
            cancelled_at: now,
        })
    }

    fn ensure(&self, allowed: bool, action: &'static str) -> DomainResult<()> {
        if allowed {
            Ok(())
        } else {
            Err(DomainError::invalid_transition("purchase order", self.state, action))
        }
    }

    fn cascade(&mut self, from: ItemState, to: ItemState) {
        for item in self.items.iter_mut().filter(|i| i.state == from) {
            item.state = to;
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
