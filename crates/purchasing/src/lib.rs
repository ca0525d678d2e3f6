//! Purchasing domain: purchase orders, the product snapshot they are generated
//! from, and the auto-generation rules.
//!
//! Pure domain logic only (no IO, no storage, no bus).

pub mod external;
pub mod order;
pub mod product;
pub mod reorder;

pub use external::{GatewayError, normalize, supported_event_types};
pub use order::{
    GenerateOrder, ItemState, NewOrderItem, OrderItem, OrderState, OrderTag, PurchaseOrder,
    SupplierEvaluation, order_number,
};
pub use product::{NewProduct, Product, StorageConditions};
pub use reorder::{
    DEFAULT_CONFIDENCE_THRESHOLD, ReorderDecision, ReorderPlan, ReorderPolicy, ReorderSignal,
    SkipReason, Trigger, decide, stock_priority,
};
