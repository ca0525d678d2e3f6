//! Index from product to the open (`Generated`) orders that contain it.
//!
//! The auto-generation engine consults this instead of scanning every open
//! order. `try_claim` checks and inserts under one write lock so two signals
//! for the same product in this process cannot both create an order; the
//! claim is released again if the order is never persisted.

use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use medchain_core::{AggregateRoot, OrderId, ProductId};
use medchain_purchasing::{OrderState, PurchaseOrder};

use super::StoreError;

/// Outcome of [`OpenOrderIndex::try_claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The product had no open order; it is now held by the claiming order.
    Claimed,
    /// Another open order already covers the product.
    Held(OrderId),
}

#[derive(Debug, Default)]
pub struct OpenOrderIndex {
    inner: RwLock<HashMap<ProductId, BTreeSet<OrderId>>>,
}

impl OpenOrderIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<ProductId, BTreeSet<OrderId>>>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("open-order index lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<ProductId, BTreeSet<OrderId>>>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("open-order index lock poisoned".into()))
    }

    /// Oldest open order containing `product_id`, if any.
    pub fn open_order_for(&self, product_id: &ProductId) -> Result<Option<OrderId>, StoreError> {
        Ok(self
            .read()?
            .get(product_id)
            .and_then(|orders| orders.iter().next().copied()))
    }

    pub fn try_claim(&self, product_id: &ProductId, order_id: OrderId) -> Result<Claim, StoreError> {
        let mut inner = self.write()?;
        let orders = inner.entry(product_id.clone()).or_default();
        if let Some(existing) = orders.iter().find(|id| **id != order_id) {
            return Ok(Claim::Held(*existing));
        }
        orders.insert(order_id);
        Ok(Claim::Claimed)
    }

    pub fn release(&self, product_id: &ProductId, order_id: OrderId) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        if let Some(orders) = inner.get_mut(product_id) {
            orders.remove(&order_id);
            if orders.is_empty() {
                inner.remove(product_id);
            }
        }
        Ok(())
    }

    /// Record an order if it is open; drop it from every product otherwise.
    pub fn sync(&self, order: &PurchaseOrder) -> Result<(), StoreError> {
        let order_id = *order.id();
        let mut inner = self.write()?;
        if order.state() == OrderState::Generated {
            for product_id in order.product_ids() {
                inner.entry(product_id.clone()).or_default().insert(order_id);
            }
        } else {
            for product_id in order.product_ids() {
                if let Some(orders) = inner.get_mut(product_id) {
                    orders.remove(&order_id);
                    if orders.is_empty() {
                        inner.remove(product_id);
                    }
                }
            }
        }
        Ok(())
    }

    /// Replace the index contents with the open orders among `orders`.
    pub fn rebuild<'a>(
        &self,
        orders: impl IntoIterator<Item = &'a PurchaseOrder>,
    ) -> Result<usize, StoreError> {
        let mut fresh: HashMap<ProductId, BTreeSet<OrderId>> = HashMap::new();
        let mut count = 0;
        for order in orders.into_iter().filter(|o| o.state() == OrderState::Generated) {
            count += 1;
            for product_id in order.product_ids() {
                fresh.entry(product_id.clone()).or_default().insert(*order.id());
            }
        }
        *self.write()? = fresh;
        Ok(count)
    }

    /// Number of products with at least one open order.
    pub fn len(&self) -> usize {
        self.read().map(|i| i.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Linear scan over `orders` for an open order containing `product_id`.
///
/// Equivalent to [`OpenOrderIndex::open_order_for`] over the same orders;
/// kept as the baseline the index is benchmarked against.
pub fn scan_open_order(orders: &[PurchaseOrder], product_id: &ProductId) -> Option<OrderId> {
    orders
        .iter()
        .filter(|o| o.state() == OrderState::Generated && o.contains_product(product_id))
        .map(|o| *o.id())
        .min()
}
