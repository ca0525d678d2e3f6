//! Product catalog kept by the purchasing side.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{Span, info};

use medchain_core::{AggregateRoot, DomainError, ExpectedVersion, ProductId};
use medchain_events::catalog::stock::StockLow;
use medchain_events::{EventEnvelope, MessageBus, MessageBusExt};
use medchain_purchasing::{NewProduct, Product};

use super::ServiceResult;
use crate::store::KeyedStore;

pub struct ProductService {
    products: Arc<dyn KeyedStore<Product>>,
    bus: Arc<dyn MessageBus>,
    log: Span,
}

impl ProductService {
    pub fn new(products: Arc<dyn KeyedStore<Product>>, bus: Arc<dyn MessageBus>, log: Span) -> Self {
        Self { products, bus, log }
    }

    pub fn register(&self, cmd: NewProduct, now: DateTime<Utc>) -> ServiceResult<Product> {
        let product = Product::register(cmd, now)?;
        self.products.create(product.clone())?;
        info!(
            parent: &self.log,
            product_id = %product.id(),
            cold_chain = product.requires_cold_chain(),
            "product registered"
        );
        Ok(product)
    }

    pub fn get(&self, id: &ProductId) -> ServiceResult<Product> {
        self.products
            .get(id)?
            .ok_or_else(|| DomainError::not_found().into())
    }

    pub fn list(&self) -> ServiceResult<Vec<Product>> {
        Ok(self.products.list()?)
    }

    /// Record a counted stock level; publishes StockLow when it is at or
    /// below the reorder point.
    pub fn record_stock(&self, id: &ProductId, level: i64, now: DateTime<Utc>) -> ServiceResult<Product> {
        let mut product = self.get(id)?;
        let expected = ExpectedVersion::Exact(AggregateRoot::version(&product));
        let low = product.record_stock(level, now)?;
        self.products.update(product.clone(), expected)?;

        if low {
            let event = StockLow {
                product_name: product.name().to_string(),
                current_stock: product.current_stock(),
                reorder_point: product.reorder_point(),
                max_stock: product.max_stock(),
                required_quantity: product.max_stock() - product.current_stock(),
            };
            self.bus.emit(&EventEnvelope::new(id.to_string(), event, now))?;
            info!(
                parent: &self.log,
                product_id = %id,
                current_stock = product.current_stock(),
                reorder_point = product.reorder_point(),
                "stock low published"
            );
        }
        Ok(product)
    }
}
