//! Product snapshot the purchasing side reorders against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use medchain_core::{AggregateRoot, DomainError, DomainResult, ProductId};

/// Cold-chain and handling requirements of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConditions {
    pub cold_chain_required: bool,
    pub min_temperature: f64,
    pub max_temperature: f64,
    #[serde(default)]
    pub max_lead_time_days: Option<u32>,
    #[serde(default)]
    pub required_conditions: Vec<String>,
}

/// Input for registering a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub product_id: ProductId,
    pub name: String,
    pub current_stock: i64,
    pub reorder_point: i64,
    pub max_stock: i64,
    pub unit_cost: f64,
    #[serde(default)]
    pub storage: Option<StorageConditions>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    name: String,
    current_stock: i64,
    reorder_point: i64,
    max_stock: i64,
    unit_cost: f64,
    storage: Option<StorageConditions>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl Product {
    pub fn register(cmd: NewProduct, now: DateTime<Utc>) -> DomainResult<Self> {
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("product name must not be empty"));
        }
        if cmd.current_stock < 0 {
            return Err(DomainError::validation("current stock must not be negative"));
        }
        if cmd.reorder_point < 0 || cmd.max_stock <= 0 {
            return Err(DomainError::validation(
                "reorder point must be >= 0 and max stock > 0",
            ));
        }
        if cmd.reorder_point > cmd.max_stock {
            return Err(DomainError::validation(
                "reorder point must not exceed max stock",
            ));
        }
        if !cmd.unit_cost.is_finite() || cmd.unit_cost < 0.0 {
            return Err(DomainError::validation("unit cost must not be negative"));
        }
        if let Some(storage) = &cmd.storage {
            if storage.min_temperature > storage.max_temperature {
                return Err(DomainError::validation(
                    "min storage temperature must not exceed max",
                ));
            }
        }

        Ok(Self {
            id: cmd.product_id,
            name: cmd.name.trim().to_string(),
            current_stock: cmd.current_stock,
            reorder_point: cmd.reorder_point,
            max_stock: cmd.max_stock,
            unit_cost: cmd.unit_cost,
            storage: cmd.storage,
            updated_at: now,
            version: 1,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_stock(&self) -> i64 {
        self.current_stock
    }

    pub fn reorder_point(&self) -> i64 {
        self.reorder_point
    }

    pub fn max_stock(&self) -> i64 {
        self.max_stock
    }

    pub fn unit_cost(&self) -> f64 {
        self.unit_cost
    }

    pub fn storage(&self) -> Option<&StorageConditions> {
        self.storage.as_ref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn requires_cold_chain(&self) -> bool {
        self.storage.as_ref().is_some_and(|s| s.cold_chain_required)
    }

    /// Temperature an order item for this product must be kept at (0 = ambient).
    pub fn required_temperature(&self) -> f64 {
        match &self.storage {
            Some(s) if s.cold_chain_required => s.min_temperature,
            _ => 0.0,
        }
    }

    pub fn is_low_stock(&self) -> bool {
        self.current_stock <= self.reorder_point
    }

    /// Record a counted stock level. Returns whether the product is now low.
    pub fn record_stock(&mut self, level: i64, now: DateTime<Utc>) -> DomainResult<bool> {
        if level < 0 {
            return Err(DomainError::validation("stock level must not be negative"));
        }
        self.current_stock = level;
        self.updated_at = now;
        self.version += 1;
        Ok(self.is_low_stock())
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insulin() -> NewProduct {
        NewProduct {
            product_id: ProductId::new("sku-1").unwrap(),
            name: "Insulin".into(),
            current_stock: 20,
            reorder_point: 10,
            max_stock: 50,
            unit_cost: 12.5,
            storage: Some(StorageConditions {
                cold_chain_required: true,
                min_temperature: 2.0,
                max_temperature: 8.0,
                max_lead_time_days: Some(3),
                required_conditions: vec!["refrigerated".into()],
            }),
        }
    }

    #[test]
    fn register_validates_stock_levels() {
        let mut cmd = insulin();
        cmd.reorder_point = 60;
        assert!(matches!(
            Product::register(cmd, Utc::now()),
            Err(DomainError::Validation(_))
        ));

        let mut cmd = insulin();
        cmd.storage.as_mut().unwrap().min_temperature = 10.0;
        assert!(Product::register(cmd, Utc::now()).is_err());
    }

    #[test]
    fn cold_chain_products_require_their_min_temperature() {
        let product = Product::register(insulin(), Utc::now()).unwrap();
        assert!(product.requires_cold_chain());
        assert_eq!(product.required_temperature(), 2.0);

        let mut cmd = insulin();
        cmd.storage = None;
        let ambient = Product::register(cmd, Utc::now()).unwrap();
        assert_eq!(ambient.required_temperature(), 0.0);
    }

    #[test]
    fn recording_stock_reports_low_levels() {
        let mut product = Product::register(insulin(), Utc::now()).unwrap();
        assert!(!product.record_stock(11, Utc::now()).unwrap());
        assert!(product.record_stock(10, Utc::now()).unwrap());
        assert_eq!(product.version(), 3);
        assert!(product.record_stock(-1, Utc::now()).is_err());
    }
}
