use std::sync::Arc;

use medchain_events::MessageBus;
use medchain_infra::{OrderService, ProductService, Runtime, SupplierService};

/// Shared handler state: the assembled runtime.
pub struct AppServices {
    runtime: Arc<Runtime>,
}

impl AppServices {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime }
    }

    pub fn orders(&self) -> &OrderService {
        &self.runtime.orders
    }

    pub fn products(&self) -> &ProductService {
        &self.runtime.products
    }

    pub fn suppliers(&self) -> &SupplierService {
        &self.runtime.suppliers
    }

    /// Bus used by the simulation endpoints to inject external signals.
    pub fn bus(&self) -> &dyn MessageBus {
        self.runtime.bus().as_ref()
    }
}
