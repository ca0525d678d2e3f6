use axum::Router;

pub mod common;
pub mod orders;
pub mod products;
pub mod simulate;
pub mod suppliers;
pub mod system;

/// Router for every resource endpoint.
pub fn router() -> Router {
    Router::new()
        .nest("/orders", orders::router())
        .nest("/products", products::router())
        .nest("/suppliers", suppliers::router())
        .nest("/simulate/external", simulate::router())
}
