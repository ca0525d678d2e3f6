use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use medchain_core::ProductId;
use medchain_purchasing::NewProduct;

use crate::app::dto;
use crate::app::errors::ApiResult;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route("/:id", get(get_product))
        .route("/:id/stock", post(record_stock))
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<NewProduct>,
) -> ApiResult {
    let product = services.products().register(body, Utc::now())?;
    Ok((StatusCode::CREATED, Json(dto::product_to_json(&product))).into_response())
}

pub async fn list_products(Extension(services): Extension<Arc<AppServices>>) -> ApiResult {
    let items = services
        .products()
        .list()?
        .iter()
        .map(dto::product_to_json)
        .collect::<Vec<_>>();
    Ok((StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response())
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let product = services.products().get(&ProductId::new(id)?)?;
    Ok((StatusCode::OK, Json(dto::product_to_json(&product))).into_response())
}

/// Record an inventory reading; a level at or below the reorder point
/// publishes StockLow.
pub async fn record_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordStockRequest>,
) -> ApiResult {
    let product = services
        .products()
        .record_stock(&ProductId::new(id)?, body.current_stock, Utc::now())?;
    Ok((StatusCode::OK, Json(dto::product_to_json(&product))).into_response())
}
