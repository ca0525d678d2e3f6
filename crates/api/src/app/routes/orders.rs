use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use medchain_core::OrderId;
use medchain_purchasing::OrderState;

use crate::app::dto;
use crate::app::errors::ApiResult;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/send", post(send_order))
        .route("/:id/confirm", post(confirm_order))
        .route("/:id/receive", post(receive_order))
        .route("/:id/cancel", post(cancel_order))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> ApiResult {
    let order = services.orders().create_order(body.into(), Utc::now())?;
    Ok((StatusCode::CREATED, Json(dto::order_to_json(&order))).into_response())
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::StateQuery>,
) -> ApiResult {
    let state = query.state.as_deref().map(str::parse::<OrderState>).transpose()?;
    let items = services
        .orders()
        .list(state)?
        .iter()
        .map(dto::order_to_json)
        .collect::<Vec<_>>();
    Ok((StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response())
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let order = services.orders().get(id.parse::<OrderId>()?)?;
    Ok((StatusCode::OK, Json(dto::order_to_json(&order))).into_response())
}

pub async fn send_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let order = services.orders().send(id.parse()?, Utc::now())?;
    Ok((StatusCode::OK, Json(dto::order_to_json(&order))).into_response())
}

pub async fn confirm_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let order = services.orders().confirm(id.parse()?, Utc::now())?;
    Ok((StatusCode::OK, Json(dto::order_to_json(&order))).into_response())
}

pub async fn receive_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let order = services.orders().receive(id.parse()?, Utc::now())?;
    Ok((StatusCode::OK, Json(dto::order_to_json(&order))).into_response())
}

/// The body is optional; an empty POST cancels without a reason.
pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Option<Json<dto::CancelOrderRequest>>,
) -> ApiResult {
    let reason = body.and_then(|Json(b)| b.reason);
    let order = services.orders().cancel(id.parse()?, reason, Utc::now())?;
    Ok((StatusCode::OK, Json(dto::order_to_json(&order))).into_response())
}
