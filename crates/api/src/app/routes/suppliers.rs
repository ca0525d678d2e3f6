use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use medchain_core::SupplierId;
use medchain_suppliers::{Supplier, SupplierState};

use crate::app::dto;
use crate::app::errors::ApiResult;
use crate::app::routes::common::actor;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_supplier).get(list_suppliers))
        .route("/certifications/check", post(check_certifications))
        .route("/:id", get(get_supplier).put(update_supplier))
        .route("/:id/evaluate", post(evaluate_supplier))
        .route("/:id/suspend", post(suspend_supplier))
        .route("/:id/activate", post(activate_supplier))
        .route("/:id/deactivate", post(deactivate_supplier))
        .route("/:id/audit", get(supplier_audit))
}

fn ok(supplier: &Supplier) -> ApiResult {
    Ok((StatusCode::OK, Json(dto::supplier_to_json(supplier, Utc::now()))).into_response())
}

pub async fn register_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Json(body): Json<dto::RegisterSupplierRequest>,
) -> ApiResult {
    let now = Utc::now();
    let supplier = services
        .suppliers()
        .register(body.into_command(now)?, &actor(&headers), now)?;
    Ok((StatusCode::CREATED, Json(dto::supplier_to_json(&supplier, now))).into_response())
}

pub async fn list_suppliers(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::StateQuery>,
) -> ApiResult {
    let state = query.state.as_deref().map(str::parse::<SupplierState>).transpose()?;
    let now = Utc::now();
    let items = services
        .suppliers()
        .list(state)?
        .iter()
        .map(|s| dto::supplier_to_json(s, now))
        .collect::<Vec<_>>();
    Ok((StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response())
}

pub async fn get_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    ok(&services.suppliers().get(id.parse::<SupplierId>()?)?)
}

pub async fn update_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateSupplierRequest>,
) -> ApiResult {
    ok(&services
        .suppliers()
        .update(id.parse()?, body.into(), &actor(&headers), Utc::now())?)
}

pub async fn evaluate_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<dto::EvaluateSupplierRequest>,
) -> ApiResult {
    ok(&services
        .suppliers()
        .evaluate(id.parse()?, body.into(), &actor(&headers), Utc::now())?)
}

pub async fn suspend_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<dto::ReasonRequest>,
) -> ApiResult {
    ok(&services
        .suppliers()
        .suspend(id.parse()?, &body.reason, &actor(&headers), Utc::now())?)
}

pub async fn activate_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult {
    ok(&services
        .suppliers()
        .activate(id.parse()?, &actor(&headers), Utc::now())?)
}

pub async fn deactivate_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<dto::ReasonRequest>,
) -> ApiResult {
    ok(&services
        .suppliers()
        .deactivate(id.parse()?, &body.reason, &actor(&headers), Utc::now())?)
}

pub async fn supplier_audit(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: SupplierId = id.parse()?;
    // 404 for unknown suppliers rather than an empty trail.
    services.suppliers().get(id)?;
    let items = services.suppliers().audit_trail(id)?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response())
}

pub async fn check_certifications(Extension(services): Extension<Arc<AppServices>>) -> ApiResult {
    let published = services.suppliers().check_expiring_certifications(Utc::now())?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "notices_published": published }))).into_response())
}
