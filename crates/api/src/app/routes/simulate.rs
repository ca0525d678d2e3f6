//! Inject external signals onto `external-events`, as an upstream
//! inventory or forecasting system would.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use tracing::info;

use medchain_core::ProductId;
use medchain_events::catalog::external::{
    BatchDamagedExternal, DemandHighExternal, InventoryAlertExternal, StockLowExternal,
};
use medchain_events::{CatalogEvent, EventEnvelope, MessageBusExt};
use medchain_purchasing::supported_event_types;

use crate::app::dto::ExternalSignalRequest;
use crate::app::errors::ApiResult;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/types", get(list_types))
        .route("/stock-low", post(publish::<StockLowExternal>))
        .route("/demand-high", post(publish::<DemandHighExternal>))
        .route("/batch-damaged", post(publish::<BatchDamagedExternal>))
        .route("/inventory-alert", post(publish::<InventoryAlertExternal>))
}

pub async fn list_types() -> impl IntoResponse {
    Json(serde_json::json!({ "event_types": supported_event_types() }))
}

/// Publish one external signal; consumption happens asynchronously.
pub async fn publish<P>(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<ExternalSignalRequest<P>>,
) -> ApiResult
where
    P: CatalogEvent,
{
    let product_id = ProductId::new(body.product_id)?;
    let mut envelope = EventEnvelope::new(product_id.as_str(), body.data, Utc::now());
    if let Some(source) = body.source {
        envelope = envelope.with_source(source);
    }
    services.bus().emit(&envelope)?;
    info!(
        event_type = P::KIND.event_type,
        routing_key = P::KIND.routing_key,
        product_id = %product_id,
        "external signal published"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "event_id": envelope.event_id().to_string(),
            "event_type": P::KIND.event_type,
            "routing_key": P::KIND.routing_key,
        })),
    )
        .into_response())
}
