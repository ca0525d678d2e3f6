use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, warn};

use medchain_core::DomainError;
use medchain_events::PublishError;
use medchain_infra::{ErrorKind, ServiceError};

/// Handler failure, rendered as `{"error": code, "message": msg}`.
#[derive(Debug)]
pub struct ApiError(Response);

pub type ApiResult = Result<Response, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.0
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError(service_error_to_response(err))
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::from(ServiceError::from(err))
    }
}

impl From<PublishError> for ApiError {
    fn from(err: PublishError) -> Self {
        ApiError::from(ServiceError::from(err))
    }
}

pub fn service_error_to_response(err: ServiceError) -> Response {
    match err.kind() {
        ErrorKind::Validation => json_error(StatusCode::BAD_REQUEST, "validation_error", err.to_string()),
        ErrorKind::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        ErrorKind::InvalidTransition => {
            json_error(StatusCode::CONFLICT, "invalid_transition", err.to_string())
        }
        ErrorKind::Conflict => json_error(StatusCode::CONFLICT, "conflict", err.to_string()),
        // Infrastructure details stay in the logs.
        ErrorKind::Transient => {
            warn!(error = %err, "request failed on an unavailable collaborator");
            json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                "service temporarily unavailable",
            )
        }
        ErrorKind::Internal => {
            error!(error = %err, "request failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use medchain_events::Topic;
    use medchain_infra::StoreError;

    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        let cases: Vec<(ServiceError, StatusCode)> = vec![
            (DomainError::validation("bad").into(), StatusCode::BAD_REQUEST),
            (DomainError::not_found().into(), StatusCode::NOT_FOUND),
            (
                DomainError::invalid_transition("purchase order", "RECIBIDA", "cancel").into(),
                StatusCode::CONFLICT,
            ),
            (DomainError::conflict("taken").into(), StatusCode::CONFLICT),
            (StoreError::Unavailable("db down".into()).into(), StatusCode::SERVICE_UNAVAILABLE),
            (
                PublishError::ExchangeNotDeclared(Topic::OrderEvents).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(service_error_to_response(err).status(), status);
        }
    }
}
