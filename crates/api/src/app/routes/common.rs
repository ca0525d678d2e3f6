use axum::http::HeaderMap;

/// Header naming the person or system behind a supplier change.
pub const ACTOR_HEADER: &str = "x-actor";

/// Actor recorded when the caller does not name one.
pub const DEFAULT_ACTOR: &str = "api";

/// Audit actor for this request.
pub fn actor(headers: &HeaderMap) -> String {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_ACTOR)
        .to_string()
}
