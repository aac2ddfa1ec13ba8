//! HTTP response helper functions for consistent API responses.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::json;

/// Standard API success response with JSON data.
pub fn api_success<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, Json(data))
}

/// Success response with `{ "ok": true, ...extra }`.
pub fn api_ok(extra: serde_json::Value) -> impl IntoResponse {
    let mut body = json!({ "ok": true });
    if let (Some(body), serde_json::Value::Object(extra)) = (body.as_object_mut(), extra) {
        body.extend(extra);
    }
    api_success(body)
}

/// Standard API error response with code and message.
pub fn api_error(
    status: StatusCode,
    code: &str,
    message: impl std::fmt::Display,
) -> impl IntoResponse {
    (
        status,
        Json(json!({
            "ok": false,
            "error": code,
            "message": message.to_string(),
            "status": status.as_u16()
        })),
    )
}
