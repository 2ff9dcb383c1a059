//! # Response Formatting
//!
//! Every JSON answer from the user routes uses the same envelope:
//! `{"msg": "..."}` for both confirmations and errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

/// `{"msg": ...}` with the given status
pub fn msg_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "msg": message.into() }))).into_response()
}

/// Status for a record store failure
pub fn status_for(error: &crate::store::StoreError) -> StatusCode {
    use crate::store::StoreError;
    match error {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::AlreadyExists(_) => StatusCode::CONFLICT,
        StoreError::InvalidRecord(_) => StatusCode::BAD_REQUEST,
        StoreError::AlreadyOpen { .. }
        | StoreError::Read { .. }
        | StoreError::Write { .. }
        | StoreError::Decode { .. }
        | StoreError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
