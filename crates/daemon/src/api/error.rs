// SPDX-License-Identifier: MIT

//! Central mapping from `zd_core::Error` to HTTP status codes (spec.md §7),
//! enforced in one place rather than per-handler.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use zd_core::Error;

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::MachineBusy(_) | Error::DiskBusy(_) | Error::AlreadyRunning(_) => StatusCode::CONFLICT,
            Error::ValidationFailed(_) | Error::UnknownRuntime(_) | Error::UnknownDiskType(_) => StatusCode::BAD_REQUEST,
            Error::SpawnFailed { .. }
            | Error::DatastoreUninitialized(_)
            | Error::RuntimeError(_)
            | Error::Io(_)
            | Error::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
