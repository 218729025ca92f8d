//! Mapping of engine errors onto HTTP responses.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::common::EngineError;

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::Unauthorized => StatusCode::UNAUTHORIZED,
            EngineError::FormationNotReady(_)
            | EngineError::FormationNotEmpty(_)
            | EngineError::ResetNotSupported(_)
            | EngineError::InvalidStatusTransition(_)
            | EngineError::ConstraintViolation { .. } => StatusCode::BAD_REQUEST,
            EngineError::Store(err) => {
                error!(error = ?err, "Request failed");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal server error" })),
                )
                    .into_response();
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<JsonRejection> for EngineError {
    fn from(rejection: JsonRejection) -> Self {
        EngineError::invalid(rejection.body_text())
    }
}

impl From<QueryRejection> for EngineError {
    fn from(rejection: QueryRejection) -> Self {
        EngineError::invalid(rejection.body_text())
    }
}
