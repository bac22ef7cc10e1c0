//! Maps the broker's internal error taxonomy onto HTTP status codes (§7.1),
//! the same pattern as `knhk-workflow-engine`'s `RestAdapter::error_to_response`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use mobility_wire::{DispatchError, ErrorBody, ProtocolError, RunError, SetupError};

/// Wraps a [`RunError`] with the HTTP status it maps to (§7.1).
pub struct ApiError(pub RunError);

impl From<RunError> for ApiError {
    fn from(err: RunError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            RunError::Setup(SetupError::UnsatisfiedFeature { .. }) => {
                (StatusCode::BAD_REQUEST, "UNSATISFIED_FEATURE")
            }
            RunError::Setup(_) => (StatusCode::BAD_REQUEST, "CONFIG_ERROR"),
            RunError::Protocol(ProtocolError::StepOnEmptyQueue { .. }) => {
                (StatusCode::CONFLICT, "PROTOCOL_ERROR")
            }
            RunError::Protocol(_) => (StatusCode::INTERNAL_SERVER_ERROR, "PROTOCOL_ERROR"),
            RunError::Dispatch(DispatchError::Rejected { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "DISPATCH_ERROR")
            }
            RunError::InvalidState(_) => (StatusCode::CONFLICT, "INVALID_STATE"),
        };
        let body = ErrorBody::new(code, self.0.to_string());
        (status, Json(body)).into_response()
    }
}
