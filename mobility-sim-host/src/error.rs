//! HTTP status mapping for simulator-side errors (§7.1), the generic-host
//! analogue of `mobility-broker`'s `ApiError`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use mobility_wire::{ErrorBody, RuntimeError, SetupError};

pub struct HostError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for HostError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody::new(self.code, self.message))).into_response()
    }
}

impl From<SetupError> for HostError {
    fn from(err: SetupError) -> Self {
        let code = match &err {
            SetupError::UnsatisfiedFeature { .. } => "UNSATISFIED_FEATURE",
            _ => "CONFIG_ERROR",
        };
        HostError {
            status: StatusCode::BAD_REQUEST,
            code,
            message: err.to_string(),
        }
    }
}

impl From<RuntimeError> for HostError {
    fn from(err: RuntimeError) -> Self {
        let status = match &err {
            // The broker recognizes an empty-queue step via 409, so it can
            // distinguish "nothing to do" from a transport failure (§7
            // ProtocolError::StepOnEmptyQueue).
            RuntimeError::EmptyQueue => StatusCode::CONFLICT,
            RuntimeError::TriggeredInPast { .. } => StatusCode::BAD_REQUEST,
            RuntimeError::NotStarted | RuntimeError::AlreadyFinished => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HostError {
            status,
            code: "PROTOCOL_ERROR",
            message: err.to_string(),
        }
    }
}
