use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::engine::{EngineError, ErrorKind};

/// RFC 7807 body.
#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    pub code: String,
}

impl ProblemDetails {
    fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        let code = code.into();
        let title = status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string();
        Self {
            r#type: format!("https://shopfloor.dev/problems/{}", code.to_lowercase()),
            title,
            status: status.as_u16(),
            detail: detail.into(),
            code,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub problem: Box<ProblemDetails>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        let problem = Box::new(ProblemDetails::new(status, code, message));
        Self { status, problem }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let status = match (&e, e.kind()) {
            (EngineError::SlotUnavailable { .. }, _) => StatusCode::CONFLICT,
            (_, ErrorKind::NotFound) => StatusCode::NOT_FOUND,
            (_, ErrorKind::InvalidInput) => StatusCode::BAD_REQUEST,
            (_, ErrorKind::StateConflict)
            | (_, ErrorKind::AlreadyExists)
            | (_, ErrorKind::ResourceUnavailable)
            | (_, ErrorKind::Cancelled) => StatusCode::CONFLICT,
            (_, ErrorKind::Internal) => {
                error!(code = e.code(), "request failed: {e}");
                return Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    e.code(),
                    "internal error, see server logs",
                );
            }
        };
        Self::new(status, e.code(), e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.problem)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn engine_errors_map_to_statuses() {
        let cases = [
            (
                EngineError::NotFound {
                    entity: "task",
                    id: Ulid::new(),
                },
                StatusCode::NOT_FOUND,
            ),
            (EngineError::InvalidInput("bad".into()), StatusCode::BAD_REQUEST),
            (
                EngineError::SlotUnavailable {
                    start: 0,
                    capacity: 3,
                },
                StatusCode::CONFLICT,
            ),
            (EngineError::VehicleBusy(Ulid::new()), StatusCode::CONFLICT),
            (EngineError::BaysUnavailable { horizon_ms: 1 }, StatusCode::CONFLICT),
            (EngineError::WalError("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            let code = err.code();
            let api = ApiError::from(err);
            assert_eq!(api.status, status, "{code}");
            assert_eq!(api.problem.code, code);
        }
    }

    #[test]
    fn internal_detail_is_not_leaked() {
        let api = ApiError::from(EngineError::WalError("/var/lib/shopfloor/wal: EIO".into()));
        assert!(!api.problem.detail.contains("/var/lib"));
    }
}
