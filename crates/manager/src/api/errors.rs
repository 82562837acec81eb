use core::error::Error;

use api_types::ErrorResponse;
use error_stack::Report;
use poem::error::ResponseError;
use poem::http::StatusCode;
use poem::Response;

use crate::domain::ManagerError;

/// API server errors
#[derive(Debug, derive_more::Display)]
pub enum ApiError {
    #[display("Server error: {message}")]
    ServerError { message: String },
}

impl Error for ApiError {}

/// Failure answered to an HTTP client
///
/// Only the boundary kind crosses the wire; the cause chain of the report it
/// was built from stays in the logs.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
#[display("{kind}")]
pub struct HttpError {
    kind: ManagerError,
}

impl Error for HttpError {}

impl HttpError {
    pub fn kind(&self) -> &ManagerError {
        &self.kind
    }
}

impl From<ManagerError> for HttpError {
    fn from(kind: ManagerError) -> Self {
        Self { kind }
    }
}

impl From<Report<ManagerError>> for HttpError {
    fn from(report: Report<ManagerError>) -> Self {
        Self {
            kind: report.current_context().clone(),
        }
    }
}

pub fn status_code(kind: &ManagerError) -> StatusCode {
    match kind {
        ManagerError::MalformedEntity => StatusCode::BAD_REQUEST,
        ManagerError::Unauthorized => StatusCode::UNAUTHORIZED,
        ManagerError::NotFound => StatusCode::NOT_FOUND,
        ManagerError::IdentityAssignmentFailed => StatusCode::INTERNAL_SERVER_ERROR,
        ManagerError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
    }
}

impl ResponseError for HttpError {
    fn status(&self) -> StatusCode {
        status_code(&self.kind)
    }

    fn as_response(&self) -> Response {
        let body = ErrorResponse {
            error: self.kind.to_string(),
        };
        Response::builder()
            .status(self.status())
            .content_type("application/json")
            .body(serde_json::to_string(&body).unwrap_or_default())
    }
}
