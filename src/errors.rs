use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::{models::upload::FieldError, services::ingest_service::IngestError};

/// An HTTP-facing error: status, a stable message and optional detail.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<String>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            details: None,
        }
    }

    /// Shortcut for a 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{}: {}", self.message, details),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.message, "details": details }),
            None => json!({ "error": self.message }),
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Field(FieldError::Missing(_)) => {
                AppError::bad_request("Missing required fields")
            }
            IngestError::Field(invalid @ FieldError::InvalidValue(_)) => {
                AppError::bad_request("Invalid field value").with_details(invalid.to_string())
            }
            IngestError::Form { status, message } if status == StatusCode::PAYLOAD_TOO_LARGE => {
                AppError::new(status, "Upload too large").with_details(message)
            }
            IngestError::Form { status, message } => {
                AppError::new(status, "Malformed upload").with_details(message)
            }
            IngestError::Remote(remote) => {
                AppError::internal("Upload failed").with_details(remote.to_string())
            }
            // Local disk trouble stays in the logs.
            IngestError::Io(_) => AppError::internal("Upload failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::remote_store::RemoteError;
    use std::io;

    async fn render(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn missing_field_is_a_bare_400() {
        let (status, body) =
            render(IngestError::Field(FieldError::Missing("ward")).into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Missing required fields" }));
    }

    #[tokio::test]
    async fn remote_failure_is_a_500_with_details() {
        let remote = RemoteError::Status {
            status: 401,
            body: "invalid api_key".into(),
        };
        let (status, body) = render(IngestError::Remote(remote).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Upload failed");
        assert!(body["details"].as_str().unwrap().contains("invalid api_key"));
    }

    #[tokio::test]
    async fn oversized_form_keeps_its_status() {
        let err = IngestError::Form {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: "length limit exceeded".into(),
        };
        let (status, body) = render(err.into()).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "Upload too large");
    }

    #[tokio::test]
    async fn io_failure_hides_filesystem_details() {
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "/srv/temp_uploads denied");
        let (status, body) = render(IngestError::Io(err).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Upload failed" }));
    }
}
