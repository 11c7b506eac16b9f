//! Error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

use crate::EcommerceError;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub code: u16,
    pub timestamp: String,
}

impl EcommerceError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Config(_) | Self::Storage(_) | Self::Internal(_) | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for EcommerceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, field) = match &self {
            Self::Validation { field, message } => (message.clone(), Some(field.clone())),
            // internals stay in the log
            Self::Config(_) | Self::Storage(_) | Self::Internal(_) | Self::Database(_) => ("internal server error".to_string(), None),
            other => (other.to_string(), None),
        };

        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "request rejected");
        }

        let body = ErrorResponse {
            error: self.code(),
            message,
            field,
            code: status.as_u16(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(EcommerceError::validation("quantity", "too many").status(), StatusCode::BAD_REQUEST);
        assert_eq!(EcommerceError::NotFound("order").status(), StatusCode::NOT_FOUND);
        assert_eq!(EcommerceError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(EcommerceError::Unauthenticated("no token".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(EcommerceError::Storage("disk".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(EcommerceError::Internal("hash".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        let response = EcommerceError::Internal("password hashing failed: bad salt".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "INTERNAL_SERVER_ERROR");
        assert_eq!(body["message"], "internal server error");
    }
}
