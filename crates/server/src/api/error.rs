//! JSON error responses.

use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use popcorn_core::{DownloadError, SearchError, ServiceError};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable reason, e.g. `no_argument`.
    pub error: String,
    pub message: String,
}

/// An error answered with `{"error": reason, "message": text}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub reason: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn shutting_down() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            reason: "shutting_down",
            message: "Server is shutting down".to_string(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        if e.is_shutting_down() {
            return Self::shutting_down();
        }

        let status = match &e {
            ServiceError::NoArgument
            | ServiceError::RetrievalFailed(SearchError::InvalidIdentifier(_))
            | ServiceError::DownloadFailed(DownloadError::InvalidTicket(_)) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::BAD_GATEWAY,
        };

        Self {
            status,
            reason: e.reason(),
            message: e.to_string(),
        }
    }
}

/// A query string that cannot be read yields no usable argument.
impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            reason: ServiceError::NoArgument.reason(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.reason.to_string(),
                message: self.message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use popcorn_core::{AuthError, CacheError};

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(ServiceError::NoArgument).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ServiceError::LoginFailed(AuthError::Timeout)).status,
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(ServiceError::DownloadFailed(DownloadError::InvalidTicket(
                "bad".to_string()
            )))
            .status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ServiceError::DownloadFailed(DownloadError::InvalidTorrent)).status,
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_cache_shutdown_maps_to_unavailable() {
        let err = ApiError::from(ServiceError::CacheFailed(CacheError::ShuttingDown));
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.reason, "shutting_down");
    }

    #[test]
    fn test_reason_and_message_come_from_service_error() {
        let err = ApiError::from(ServiceError::RetrievalFailed(SearchError::Timeout));
        assert_eq!(err.reason, "retrieval_failed");
        assert_eq!(err.message, "Could not retrieve movie information");
    }
}
