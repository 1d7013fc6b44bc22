use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pagecraft_core::{Missing, ServiceError, StoreFailure};
use serde_json::json;

const INTERNAL_MESSAGE: &str = "An internal server error occurred";

/// API error type. Every variant renders as
/// `{"statusCode": .., "error": "<reason phrase>", "message": ..}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(Missing),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("insufficient permissions")]
    Forbidden,

    #[error(transparent)]
    Store(#[from] StoreFailure),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(missing) => ApiError::NotFound(missing),
            ServiceError::PermissionDenied => ApiError::Forbidden,
            ServiceError::Store(failure) => ApiError::Store(failure),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound(missing) => (StatusCode::NOT_FOUND, format!("{missing} not found")),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Missing or invalid bearer token".to_string(),
            ),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Insufficient permissions".to_string()),
            ApiError::Store(failure) => {
                tracing::error!(kind = %failure.kind(), "store failure");
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
            }
        };

        let body = json!({
            "statusCode": status.as_u16(),
            "error": status.canonical_reason().unwrap_or("Error"),
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}

/// Convenience type alias for route handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pagecraft_core::FailureKind;

    async fn render(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn store_failures_share_one_message() {
        for kind in [
            FailureKind::Schema,
            FailureKind::Constraint,
            FailureKind::Connection,
            FailureKind::Unknown,
        ] {
            let (status, body) =
                render(ServiceError::Store(StoreFailure::new(kind)).into()).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(
                body,
                json!({
                    "statusCode": 500,
                    "error": "Internal Server Error",
                    "message": "An internal server error occurred",
                })
            );
        }
    }

    #[tokio::test]
    async fn not_found_names_the_entity() {
        let (status, body) = render(ServiceError::NotFound(Missing::User).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not Found");
        assert_eq!(body["message"], "User not found");
    }

    #[tokio::test]
    async fn permission_denied_is_forbidden() {
        let (status, body) = render(ServiceError::PermissionDenied.into()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Forbidden");
        assert_eq!(body["message"], "Insufficient permissions");
    }
}
