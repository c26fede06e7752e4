use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The counter store refused or failed an operation. The limiter treats
    /// this as a fail-open condition; it never reaches the request path.
    #[error("counter store error: {0}")]
    Store(String),

    /// A counter store operation exceeded its deadline. Handled exactly like
    /// `Store`.
    #[error("counter store timed out after {0:?}")]
    StoreTimeout(Duration),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Store(err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            Error::Store(_) | Error::StoreTimeout(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            Error::Config(_) | Error::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        (
            status,
            Json(json!({
                "error": error,
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_errors_map_to_store() {
        let err = redis::RedisError::from((redis::ErrorKind::IoError, "connection refused"));
        let err = Error::from(err);
        assert!(matches!(err, Error::Store(_)));
    }

    #[test]
    fn store_errors_render_as_service_unavailable() {
        let response = Error::Store("boom".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
