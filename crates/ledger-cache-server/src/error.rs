use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ledger_cache_store::CoordinatorError;
use serde::Serialize;

#[derive(Debug)]
pub enum AppError {
    /// Parametros invalidos
    BadRequest(String),

    /// El nodo no respondio o respondio con error
    Upstream(String),

    /// Componente no disponible (p.ej. watcher sin cuenta configurada)
    Unavailable(String),

    /// Error interno
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl From<CoordinatorError> for AppError {
    fn from(err: CoordinatorError) -> Self {
        match err {
            CoordinatorError::Fetch { .. } => AppError::Upstream(err.to_string()),
            CoordinatorError::Decode { .. } | CoordinatorError::Join { .. } => {
                AppError::Internal(err.to_string())
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad Request", msg),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "Bad Gateway", msg),
            AppError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable", msg)
            },
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                msg,
            ),
        };

        let body = Json(ErrorResponse {
            error: error.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Upstream("x".into()), StatusCode::BAD_GATEWAY),
            (AppError::Unavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_coordinator_errors() {
        let fetch = CoordinatorError::Fetch {
            key: "balance:0xa:0xb:no-fhe".to_string(),
            message: "connection refused".to_string(),
        };
        assert!(matches!(AppError::from(fetch), AppError::Upstream(_)));

        let join = CoordinatorError::Join {
            key: "balance:0xa:0xb:no-fhe".to_string(),
            message: "panicked".to_string(),
        };
        assert!(matches!(AppError::from(join), AppError::Internal(_)));
    }
}
