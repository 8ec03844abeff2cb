use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use opsdash::config::ConfigError;
use opsdash::directory::ProviderError;
use opsdash::scoring::security::SecurityError;
use opsdash::telemetry::TelemetryError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server error: {0}")]
    Server(#[from] axum::Error),
    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid parameter: {0}")]
    InvalidParam(String),
    #[error("tenant {0} is not managed by this deployment")]
    UnknownTenant(i64),
    #[error(transparent)]
    Upstream(#[from] ProviderError),
    #[error(transparent)]
    Security(#[from] SecurityError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidParam(_) => StatusCode::BAD_REQUEST,
            ApiError::UnknownTenant(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_)
            | ApiError::Security(SecurityError::Provider(_))
            | ApiError::Security(SecurityError::Store(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Config(_)
            | ApiError::Telemetry(_)
            | ApiError::Io(_)
            | ApiError::Server(_)
            | ApiError::Encode(_)
            | ApiError::Security(SecurityError::Encode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
