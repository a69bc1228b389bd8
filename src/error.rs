use crate::config::ConfigError;
use crate::delivery::{AdminError, CacheError, DeliveryError};
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error(transparent)]
    Admin(#[from] AdminError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_)
            | AppError::Admin(AdminError::InvalidTier(_))
            | AppError::Admin(AdminError::InvalidZone(_)) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_)
            | AppError::Admin(AdminError::ZoneNotFound(_))
            | AppError::Admin(AdminError::TierNotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Admin(AdminError::DuplicateZone(_)) => StatusCode::CONFLICT,
            AppError::Admin(AdminError::CenterNotGeocoded { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Delivery(DeliveryError::Provider(_)) | AppError::Admin(AdminError::Provider(_)) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Delivery(DeliveryError::Store(_))
            | AppError::Admin(AdminError::Store(_))
            | AppError::Admin(AdminError::Cache(_))
            | AppError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
            code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
