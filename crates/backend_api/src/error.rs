use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use brapi_client::BrapiError;
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Asset not found: {0}")]
    AssetNotFound(u64),

    #[error("Dividend record not found: {0}")]
    DividendNotFound(u64),

    #[error("Income goal not found: {0}")]
    GoalNotFound(u64),

    #[error("Simulation not found: {0}")]
    SimulationNotFound(u64),

    #[error("An asset with ticker {0} already exists")]
    DuplicateTicker(String),

    #[error("No dividends found for {0}")]
    NoDividendsFound(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] models::ValidationError),

    #[error("Projection failed: {0}")]
    Projection(#[from] projection::ProjectionError),

    #[error("Market data error: {0}")]
    MarketData(#[from] BrapiError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::AssetNotFound(_)
            | ApiError::DividendNotFound(_)
            | ApiError::GoalNotFound(_)
            | ApiError::SimulationNotFound(_)
            | ApiError::NoDividendsFound(_) => StatusCode::NOT_FOUND,
            ApiError::DuplicateTicker(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Projection(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::MarketData(err) => market_status(err),
            ApiError::IoError(_) | ApiError::JsonError(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Upstream market-data failures map onto the gateway status family; an
/// unknown ticker stays a plain 404.
fn market_status(err: &BrapiError) -> StatusCode {
    match err {
        BrapiError::TickerNotFound(_) | BrapiError::TokenRequired(_) => StatusCode::NOT_FOUND,
        BrapiError::Transport(inner) if inner.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
        BrapiError::Transport(inner) if inner.is_connect() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
