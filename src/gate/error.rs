use axum::http::{StatusCode, header::InvalidHeaderValue};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("identity provider request failed: {0}")]
    Provider(#[from] reqwest::Error),
    #[error("identity provider returned unexpected status: {0}")]
    ProviderStatus(StatusCode),
    #[error("invalid identity provider url: {0}")]
    ProviderUrl(#[from] url::ParseError),
    #[error("invalid user id: {0}")]
    InvalidUserId(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid cookie header: {0}")]
    Cookie(#[from] InvalidHeaderValue),
}
