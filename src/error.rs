use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::model::{CoinId, ErrorResponse};

pub type Result<T> = std::result::Result<T, ExchangeError>;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("invalid address [{0}]")]
    InvalidAddress(String),

    #[error("offerID not found [{0}]")]
    OfferNotFound(String),

    #[error("quotation id already in use [{0}]")]
    DuplicateQuotation(String),

    #[error("no exchange source: {offer} -> {request}")]
    NoExchangeSource { offer: String, request: String },

    #[error("cost lower than min value: {cost} < {min}")]
    BelowMinimum { cost: i64, min: i64 },

    #[error("cost higher than max value: {cost} > {max}")]
    AboveMaximum { cost: i64, max: i64 },

    #[error("no sufficient utxo: {asset} needs more than {requested}")]
    InsufficientFunds { asset: String, requested: i64 },

    #[error("no utxo [{0}]")]
    NoEligibleCoin(String),

    #[error(
        "quotation has changed: old (cost:{old_cost}, fee:{old_fee}) => new (cost:{new_cost}, fee:{new_fee})"
    )]
    QuoteDrifted {
        old_cost: i64,
        old_fee: i64,
        new_cost: i64,
        new_fee: i64,
    },

    #[error("reservation lost for {0}")]
    ReservationLost(CoinId),

    #[error("Ledger RPC error: {0}")]
    Ledger(String),

    #[error("Counterparty error: {0}")]
    Remote(String),

    #[error("Submission rejected: {0}")]
    SubmissionRejected(String),

    #[error("Template builder error: {0}")]
    TemplateBuilder(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl ExchangeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ExchangeError::Validation(_) | ExchangeError::InvalidAddress(_) => {
                StatusCode::BAD_REQUEST
            }
            ExchangeError::OfferNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for ExchangeError {
    fn from(err: std::io::Error) -> Self {
        ExchangeError::Io(err.to_string())
    }
}

impl From<config::ConfigError> for ExchangeError {
    fn from(err: config::ConfigError) -> Self {
        ExchangeError::Config(err.to_string())
    }
}

impl IntoResponse for ExchangeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        } else {
            tracing::warn!("request rejected: {}", self);
        }
        let body = ErrorResponse {
            result: false,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ExchangeError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ExchangeError::OfferNotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ExchangeError::BelowMinimum { cost: 50, min: 100 }.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
