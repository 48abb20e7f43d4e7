//! HTTP surfaces of both actors.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    error::{ExchangeError, Result},
    exchanger::ExchangerService,
    model::{
        ExchangeOfferRequest, ExchangeOfferResponse, ExchangeOfferWBRequest, ExchangeOfferWBResponse,
        ExchangeRateRequest, ExchangeRateResponse, OfferParams, SendParams, SendResponse,
        SubmitExchangeRequest, SubmitExchangeResponse, UserOfferResponse, WalletInfoResponse,
    },
    trader::TraderService,
};

pub fn trader_router(trader: Arc<TraderService>) -> Router {
    Router::new()
        .route("/walletinfo", get(wallet_info).post(wallet_info))
        .route("/offer", get(offer_from_query).post(offer_from_json))
        .route("/send", get(send_from_query).post(send_from_json))
        .route("/health", get(trader_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(trader)
}

pub fn exchanger_router(exchanger: Arc<ExchangerService>) -> Router {
    Router::new()
        .route("/getexchangerate", post(get_exchange_rate))
        .route("/getexchangeoffer", post(get_exchange_offer))
        .route("/getexchangeofferwb", post(get_exchange_offer_wb))
        .route("/submitexchange", post(submit_exchange))
        .route("/health", get(exchanger_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(exchanger)
}

fn from_query<T>(query: std::result::Result<Query<T>, QueryRejection>) -> Result<T> {
    query
        .map(|Query(params)| params)
        .map_err(|e| ExchangeError::Validation(e.body_text()))
}

fn from_json<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(params)| params)
        .map_err(|e| ExchangeError::Validation(e.body_text()))
}

// Trader handlers.

async fn wallet_info(State(trader): State<Arc<TraderService>>) -> Result<Json<WalletInfoResponse>> {
    Ok(Json(trader.wallet_info().await?))
}

async fn offer_from_query(
    State(trader): State<Arc<TraderService>>,
    query: std::result::Result<Query<OfferParams>, QueryRejection>,
) -> Result<Json<UserOfferResponse>> {
    let params = from_query(query)?;
    Ok(Json(trader.request_quote(&params).await?))
}

async fn offer_from_json(
    State(trader): State<Arc<TraderService>>,
    body: std::result::Result<Json<OfferParams>, JsonRejection>,
) -> Result<Json<UserOfferResponse>> {
    let params = from_json(body)?;
    Ok(Json(trader.request_quote(&params).await?))
}

async fn send_from_query(
    State(trader): State<Arc<TraderService>>,
    query: std::result::Result<Query<SendParams>, QueryRejection>,
) -> Result<Json<SendResponse>> {
    let params = from_query(query)?;
    Ok(Json(trader.send(&params).await?))
}

async fn send_from_json(
    State(trader): State<Arc<TraderService>>,
    body: std::result::Result<Json<SendParams>, JsonRejection>,
) -> Result<Json<SendResponse>> {
    let params = from_json(body)?;
    Ok(Json(trader.send(&params).await?))
}

async fn trader_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "role": "trader"}))
}

// Exchanger handlers.

async fn get_exchange_rate(
    State(exchanger): State<Arc<ExchangerService>>,
    body: std::result::Result<Json<ExchangeRateRequest>, JsonRejection>,
) -> Result<Json<ExchangeRateResponse>> {
    let request = from_json(body)?;
    Ok(Json(exchanger.lookup_rate(&request)?))
}

async fn get_exchange_offer(
    State(exchanger): State<Arc<ExchangerService>>,
    body: std::result::Result<Json<ExchangeOfferRequest>, JsonRejection>,
) -> Result<Json<ExchangeOfferResponse>> {
    let request = from_json(body)?;
    Ok(Json(exchanger.build_offer(&request).await?))
}

async fn get_exchange_offer_wb(
    State(exchanger): State<Arc<ExchangerService>>,
    body: std::result::Result<Json<ExchangeOfferWBRequest>, JsonRejection>,
) -> Result<Json<ExchangeOfferWBResponse>> {
    let request = from_json(body)?;
    Ok(Json(exchanger.build_offer_blinded(&request).await?))
}

async fn submit_exchange(
    State(exchanger): State<Arc<ExchangerService>>,
    body: std::result::Result<Json<SubmitExchangeRequest>, JsonRejection>,
) -> Result<Json<SubmitExchangeResponse>> {
    let request = from_json(body)?;
    Ok(Json(exchanger.submit_exchange(&request).await?))
}

async fn exchanger_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "role": "exchanger"}))
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
