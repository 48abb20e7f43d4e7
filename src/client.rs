use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

use crate::{
    config::CounterpartyConfig,
    error::{ExchangeError, Result},
    model::{
        ErrorResponse, ExchangeOfferRequest, ExchangeOfferResponse, ExchangeOfferWBRequest,
        ExchangeOfferWBResponse, ExchangeRateRequest, ExchangeRateResponse, SubmitExchangeRequest,
        SubmitExchangeResponse,
    },
};

/// Operations the exchanger serves to traders.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// Non-binding quote.
    async fn rate(&self, request: &ExchangeRateRequest) -> Result<ExchangeRateResponse>;

    /// Binding offer with a plain unsigned template.
    async fn offer(&self, request: &ExchangeOfferRequest) -> Result<ExchangeOfferResponse>;

    /// Binding offer with a commitment-aware unsigned template.
    async fn offer_blinded(&self, request: &ExchangeOfferWBRequest) -> Result<ExchangeOfferWBResponse>;

    /// Counter-sign and broadcast a settlement transaction.
    async fn submit(&self, request: &SubmitExchangeRequest) -> Result<SubmitExchangeResponse>;
}

/// HTTP client for a remote exchanger.
#[derive(Debug, Clone)]
pub struct ExchangerClient {
    base_url: String,
    client: Client,
}

impl ExchangerClient {
    pub fn new(config: &CounterpartyConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<Req, Res>(&self, path: &str, body: &Req) -> Result<Res>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);
        tracing::debug!(%url, "calling exchanger");

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.message)
                .unwrap_or_else(|_| format!("{} returned {}", path, status));
            return Err(ExchangeError::Remote(message));
        }

        let res = response.json::<Res>().await?;
        Ok(res)
    }
}

#[async_trait]
impl ExchangeApi for ExchangerClient {
    async fn rate(&self, request: &ExchangeRateRequest) -> Result<ExchangeRateResponse> {
        self.post("getexchangerate", request).await
    }

    async fn offer(&self, request: &ExchangeOfferRequest) -> Result<ExchangeOfferResponse> {
        self.post("getexchangeoffer", request).await
    }

    async fn offer_blinded(&self, request: &ExchangeOfferWBRequest) -> Result<ExchangeOfferWBResponse> {
        self.post("getexchangeofferwb", request).await
    }

    async fn submit(&self, request: &SubmitExchangeRequest) -> Result<SubmitExchangeResponse> {
        self.post("submitexchange", request).await
    }
}
