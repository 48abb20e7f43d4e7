//! JSON-RPC seam to the confidential-transaction ledger node.
//!
//! The node owns consensus, scripts and the blinding cryptography; this
//! crate only consumes the calls below as opaque operations.

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::{
    config::LedgerConfig,
    error::{ExchangeError, Result},
    model::{BalanceMap, Utxo},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidatedAddress {
    #[serde(rename = "isvalid")]
    pub is_valid: bool,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub unconfidential: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxInput {
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub vout: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodedTransaction {
    #[serde(default)]
    pub txid: String,
    #[serde(default)]
    pub vin: Vec<TxInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub hex: String,
    #[serde(default)]
    pub complete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletInfo {
    #[serde(default)]
    pub balance: BalanceMap,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn list_unspent(&self, asset: &str) -> Result<Vec<Utxo>>;
    async fn validate_address(&self, address: &str) -> Result<ValidatedAddress>;
    async fn get_new_address(&self) -> Result<String>;
    async fn decode_raw_transaction(&self, hex: &str) -> Result<DecodedTransaction>;
    async fn sign_raw_transaction(&self, hex: &str) -> Result<SignedTransaction>;
    async fn blind_raw_transaction(&self, hex: &str, commitments: &[String]) -> Result<String>;
    async fn send_raw_transaction(&self, hex: &str) -> Result<String>;
    async fn get_wallet_info(&self) -> Result<WalletInfo>;
    async fn dump_asset_labels(&self) -> Result<HashMap<String, String>>;
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: String,
    method: &'a str,
    params: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<RpcErrorBody>,
    #[serde(default)]
    id: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Basic-auth JSON-RPC 1.0 client for an Elements-style node.
pub struct RpcLedger {
    url: String,
    user: String,
    password: String,
    client: Client,
    next_id: AtomicU64,
}

impl RpcLedger {
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            url: config.url.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn request(&self, method: &str, params: Vec<serde_json::Value>) -> Result<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let body = RpcRequest {
            jsonrpc: "1.0",
            id: id.clone(),
            method,
            params,
        };
        tracing::debug!(method, id = %id, "ledger rpc");

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| ExchangeError::Ledger(format!("{}: {}", method, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ExchangeError::Ledger(format!("{}: {}", method, e)))?;
        let parsed: RpcResponse = serde_json::from_str(&text).map_err(|e| {
            ExchangeError::Ledger(format!("{}: status {} body {}: {}", method, status, text, e))
        })?;

        if let Some(err) = parsed.error {
            return Err(ExchangeError::Ledger(format!(
                "{}: code {}: {}",
                method, err.code, err.message
            )));
        }
        if !status.is_success() {
            return Err(ExchangeError::Ledger(format!("{}: status {}", method, status)));
        }
        if parsed.id.as_str() != Some(id.as_str()) {
            return Err(ExchangeError::Ledger(format!(
                "{}: response id {} does not match request id {}",
                method, parsed.id, id
            )));
        }
        if parsed.result.is_null() {
            return Err(ExchangeError::Ledger(format!("{}: result is null", method)));
        }
        Ok(parsed.result)
    }

    async fn request_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<T> {
        let value = self.request(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| ExchangeError::Ledger(format!("{}: unexpected result: {}", method, e)))
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn list_unspent(&self, asset: &str) -> Result<Vec<Utxo>> {
        let params = vec![
            serde_json::json!(1),
            serde_json::json!(9_999_999),
            serde_json::json!([]),
            serde_json::json!(asset),
        ];
        self.request_as("listunspent", params).await
    }

    async fn validate_address(&self, address: &str) -> Result<ValidatedAddress> {
        self.request_as("validateaddress", vec![serde_json::json!(address)])
            .await
    }

    async fn get_new_address(&self) -> Result<String> {
        self.request_as("getnewaddress", vec![]).await
    }

    async fn decode_raw_transaction(&self, hex: &str) -> Result<DecodedTransaction> {
        self.request_as("decoderawtransaction", vec![serde_json::json!(hex)])
            .await
    }

    async fn sign_raw_transaction(&self, hex: &str) -> Result<SignedTransaction> {
        self.request_as("signrawtransaction", vec![serde_json::json!(hex)])
            .await
    }

    async fn blind_raw_transaction(&self, hex: &str, commitments: &[String]) -> Result<String> {
        self.request_as(
            "blindrawtransaction",
            vec![serde_json::json!(hex), serde_json::json!(commitments)],
        )
        .await
    }

    async fn send_raw_transaction(&self, hex: &str) -> Result<String> {
        self.request_as("sendrawtransaction", vec![serde_json::json!(hex)])
            .await
    }

    async fn get_wallet_info(&self) -> Result<WalletInfo> {
        self.request_as("getwalletinfo", vec![]).await
    }

    async fn dump_asset_labels(&self) -> Result<HashMap<String, String>> {
        self.request_as("dumpassetlabels", vec![]).await
    }
}
