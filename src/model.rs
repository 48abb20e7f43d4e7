use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tokio::time::Instant;

use crate::error::{ExchangeError, Result};

/// Amounts are integers in the ledger's smallest unit.
pub type Amount = i64;

/// Wallet balance per asset label, as reported by the ledger.
pub type BalanceMap = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CoinId {
    pub txid: String,
    pub vout: u32,
}

impl CoinId {
    pub fn new(txid: impl Into<String>, vout: u32) -> Self {
        Self {
            txid: txid.into(),
            vout,
        }
    }
}

impl fmt::Display for CoinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// One entry of `listunspent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    pub amount: Amount,
    #[serde(default)]
    pub confirmations: i64,
    #[serde(default)]
    pub spendable: bool,
    #[serde(default)]
    pub solvable: bool,
    #[serde(default, rename = "assetcommitment")]
    pub asset_commitment: String,
}

impl Utxo {
    pub fn id(&self) -> CoinId {
        CoinId::new(self.txid.clone(), self.vout)
    }

    pub fn is_blinded(&self) -> bool {
        !self.asset_commitment.is_empty()
    }

    pub fn is_usable(&self) -> bool {
        self.spendable || self.solvable
    }
}

pub fn total_amount(utxos: &[Utxo]) -> Amount {
    utxos.iter().fold(0, |total: Amount, u| total.saturating_add(u.amount))
}

pub fn commitments_of(utxos: &[Utxo]) -> Vec<String> {
    utxos.iter().map(|u| u.asset_commitment.clone()).collect()
}

/// A priced offer for one counter-asset. `transaction` is empty for
/// non-binding quotes and never leaves the trader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub fee: Amount,
    pub cost: Amount,
    pub id: String,
    #[serde(skip)]
    pub transaction: String,
}

#[derive(Debug, Clone)]
pub struct Quotation {
    pub request_asset: String,
    pub request_amount: Amount,
    pub offers: BTreeMap<String, Offer>,
    pub created_at: Instant,
}

impl Quotation {
    pub fn new(request_asset: String, request_amount: Amount) -> Self {
        Self {
            request_asset,
            request_amount,
            offers: BTreeMap::new(),
            created_at: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTuple {
    pub rate: f64,
    pub min: Amount,
    pub max: Amount,
    pub unit: i64,
    pub fee: Amount,
}

impl Default for RateTuple {
    fn default() -> Self {
        Self {
            rate: 0.5,
            min: 100,
            max: 200_000,
            unit: 20,
            fee: 15,
        }
    }
}

// Exchanger wire records.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRateRequest {
    pub request: BTreeMap<String, Amount>,
    pub offer: String,
}

impl ExchangeRateRequest {
    pub fn new(request_asset: &str, request_amount: Amount, offer_asset: &str) -> Self {
        let mut request = BTreeMap::new();
        request.insert(request_asset.to_string(), request_amount);
        Self {
            request,
            offer: offer_asset.to_string(),
        }
    }

    /// The request map must carry exactly one asset.
    pub fn single(&self) -> Result<(String, Amount)> {
        if self.request.len() != 1 {
            return Err(ExchangeError::Validation(format!(
                "request must single record:{}",
                self.request.len()
            )));
        }
        let (asset, amount) = self
            .request
            .iter()
            .next()
            .ok_or_else(|| ExchangeError::Validation("request is empty".to_string()))?;
        if *amount <= 0 {
            return Err(ExchangeError::Validation(format!(
                "request amount must be positive: {}",
                amount
            )));
        }
        if self.offer.is_empty() {
            return Err(ExchangeError::Validation("offer not found".to_string()));
        }
        Ok((asset.clone(), *amount))
    }
}

pub type ExchangeOfferRequest = ExchangeRateRequest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRateResponse {
    pub fee: Amount,
    #[serde(rename = "assetid")]
    pub asset_label: String,
    pub cost: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeOfferResponse {
    pub fee: Amount,
    #[serde(rename = "assetid")]
    pub asset_label: String,
    pub cost: Amount,
    #[serde(rename = "tx")]
    pub transaction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeOfferWBRequest {
    pub request: BTreeMap<String, Amount>,
    pub offer: String,
    pub commitments: Vec<String>,
}

impl ExchangeOfferWBRequest {
    pub fn rate_request(&self) -> ExchangeRateRequest {
        ExchangeRateRequest {
            request: self.request.clone(),
            offer: self.offer.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeOfferWBResponse {
    pub fee: Amount,
    #[serde(rename = "assetid")]
    pub asset_label: String,
    pub cost: Amount,
    #[serde(rename = "tx")]
    pub transaction: String,
    pub commitments: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitExchangeRequest {
    #[serde(rename = "tx")]
    pub transaction: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitExchangeResponse {
    pub txid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub result: bool,
    pub message: String,
}

// Trader wire records.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferParams {
    pub asset: String,
    pub cost: Amount,
}

pub type UserOfferResponse = BTreeMap<String, Offer>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendParams {
    pub id: String,
    pub addr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendResponse {
    pub result: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletInfoResponse {
    pub balance: BalanceMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utxo_deserialize_from_listunspent() {
        let json = r#"{
            "txid": "aa",
            "vout": 1,
            "amount": 5000,
            "confirmations": 12,
            "spendable": true,
            "solvable": false,
            "assetcommitment": "0a11"
        }"#;
        let utxo: Utxo = serde_json::from_str(json).unwrap();
        assert_eq!(utxo.id(), CoinId::new("aa", 1));
        assert!(utxo.is_blinded());
        assert!(utxo.is_usable());
    }

    #[test]
    fn test_plain_utxo_has_no_commitment() {
        let json = r#"{"txid": "bb", "vout": 0, "amount": 10, "solvable": true}"#;
        let utxo: Utxo = serde_json::from_str(json).unwrap();
        assert!(!utxo.is_blinded());
        assert!(utxo.is_usable());
    }

    #[test]
    fn test_rate_request_requires_single_record() {
        let mut request = ExchangeRateRequest::new("MELON", 1000, "AKISKY");
        assert_eq!(request.single().unwrap(), ("MELON".to_string(), 1000));

        request.request.insert("OTHER".to_string(), 1);
        assert!(matches!(request.single(), Err(ExchangeError::Validation(_))));

        request.request.clear();
        assert!(request.single().is_err());
    }

    #[test]
    fn test_offer_hides_transaction_on_the_wire() {
        let offer = Offer {
            fee: 15,
            cost: 2000,
            id: "abc".to_string(),
            transaction: "deadbeef".to_string(),
        };
        let json = serde_json::to_value(&offer).unwrap();
        assert_eq!(json, serde_json::json!({"fee": 15, "cost": 2000, "id": "abc"}));
    }

    #[test]
    fn test_exchange_response_field_names() {
        let res = ExchangeOfferResponse {
            fee: 15,
            asset_label: "AKISKY".to_string(),
            cost: 2000,
            transaction: "00".to_string(),
        };
        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(json["assetid"], "AKISKY");
        assert_eq!(json["tx"], "00");
    }
}
