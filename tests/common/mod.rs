#![allow(dead_code)]

use assetx::{
    config::RateEntry,
    error::{ExchangeError, Result},
    ledger::{DecodedTransaction, Ledger, SignedTransaction, TxInput, ValidatedAddress, WalletInfo},
    model::{Amount, BalanceMap, Utxo},
    CoinRegistry, ExchangeApi, ExchangerService, QuotationStore, RateTable, ReservationTable,
    TemplateBase, TemplateBuilder, TraderService, TxDirective,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const LOCK_DURATION: Duration = Duration::from_secs(600);

pub fn asset_labels() -> HashMap<String, String> {
    HashMap::from([
        ("bitcoin".to_string(), "id-bitcoin".to_string()),
        ("MELON".to_string(), "id-melon".to_string()),
        ("AKISKY".to_string(), "id-akisky".to_string()),
    ])
}

pub fn plain(txid: &str, amount: Amount) -> Utxo {
    Utxo {
        txid: txid.to_string(),
        vout: 0,
        amount,
        confirmations: 10,
        spendable: true,
        solvable: true,
        asset_commitment: String::new(),
    }
}

pub fn blinded(txid: &str, amount: Amount) -> Utxo {
    Utxo {
        asset_commitment: format!("commit-{}", txid),
        ..plain(txid, amount)
    }
}

/// In-memory ledger node.
///
/// Confidential addresses carry a `CT` prefix; their unconfidential form is
/// the rest of the string. Addresses starting with `bad` are invalid.
/// Transactions are whitespace-separated directive lists, so decoding picks
/// up every `in=txid:vout` token.
pub struct FakeLedger {
    name: &'static str,
    utxos: Mutex<HashMap<String, Vec<Utxo>>>,
    balance: Mutex<BalanceMap>,
    next: AtomicU64,
    pub fail_send: AtomicBool,
    pub sent: Mutex<Vec<String>>,
    pub blind_calls: Mutex<Vec<Vec<String>>>,
}

impl FakeLedger {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            utxos: Mutex::new(HashMap::new()),
            balance: Mutex::new(BalanceMap::new()),
            next: AtomicU64::new(1),
            fail_send: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            blind_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_coins(self, asset: &str, coins: Vec<Utxo>) -> Self {
        let total: Amount = coins.iter().map(|u| u.amount).sum();
        self.balance.lock().insert(asset.to_string(), total as f64);
        self.utxos.lock().entry(asset.to_string()).or_default().extend(coins);
        self
    }

    pub fn with_balance(self, asset: &str, amount: f64) -> Self {
        self.balance.lock().insert(asset.to_string(), amount);
        self
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    async fn list_unspent(&self, asset: &str) -> Result<Vec<Utxo>> {
        Ok(self.utxos.lock().get(asset).cloned().unwrap_or_default())
    }

    async fn validate_address(&self, address: &str) -> Result<ValidatedAddress> {
        if address.starts_with("bad") || address.is_empty() {
            return Ok(ValidatedAddress::default());
        }
        Ok(ValidatedAddress {
            is_valid: true,
            address: address.to_string(),
            unconfidential: address.strip_prefix("CT").unwrap_or(address).to_string(),
        })
    }

    async fn get_new_address(&self) -> Result<String> {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        Ok(format!("CT{}addr{}", self.name, n))
    }

    async fn decode_raw_transaction(&self, hex: &str) -> Result<DecodedTransaction> {
        let vin = hex
            .split_whitespace()
            .filter_map(|token| token.strip_prefix("in="))
            .map(|input| {
                let mut parts = input.split(':');
                TxInput {
                    txid: parts.next().map(str::to_string),
                    vout: parts.next().and_then(|v| v.parse().ok()),
                }
            })
            .collect();
        Ok(DecodedTransaction {
            txid: String::new(),
            vin,
        })
    }

    async fn sign_raw_transaction(&self, hex: &str) -> Result<SignedTransaction> {
        Ok(SignedTransaction {
            hex: format!("{} sig-{}", hex, self.name),
            complete: true,
        })
    }

    async fn blind_raw_transaction(&self, hex: &str, commitments: &[String]) -> Result<String> {
        self.blind_calls.lock().push(commitments.to_vec());
        Ok(format!("{} blinded", hex))
    }

    async fn send_raw_transaction(&self, hex: &str) -> Result<String> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(ExchangeError::Ledger("bad-txns-inputs-missingorspent".to_string()));
        }
        let mut sent = self.sent.lock();
        sent.push(hex.to_string());
        Ok(format!("txid-{}", sent.len()))
    }

    async fn get_wallet_info(&self) -> Result<WalletInfo> {
        Ok(WalletInfo {
            balance: self.balance.lock().clone(),
        })
    }

    async fn dump_asset_labels(&self) -> Result<HashMap<String, String>> {
        Ok(asset_labels())
    }
}

/// Template builder that concatenates the base and the rendered directives.
#[derive(Default)]
pub struct FakeTemplateBuilder {
    pub calls: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl TemplateBuilder for FakeTemplateBuilder {
    async fn build(&self, base: TemplateBase, directives: &[TxDirective]) -> Result<String> {
        let rendered: Vec<String> = directives.iter().map(ToString::to_string).collect();
        self.calls.lock().push(rendered.clone());
        let body = rendered.join(" ");
        Ok(match base {
            TemplateBase::Create => body,
            TemplateBase::Extend(template) => format!("{} {}", template, body),
        })
    }
}

pub struct Exchanger {
    pub ledger: Arc<FakeLedger>,
    pub service: Arc<ExchangerService>,
}

pub struct Trader {
    pub ledger: Arc<FakeLedger>,
    pub builder: Arc<FakeTemplateBuilder>,
    pub service: TraderService,
}

pub fn default_exchanger_ledger() -> FakeLedger {
    FakeLedger::new("exch")
        .with_coins("MELON", vec![plain("ex-melon-1", 1500), blinded("ex-melon-b", 1200)])
        .with_coins("AKISKY", vec![blinded("ex-akisky-lb", 40)])
}

pub fn default_trader_ledger() -> FakeLedger {
    FakeLedger::new("trd")
        .with_coins("AKISKY", vec![plain("tr-akisky-1", 3000), blinded("tr-akisky-b", 2500)])
        .with_coins("MELON", vec![blinded("tr-melon-lb", 30)])
        .with_balance("bitcoin", 21.0)
}

pub async fn exchanger(ledger: FakeLedger) -> Exchanger {
    let ledger = Arc::new(ledger);
    let registry = CoinRegistry::new(ledger.clone());
    registry.refresh_asset_labels().await.unwrap();
    let service = Arc::new(ExchangerService::new(
        RateTable::new(&[RateEntry::default()]),
        registry,
        Arc::new(ReservationTable::new(LOCK_DURATION)),
        Arc::new(FakeTemplateBuilder::default()),
    ));
    Exchanger { ledger, service }
}

pub async fn trader(ledger: FakeLedger, exchanger: Arc<dyn ExchangeApi>) -> Trader {
    let ledger = Arc::new(ledger);
    let registry = CoinRegistry::new(ledger.clone());
    registry.refresh_asset_labels().await.unwrap();
    let builder = Arc::new(FakeTemplateBuilder::default());
    let service = TraderService::new(
        registry,
        Arc::new(ReservationTable::new(LOCK_DURATION)),
        Arc::new(QuotationStore::new(Duration::from_secs(600))),
        exchanger,
        builder.clone(),
    );
    Trader {
        ledger,
        builder,
        service,
    }
}

/// A trader wired to an in-process exchanger holding the default wallets.
pub async fn pair() -> (Trader, Exchanger) {
    let exchanger = exchanger(default_exchanger_ledger()).await;
    let trader = trader(default_trader_ledger(), exchanger.service.clone()).await;
    (trader, exchanger)
}
