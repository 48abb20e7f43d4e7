//! Coin Registry: the actor's read view of its own wallet on the ledger.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    error::{ExchangeError, Result},
    ledger::Ledger,
    model::{BalanceMap, Utxo},
};

const NATIVE_ASSET_LABEL: &str = "bitcoin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Plain,
    Confidential,
}

#[derive(Clone)]
pub struct CoinRegistry {
    ledger: Arc<dyn Ledger>,
    asset_ids: Arc<RwLock<HashMap<String, String>>>,
}

impl CoinRegistry {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self {
            ledger,
            asset_ids: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// Reload the label -> asset id map, leaving out the native asset.
    pub async fn refresh_asset_labels(&self) -> Result<usize> {
        let mut labels = self.ledger.dump_asset_labels().await?;
        labels.remove(NATIVE_ASSET_LABEL);
        let count = labels.len();
        *self.asset_ids.write() = labels;
        tracing::info!(assets = count, "asset labels loaded");
        Ok(count)
    }

    pub fn asset_id(&self, label: &str) -> Result<String> {
        self.asset_ids
            .read()
            .get(label)
            .cloned()
            .ok_or_else(|| ExchangeError::Validation(format!("unknown asset label: {}", label)))
    }

    pub fn is_known_asset(&self, label: &str) -> bool {
        self.asset_ids.read().contains_key(label)
    }

    pub async fn list_unspent(&self, asset: &str) -> Result<Vec<Utxo>> {
        self.ledger.list_unspent(asset).await
    }

    /// Wallet balances restricted to assets with a known label.
    pub async fn known_balance(&self) -> Result<BalanceMap> {
        let mut balance = self.ledger.get_wallet_info().await?.balance;
        balance.retain(|label, _| self.is_known_asset(label));
        Ok(balance)
    }

    /// Validate `address` and tell whether it is in confidential form.
    pub async fn classify_address(&self, address: &str) -> Result<AddressKind> {
        let validated = self.ledger.validate_address(address).await?;
        if !validated.is_valid {
            return Err(ExchangeError::InvalidAddress(address.to_string()));
        }
        if validated.unconfidential == address {
            Ok(AddressKind::Plain)
        } else {
            Ok(AddressKind::Confidential)
        }
    }

    /// Derive a receiving address; the unconfidential form unless
    /// `confidential` is requested.
    pub async fn new_address(&self, confidential: bool) -> Result<String> {
        let address = self.ledger.get_new_address().await?;
        if confidential {
            return Ok(address);
        }
        let validated = self.ledger.validate_address(&address).await?;
        if validated.unconfidential.is_empty() {
            return Err(ExchangeError::Ledger("unconfidential is empty".to_string()));
        }
        Ok(validated.unconfidential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{MockLedger, ValidatedAddress, WalletInfo};

    #[tokio::test]
    async fn test_classify_address() {
        let mut ledger = MockLedger::new();
        ledger.expect_validate_address().returning(|addr| {
            Ok(match addr {
                "CTEplain" => ValidatedAddress {
                    is_valid: true,
                    address: addr.to_string(),
                    unconfidential: "2dplain".to_string(),
                },
                "2dplain" => ValidatedAddress {
                    is_valid: true,
                    address: addr.to_string(),
                    unconfidential: "2dplain".to_string(),
                },
                "CTEnoform" => ValidatedAddress {
                    is_valid: true,
                    address: addr.to_string(),
                    unconfidential: String::new(),
                },
                _ => ValidatedAddress::default(),
            })
        });
        let registry = CoinRegistry::new(Arc::new(ledger));

        assert_eq!(
            registry.classify_address("2dplain").await.unwrap(),
            AddressKind::Plain
        );
        assert_eq!(
            registry.classify_address("CTEplain").await.unwrap(),
            AddressKind::Confidential
        );
        assert_eq!(
            registry.classify_address("CTEnoform").await.unwrap(),
            AddressKind::Confidential
        );
        assert!(matches!(
            registry.classify_address("garbage").await,
            Err(ExchangeError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_known_balance_drops_unlabelled_assets() {
        let mut ledger = MockLedger::new();
        ledger.expect_dump_asset_labels().returning(|| {
            Ok(HashMap::from([
                ("bitcoin".to_string(), "b0".to_string()),
                ("MELON".to_string(), "m1".to_string()),
                ("AKISKY".to_string(), "a2".to_string()),
            ]))
        });
        ledger.expect_get_wallet_info().returning(|| {
            Ok(WalletInfo {
                balance: BalanceMap::from([
                    ("bitcoin".to_string(), 10.0),
                    ("MELON".to_string(), 5.0),
                    ("6f0279e9ed04".to_string(), 1.0),
                ]),
            })
        });
        let registry = CoinRegistry::new(Arc::new(ledger));
        assert_eq!(registry.refresh_asset_labels().await.unwrap(), 2);
        assert_eq!(registry.asset_id("AKISKY").unwrap(), "a2");
        assert!(registry.asset_id("bitcoin").is_err());

        let balance = registry.known_balance().await.unwrap();
        assert_eq!(balance.len(), 1);
        assert!(balance.contains_key("MELON"));
    }

    #[tokio::test]
    async fn test_new_plain_address_uses_unconfidential_form() {
        let mut ledger = MockLedger::new();
        ledger
            .expect_get_new_address()
            .returning(|| Ok("CTEnew".to_string()));
        ledger.expect_validate_address().returning(|addr| {
            Ok(ValidatedAddress {
                is_valid: true,
                address: addr.to_string(),
                unconfidential: "2dnew".to_string(),
            })
        });
        let registry = CoinRegistry::new(Arc::new(ledger));
        assert_eq!(registry.new_address(false).await.unwrap(), "2dnew");
        assert_eq!(registry.new_address(true).await.unwrap(), "CTEnew");
    }
}
