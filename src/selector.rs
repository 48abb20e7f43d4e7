//! Coin selection over the registry and the reservation table.
//!
//! Every coin returned is reserved under the caller's lease; on failure,
//! whatever the call reserved has been released again.

use std::cmp::Reverse;
use std::sync::Arc;

use crate::{
    error::{ExchangeError, Result},
    model::{total_amount, Amount, CoinId, Utxo},
    registry::CoinRegistry,
    reservation::{LeaseId, ReservationTable},
};

#[derive(Clone)]
pub struct CoinSelector {
    registry: CoinRegistry,
    reservations: Arc<ReservationTable>,
}

fn eligible(utxos: Vec<Utxo>, want_blinded: bool) -> Vec<Utxo> {
    utxos
        .into_iter()
        .filter(|u| u.is_blinded() == want_blinded && u.is_usable())
        .collect()
}

impl CoinSelector {
    pub fn new(registry: CoinRegistry, reservations: Arc<ReservationTable>) -> Self {
        Self {
            registry,
            reservations,
        }
    }

    pub fn reservations(&self) -> &Arc<ReservationTable> {
        &self.reservations
    }

    /// Reserve coins of `asset` whose total strictly exceeds `min_amount`,
    /// largest first.
    pub async fn select_funding(
        &self,
        asset: &str,
        min_amount: Amount,
        want_blinded: bool,
        lease: LeaseId,
    ) -> Result<Vec<Utxo>> {
        let mut candidates = eligible(self.registry.list_unspent(asset).await?, want_blinded);
        candidates.sort_by_key(|u| Reverse((u.amount, u.confirmations)));

        let mut total: Amount = 0;
        let mut selected = Vec::new();
        for utxo in candidates {
            if total > min_amount {
                break;
            }
            if !self.reservations.lock(&utxo.id(), lease) {
                continue;
            }
            total = total.saturating_add(utxo.amount);
            selected.push(utxo);
        }

        if total <= min_amount {
            let ids: Vec<CoinId> = selected.iter().map(Utxo::id).collect();
            self.reservations.release(ids.iter(), lease);
            tracing::warn!(asset, min_amount, available = total, "insufficient funds");
            return Err(ExchangeError::InsufficientFunds {
                asset: asset.to_string(),
                requested: min_amount,
            });
        }

        tracing::debug!(
            asset,
            min_amount,
            coins = selected.len(),
            total = total_amount(&selected),
            "funding selected"
        );
        Ok(selected)
    }

    /// Reserve the single smallest eligible coin of `asset`.
    pub async fn select_minimal(&self, asset: &str, want_blinded: bool, lease: LeaseId) -> Result<Utxo> {
        let mut candidates = eligible(self.registry.list_unspent(asset).await?, want_blinded);
        candidates.sort_by_key(|u| (u.amount, u.confirmations));

        let mut chosen: Option<Utxo> = None;
        for utxo in candidates {
            if let Some(current) = &chosen {
                if utxo.amount != current.amount {
                    break;
                }
            }
            if !self.reservations.lock(&utxo.id(), lease) {
                continue;
            }
            if let Some(previous) = chosen.replace(utxo) {
                self.reservations.release([previous.id()].iter(), lease);
            }
        }

        chosen.ok_or_else(|| ExchangeError::NoEligibleCoin(asset.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MockLedger;
    use std::time::Duration;

    fn utxo(txid: &str, amount: Amount, confirmations: i64, blinded: bool) -> Utxo {
        Utxo {
            txid: txid.to_string(),
            vout: 0,
            amount,
            confirmations,
            spendable: true,
            solvable: true,
            asset_commitment: if blinded { format!("c-{}", txid) } else { String::new() },
        }
    }

    fn selector_with(utxos: Vec<Utxo>) -> CoinSelector {
        let mut ledger = MockLedger::new();
        ledger
            .expect_list_unspent()
            .returning(move |_| Ok(utxos.clone()));
        CoinSelector::new(
            CoinRegistry::new(Arc::new(ledger)),
            Arc::new(ReservationTable::new(Duration::from_secs(600))),
        )
    }

    fn txids(utxos: &[Utxo]) -> Vec<&str> {
        utxos.iter().map(|u| u.txid.as_str()).collect()
    }

    #[tokio::test]
    async fn test_funding_takes_largest_first_until_strictly_above() {
        let selector = selector_with(vec![
            utxo("small", 100, 9, false),
            utxo("big", 1000, 1, false),
            utxo("mid-old", 500, 10, false),
            utxo("mid-new", 500, 2, false),
        ]);
        let lease = LeaseId::new();

        let coins = selector.select_funding("AKISKY", 1000, false, lease).await.unwrap();
        assert_eq!(txids(&coins), vec!["big", "mid-old"]);
        assert_eq!(total_amount(&coins), 1500);
        assert!(selector.reservations().is_locked(&CoinId::new("big", 0)));
        assert!(!selector.reservations().is_locked(&CoinId::new("mid-new", 0)));
    }

    #[tokio::test]
    async fn test_funding_equal_total_is_insufficient_and_releases() {
        let selector = selector_with(vec![utxo("a", 600, 1, false), utxo("b", 400, 1, false)]);

        let err = selector
            .select_funding("AKISKY", 1000, false, LeaseId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::InsufficientFunds { requested: 1000, .. }));
        assert!(selector.reservations().is_empty());
    }

    #[tokio::test]
    async fn test_funding_filters_blinded_state_and_unusable() {
        let mut unusable = utxo("unusable", 5000, 1, false);
        unusable.spendable = false;
        unusable.solvable = false;
        let selector = selector_with(vec![
            unusable,
            utxo("blinded", 3000, 1, true),
            utxo("plain", 2000, 1, false),
        ]);

        let plain = selector.select_funding("A", 100, false, LeaseId::new()).await.unwrap();
        assert_eq!(txids(&plain), vec!["plain"]);

        let blinded = selector.select_funding("A", 100, true, LeaseId::new()).await.unwrap();
        assert_eq!(txids(&blinded), vec!["blinded"]);
    }

    #[tokio::test]
    async fn test_funding_skips_reserved_coins() {
        let selector = selector_with(vec![utxo("a", 800, 1, false), utxo("b", 700, 1, false)]);
        let first = selector.select_funding("A", 500, false, LeaseId::new()).await.unwrap();
        assert_eq!(txids(&first), vec!["a"]);

        let second = selector.select_funding("A", 500, false, LeaseId::new()).await.unwrap();
        assert_eq!(txids(&second), vec!["b"]);

        assert!(selector.select_funding("A", 500, false, LeaseId::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_minimal_returns_smallest_eligible() {
        let selector = selector_with(vec![
            utxo("large", 900, 1, true),
            utxo("plain-small", 1, 1, false),
            utxo("smallest", 50, 1, true),
            utxo("middle", 300, 1, true),
        ]);
        let lease = LeaseId::new();

        let coin = selector.select_minimal("MELON", true, lease).await.unwrap();
        assert_eq!(coin.txid, "smallest");
        assert_eq!(selector.reservations().len(), 1);
    }

    #[tokio::test]
    async fn test_minimal_prefers_last_tie_and_releases_earlier() {
        let selector = selector_with(vec![
            utxo("tie-young", 50, 1, true),
            utxo("tie-old", 50, 8, true),
            utxo("bigger", 60, 1, true),
        ]);
        let lease = LeaseId::new();

        let coin = selector.select_minimal("MELON", true, lease).await.unwrap();
        assert_eq!(coin.txid, "tie-old");
        assert!(!selector.reservations().is_locked(&CoinId::new("tie-young", 0)));
        assert!(!selector.reservations().is_locked(&CoinId::new("bigger", 0)));
    }

    #[tokio::test]
    async fn test_minimal_skips_reserved_and_fails_when_none_left() {
        let selector = selector_with(vec![utxo("x", 10, 1, true), utxo("y", 20, 1, true)]);
        let first = selector.select_minimal("M", true, LeaseId::new()).await.unwrap();
        let second = selector.select_minimal("M", true, LeaseId::new()).await.unwrap();
        assert_eq!(first.txid, "x");
        assert_eq!(second.txid, "y");

        let err = selector.select_minimal("M", true, LeaseId::new()).await.unwrap_err();
        assert!(matches!(err, ExchangeError::NoEligibleCoin(_)));
    }
}
