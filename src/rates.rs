use std::collections::HashMap;

use crate::{
    config::RateEntry,
    error::{ExchangeError, Result},
    model::{Amount, ExchangeRateResponse, RateTuple},
};

/// Rate pair key: (offered asset, requested asset).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RatePair {
    pub offer: String,
    pub request: String,
}

#[derive(Debug, Clone, Default)]
pub struct RateTable {
    rates: HashMap<RatePair, RateTuple>,
}

impl RateTable {
    pub fn new(entries: &[RateEntry]) -> Self {
        let rates = entries
            .iter()
            .map(|entry| {
                (
                    RatePair {
                        offer: entry.offer.clone(),
                        request: entry.request.clone(),
                    },
                    entry.tuple(),
                )
            })
            .collect();
        Self { rates }
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Price `request_amount` of `request_asset` in units of `offer_asset`.
    ///
    /// `cost` is the requested amount divided by the rate, truncated.
    pub fn lookup_rate(
        &self,
        request_asset: &str,
        request_amount: Amount,
        offer_asset: &str,
    ) -> Result<ExchangeRateResponse> {
        let pair = RatePair {
            offer: offer_asset.to_string(),
            request: request_asset.to_string(),
        };
        let rate = self.rates.get(&pair).ok_or_else(|| ExchangeError::NoExchangeSource {
            offer: offer_asset.to_string(),
            request: request_asset.to_string(),
        })?;

        let cost = (request_amount as f64 / rate.rate) as Amount;
        if cost < rate.min {
            return Err(ExchangeError::BelowMinimum { cost, min: rate.min });
        }
        if cost > rate.max {
            return Err(ExchangeError::AboveMaximum { cost, max: rate.max });
        }

        Ok(ExchangeRateResponse {
            fee: rate.fee,
            asset_label: offer_asset.to_string(),
            cost,
        })
    }
}
