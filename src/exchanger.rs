//! Rate/offer engine run by the exchanger.
//!
//! Binding offers reserve the exchanger's coins under a fresh lease and hand
//! back an unsigned template funded by them. Those reservations end when the
//! trader submits a transaction spending them, or when they expire.

use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    client::ExchangeApi,
    error::{ExchangeError, Result},
    model::{
        commitments_of, total_amount, Amount, CoinId, ExchangeOfferRequest, ExchangeOfferResponse,
        ExchangeOfferWBRequest, ExchangeOfferWBResponse, ExchangeRateRequest, ExchangeRateResponse,
        SubmitExchangeRequest, SubmitExchangeResponse, Utxo,
    },
    rates::RateTable,
    registry::CoinRegistry,
    reservation::{LeaseId, ReservationTable},
    selector::CoinSelector,
    template::{TemplateBase, TemplateBuilder, TxDirective},
};

pub struct ExchangerService {
    rates: RateTable,
    registry: CoinRegistry,
    selector: CoinSelector,
    builder: Arc<dyn TemplateBuilder>,
}

impl ExchangerService {
    pub fn new(
        rates: RateTable,
        registry: CoinRegistry,
        reservations: Arc<ReservationTable>,
        builder: Arc<dyn TemplateBuilder>,
    ) -> Self {
        let selector = CoinSelector::new(registry.clone(), reservations);
        Self {
            rates,
            registry,
            selector,
            builder,
        }
    }

    pub fn reservations(&self) -> &Arc<ReservationTable> {
        self.selector.reservations()
    }

    pub fn lookup_rate(&self, request: &ExchangeRateRequest) -> Result<ExchangeRateResponse> {
        let (asset, amount) = request.single()?;
        let quote = self.rates.lookup_rate(&asset, amount, &request.offer)?;
        tracing::info!(
            request_asset = %asset,
            request_amount = amount,
            offer_asset = %request.offer,
            cost = quote.cost,
            fee = quote.fee,
            "rate quoted"
        );
        Ok(quote)
    }

    pub async fn build_offer(&self, request: &ExchangeOfferRequest) -> Result<ExchangeOfferResponse> {
        let (asset, amount) = request.single()?;
        let quote = self.rates.lookup_rate(&asset, amount, &request.offer)?;

        let lease = LeaseId::new();
        let funding = self.selector.select_funding(&asset, amount, false, lease).await?;

        let transaction = match self
            .plain_template(&asset, amount, &request.offer, quote.cost, &funding)
            .await
        {
            Ok(tx) => tx,
            Err(e) => {
                self.release(&funding, lease);
                return Err(e);
            }
        };

        tracing::info!(
            %lease,
            request_asset = %asset,
            offer_asset = %request.offer,
            cost = quote.cost,
            inputs = funding.len(),
            "binding offer built"
        );
        Ok(ExchangeOfferResponse {
            fee: quote.fee,
            asset_label: quote.asset_label,
            cost: quote.cost,
            transaction,
        })
    }

    pub async fn build_offer_blinded(
        &self,
        request: &ExchangeOfferWBRequest,
    ) -> Result<ExchangeOfferWBResponse> {
        let (asset, amount) = request.rate_request().single()?;
        if request.commitments.is_empty() {
            return Err(ExchangeError::Validation("commitments not found".to_string()));
        }
        let quote = self.rates.lookup_rate(&asset, amount, &request.offer)?;

        let lease = LeaseId::new();
        let funding = self.selector.select_funding(&asset, amount, true, lease).await?;
        let loopback = match self.selector.select_minimal(&request.offer, true, lease).await {
            Ok(utxo) => utxo,
            Err(e) => {
                self.release(&funding, lease);
                return Err(e);
            }
        };

        let transaction = match self
            .blinded_template(&asset, amount, &request.offer, quote.cost, quote.fee, &funding, &loopback)
            .await
        {
            Ok(tx) => tx,
            Err(e) => {
                self.release(&funding, lease);
                self.release(std::slice::from_ref(&loopback), lease);
                return Err(e);
            }
        };

        let mut commitments = commitments_of(&funding);
        commitments.push(loopback.asset_commitment.clone());

        tracing::info!(
            %lease,
            request_asset = %asset,
            offer_asset = %request.offer,
            cost = quote.cost,
            inputs = funding.len() + 1,
            "binding blinded offer built"
        );
        Ok(ExchangeOfferWBResponse {
            fee: quote.fee,
            asset_label: quote.asset_label,
            cost: quote.cost,
            transaction,
            commitments,
        })
    }

    /// Counter-sign and broadcast. Every coin the transaction spends is
    /// unlocked whatever the outcome.
    pub async fn submit_exchange(&self, request: &SubmitExchangeRequest) -> Result<SubmitExchangeResponse> {
        let ledger = self.registry.ledger();
        let decoded = ledger
            .decode_raw_transaction(&request.transaction)
            .await
            .map_err(|e| ExchangeError::SubmissionRejected(e.to_string()))?;

        let result = async {
            let signed = ledger.sign_raw_transaction(&request.transaction).await?;
            ledger.send_raw_transaction(&signed.hex).await
        }
        .await;

        let spent: Vec<CoinId> = decoded
            .vin
            .iter()
            .filter_map(|input| match (&input.txid, input.vout) {
                (Some(txid), Some(vout)) => Some(CoinId::new(txid.clone(), vout)),
                _ => None,
            })
            .collect();
        for coin in &spent {
            if let Some(lease) = self.reservations().holder(coin) {
                tracing::debug!(%coin, %lease, "releasing spent coin");
            }
            self.reservations().unlock(coin);
        }

        match result {
            Ok(txid) => {
                tracing::info!(%txid, inputs = spent.len(), "exchange submitted");
                Ok(SubmitExchangeResponse { txid })
            }
            Err(e) => {
                tracing::warn!(error = %e, inputs = spent.len(), "exchange submission failed");
                Err(ExchangeError::SubmissionRejected(e.to_string()))
            }
        }
    }

    async fn plain_template(
        &self,
        request_asset: &str,
        request_amount: Amount,
        offer_asset: &str,
        cost: Amount,
        funding: &[Utxo],
    ) -> Result<String> {
        let change = total_amount(funding) - request_amount;

        let mut directives: Vec<TxDirective> = funding.iter().map(TxDirective::input_with_amount).collect();
        directives.push(TxDirective::out_addr(
            cost,
            self.registry.new_address(false).await?,
            self.registry.asset_id(offer_asset)?,
        ));
        if change > 0 {
            directives.push(TxDirective::out_addr(
                change,
                self.registry.new_address(false).await?,
                self.registry.asset_id(request_asset)?,
            ));
        }

        self.builder.build(TemplateBase::Create, &directives).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn blinded_template(
        &self,
        request_asset: &str,
        request_amount: Amount,
        offer_asset: &str,
        cost: Amount,
        fee: Amount,
        funding: &[Utxo],
        loopback: &Utxo,
    ) -> Result<String> {
        let change = total_amount(funding) - request_amount;
        let loopback_amount = loopback.amount + cost;

        let mut directives: Vec<TxDirective> = funding.iter().map(TxDirective::input_with_amount).collect();
        directives.push(TxDirective::input_with_amount(loopback));
        directives.push(TxDirective::out_addr(
            loopback_amount,
            self.registry.new_address(true).await?,
            self.registry.asset_id(offer_asset)?,
        ));
        if change > 0 {
            directives.push(TxDirective::out_addr(
                change,
                self.registry.new_address(true).await?,
                self.registry.asset_id(request_asset)?,
            ));
        }
        directives.push(TxDirective::out_fee(fee, self.registry.asset_id(offer_asset)?));

        self.builder.build(TemplateBase::Create, &directives).await
    }

    fn release(&self, coins: &[Utxo], lease: LeaseId) {
        let ids: Vec<CoinId> = coins.iter().map(Utxo::id).collect();
        self.reservations().release(ids.iter(), lease);
    }
}

#[async_trait]
impl ExchangeApi for ExchangerService {
    async fn rate(&self, request: &ExchangeRateRequest) -> Result<ExchangeRateResponse> {
        self.lookup_rate(request)
    }

    async fn offer(&self, request: &ExchangeOfferRequest) -> Result<ExchangeOfferResponse> {
        self.build_offer(request).await
    }

    async fn offer_blinded(&self, request: &ExchangeOfferWBRequest) -> Result<ExchangeOfferWBResponse> {
        self.build_offer_blinded(request).await
    }

    async fn submit(&self, request: &SubmitExchangeRequest) -> Result<SubmitExchangeResponse> {
        self.submit_exchange(request).await
    }
}
