//! Trader side: wallet view, multi-asset quotes and settlement.
//!
//! A settlement attempt owns one lease. Every coin it reserves is held under
//! that lease and released when the attempt ends, whatever the outcome.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::{
    client::ExchangeApi,
    error::{ExchangeError, Result},
    ids,
    model::{
        commitments_of, total_amount, Amount, CoinId, ExchangeOfferRequest, ExchangeOfferWBRequest,
        ExchangeRateRequest, Offer, OfferParams, Quotation, SendParams, SendResponse,
        SubmitExchangeRequest, UserOfferResponse, Utxo, WalletInfoResponse,
    },
    quotation::QuotationStore,
    registry::{AddressKind, CoinRegistry},
    reservation::{spawn_periodic, LeaseId, ReservationTable},
    selector::CoinSelector,
    template::{TemplateBase, TemplateBuilder, TxDirective},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementStage {
    AddressCheck,
    BindingQuote,
    Funding,
    RemoteBlind,
    Sign,
    Submit,
    Done,
    Failed,
}

impl SettlementStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStage::AddressCheck => "address_check",
            SettlementStage::BindingQuote => "binding_quote",
            SettlementStage::Funding => "funding",
            SettlementStage::RemoteBlind => "remote_blind",
            SettlementStage::Sign => "sign",
            SettlementStage::Submit => "submit",
            SettlementStage::Done => "done",
            SettlementStage::Failed => "failed",
        }
    }
}

impl fmt::Display for SettlementStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a resolved offer id commits the trader to.
#[derive(Debug, Clone)]
struct SettlementTerms {
    destination: String,
    send_asset: String,
    send_amount: Amount,
    offer_asset: String,
    offer: Offer,
}

struct SettlementAttempt {
    lease: LeaseId,
    stage: SettlementStage,
    held: Vec<CoinId>,
}

impl SettlementAttempt {
    fn new() -> Self {
        Self {
            lease: LeaseId::new(),
            stage: SettlementStage::AddressCheck,
            held: Vec::new(),
        }
    }

    fn advance(&mut self, stage: SettlementStage) {
        self.stage = stage;
        tracing::Span::current().record("stage", stage.as_str());
        tracing::info!(%stage, "settlement stage");
    }

    fn hold(&mut self, coins: &[Utxo]) {
        self.held.extend(coins.iter().map(Utxo::id));
    }
}

pub struct TraderService {
    registry: CoinRegistry,
    selector: CoinSelector,
    quotations: Arc<QuotationStore>,
    exchanger: Arc<dyn ExchangeApi>,
    builder: Arc<dyn TemplateBuilder>,
}

impl TraderService {
    pub fn new(
        registry: CoinRegistry,
        reservations: Arc<ReservationTable>,
        quotations: Arc<QuotationStore>,
        exchanger: Arc<dyn ExchangeApi>,
        builder: Arc<dyn TemplateBuilder>,
    ) -> Self {
        let selector = CoinSelector::new(registry.clone(), reservations);
        Self {
            registry,
            selector,
            quotations,
            exchanger,
            builder,
        }
    }

    pub fn reservations(&self) -> &Arc<ReservationTable> {
        self.selector.reservations()
    }

    pub fn quotations(&self) -> &Arc<QuotationStore> {
        &self.quotations
    }

    pub async fn wallet_info(&self) -> Result<WalletInfoResponse> {
        Ok(WalletInfoResponse {
            balance: self.registry.known_balance().await?,
        })
    }

    /// Ask the exchanger for a non-binding price of `params.cost` units of
    /// `params.asset` in every other asset the wallet holds.
    pub async fn request_quote(&self, params: &OfferParams) -> Result<UserOfferResponse> {
        if params.asset.is_empty() {
            return Err(ExchangeError::Validation("asset is required".to_string()));
        }
        if params.cost <= 0 {
            return Err(ExchangeError::Validation(format!(
                "cost must be positive: {}",
                params.cost
            )));
        }

        let balance = self.registry.known_balance().await?;
        let mut quotation = Quotation::new(params.asset.clone(), params.cost);
        for offer_asset in balance.keys().filter(|a| **a != params.asset) {
            let request = ExchangeRateRequest::new(&params.asset, params.cost, offer_asset);
            match self.exchanger.rate(&request).await {
                Ok(rate) => {
                    let offer = Offer {
                        fee: rate.fee,
                        cost: rate.cost,
                        id: ids::rate_offer_id(rate.fee, &rate.asset_label, rate.cost),
                        transaction: String::new(),
                    };
                    quotation.offers.insert(offer_asset.clone(), offer);
                }
                Err(e) => {
                    tracing::debug!(%offer_asset, error = %e, "no offer for asset");
                }
            }
        }

        let offers = quotation.offers.clone();
        if !offers.is_empty() {
            let id = self.quotations.insert(quotation)?;
            tracing::info!(
                quotation_id = %id,
                request_asset = %params.asset,
                request_amount = params.cost,
                offers = offers.len(),
                "quotation stored"
            );
        }
        Ok(offers)
    }

    /// Settle the offer `params.id`, paying `params.addr`.
    ///
    /// An invalid address or unknown offer id is returned as an error; any
    /// later failure is reported in the response body.
    pub async fn send(&self, params: &SendParams) -> Result<SendResponse> {
        let mut attempt = SettlementAttempt::new();
        let span = tracing::info_span!(
            "settlement",
            offer_id = %params.id,
            lease = %attempt.lease,
            blinded = tracing::field::Empty,
            stage = attempt.stage.as_str(),
        );

        async {
            let (kind, terms) = match self.resolve(params).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    tracing::warn!(error = %e, "send rejected");
                    return Err(e);
                }
            };
            tracing::Span::current().record("blinded", kind == AddressKind::Confidential);

            let outcome = match kind {
                AddressKind::Plain => self.settle_plain(&terms, &mut attempt).await,
                AddressKind::Confidential => self.settle_blinded(&terms, &mut attempt).await,
            };
            let released = self.reservations().release(attempt.held.iter(), attempt.lease);
            match &outcome {
                Ok(txid) => {
                    attempt.advance(SettlementStage::Done);
                    tracing::info!(%txid, released, "settlement complete");
                }
                Err(e) => {
                    let failed_at = attempt.stage;
                    attempt.advance(SettlementStage::Failed);
                    tracing::warn!(%failed_at, error = %e, released, "settlement failed");
                }
            }

            Ok(match outcome {
                Ok(txid) => SendResponse {
                    result: true,
                    message: format!("success ADDR:{} TxID:{}", params.addr, txid),
                },
                Err(e) => SendResponse {
                    result: false,
                    message: format!("fail ADDR:{} offer:{} err:{}", params.addr, params.id, e),
                },
            })
        }
        .instrument(span)
        .await
    }

    /// Classify the destination, then take the quotation holding the offer.
    async fn resolve(&self, params: &SendParams) -> Result<(AddressKind, SettlementTerms)> {
        let kind = self.registry.classify_address(&params.addr).await?;
        let (quotation, offer_asset) = self
            .quotations
            .take_by_offer_id(&params.id)
            .ok_or_else(|| ExchangeError::OfferNotFound(params.id.clone()))?;
        let offer = quotation
            .offers
            .get(&offer_asset)
            .cloned()
            .ok_or_else(|| ExchangeError::OfferNotFound(params.id.clone()))?;

        Ok((
            kind,
            SettlementTerms {
                destination: params.addr.clone(),
                send_asset: quotation.request_asset,
                send_amount: quotation.request_amount,
                offer_asset,
                offer,
            },
        ))
    }

    async fn settle_plain(&self, terms: &SettlementTerms, attempt: &mut SettlementAttempt) -> Result<String> {
        attempt.advance(SettlementStage::BindingQuote);
        let binding = self
            .exchanger
            .offer(&ExchangeOfferRequest::new(
                &terms.send_asset,
                terms.send_amount,
                &terms.offer_asset,
            ))
            .await?;
        check_drift(&terms.offer, binding.cost, binding.fee)?;
        tracing::debug!(binding_offer = %ids::generate_id(binding.transaction.as_bytes()), "binding offer received");

        attempt.advance(SettlementStage::Funding);
        let required = funding_target(binding.cost, binding.fee)?;
        let funding = self
            .selector
            .select_funding(&terms.offer_asset, required, false, attempt.lease)
            .await?;
        attempt.hold(&funding);

        let offer_asset_id = self.registry.asset_id(&terms.offer_asset)?;
        let change = total_amount(&funding) - required;
        let mut directives: Vec<TxDirective> = funding.iter().map(TxDirective::input).collect();
        if change > 0 {
            directives.push(TxDirective::out_addr(
                change,
                self.registry.new_address(false).await?,
                offer_asset_id.clone(),
            ));
        }
        directives.push(TxDirective::out_addr(
            terms.send_amount,
            terms.destination.clone(),
            self.registry.asset_id(&terms.send_asset)?,
        ));
        directives.push(TxDirective::out_fee(binding.fee, offer_asset_id));
        let template = self
            .builder
            .build(TemplateBase::Extend(binding.transaction), &directives)
            .await?;

        self.sign_and_submit(&template, attempt).await
    }

    async fn settle_blinded(&self, terms: &SettlementTerms, attempt: &mut SettlementAttempt) -> Result<String> {
        attempt.advance(SettlementStage::Funding);
        let required = funding_target(terms.offer.cost, terms.offer.fee)?;
        let funding = self
            .selector
            .select_funding(&terms.offer_asset, required, true, attempt.lease)
            .await?;
        attempt.hold(&funding);
        let loopback = self
            .selector
            .select_minimal(&terms.send_asset, true, attempt.lease)
            .await?;
        attempt.hold(std::slice::from_ref(&loopback));

        let mut commitments = commitments_of(&funding);
        commitments.push(loopback.asset_commitment.clone());

        attempt.advance(SettlementStage::BindingQuote);
        let binding = self
            .exchanger
            .offer_blinded(&ExchangeOfferWBRequest {
                request: ExchangeRateRequest::new(&terms.send_asset, terms.send_amount, &terms.offer_asset)
                    .request,
                offer: terms.offer_asset.clone(),
                commitments: commitments.clone(),
            })
            .await?;
        check_drift(&terms.offer, binding.cost, binding.fee)?;

        let send_asset_id = self.registry.asset_id(&terms.send_asset)?;
        let change = total_amount(&funding) - required;
        let mut directives: Vec<TxDirective> = funding.iter().map(TxDirective::input).collect();
        directives.push(TxDirective::input(&loopback));
        if change > 0 {
            directives.push(TxDirective::out_addr(
                change,
                self.registry.new_address(true).await?,
                self.registry.asset_id(&terms.offer_asset)?,
            ));
        }
        if loopback.amount > 0 {
            directives.push(TxDirective::out_addr(
                loopback.amount,
                self.registry.new_address(true).await?,
                send_asset_id.clone(),
            ));
        }
        directives.push(TxDirective::out_addr(
            terms.send_amount,
            terms.destination.clone(),
            send_asset_id,
        ));
        let template = self
            .builder
            .build(TemplateBase::Extend(binding.transaction), &directives)
            .await?;

        attempt.advance(SettlementStage::RemoteBlind);
        let mut merged = binding.commitments;
        merged.extend(commitments);
        let blinded = self
            .registry
            .ledger()
            .blind_raw_transaction(&template, &merged)
            .await?;

        self.sign_and_submit(&blinded, attempt).await
    }

    async fn sign_and_submit(&self, template: &str, attempt: &mut SettlementAttempt) -> Result<String> {
        attempt.advance(SettlementStage::Sign);
        self.reservations().confirm(&attempt.held, attempt.lease)?;
        let signed = self.registry.ledger().sign_raw_transaction(template).await?;

        attempt.advance(SettlementStage::Submit);
        let res = self
            .exchanger
            .submit(&SubmitExchangeRequest {
                transaction: signed.hex,
            })
            .await?;
        Ok(res.txid)
    }

    /// Sweep expired reservations and prune stale quotations every `interval`.
    pub fn spawn_maintenance(&self, interval: Duration) -> JoinHandle<()> {
        let reservations = Arc::clone(self.reservations());
        let quotations = Arc::clone(&self.quotations);
        spawn_periodic("trader-maintenance", interval, move || {
            let evicted = reservations.sweep();
            let pruned = quotations.prune_expired();
            if evicted > 0 || pruned > 0 {
                tracing::debug!(evicted, pruned, "maintenance pass");
            }
        })
    }
}

/// What the trader must fund for an offer: its cost plus its fee. Both come
/// from the exchanger.
fn funding_target(cost: Amount, fee: Amount) -> Result<Amount> {
    if cost < 0 || fee < 0 {
        return Err(ExchangeError::Remote(format!(
            "negative offer amounts: cost {} fee {}",
            cost, fee
        )));
    }
    cost.checked_add(fee).ok_or_else(|| {
        ExchangeError::Remote(format!("offer amounts out of range: cost {} fee {}", cost, fee))
    })
}

fn check_drift(quoted: &Offer, cost: Amount, fee: Amount) -> Result<()> {
    if quoted.cost != cost || quoted.fee != fee {
        return Err(ExchangeError::QuoteDrifted {
            old_cost: quoted.cost,
            old_fee: quoted.fee,
            new_cost: cost,
            new_fee: fee,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(cost: Amount, fee: Amount) -> Offer {
        Offer {
            fee,
            cost,
            id: "o".to_string(),
            transaction: String::new(),
        }
    }

    #[test]
    fn test_check_drift() {
        assert!(check_drift(&offer(2000, 15), 2000, 15).is_ok());
        assert!(matches!(
            check_drift(&offer(2000, 15), 2001, 15),
            Err(ExchangeError::QuoteDrifted { new_cost: 2001, .. })
        ));
        assert!(check_drift(&offer(2000, 15), 2000, 16).is_err());
    }

    #[test]
    fn test_funding_target_rejects_out_of_range_offers() {
        assert_eq!(funding_target(2000, 15).unwrap(), 2015);
        assert!(matches!(
            funding_target(Amount::MAX, 1),
            Err(ExchangeError::Remote(m)) if m.contains("out of range")
        ));
        assert!(funding_target(-5, 15).is_err());
        assert!(funding_target(2000, -1).is_err());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(SettlementStage::RemoteBlind.to_string(), "remote_blind");
        assert_eq!(SettlementStage::Done.as_str(), "done");
    }
}
