use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::{
    error::{ExchangeError, Result},
    ids,
    model::Quotation,
};

pub struct QuotationStore {
    quotations: Mutex<HashMap<String, Quotation>>,
    ttl: Duration,
}

impl QuotationStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            quotations: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Store `quotation` under an id derived from its offers and return the id.
    /// An existing quotation is never replaced.
    pub fn insert(&self, quotation: Quotation) -> Result<String> {
        let id = ids::quotation_id(quotation.offers.values().map(|o| o.id.as_str()));
        match self.quotations.lock().entry(id.clone()) {
            Entry::Occupied(_) => Err(ExchangeError::DuplicateQuotation(id)),
            Entry::Vacant(slot) => {
                slot.insert(quotation);
                Ok(id)
            }
        }
    }

    /// Find the quotation holding `offer_id`, with the asset it is offered in.
    pub fn find_by_offer_id(&self, offer_id: &str) -> Option<(String, Quotation, String)> {
        let quotations = self.quotations.lock();
        quotations.iter().find_map(|(id, quotation)| {
            offer_asset(quotation, offer_id).map(|asset| (id.clone(), quotation.clone(), asset))
        })
    }

    /// Remove and return the quotation holding `offer_id`. At most one caller
    /// gets it.
    pub fn take_by_offer_id(&self, offer_id: &str) -> Option<(Quotation, String)> {
        let mut quotations = self.quotations.lock();
        let (id, asset) = quotations
            .iter()
            .find_map(|(id, quotation)| offer_asset(quotation, offer_id).map(|asset| (id.clone(), asset)))?;
        quotations.remove(&id).map(|quotation| (quotation, asset))
    }

    /// Drop quotations older than the TTL. Returns how many were dropped.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let mut quotations = self.quotations.lock();
        let before = quotations.len();
        quotations.retain(|_, q| now.duration_since(q.created_at) < self.ttl);
        before - quotations.len()
    }

    pub fn len(&self) -> usize {
        self.quotations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn offer_asset(quotation: &Quotation, offer_id: &str) -> Option<String> {
    quotation
        .offers
        .iter()
        .find(|(_, offer)| offer.id == offer_id)
        .map(|(asset, _)| asset.clone())
}
