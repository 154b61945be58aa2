use std::time::Instant;

use hashbrown::HashMap;
use wtrendezvous_common::ValidUntil;
use wtrendezvous_protocol::common::{OfferId, SessionDescription};

/// Offer published by us, waiting for an answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOffer {
    pub description: SessionDescription,
    pub valid_until: ValidUntil,
}

/// Outstanding offers by offer id
#[derive(Debug, Default)]
pub struct OutstandingOffers {
    offers: HashMap<OfferId, PendingOffer>,
}

impl OutstandingOffers {
    /// Returns false and leaves table unchanged if offer id is taken
    pub fn insert(&mut self, offer_id: OfferId, offer: PendingOffer) -> bool {
        match self.offers.entry(offer_id) {
            hashbrown::hash_map::Entry::Occupied(_) => false,
            hashbrown::hash_map::Entry::Vacant(entry) => {
                entry.insert(offer);

                true
            }
        }
    }

    pub fn contains(&self, offer_id: &OfferId) -> bool {
        self.offers.contains_key(offer_id)
    }

    /// Remove offer once it is answered
    pub fn take(&mut self, offer_id: &OfferId) -> Option<PendingOffer> {
        self.offers.remove(offer_id)
    }

    /// Remove offers no longer valid at `now`, returning their ids
    pub fn expire(&mut self, now: Instant) -> Vec<OfferId> {
        let mut expired = Vec::new();

        self.offers.retain(|offer_id, offer| {
            if offer.valid_until.valid(now) {
                true
            } else {
                expired.push(offer_id.clone());

                false
            }
        });

        expired
    }

    pub fn clear(&mut self) -> Vec<OfferId> {
        self.offers.drain().map(|(offer_id, _)| offer_id).collect()
    }

    pub fn len(&self) -> usize {
        self.offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }
}
