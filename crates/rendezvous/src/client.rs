use std::time::{Duration, Instant};

use hashbrown::HashSet;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use wtrendezvous_common::ValidUntil;
use wtrendezvous_protocol::common::{
    AnnounceAction, AnnounceEvent, OfferId, PeerId, Room, SessionDescription,
};
use wtrendezvous_protocol::incoming::RelayMessage;
use wtrendezvous_protocol::outgoing::{
    AnnounceRequest, AnnounceRequestOffer, AnswerMessage, OutMessage,
};

use crate::dispatch::{dispatch, CorrelationError, Event};
use crate::error::Error;
use crate::identity::{generate_offer_id, Scope};
use crate::link::RelayLink;
use crate::machine::Role;
use crate::outstanding::{OutstandingOffers, PendingOffer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSettings {
    pub role: Role,
    pub numwant: usize,
    /// How long an announced offer stays in the outstanding table
    pub offer_validity: Duration,
}

/// Rendezvous engine shared by both roles
///
/// Owns the local identity and room, the outstanding offers table and the
/// link to the relay.
pub struct RendezvousClient<L> {
    link: L,
    scope: Scope,
    settings: ClientSettings,
    outstanding: OutstandingOffers,
    rng: SmallRng,
}

impl<L: RelayLink> RendezvousClient<L> {
    pub fn new(link: L, scope: Scope, settings: ClientSettings) -> Self {
        Self {
            link,
            scope,
            settings,
            outstanding: OutstandingOffers::default(),
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.scope.peer_id
    }

    pub fn room(&self) -> &Room {
        &self.scope.room
    }

    pub fn role(&self) -> Role {
        self.settings.role
    }

    pub fn outstanding(&self) -> &OutstandingOffers {
        &self.outstanding
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Offer id not currently outstanding
    pub fn new_offer_id(&mut self) -> OfferId {
        loop {
            let offer_id = generate_offer_id(&mut self.rng);

            if !self.outstanding.contains(&offer_id) {
                return offer_id;
            }
        }
    }

    /// Send announce, then register its offers as outstanding
    ///
    /// Nothing is registered if sending fails.
    pub async fn announce(
        &mut self,
        offers: Vec<AnnounceRequestOffer>,
        event: Option<AnnounceEvent>,
    ) -> Result<(), Error> {
        let mut offer_ids: HashSet<OfferId> = HashSet::with_capacity(offers.len());

        for offer in offers.iter() {
            if self.outstanding.contains(&offer.offer_id)
                || !offer_ids.insert(offer.offer_id.clone())
            {
                return Err(Error::DuplicateOffer(offer.offer_id.clone()));
            }
        }

        let pending: Vec<(OfferId, SessionDescription)> = offers
            .iter()
            .map(|offer| (offer.offer_id.clone(), offer.offer.clone()))
            .collect();

        let counters = self.settings.role.announce_counters();

        let request = AnnounceRequest {
            numwant: self.settings.numwant,
            uploaded: counters.uploaded,
            downloaded: counters.downloaded,
            left: counters.left,
            event,
            action: AnnounceAction::Announce,
            info_hash: self.scope.room.clone(),
            peer_id: self.scope.peer_id.clone(),
            offers,
        };

        self.link
            .send(OutMessage::AnnounceRequest(request))
            .await?;

        let valid_until = ValidUntil::new(Instant::now(), self.settings.offer_validity);

        for (offer_id, description) in pending {
            self.outstanding.insert(
                offer_id,
                PendingOffer {
                    description,
                    valid_until,
                },
            );
        }

        ::log::debug!(
            "announced in room {} with {} outstanding offers",
            self.scope.room,
            self.outstanding.len()
        );

        Ok(())
    }

    /// Wait for next message from relay
    pub async fn receive(&mut self) -> Result<RelayMessage, Error> {
        let message = self.link.recv().await?;

        if let Some(warning) = message.warning_message.as_ref() {
            ::log::warn!("relay warning for room {}: {}", message.info_hash, warning);
        }

        Ok(message)
    }

    /// Classify message. Never changes client state.
    pub fn dispatch(&self, message: RelayMessage) -> Event {
        dispatch(message, &self.scope, &self.outstanding)
    }

    /// Remove answered offer from the outstanding table
    ///
    /// Fails for offers not outstanding, such as when an answer is replayed.
    pub fn apply_answer(&mut self, offer_id: &OfferId) -> Result<PendingOffer, Error> {
        let offer = self
            .outstanding
            .take(offer_id)
            .ok_or_else(|| CorrelationError::UnknownOffer(offer_id.clone()))?;

        self.link.forget_offer(offer_id);

        Ok(offer)
    }

    pub async fn send_answer(
        &mut self,
        to_peer_id: PeerId,
        offer_id: OfferId,
        answer: SessionDescription,
    ) -> Result<(), Error> {
        let message = AnswerMessage {
            action: AnnounceAction::Announce,
            info_hash: self.scope.room.clone(),
            peer_id: self.scope.peer_id.clone(),
            to_peer_id,
            answer,
            offer_id,
        };

        self.link.send(OutMessage::AnswerMessage(message)).await
    }

    pub fn expire_offers(&mut self, now: Instant) -> Vec<OfferId> {
        let expired = self.outstanding.expire(now);

        for offer_id in expired.iter() {
            self.link.forget_offer(offer_id);
        }

        expired
    }

    /// Drop all outstanding offers, such as when a round is aborted
    pub fn release_offers(&mut self) -> Vec<OfferId> {
        let released = self.outstanding.clear();

        for offer_id in released.iter() {
            self.link.forget_offer(offer_id);
        }

        released
    }
}
