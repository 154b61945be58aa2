use wtrendezvous_protocol::common::{OfferId, PeerId, Room, SessionDescription};
use wtrendezvous_protocol::incoming::RelayMessage;

use crate::identity::Scope;
use crate::outstanding::OutstandingOffers;

/// Relay statistics carried by a plain announce response. Advisory only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub interval: Option<u64>,
    pub complete: Option<u64>,
    pub incomplete: Option<u64>,
}

/// Classified inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Broadcast announce response
    StatsAck(RelayStats),
    /// Other peer wants to connect to us
    IncomingOffer {
        from: PeerId,
        offer_id: OfferId,
        offer: SessionDescription,
    },
    /// Answer to one of our outstanding offers
    IncomingAnswer {
        /// Relays usually fill this in, but the answer is matched by offer id
        from: Option<PeerId>,
        offer_id: OfferId,
        answer: SessionDescription,
    },
    /// Not for us. Discard.
    Unroutable(CorrelationError),
}

/// Reason a message was not routed to any handler
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorrelationError {
    #[error("message is for room {0}")]
    ForeignRoom(Room),
    #[error("message is addressed to peer {}", .0.to_hex())]
    ForeignPeer(PeerId),
    #[error("message is our own")]
    OwnMessage,
    #[error("message carries both offer and answer")]
    Ambiguous,
    #[error("message carries offer or answer without offer id")]
    MissingOfferId,
    #[error("offer carries no peer id to answer to")]
    MissingPeerId,
    #[error("answer for unknown or expired offer {0}")]
    UnknownOffer(OfferId),
}

/// Classify message from relay
///
/// Rules are checked in order:
/// 1. room must be ours
/// 2. if addressed, it must be addressed to us
/// 3. it must not be authored by us
/// 4. answers must reference an outstanding offer
/// 5. offers must say who to answer and which offer is answered
///
/// Anything else in our room is a statistics ack. Never mutates `outstanding`.
pub fn dispatch(message: RelayMessage, scope: &Scope, outstanding: &OutstandingOffers) -> Event {
    if message.info_hash != scope.room {
        return Event::Unroutable(CorrelationError::ForeignRoom(message.info_hash));
    }

    if let Some(to_peer_id) = message.to_peer_id {
        if to_peer_id != scope.peer_id {
            return Event::Unroutable(CorrelationError::ForeignPeer(to_peer_id));
        }
    }

    if message.peer_id.as_ref() == Some(&scope.peer_id) {
        return Event::Unroutable(CorrelationError::OwnMessage);
    }

    match (message.answer, message.offer) {
        (Some(_), Some(_)) => Event::Unroutable(CorrelationError::Ambiguous),
        (Some(answer), None) => match message.offer_id {
            Some(offer_id) if outstanding.contains(&offer_id) => Event::IncomingAnswer {
                from: message.peer_id,
                offer_id,
                answer,
            },
            Some(offer_id) => Event::Unroutable(CorrelationError::UnknownOffer(offer_id)),
            None => Event::Unroutable(CorrelationError::MissingOfferId),
        },
        (None, Some(offer)) => match (message.offer_id, message.peer_id) {
            (Some(offer_id), Some(from)) => Event::IncomingOffer {
                from,
                offer_id,
                offer,
            },
            (None, _) => Event::Unroutable(CorrelationError::MissingOfferId),
            (Some(_), None) => Event::Unroutable(CorrelationError::MissingPeerId),
        },
        (None, None) => Event::StatsAck(RelayStats {
            interval: message.interval,
            complete: message.complete,
            incomplete: message.incomplete,
        }),
    }
}
