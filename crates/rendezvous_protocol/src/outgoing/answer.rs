use serde::{Deserialize, Serialize};

use crate::common::*;

/// Answer to an offer received from another peer
///
/// Relays parse this as an announce request carrying an answer and pass it
/// on to the peer with id `to_peer_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerMessage {
    /// Always "announce"
    pub action: AnnounceAction,
    pub info_hash: Room,
    /// Peer id of answering peer
    pub peer_id: PeerId,
    /// Peer id of peer that sent the offer
    pub to_peer_id: PeerId,
    pub answer: SessionDescription,
    /// Copied verbatim from the offer being answered
    pub offer_id: OfferId,
}
