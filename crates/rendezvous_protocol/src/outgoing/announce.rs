use serde::{Deserialize, Serialize};

use crate::common::*;

/// Announce request
///
/// Announces presence in a room and optionally publishes WebRTC offers,
/// which the relay forwards to other peers in the same room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnounceRequest {
    /// Number of peers wanted
    pub numwant: usize,
    pub uploaded: u64,
    pub downloaded: u64,
    /// Bytes left. Relays use zero/non-zero to count complete/incomplete
    pub left: u64,
    /// Left out for the empty event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<AnnounceEvent>,
    /// Always "announce"
    pub action: AnnounceAction,
    pub info_hash: Room,
    pub peer_id: PeerId,
    /// Possibly empty, but always sent
    #[serde(default)]
    pub offers: Vec<AnnounceRequestOffer>,
}

/// Element of AnnounceRequest.offers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnounceRequestOffer {
    pub offer_id: OfferId,
    pub offer: SessionDescription,
}
