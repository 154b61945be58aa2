use serde::{Deserialize, Serialize};

use crate::common::*;
use crate::ProtocolError;

/// Message received by peer from relay
///
/// One shape covers everything a relay sends in response to announces:
/// - Plain announce response (statistics): only `interval`, `complete` and
///   `incomplete` are set
/// - Offer from other peer: `peer_id`, `offer` and `offer_id` are set
/// - Answer to one of our offers: `peer_id`, `answer` and `offer_id` are
///   set. Some relays leave `to_peer_id` in place, most strip it.
///
/// Fields not carried by a message are absent, never null or zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    /// Always "announce"
    pub action: AnnounceAction,
    pub info_hash: Room,
    /// Seconds until relay expects next announce. Advisory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incomplete: Option<u64>,
    /// Peer that authored the message, if it originates from another peer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<PeerId>,
    /// Set when message is privately addressed to one peer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_peer_id: Option<PeerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_id: Option<OfferId>,
    #[serde(
        default,
        rename = "warning message",
        skip_serializing_if = "Option::is_none"
    )]
    pub warning_message: Option<String>,
}

impl RelayMessage {
    /// Plain announce response for a room
    pub fn stats(info_hash: Room) -> Self {
        Self {
            action: AnnounceAction::Announce,
            info_hash,
            interval: None,
            complete: None,
            incomplete: None,
            peer_id: None,
            to_peer_id: None,
            answer: None,
            offer: None,
            offer_id: None,
            warning_message: None,
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(::serde_json::to_string(self)?)
    }

    /// Decode message from relay. Buffer contents are clobbered.
    ///
    /// Error responses ("failure reason" set) are returned as
    /// `ProtocolError::Rejected` rather than decoded as statistics.
    pub fn from_bytes(bytes: &mut [u8]) -> Result<Self, ProtocolError> {
        let raw: RawRelayMessage = ::simd_json::serde::from_slice(bytes)?;

        raw.try_into()
    }
}

/// Everything optional, so that error responses and messages missing
/// required fields can be told apart after a single parse
#[derive(Deserialize)]
struct RawRelayMessage {
    #[serde(rename = "failure reason")]
    failure_reason: Option<String>,
    #[serde(rename = "warning message")]
    warning_message: Option<String>,
    action: Option<AnnounceAction>,
    info_hash: Option<Room>,
    interval: Option<u64>,
    complete: Option<u64>,
    incomplete: Option<u64>,
    peer_id: Option<PeerId>,
    to_peer_id: Option<PeerId>,
    answer: Option<SessionDescription>,
    offer: Option<SessionDescription>,
    offer_id: Option<OfferId>,
}

impl TryFrom<RawRelayMessage> for RelayMessage {
    type Error = ProtocolError;

    fn try_from(raw: RawRelayMessage) -> Result<Self, Self::Error> {
        if let Some(reason) = raw.failure_reason {
            return Err(ProtocolError::Rejected(reason));
        }

        Ok(Self {
            action: raw.action.ok_or(ProtocolError::MissingField("action"))?,
            info_hash: raw
                .info_hash
                .ok_or(ProtocolError::MissingField("info_hash"))?,
            interval: raw.interval,
            complete: raw.complete,
            incomplete: raw.incomplete,
            peer_id: raw.peer_id,
            to_peer_id: raw.to_peer_id,
            answer: raw.answer,
            offer: raw.offer,
            offer_id: raw.offer_id,
            warning_message: raw.warning_message,
        })
    }
}
