use serde::{Deserialize, Serialize};

pub mod announce;
pub mod answer;

pub use announce::*;
pub use answer::*;

use crate::ProtocolError;

/// Message sent by peer to relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutMessage {
    AnnounceRequest(AnnounceRequest),
    AnswerMessage(AnswerMessage),
}

impl OutMessage {
    #[inline]
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(::serde_json::to_string(self)?)
    }

    /// Decode a message as a relay would
    #[inline]
    pub fn from_bytes(bytes: &mut [u8]) -> Result<Self, ProtocolError> {
        Ok(::simd_json::serde::from_slice(bytes)?)
    }
}
