use std::fmt;

use serde::{de::Visitor, Deserialize, Deserializer, Serialize, Serializer};

/// Peer identity
///
/// Sent as a "binary string": one char per byte, each with a code point in
/// the range 0-255. The byte length is preserved exactly.
#[derive(Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(
    #[serde(
        deserialize_with = "deserialize_byte_string",
        serialize_with = "serialize_byte_string"
    )]
    pub Vec<u8>,
);

impl PeerId {
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|byte| format!("{:02x}", byte)).collect()
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.to_hex())
    }
}

/// Rendezvous namespace, called "info_hash" on the wire
///
/// Trackers treat it as an info hash, but any string works as long as both
/// peers agree on it.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Room(pub String);

impl From<&str> for Room {
    fn from(room: &str) -> Self {
        Self(room.into())
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one offer among those its author has outstanding
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfferId(pub String);

impl From<&str> for OfferId {
    fn from(offer_id: &str) -> Self {
        Self(offer_id.into())
    }
}

impl fmt::Display for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque session description (offer or answer)
///
/// In practice the `{ "type": ..., "sdp": ... }` object created by
/// https://developer.mozilla.org/en-US/docs/Web/API/RTCPeerConnection/createOffer
/// and passed around by https://www.npmjs.com/package/simple-peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionDescription(pub ::serde_json::Value);

impl SessionDescription {
    pub fn from_sdp(kind: &str, sdp: &str) -> Self {
        Self(::serde_json::json!({ "type": kind, "sdp": sdp }))
    }

    /// The "sdp" member, if the description has the usual shape
    pub fn sdp(&self) -> Option<&str> {
        self.0.get("sdp").and_then(|sdp| sdp.as_str())
    }
}

/// Serializes to and deserializes from "announce"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnounceAction {
    Announce,
}

/// Announce event. The empty event is expressed by leaving the field out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnounceEvent {
    Started,
    Stopped,
    Completed,
}

fn serialize_byte_string<S>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let text: String = data.iter().map(|byte| char::from(*byte)).collect();

    serializer.serialize_str(&text)
}

struct ByteStringVisitor;

impl<'de> Visitor<'de> for ByteStringVisitor {
    type Value = Vec<u8>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("string of chars in single byte range")
    }

    #[inline]
    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: ::serde::de::Error,
    {
        // Value is encoded in nodejs reference client something as follows:
        // ```
        // Buffer.from(bytes).toString('binary');
        // ```
        // which gives one UTF-16 char per byte, each with only the low byte
        // set. JSON decoding yields the same chars, so casting each one to u8
        // recovers the bytes.
        value
            .chars()
            .map(|c| {
                if c as u32 > 255 {
                    Err(E::custom(format!(
                        "character not in single byte range: {:#?}",
                        c
                    )))
                } else {
                    Ok(c as u8)
                }
            })
            .collect()
    }
}

#[inline]
fn deserialize_byte_string<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_str(ByteStringVisitor)
}
