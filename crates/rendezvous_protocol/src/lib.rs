//! WebTorrent tracker signaling protocol, as spoken by peers
//!
//! Typical rendezvous workflow:
//! - Peer A (initiator) sends announce request with room ("info_hash") and
//!   offers
//! - Relay sends back announce response to peer A and sends the offers on to
//!   other peers that announced the same room
//! - Peer B (responder) sends an answer addressed to peer A, copying the
//!   offer id of the offer it answers
//! - Relay passes the answer on to peer A, which matches it to its
//!   outstanding offer by offer id

pub mod common;
pub mod incoming;
pub mod outgoing;

/// Malformed or unusable message
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed json: {0}")]
    Json(#[from] ::simd_json::Error),
    #[error("couldn't encode json: {0}")]
    Encode(#[from] ::serde_json::Error),
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("relay rejected request: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use quickcheck::Arbitrary;
    use quickcheck_macros::quickcheck;

    use crate::{
        common::*,
        incoming::RelayMessage,
        outgoing::{AnnounceRequest, AnnounceRequestOffer, AnswerMessage, OutMessage},
        ProtocolError,
    };

    fn rtc_offer(g: &mut quickcheck::Gen) -> SessionDescription {
        SessionDescription::from_sdp("offer", &String::arbitrary(g))
    }

    fn rtc_answer() -> SessionDescription {
        SessionDescription::from_sdp("answer", "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\n")
    }

    fn arbitrary_peer_id(g: &mut quickcheck::Gen) -> PeerId {
        PeerId((0..20).map(|_| u8::arbitrary(g)).collect())
    }

    impl Arbitrary for Room {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            Self(Arbitrary::arbitrary(g))
        }
    }

    impl Arbitrary for OfferId {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            Self(Arbitrary::arbitrary(g))
        }
    }

    impl Arbitrary for AnnounceEvent {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            match (bool::arbitrary(g), bool::arbitrary(g)) {
                (false, false) => Self::Started,
                (true, false) => Self::Started,
                (false, true) => Self::Completed,
                (true, true) => Self::Stopped,
            }
        }
    }

    impl Arbitrary for AnnounceRequestOffer {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            Self {
                offer_id: Arbitrary::arbitrary(g),
                offer: rtc_offer(g),
            }
        }
    }

    impl Arbitrary for AnnounceRequest {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            let offers: Vec<AnnounceRequestOffer> = Arbitrary::arbitrary(g);

            Self {
                numwant: offers.len(),
                uploaded: Arbitrary::arbitrary(g),
                downloaded: Arbitrary::arbitrary(g),
                left: Arbitrary::arbitrary(g),
                event: Arbitrary::arbitrary(g),
                action: AnnounceAction::Announce,
                info_hash: Arbitrary::arbitrary(g),
                peer_id: arbitrary_peer_id(g),
                offers,
            }
        }
    }

    impl Arbitrary for AnswerMessage {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            Self {
                action: AnnounceAction::Announce,
                info_hash: Arbitrary::arbitrary(g),
                peer_id: arbitrary_peer_id(g),
                to_peer_id: arbitrary_peer_id(g),
                answer: rtc_answer(),
                offer_id: Arbitrary::arbitrary(g),
            }
        }
    }

    impl Arbitrary for OutMessage {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            if Arbitrary::arbitrary(g) {
                Self::AnnounceRequest(Arbitrary::arbitrary(g))
            } else {
                Self::AnswerMessage(Arbitrary::arbitrary(g))
            }
        }
    }

    #[quickcheck]
    fn quickcheck_serde_identity_out_message(out_message_1: OutMessage) -> bool {
        let json = out_message_1.to_json().unwrap();
        let mut bytes = json.clone().into_bytes();

        let out_message_2 = OutMessage::from_bytes(&mut bytes).unwrap();

        let success = out_message_1 == out_message_2;

        if !success {
            dbg!(out_message_1);
            dbg!(out_message_2);
            println!("{}", json);
        }

        success
    }

    #[test]
    fn test_deserialize_minimal_relay_message() {
        let mut input = br#"{"action":"announce","info_hash":"R"}"#.to_vec();

        let observed = RelayMessage::from_bytes(&mut input).unwrap();

        assert_eq!(observed, RelayMessage::stats(Room::from("R")));
    }

    #[test]
    fn test_deserialize_relay_answer() {
        let mut input = r#"{
            "action": "announce",
            "info_hash": "chompnet",
            "peer_id": "bbbbbbbbbbbbbbbbbbbb",
            "answer": { "type": "answer", "sdp": "v=0" },
            "offer_id": "A1"
        }"#
        .as_bytes()
        .to_vec();

        let observed = RelayMessage::from_bytes(&mut input).unwrap();

        let expected = RelayMessage {
            peer_id: Some(PeerId(b"bbbbbbbbbbbbbbbbbbbb".to_vec())),
            answer: Some(SessionDescription::from_sdp("answer", "v=0")),
            offer_id: Some(OfferId::from("A1")),
            ..RelayMessage::stats(Room::from("chompnet"))
        };

        assert_eq!(observed, expected);
    }

    #[test]
    fn test_relay_message_zero_is_not_absent() {
        let mut input =
            br#"{"action":"announce","info_hash":"R","interval":0,"complete":3}"#.to_vec();

        let observed = RelayMessage::from_bytes(&mut input).unwrap();

        assert_eq!(observed.interval, Some(0));
        assert_eq!(observed.complete, Some(3));
        assert_eq!(observed.incomplete, None);
    }

    #[test]
    fn test_serialize_omits_unset_fields() {
        let message = RelayMessage {
            interval: Some(120),
            ..RelayMessage::stats(Room::from("R"))
        };

        assert_eq!(
            message.to_json().unwrap(),
            r#"{"action":"announce","info_hash":"R","interval":120}"#
        );

        let request = OutMessage::AnnounceRequest(AnnounceRequest {
            numwant: 50,
            uploaded: 0,
            downloaded: 0,
            left: 1,
            event: None,
            action: AnnounceAction::Announce,
            info_hash: Room::from("R"),
            peer_id: PeerId(b"ab".to_vec()),
            offers: Vec::new(),
        });

        assert_eq!(
            request.to_json().unwrap(),
            r#"{"numwant":50,"uploaded":0,"downloaded":0,"left":1,"action":"announce","info_hash":"R","peer_id":"ab","offers":[]}"#
        );
    }

    #[test]
    fn test_answer_message_shape() {
        let message = OutMessage::AnswerMessage(AnswerMessage {
            action: AnnounceAction::Announce,
            info_hash: Room::from("R"),
            peer_id: PeerId(b"yy".to_vec()),
            to_peer_id: PeerId(b"xx".to_vec()),
            answer: SessionDescription::from_sdp("answer", "Q1"),
            offer_id: OfferId::from("A1"),
        });

        let mut bytes = message.to_json().unwrap().into_bytes();

        // Relay forwarding an answer unchanged must decode on the other side
        let relayed = RelayMessage::from_bytes(&mut bytes).unwrap();

        assert_eq!(relayed.to_peer_id, Some(PeerId(b"xx".to_vec())));
        assert_eq!(relayed.peer_id, Some(PeerId(b"yy".to_vec())));
        assert_eq!(relayed.offer_id, Some(OfferId::from("A1")));
        assert_eq!(relayed.answer.as_ref().and_then(|a| a.sdp()), Some("Q1"));
        assert_eq!(relayed.offer, None);
    }

    #[test]
    fn test_deserialize_rejection() {
        let mut input =
            br#"{"failure reason":"Info hash not allowed","action":"announce"}"#.to_vec();

        match RelayMessage::from_bytes(&mut input) {
            Err(ProtocolError::Rejected(reason)) => assert_eq!(reason, "Info hash not allowed"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_deserialize_invalid() {
        let mut missing_room = br#"{"action":"announce"}"#.to_vec();
        let mut wrong_action = br#"{"action":"scrape","info_hash":"R"}"#.to_vec();
        let mut not_json = b"{\"action\":".to_vec();

        assert!(matches!(
            RelayMessage::from_bytes(&mut missing_room),
            Err(ProtocolError::MissingField("info_hash"))
        ));
        assert!(matches!(
            RelayMessage::from_bytes(&mut wrong_action),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            RelayMessage::from_bytes(&mut not_json),
            Err(ProtocolError::Json(_))
        ));
    }
}
