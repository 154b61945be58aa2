#![allow(dead_code)]

use std::cell::RefCell;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use async_tungstenite::tungstenite::{self, Message};
use futures::channel::mpsc;
use futures::{Sink, StreamExt};
use hashbrown::{HashMap, HashSet};
use wtrendezvous::negotiation::{NegotiationError, Negotiator};
use wtrendezvous_protocol::common::{OfferId, PeerId, Room, SessionDescription};
use wtrendezvous_protocol::incoming::RelayMessage;
use wtrendezvous_protocol::outgoing::OutMessage;

pub type PeerStream = mpsc::UnboundedReceiver<Result<Message, tungstenite::Error>>;

/// Write half of an in-memory tracker connection
pub struct PeerSink {
    connection_id: usize,
    sender: mpsc::UnboundedSender<(usize, Message)>,
}

impl Sink<Message> for PeerSink {
    type Error = tungstenite::Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, message: Message) -> Result<(), Self::Error> {
        self.sender
            .unbounded_send((self.connection_id, message))
            .map_err(|_| tungstenite::Error::ConnectionClosed)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.get_mut().sender.disconnect();

        Poll::Ready(Ok(()))
    }
}

pub struct TrackerConnection {
    pub sink: PeerSink,
    pub stream: PeerStream,
    /// Push raw frames to this connection, bypassing the tracker
    pub injector: mpsc::UnboundedSender<Result<Message, tungstenite::Error>>,
}

struct TrackerPeer {
    connection_id: usize,
    room: Room,
    seeder: bool,
    /// (answering peer, offer id) pairs this peer's offers were sent as
    expecting_answers: HashSet<(PeerId, OfferId)>,
}

#[derive(Default)]
pub struct TrackerState {
    peers: HashMap<PeerId, TrackerPeer>,
    pub num_announces: usize,
    pub num_answers_forwarded: usize,
}

impl TrackerState {
    pub fn num_peers(&self) -> usize {
        self.peers.len()
    }
}

/// In-memory WebTorrent tracker. Offers go to other peers in the room,
/// answers only to the peer whose offer they answer.
pub struct MiniTracker {
    inbound_sender: mpsc::UnboundedSender<(usize, Message)>,
    inbound: mpsc::UnboundedReceiver<(usize, Message)>,
    connections: Vec<mpsc::UnboundedSender<Result<Message, tungstenite::Error>>>,
    state: Rc<RefCell<TrackerState>>,
    /// Misbehave by sending answers to every other peer in the room,
    /// leaving `to_peer_id` in place
    leak_answers: bool,
}

impl MiniTracker {
    pub fn new() -> Self {
        let (inbound_sender, inbound) = mpsc::unbounded();

        Self {
            inbound_sender,
            inbound,
            connections: Vec::new(),
            state: Default::default(),
            leak_answers: false,
        }
    }

    pub fn leaking_answers() -> Self {
        Self {
            leak_answers: true,
            ..Self::new()
        }
    }

    pub fn state(&self) -> Rc<RefCell<TrackerState>> {
        self.state.clone()
    }

    pub fn connect(&mut self) -> TrackerConnection {
        let connection_id = self.connections.len();
        let (sender, stream) = mpsc::unbounded();

        self.connections.push(sender.clone());

        TrackerConnection {
            sink: PeerSink {
                connection_id,
                sender: self.inbound_sender.clone(),
            },
            stream,
            injector: sender,
        }
    }

    /// Runs until every connection has closed its sink
    pub async fn run(self) {
        let Self {
            inbound_sender,
            mut inbound,
            connections,
            state,
            leak_answers,
        } = self;

        drop(inbound_sender);

        while let Some((connection_id, message)) = inbound.next().await {
            let mut bytes = match message {
                Message::Text(text) => text.into_bytes(),
                Message::Binary(bytes) => bytes,
                _ => continue,
            };

            let out_messages = match OutMessage::from_bytes(&mut bytes) {
                Ok(message) => {
                    state
                        .borrow_mut()
                        .handle_message(connection_id, message, leak_answers)
                }
                Err(err) => {
                    vec![(connection_id, failure(None, &format!("invalid request: {}", err)))]
                }
            };

            for (connection_id, text) in out_messages {
                if let Some(connection) = connections.get(connection_id) {
                    let _ = connection.unbounded_send(Ok(Message::Text(text)));
                }
            }
        }
    }
}

fn failure(room: Option<&Room>, reason: &str) -> String {
    let mut value = ::serde_json::json!({
        "action": "announce",
        "failure reason": reason,
    });

    if let Some(room) = room {
        value["info_hash"] = ::serde_json::Value::String(room.0.clone());
    }

    value.to_string()
}

impl TrackerState {
    fn handle_message(
        &mut self,
        connection_id: usize,
        message: OutMessage,
        leak_answers: bool,
    ) -> Vec<(usize, String)> {
        let mut out = Vec::new();

        let (room, peer_id, seeder) = match &message {
            OutMessage::AnnounceRequest(request) => (
                request.info_hash.clone(),
                request.peer_id.clone(),
                Some(request.left == 0),
            ),
            OutMessage::AnswerMessage(answer) => {
                (answer.info_hash.clone(), answer.peer_id.clone(), None)
            }
        };

        self.num_announces += 1;

        let peer = self
            .peers
            .entry(peer_id.clone())
            .or_insert_with(|| TrackerPeer {
                connection_id,
                room: room.clone(),
                seeder: false,
                expecting_answers: HashSet::new(),
            });

        peer.connection_id = connection_id;
        peer.room = room.clone();

        if let Some(seeder) = seeder {
            peer.seeder = seeder;
        }

        match message {
            OutMessage::AnnounceRequest(request) => {
                let receivers: Vec<(PeerId, usize)> = self
                    .peers
                    .iter()
                    .filter(|(other_id, other)| **other_id != peer_id && other.room == room)
                    .map(|(other_id, other)| (other_id.clone(), other.connection_id))
                    .take(request.numwant.min(request.offers.len()))
                    .collect();

                for (offer, (receiver_id, receiver_connection_id)) in
                    request.offers.into_iter().zip(receivers)
                {
                    let relayed = RelayMessage {
                        peer_id: Some(peer_id.clone()),
                        offer: Some(offer.offer),
                        offer_id: Some(offer.offer_id.clone()),
                        ..RelayMessage::stats(room.clone())
                    };

                    out.push((receiver_connection_id, to_json(&relayed)));

                    if let Some(peer) = self.peers.get_mut(&peer_id) {
                        peer.expecting_answers.insert((receiver_id, offer.offer_id));
                    }
                }
            }
            OutMessage::AnswerMessage(answer) if leak_answers => {
                let relayed = RelayMessage {
                    peer_id: Some(peer_id.clone()),
                    to_peer_id: Some(answer.to_peer_id.clone()),
                    answer: Some(answer.answer),
                    offer_id: Some(answer.offer_id),
                    ..RelayMessage::stats(room.clone())
                };

                for (other_id, other) in self.peers.iter() {
                    if *other_id != peer_id && other.room == room {
                        out.push((other.connection_id, to_json(&relayed)));
                    }
                }
            }
            OutMessage::AnswerMessage(answer) => {
                let expecting = (peer_id.clone(), answer.offer_id.clone());

                if let Some(receiver) = self.peers.get_mut(&answer.to_peer_id) {
                    if receiver.expecting_answers.remove(&expecting) {
                        // Relays strip the addressee when forwarding
                        let relayed = RelayMessage {
                            peer_id: Some(peer_id.clone()),
                            answer: Some(answer.answer),
                            offer_id: Some(answer.offer_id),
                            ..RelayMessage::stats(room.clone())
                        };

                        out.push((receiver.connection_id, to_json(&relayed)));

                        self.num_answers_forwarded += 1;
                    } else {
                        out.push((
                            connection_id,
                            failure(
                                Some(&room),
                                "Could not find the offer corresponding to your answer. It may have expired.",
                            ),
                        ));
                    }
                }
            }
        }

        let num_seeders = self
            .peers
            .values()
            .filter(|peer| peer.room == room && peer.seeder)
            .count() as u64;
        let num_peers = self.peers.values().filter(|peer| peer.room == room).count() as u64;

        out.push((
            connection_id,
            to_json(&RelayMessage {
                interval: Some(120),
                complete: Some(num_seeders),
                incomplete: Some(num_peers - num_seeders),
                ..RelayMessage::stats(room)
            }),
        ));

        out
    }
}

fn to_json(message: &RelayMessage) -> String {
    message.to_json().unwrap()
}

/// Negotiator handing out fixed descriptions and recording remote ones
#[derive(Default)]
pub struct StaticNegotiator {
    pub remote_descriptions: Vec<SessionDescription>,
}

impl Negotiator for StaticNegotiator {
    fn create_offer(&mut self) -> Result<SessionDescription, NegotiationError> {
        Ok(SessionDescription::from_sdp("offer", "P1"))
    }

    fn create_answer(
        &mut self,
        remote_offer: &SessionDescription,
    ) -> Result<SessionDescription, NegotiationError> {
        self.remote_descriptions.push(remote_offer.clone());

        Ok(SessionDescription::from_sdp("answer", "Q1"))
    }

    fn set_remote_description(
        &mut self,
        remote_answer: &SessionDescription,
    ) -> Result<(), NegotiationError> {
        self.remote_descriptions.push(remote_answer.clone());

        Ok(())
    }
}

pub fn peer_id(byte: u8) -> PeerId {
    PeerId(vec![byte; 20])
}

/// Yield to other tasks until `condition` holds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    while !condition() {
        futures_lite::future::yield_now().await;
    }
}
