//! Multiplexing many rounds over one relay connection
//!
//! A single reader drains the connection and routes every message to the
//! rounds it concerns. A single writer sends what rounds queue up, so sends
//! are serialized. Rounds talk to the relay through a [`MuxLink`].

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::future::Future;
use std::rc::Rc;

use async_tungstenite::tungstenite::{self, Message};
use futures::channel::mpsc;
use futures::{Sink, SinkExt, Stream, StreamExt};
use futures_lite::future::or;
use hashbrown::HashMap;
use wtrendezvous_protocol::common::{OfferId, PeerId, Room};
use wtrendezvous_protocol::incoming::RelayMessage;
use wtrendezvous_protocol::outgoing::OutMessage;

use crate::error::Error;
use crate::link::{decode_ws_message, encode_ws_message, RelayLink};
use crate::machine::Role;

type RoundId = u64;

struct RoundRoute {
    room: Room,
    role: Role,
    sender: mpsc::UnboundedSender<RelayMessage>,
    /// Responder round that hasn't been handed an offer yet
    awaiting_offer: bool,
}

#[derive(Default)]
struct Routes {
    next_round_id: RoundId,
    /// Ordered by age, oldest first
    rounds: BTreeMap<RoundId, RoundRoute>,
    offers: HashMap<OfferId, RoundId>,
    closed: bool,
}

impl Routes {
    fn route(&mut self, local_peer_id: &PeerId, message: RelayMessage) {
        if let Some(to_peer_id) = message.to_peer_id.as_ref() {
            if to_peer_id != local_peer_id {
                ::log::debug!("dropping message addressed to {:?}", to_peer_id);

                return;
            }
        }

        match (message.answer.is_some(), message.offer.is_some()) {
            (true, false) => self.route_answer(message),
            (false, true) => self.route_offer(local_peer_id, message),
            _ => self.broadcast(message),
        }
    }

    fn route_answer(&mut self, message: RelayMessage) {
        let round = message
            .offer_id
            .as_ref()
            .and_then(|offer_id| self.offers.get(offer_id))
            .and_then(|round_id| self.rounds.get(round_id));

        match round {
            Some(round) => Self::deliver(round, message),
            None => ::log::debug!(
                "dropping answer for unknown offer {:?}",
                message.offer_id
            ),
        }
    }

    /// Hand offer to the oldest responder round in the room still waiting
    /// for one
    fn route_offer(&mut self, local_peer_id: &PeerId, message: RelayMessage) {
        match message.peer_id.as_ref() {
            Some(peer_id) if peer_id == local_peer_id => {
                ::log::debug!("dropping own offer");

                return;
            }
            Some(_) if message.offer_id.is_some() => (),
            _ => {
                ::log::debug!("dropping offer without peer id or offer id");

                return;
            }
        }

        let round = self.rounds.values_mut().find(|round| {
            round.role == Role::Responder && round.awaiting_offer && round.room == message.info_hash
        });

        match round {
            Some(round) => {
                round.awaiting_offer = false;

                Self::deliver(round, message);
            }
            None => ::log::debug!(
                "dropping offer in room {}: no round waiting for one",
                message.info_hash
            ),
        }
    }

    /// Stats acks can't be told apart by round, so every round in the room
    /// takes any ack as its own. They are advisory, and a round whose own
    /// announce is lost still ends by timeout.
    fn broadcast(&mut self, message: RelayMessage) {
        let mut delivered = false;

        for round in self
            .rounds
            .values()
            .filter(|round| round.room == message.info_hash)
        {
            Self::deliver(round, message.clone());

            delivered = true;
        }

        if !delivered {
            ::log::debug!("dropping message for room {}", message.info_hash);
        }
    }

    fn deliver(round: &RoundRoute, message: RelayMessage) {
        if round.sender.unbounded_send(message).is_err() {
            ::log::debug!("round in room {} is gone", round.room);
        }
    }

    fn remove_round(&mut self, round_id: RoundId) {
        self.rounds.remove(&round_id);
        self.offers.retain(|_, owner| *owner != round_id);
    }

    /// Dropping the senders ends every link
    fn close(&mut self) {
        self.closed = true;
        self.rounds.clear();
        self.offers.clear();
    }
}

/// Handle to a multiplexed relay connection
#[derive(Clone)]
pub struct Relay {
    routes: Rc<RefCell<Routes>>,
    out_sender: mpsc::UnboundedSender<Message>,
}

impl Relay {
    /// Returns the handle and the driver future, which must be polled for
    /// anything to be sent or received
    ///
    /// The driver finishes when the connection fails or after
    /// [`Relay::close`], closing every link.
    pub fn new<Si, St>(
        local_peer_id: PeerId,
        sink: Si,
        stream: St,
    ) -> (Self, impl Future<Output = Result<(), Error>>)
    where
        Si: Sink<Message, Error = tungstenite::Error> + Unpin,
        St: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        let routes = Rc::new(RefCell::new(Routes::default()));
        let (out_sender, out_receiver) = mpsc::unbounded();

        let driver = {
            let routes = routes.clone();

            async move {
                // Writer first: after close, the orderly shutdown is the
                // result even if the connection drops at the same time
                let result = or(
                    write_loop(sink, out_receiver),
                    read_loop(&local_peer_id, &routes, stream),
                )
                .await;

                routes.borrow_mut().close();

                result
            }
        };

        (Self { routes, out_sender }, driver)
    }

    pub fn open_round(&self, room: Room, role: Role) -> MuxLink {
        let (sender, receiver) = mpsc::unbounded();

        let mut routes = self.routes.borrow_mut();

        let round_id = routes.next_round_id;

        routes.next_round_id += 1;

        // Links of a closed relay start out closed
        if !routes.closed {
            routes.rounds.insert(
                round_id,
                RoundRoute {
                    room,
                    role,
                    sender,
                    awaiting_offer: role == Role::Responder,
                },
            );
        }

        MuxLink {
            round_id,
            routes: self.routes.clone(),
            out_sender: self.out_sender.clone(),
            receiver,
        }
    }

    /// Finish queued sends, then close the connection
    pub fn close(&self) {
        self.out_sender.close_channel();
    }

    pub fn num_rounds(&self) -> usize {
        self.routes.borrow().rounds.len()
    }

    pub fn is_closed(&self) -> bool {
        self.routes.borrow().closed
    }
}

async fn read_loop<St>(
    local_peer_id: &PeerId,
    routes: &Rc<RefCell<Routes>>,
    mut stream: St,
) -> Result<(), Error>
where
    St: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(message) = stream.next().await {
        match decode_ws_message(message?) {
            Some(Ok(message)) => routes.borrow_mut().route(local_peer_id, message),
            Some(Err(Error::Protocol(err))) => {
                ::log::warn!("dropping message from relay: {:#}", err);
            }
            Some(Err(err)) => return Err(err),
            None => (),
        }
    }

    Err(Error::ConnectionClosed)
}

async fn write_loop<Si>(
    mut sink: Si,
    mut out_receiver: mpsc::UnboundedReceiver<Message>,
) -> Result<(), Error>
where
    Si: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    while let Some(message) = out_receiver.next().await {
        sink.send(message).await?;
    }

    sink.close().await?;

    Ok(())
}

/// One round's view of a multiplexed relay connection
///
/// Dropping it releases the round's routes.
pub struct MuxLink {
    round_id: RoundId,
    routes: Rc<RefCell<Routes>>,
    out_sender: mpsc::UnboundedSender<Message>,
    receiver: mpsc::UnboundedReceiver<RelayMessage>,
}

impl RelayLink for MuxLink {
    async fn send(&mut self, message: OutMessage) -> Result<(), Error> {
        let offer_ids: Vec<OfferId> = match &message {
            OutMessage::AnnounceRequest(request) => request
                .offers
                .iter()
                .map(|offer| offer.offer_id.clone())
                .collect(),
            OutMessage::AnswerMessage(_) => Vec::new(),
        };

        // Route answers before the offers go out, since the answer may
        // arrive before this future is polled again
        {
            let mut routes = self.routes.borrow_mut();

            for offer_id in offer_ids.iter() {
                routes.offers.insert(offer_id.clone(), self.round_id);
            }
        }

        let result = encode_ws_message(&message).and_then(|message| {
            self.out_sender
                .unbounded_send(message)
                .map_err(|_| Error::ConnectionClosed)
        });

        if result.is_err() {
            for offer_id in offer_ids.iter() {
                self.forget_offer(offer_id);
            }
        }

        result
    }

    async fn recv(&mut self) -> Result<RelayMessage, Error> {
        self.receiver.next().await.ok_or(Error::ConnectionClosed)
    }

    fn forget_offer(&mut self, offer_id: &OfferId) {
        let mut routes = self.routes.borrow_mut();

        if routes.offers.get(offer_id) == Some(&self.round_id) {
            routes.offers.remove(offer_id);
        }
    }
}

impl Drop for MuxLink {
    fn drop(&mut self) {
        self.routes.borrow_mut().remove_round(self.round_id);
    }
}
