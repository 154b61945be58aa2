use std::fmt;

use serde::{Deserialize, Serialize};
use wtrendezvous_protocol::common::{OfferId, PeerId, SessionDescription};

use crate::dispatch::{Event, RelayStats};

/// Which side of the handshake this peer plays
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Publishes offers and waits for an answer
    #[default]
    Initiator,
    /// Waits for an offer and answers it
    Responder,
}

/// Transfer counters sent with every announce
///
/// Only carried for relay compatibility. Relays count peers with
/// `left == 0` as seeders, so responders announce as seeders and initiators
/// as leechers, which is what makes relays forward offers to responders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnounceCounters {
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
}

impl Role {
    pub fn announce_counters(self) -> AnnounceCounters {
        match self {
            Self::Initiator => AnnounceCounters {
                uploaded: 0,
                downloaded: 0,
                left: 1,
            },
            Self::Responder => AnnounceCounters {
                uploaded: 0,
                downloaded: 1,
                left: 0,
            },
        }
    }
}

/// Phase a round can fail in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Announce,
    AwaitAck,
    AwaitAnswer,
    AwaitOffer,
    Answer,
    ApplyAnswer,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Announce => "announce",
            Self::AwaitAck => "await-ack",
            Self::AwaitAnswer => "await-answer",
            Self::AwaitOffer => "await-offer",
            Self::Answer => "answer",
            Self::ApplyAnswer => "apply-answer",
        };

        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Announcing,
    AwaitingAck,
    /// Initiator only
    AwaitingAnswer,
    /// Responder only
    AwaitingOffer,
    /// Initiator only
    Matched,
    /// Responder only
    Answering,
    Done,
    Failed(Phase),
}

/// What the round should do about an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    /// Message dropped, state unchanged
    Ignore,
    /// Relay acknowledged our announce
    Acknowledged(RelayStats),
    /// Answer correlated with one of our offers. Take it out of the
    /// outstanding table and hand it to the negotiator.
    ApplyAnswer {
        from: Option<PeerId>,
        offer_id: OfferId,
        answer: SessionDescription,
    },
    /// Offer to answer. Create an answer and send it to `from`.
    AnswerOffer {
        from: PeerId,
        offer_id: OfferId,
        offer: SessionDescription,
    },
}

/// Protocol state machine for one round, parameterized by role
///
/// Initiator: Idle -> Announcing -> AwaitingAck -> AwaitingAnswer -> Matched -> Done
///
/// Responder: Idle -> Announcing -> AwaitingAck -> AwaitingOffer -> Answering -> Done
///
/// Any non-terminal state can move to Failed. The machine does no I/O.
#[derive(Debug, Clone)]
pub struct Machine {
    role: Role,
    state: State,
}

impl Machine {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: State::Idle,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn begin_announce(&mut self) {
        if self.state == State::Idle {
            self.transition(State::Announcing);
        }
    }

    /// Announce was sent
    pub fn announced(&mut self) {
        if self.state == State::Announcing {
            self.transition(State::AwaitingAck);
        }
    }

    pub fn on_event(&mut self, event: Event) -> Reaction {
        match (self.role, self.state, event) {
            (_, _, Event::Unroutable(err)) => {
                ::log::debug!("dropping message: {}", err);

                Reaction::Ignore
            }
            (Role::Initiator, State::AwaitingAck, Event::StatsAck(stats)) => {
                self.transition(State::AwaitingAnswer);

                Reaction::Acknowledged(stats)
            }
            (Role::Responder, State::AwaitingAck, Event::StatsAck(stats)) => {
                self.transition(State::AwaitingOffer);

                Reaction::Acknowledged(stats)
            }
            // The ack and the counterpart's reply may arrive in either order
            (
                Role::Initiator,
                State::AwaitingAck | State::AwaitingAnswer,
                Event::IncomingAnswer {
                    from,
                    offer_id,
                    answer,
                },
            ) => {
                self.transition(State::Matched);

                Reaction::ApplyAnswer {
                    from,
                    offer_id,
                    answer,
                }
            }
            (
                Role::Responder,
                State::AwaitingAck | State::AwaitingOffer,
                Event::IncomingOffer {
                    from,
                    offer_id,
                    offer,
                },
            ) => {
                self.transition(State::Answering);

                Reaction::AnswerOffer {
                    from,
                    offer_id,
                    offer,
                }
            }
            _ => Reaction::Ignore,
        }
    }

    /// Answer was applied or sent
    pub fn finish(&mut self) {
        if matches!(self.state, State::Matched | State::Answering) {
            self.transition(State::Done);
        }
    }

    /// Move to Failed, returning the phase that failed
    pub fn fail(&mut self) -> Phase {
        let phase = self.phase();

        self.transition(State::Failed(phase));

        phase
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Idle | State::Announcing => Phase::Announce,
            State::AwaitingAck => Phase::AwaitAck,
            State::AwaitingAnswer => Phase::AwaitAnswer,
            State::AwaitingOffer => Phase::AwaitOffer,
            State::Matched => Phase::ApplyAnswer,
            State::Answering => Phase::Answer,
            State::Done => match self.role {
                Role::Initiator => Phase::ApplyAnswer,
                Role::Responder => Phase::Answer,
            },
            State::Failed(phase) => phase,
        }
    }

    fn transition(&mut self, state: State) {
        ::log::info!("{:?} round: {:?} -> {:?}", self.role, self.state, state);

        self.state = state;
    }
}
