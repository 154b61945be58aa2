use std::time::Duration;

use async_tungstenite::tungstenite;
use wtrendezvous_protocol::common::OfferId;
use wtrendezvous_protocol::ProtocolError;

use crate::dispatch::CorrelationError;
use crate::machine::Phase;
use crate::negotiation::NegotiationError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("couldn't generate peer identity: {0}")]
    IdentityGeneration(#[source] rand::Error),
    #[error("relay connection error: {0}")]
    Connection(#[from] tungstenite::Error),
    #[error("relay connection closed")]
    ConnectionClosed,
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("couldn't correlate message: {0}")]
    Correlation(#[from] CorrelationError),
    #[error("offer id {0} is already outstanding")]
    DuplicateOffer(OfferId),
    #[error("negotiation error: {0}")]
    Negotiation(#[from] NegotiationError),
    #[error("no counterpart within {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// Connection failures are worth retrying on a new connection
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::ConnectionClosed)
    }
}

/// Aborted round, with the phase it was aborted in
#[derive(Debug, thiserror::Error)]
#[error("{phase} failed: {source}")]
pub struct RoundError {
    pub phase: Phase,
    pub source: Error,
}
