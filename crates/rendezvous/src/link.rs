use async_tungstenite::tungstenite::{self, Message};
use futures::{Sink, SinkExt, Stream, StreamExt};
use wtrendezvous_protocol::common::OfferId;
use wtrendezvous_protocol::incoming::RelayMessage;
use wtrendezvous_protocol::outgoing::OutMessage;

use crate::error::Error;

/// Message path between one round and the relay
#[allow(async_fn_in_trait)]
pub trait RelayLink {
    async fn send(&mut self, message: OutMessage) -> Result<(), Error>;

    /// Wait for next message meant for this link
    ///
    /// Malformed messages are returned as `Error::Protocol` and leave the
    /// link usable.
    async fn recv(&mut self) -> Result<RelayMessage, Error>;

    /// Offer no longer outstanding, so answers to it needn't be delivered
    fn forget_offer(&mut self, _offer_id: &OfferId) {}
}

pub fn encode_ws_message(message: &OutMessage) -> Result<Message, Error> {
    Ok(Message::Text(message.to_json()?))
}

/// Returns None for control frames
pub fn decode_ws_message(message: Message) -> Option<Result<RelayMessage, Error>> {
    let mut bytes = match message {
        Message::Text(text) => text.into_bytes(),
        Message::Binary(bytes) => bytes,
        Message::Close(frame) => {
            ::log::debug!("relay closed connection: {:?}", frame);

            return Some(Err(Error::ConnectionClosed));
        }
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => return None,
    };

    Some(RelayMessage::from_bytes(&mut bytes).map_err(Error::from))
}

/// Link owning a whole websocket connection
pub struct WsLink<Si, St> {
    sink: Si,
    stream: St,
}

impl<Si, St> WsLink<Si, St>
where
    Si: Sink<Message, Error = tungstenite::Error> + Unpin,
    St: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    pub fn new(sink: Si, stream: St) -> Self {
        Self { sink, stream }
    }

    pub async fn close(&mut self) -> Result<(), Error> {
        Ok(self.sink.close().await?)
    }
}

impl<Si, St> RelayLink for WsLink<Si, St>
where
    Si: Sink<Message, Error = tungstenite::Error> + Unpin,
    St: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    async fn send(&mut self, message: OutMessage) -> Result<(), Error> {
        self.sink.send(encode_ws_message(&message)?).await?;

        Ok(())
    }

    async fn recv(&mut self) -> Result<RelayMessage, Error> {
        loop {
            match self.stream.next().await {
                Some(Ok(message)) => {
                    if let Some(result) = decode_ws_message(message) {
                        return result;
                    }
                }
                Some(Err(err)) => return Err(err.into()),
                None => return Err(Error::ConnectionClosed),
            }
        }
    }
}
