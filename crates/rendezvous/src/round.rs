use std::time::{Duration, Instant};

use futures_lite::future::or;
use futures_timer::Delay;
use wtrendezvous_protocol::common::{AnnounceEvent, OfferId, PeerId};
use wtrendezvous_protocol::outgoing::AnnounceRequestOffer;

use crate::client::RendezvousClient;
use crate::error::{Error, RoundError};
use crate::link::RelayLink;
use crate::machine::{Machine, Reaction, Role};
use crate::negotiation::Negotiator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundSettings {
    /// Number of offers an initiator publishes per round
    pub offers_per_round: usize,
    /// Maximum time from announcing to finding a counterpart
    pub wait: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Initiator applied an answer to one of its offers
    Matched {
        offer_id: OfferId,
        peer_id: Option<PeerId>,
    },
    /// Responder answered an offer
    Answered { offer_id: OfferId, peer_id: PeerId },
}

/// Run one rendezvous round to completion
///
/// Fails with the phase the round was in when the link fails, the
/// negotiator fails or `settings.wait` runs out. Outstanding offers are
/// released whichever way the round ends.
pub async fn run_round<L, N>(
    client: &mut RendezvousClient<L>,
    negotiator: &mut N,
    settings: RoundSettings,
) -> Result<RoundOutcome, RoundError>
where
    L: RelayLink,
    N: Negotiator,
{
    let mut machine = Machine::new(client.role());

    let result = or(
        drive_round(client, negotiator, &mut machine, settings),
        async {
            Delay::new(settings.wait).await;

            Err(Error::Timeout(settings.wait))
        },
    )
    .await;

    let released = client.release_offers();

    if !released.is_empty() {
        ::log::debug!("released {} unanswered offers", released.len());
    }

    result.map_err(|source| RoundError {
        phase: machine.fail(),
        source,
    })
}

async fn drive_round<L, N>(
    client: &mut RendezvousClient<L>,
    negotiator: &mut N,
    machine: &mut Machine,
    settings: RoundSettings,
) -> Result<RoundOutcome, Error>
where
    L: RelayLink,
    N: Negotiator,
{
    machine.begin_announce();

    let mut offers = Vec::new();

    if machine.role() == Role::Initiator {
        for _ in 0..settings.offers_per_round {
            offers.push(AnnounceRequestOffer {
                offer_id: client.new_offer_id(),
                offer: negotiator.create_offer()?,
            });
        }
    }

    client.announce(offers, Some(AnnounceEvent::Started)).await?;

    machine.announced();

    loop {
        let message = match client.receive().await {
            Ok(message) => message,
            Err(Error::Protocol(err)) => {
                ::log::warn!("skipping message from relay: {:#}", err);

                continue;
            }
            Err(err) => return Err(err),
        };

        let expired = client.expire_offers(Instant::now());

        if !expired.is_empty() {
            ::log::debug!("offers expired: {:?}", expired);
        }

        match machine.on_event(client.dispatch(message)) {
            Reaction::Ignore => (),
            Reaction::Acknowledged(stats) => {
                ::log::debug!("relay acknowledged announce: {:?}", stats);
            }
            Reaction::ApplyAnswer {
                from,
                offer_id,
                answer,
            } => {
                client.apply_answer(&offer_id)?;
                negotiator.set_remote_description(&answer)?;

                machine.finish();

                ::log::info!("offer {} answered by {:?}", offer_id, from);

                return Ok(RoundOutcome::Matched {
                    offer_id,
                    peer_id: from,
                });
            }
            Reaction::AnswerOffer {
                from,
                offer_id,
                offer,
            } => {
                let answer = negotiator.create_answer(&offer)?;

                client
                    .send_answer(from.clone(), offer_id.clone(), answer)
                    .await?;

                machine.finish();

                ::log::info!("answered offer {} from {:?}", offer_id, from);

                return Ok(RoundOutcome::Answered {
                    offer_id,
                    peer_id: from,
                });
            }
        }
    }
}
