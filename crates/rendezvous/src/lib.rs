//! WebRTC rendezvous over WebTorrent trackers
//!
//! Two peers that can't reach each other directly exchange session
//! descriptions through a tracker ("relay"), scoped to a shared room. The
//! initiator announces offers into the room, the responder answers one of
//! them, and the relay carries the answer back to the initiator, which
//! matches it to its offer by offer id.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::StreamExt;
use glommio::{spawn_local, LocalExecutorBuilder};
use wtrendezvous_protocol::common::{PeerId, Room};

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod link;
pub mod machine;
pub mod negotiation;
pub mod network;
pub mod outstanding;
pub mod relay;
pub mod round;

use client::{ClientSettings, RendezvousClient};
use config::Config;
use error::RoundError;
use identity::{generate_peer_id, Scope};
use negotiation::{FileNegotiator, Negotiator};
use network::{connect_with_backoff, Backoff};
use relay::Relay;
use round::{run_round, RoundOutcome, RoundSettings};

pub const APP_NAME: &str = "wtrendezvous: WebRTC rendezvous over WebTorrent trackers";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn run(config: Config) -> anyhow::Result<()> {
    // Without an identity there is nothing to retry
    let peer_id = generate_peer_id(config.identity.peer_id_length)
        .context("Couldn't generate peer id")?;

    ::log::info!("peer id: {}", peer_id.to_hex());

    let negotiator = FileNegotiator::new(&config.negotiation);
    let tls_config = network::create_tls_config()?;

    let handle = LocalExecutorBuilder::default()
        .name("rendezvous")
        .spawn(move || async move { run_client(config, peer_id, negotiator, tls_config).await })
        .map_err(|err| anyhow::anyhow!("Couldn't spawn executor: {:?}", err))?;

    handle
        .join()
        .map_err(|err| anyhow::anyhow!("Executor failed: {:?}", err))?
}

/// Run the configured number of rounds, reconnecting and rerunning rounds
/// that were cut short by connection failures
async fn run_client<N>(
    config: Config,
    peer_id: PeerId,
    negotiator: N,
    tls_config: Arc<rustls::ClientConfig>,
) -> anyhow::Result<()>
where
    N: Negotiator + 'static,
{
    let config = Rc::new(config);
    let negotiator = Rc::new(RefCell::new(negotiator));
    let scope = Scope {
        peer_id,
        room: Room(config.room.clone()),
    };

    let mut backoff = Backoff::new(&config.reconnect);
    let mut rounds_left = config.rounds.concurrent_rounds;
    let mut num_succeeded = 0usize;
    let mut last_error: Option<RoundError> = None;

    while rounds_left > 0 {
        let stream = connect_with_backoff(&config.relay_address, &tls_config, &mut backoff).await?;
        let (sink, stream) = stream.split();

        let (relay, driver) = Relay::new(scope.peer_id.clone(), sink, stream);

        let driver = spawn_local(async move {
            if let Err(err) = driver.await {
                ::log::warn!("relay connection ended: {:#}", err);
            }
        });

        let tasks: Vec<_> = (0..rounds_left)
            .map(|_| {
                spawn_local(run_round_task(
                    relay.clone(),
                    negotiator.clone(),
                    scope.clone(),
                    config.clone(),
                ))
            })
            .collect();

        let results = futures::future::join_all(tasks).await;

        relay.close();
        driver.await;

        rounds_left = 0;

        let mut connection_useful = false;

        for result in results {
            match result {
                Ok(outcome) => {
                    num_succeeded += 1;
                    connection_useful = true;

                    backoff.reset();

                    println!("{}", describe_outcome(&outcome));
                }
                Err(err) if err.source.is_connection_failure() => {
                    ::log::warn!("round aborted, retrying on new connection: {:#}", err);

                    rounds_left += 1;
                }
                Err(err) => {
                    ::log::error!("round aborted: {:#}", err);

                    last_error = Some(err);
                }
            }
        }

        // A relay accepting connections and then dropping them counts
        // against the same backoff as failed dials
        if rounds_left > 0 && !connection_useful {
            match backoff.next_delay() {
                Some(delay) => {
                    ::log::warn!(
                        "relay connection ended with no round done. Reconnecting in {:?}",
                        delay
                    );

                    glommio::timer::sleep(delay).await;
                }
                None => anyhow::bail!(
                    "Giving up on relay {}: connections keep ending before any round is done",
                    config.relay_address
                ),
            }
        }
    }

    match last_error {
        Some(err) if num_succeeded == 0 => Err(err).context("No round succeeded"),
        _ => Ok(()),
    }
}

async fn run_round_task<N: Negotiator>(
    relay: Relay,
    mut negotiator: Rc<RefCell<N>>,
    scope: Scope,
    config: Rc<Config>,
) -> Result<RoundOutcome, RoundError> {
    let link = relay.open_round(scope.room.clone(), config.role);

    let mut client = RendezvousClient::new(
        link,
        scope,
        ClientSettings {
            role: config.role,
            numwant: config.announce.numwant,
            offer_validity: Duration::from_millis(config.rounds.answer_timeout_ms),
        },
    );

    let settings = RoundSettings {
        offers_per_round: config.announce.offers_per_round,
        wait: Duration::from_millis(config.rounds.answer_timeout_ms),
    };

    run_round(&mut client, &mut negotiator, settings).await
}

fn describe_outcome(outcome: &RoundOutcome) -> String {
    match outcome {
        RoundOutcome::Matched {
            offer_id,
            peer_id: Some(peer_id),
        } => format!("Offer {} answered by peer {}", offer_id, peer_id.to_hex()),
        RoundOutcome::Matched {
            offer_id,
            peer_id: None,
        } => format!("Offer {} answered", offer_id),
        RoundOutcome::Answered { offer_id, peer_id } => {
            format!("Answered offer {} from peer {}", offer_id, peer_id.to_hex())
        }
    }
}
