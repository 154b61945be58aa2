use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use wtrendezvous_protocol::common::{OfferId, PeerId, Room};

use crate::error::Error;

pub const DEFAULT_PEER_ID_LENGTH: usize = 20;
pub const MIN_PEER_ID_LENGTH: usize = 16;
pub const MAX_PEER_ID_LENGTH: usize = 64;

const OFFER_ID_LENGTH: usize = 20;

/// Generate process-lifetime peer identity from the OS random source
pub fn generate_peer_id(length: usize) -> Result<PeerId, Error> {
    let mut bytes = vec![0u8; length];

    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(Error::IdentityGeneration)?;

    Ok(PeerId(bytes))
}

pub fn generate_offer_id(rng: &mut impl Rng) -> OfferId {
    OfferId(
        rng.sample_iter(&Alphanumeric)
            .take(OFFER_ID_LENGTH)
            .map(char::from)
            .collect(),
    )
}

/// Who we are and which room we're in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub peer_id: PeerId,
    pub room: Room,
}
