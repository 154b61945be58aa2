use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use url::Url;
use wtrendezvous_common::cli::LogLevel;

use crate::identity::{DEFAULT_PEER_ID_LENGTH, MAX_PEER_ID_LENGTH, MIN_PEER_ID_LENGTH};
use crate::machine::Role;

/// wtrendezvous configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// WebTorrent tracker websocket URL, ws:// or wss://
    pub relay_address: String,
    /// Room ("info_hash") shared with the counterpart
    pub room: String,
    /// initiator or responder
    pub role: Role,
    pub log_level: LogLevel,
    pub identity: IdentityConfig,
    pub announce: AnnounceConfig,
    pub rounds: RoundsConfig,
    pub reconnect: ReconnectConfig,
    pub negotiation: NegotiationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay_address: "wss://tracker.openwebtorrent.com".into(),
            room: "chompnet".into(),
            role: Role::default(),
            log_level: LogLevel::default(),
            identity: IdentityConfig::default(),
            announce: AnnounceConfig::default(),
            rounds: RoundsConfig::default(),
            reconnect: ReconnectConfig::default(),
            negotiation: NegotiationConfig::default(),
        }
    }
}

impl wtrendezvous_common::cli::Config for Config {
    fn get_log_level(&self) -> Option<LogLevel> {
        Some(self.log_level)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let url = Url::parse(&self.relay_address)
            .with_context(|| format!("invalid relay_address {}", self.relay_address))?;

        match url.scheme() {
            "ws" | "wss" => (),
            scheme => anyhow::bail!("relay_address scheme must be ws or wss, got {}", scheme),
        }

        if url.host_str().is_none() {
            anyhow::bail!("relay_address has no host");
        }
        if self.room.is_empty() {
            anyhow::bail!("room can't be empty");
        }
        if !(MIN_PEER_ID_LENGTH..=MAX_PEER_ID_LENGTH).contains(&self.identity.peer_id_length) {
            anyhow::bail!(
                "identity.peer_id_length must be in range {}..={}",
                MIN_PEER_ID_LENGTH,
                MAX_PEER_ID_LENGTH
            );
        }
        if self.role == Role::Initiator && self.announce.offers_per_round == 0 {
            anyhow::bail!("announce.offers_per_round must be at least 1 for initiators");
        }
        if self.rounds.concurrent_rounds == 0 {
            anyhow::bail!("rounds.concurrent_rounds must be at least 1");
        }
        if self.rounds.answer_timeout_ms == 0 {
            anyhow::bail!("rounds.answer_timeout_ms must be larger than zero");
        }
        if self.reconnect.initial_backoff_ms > self.reconnect.max_backoff_ms {
            anyhow::bail!("reconnect.initial_backoff_ms can't exceed reconnect.max_backoff_ms");
        }

        Ok(())
    }

    fn key_help() -> &'static [(&'static str, &'static str)] {
        &[
            ("relay_address", "Tracker websocket URL, ws:// or wss://"),
            ("room", "Room (info_hash) shared with the counterpart"),
            ("role", "initiator or responder"),
            ("log_level", "off, error, warn, info, debug or trace"),
            ("identity.peer_id_length", "Peer id length in bytes, 16 to 64"),
            ("announce.numwant", "Peers the relay may send our offers to"),
            ("announce.offers_per_round", "Offers an initiator publishes per round"),
            ("rounds.concurrent_rounds", "Rounds run over one relay connection"),
            ("rounds.answer_timeout_ms", "Give up a round after this long"),
            ("reconnect.max_attempts", "Reconnects before giving up, 0 for no limit"),
            ("reconnect.initial_backoff_ms", "First reconnect delay, doubled per attempt"),
            ("reconnect.max_backoff_ms", "Upper bound for reconnect delay"),
            ("negotiation.local_description_path", "Local descriptions, empty for stdin"),
            ("negotiation.remote_description_path", "Remote descriptions, empty for stdout"),
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    /// Peer id length in bytes. WebTorrent clients use 20.
    pub peer_id_length: usize,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            peer_id_length: DEFAULT_PEER_ID_LENGTH,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnnounceConfig {
    /// Maximum number of peers the relay should forward our offers to
    pub numwant: usize,
    /// Offers published by an initiator per round
    pub offers_per_round: usize,
}

impl Default for AnnounceConfig {
    fn default() -> Self {
        Self {
            numwant: 50,
            offers_per_round: 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoundsConfig {
    /// Number of rounds run at the same time over the relay connection
    pub concurrent_rounds: usize,
    /// Give up a round if no counterpart is found within this time
    pub answer_timeout_ms: u64,
}

impl Default for RoundsConfig {
    fn default() -> Self {
        Self {
            concurrent_rounds: 1,
            answer_timeout_ms: 60_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconnectConfig {
    /// Connection attempts before giving up. 0 means no limit.
    pub max_attempts: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NegotiationConfig {
    /// Read local descriptions from this file. Empty means stdin.
    pub local_description_path: PathBuf,
    /// Append remote descriptions to this file. Empty means stdout.
    pub remote_description_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use wtrendezvous_common::cli::Config as _;

    use super::Config;

    ::wtrendezvous_common::gen_serialize_deserialize_test!(Config);

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let invalid = [
            Config {
                relay_address: "https://tracker.example.com".into(),
                ..Default::default()
            },
            Config {
                relay_address: "not a url".into(),
                ..Default::default()
            },
            Config {
                room: String::new(),
                ..Default::default()
            },
        ];

        for config in invalid.iter() {
            assert!(config.validate().is_err(), "{:?}", config);
        }

        let mut config = Config::default();

        config.identity.peer_id_length = 8;
        assert!(config.validate().is_err());

        config.identity.peer_id_length = 64;
        config.rounds.concurrent_rounds = 0;
        assert!(config.validate().is_err());

        config.rounds.concurrent_rounds = 4;
        config.reconnect.initial_backoff_ms = 60_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_key_help_covers_every_key() {
        use ::wtrendezvous_common::toml::Value;

        let serialized = ::wtrendezvous_common::toml::to_string(&Config::default()).unwrap();
        let value: Value = ::wtrendezvous_common::toml::from_str(&serialized).unwrap();

        let mut keys = Vec::new();

        if let Value::Table(table) = value {
            for (key, value) in table {
                match value {
                    Value::Table(section) => {
                        keys.extend(section.keys().map(|inner| format!("{}.{}", key, inner)))
                    }
                    _ => keys.push(key),
                }
            }
        }

        let documented: Vec<&str> = Config::key_help().iter().map(|(key, _)| *key).collect();

        assert_eq!(keys.len(), documented.len());

        for key in keys {
            assert!(documented.contains(&key.as_str()), "undocumented key {}", key);
        }
    }

    #[test]
    fn test_parse_partial_config() {
        let config: Config = ::wtrendezvous_common::toml::from_str(
            r#"
            relay_address = "ws://127.0.0.1:3000"
            role = "responder"

            [rounds]
            answer_timeout_ms = 5000
            "#,
        )
        .unwrap();

        assert_eq!(config.role, super::Role::Responder);
        assert_eq!(config.rounds.answer_timeout_ms, 5000);
        assert_eq!(config.rounds.concurrent_rounds, 1);
        assert_eq!(config.room, "chompnet");
        assert!(config.validate().is_ok());

        assert!(::wtrendezvous_common::toml::from_str::<Config>("unknown_key = 1").is_err());
    }
}
