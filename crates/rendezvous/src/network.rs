use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_tungstenite::{client_async, WebSocketStream};
use futures::{AsyncRead, AsyncWrite};
use futures_rustls::TlsConnector;
use glommio::net::TcpStream;
use rustls::pki_types::ServerName;
use url::Url;

use crate::config::ReconnectConfig;

/// Plaintext or TLS connection to relay
pub trait RelayIo: AsyncRead + AsyncWrite + Unpin {}

impl<T: AsyncRead + AsyncWrite + Unpin> RelayIo for T {}

pub type RelayStream = WebSocketStream<Box<dyn RelayIo>>;

pub fn create_tls_config() -> anyhow::Result<Arc<rustls::ClientConfig>> {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .context("Couldn't select TLS protocol versions")?
    .with_root_certificates(root_store)
    .with_no_client_auth();

    Ok(Arc::new(config))
}

/// Dial relay and do websocket handshake. TLS is used for wss:// addresses.
pub async fn connect(
    relay_address: &str,
    tls_config: Arc<rustls::ClientConfig>,
) -> anyhow::Result<RelayStream> {
    let url = Url::parse(relay_address)
        .with_context(|| format!("invalid relay address {}", relay_address))?;

    let host = url
        .host_str()
        .with_context(|| format!("relay address {} has no host", relay_address))?
        .to_string();
    let port = url
        .port_or_known_default()
        .with_context(|| format!("relay address {} has no port", relay_address))?;

    let tcp_stream = TcpStream::connect((host.as_str(), port))
        .await
        .map_err(|err| anyhow::anyhow!("connect to {}:{}: {:?}", host, port, err))?;

    let io: Box<dyn RelayIo> = match url.scheme() {
        "wss" => {
            let server_name = ServerName::try_from(host.clone())
                .with_context(|| format!("invalid TLS server name {}", host))?;

            let tls_stream = TlsConnector::from(tls_config)
                .connect(server_name, tcp_stream)
                .await
                .with_context(|| format!("TLS handshake with {}", host))?;

            Box::new(tls_stream)
        }
        "ws" => Box::new(tcp_stream),
        scheme => anyhow::bail!("unsupported relay address scheme {}", scheme),
    };

    let (stream, response) = client_async(relay_address, io)
        .await
        .context("websocket handshake")?;

    ::log::debug!("websocket handshake response: {:?}", response.status());

    Ok(stream)
}

/// Exponential reconnection backoff
#[derive(Debug, Clone)]
pub struct Backoff {
    attempts: usize,
    max_attempts: usize,
    initial: Duration,
    next: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        let initial = Duration::from_millis(config.initial_backoff_ms);

        Self {
            attempts: 0,
            max_attempts: config.max_attempts,
            initial,
            next: initial,
            max: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Delay before the next attempt, or None once attempts are used up
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.max_attempts != 0 && self.attempts >= self.max_attempts {
            return None;
        }

        self.attempts += 1;

        let delay = self.next;

        self.next = (self.next * 2).min(self.max);

        Some(delay)
    }

    /// Call after a connection was useful
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.next = self.initial;
    }
}

/// Connect, retrying with backoff
pub async fn connect_with_backoff(
    relay_address: &str,
    tls_config: &Arc<rustls::ClientConfig>,
    backoff: &mut Backoff,
) -> anyhow::Result<RelayStream> {
    loop {
        match connect(relay_address, tls_config.clone()).await {
            Ok(stream) => {
                ::log::info!("connected to relay {}", relay_address);

                return Ok(stream);
            }
            Err(err) => match backoff.next_delay() {
                Some(delay) => {
                    ::log::warn!(
                        "couldn't connect to relay: {:#}. Retrying in {:?}",
                        err,
                        delay
                    );

                    glommio::timer::sleep(delay).await;
                }
                None => {
                    return Err(err.context("Giving up connecting to relay"));
                }
            },
        }
    }
}
