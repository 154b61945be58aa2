//! Session description negotiation collaborator
//!
//! The rendezvous engine only moves session descriptions around. Creating
//! them and acting on the remote side's description is up to a
//! [`Negotiator`], which in a real application wraps a WebRTC stack.

use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, Read, Write};
use std::path::PathBuf;
use std::rc::Rc;

use wtrendezvous_protocol::common::SessionDescription;

use crate::config::NegotiationConfig;

#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    #[error("couldn't create offer: {0}")]
    CreateOffer(String),
    #[error("couldn't create answer: {0}")]
    CreateAnswer(String),
    #[error("couldn't set remote description: {0}")]
    RemoteDescription(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait Negotiator {
    fn create_offer(&mut self) -> Result<SessionDescription, NegotiationError>;

    fn create_answer(
        &mut self,
        remote_offer: &SessionDescription,
    ) -> Result<SessionDescription, NegotiationError>;

    /// Hand the answer to our offer to the transport
    fn set_remote_description(
        &mut self,
        remote_answer: &SessionDescription,
    ) -> Result<(), NegotiationError>;
}

/// Shared by the rounds of one executor. Never borrowed across an await.
impl<N: Negotiator> Negotiator for Rc<RefCell<N>> {
    fn create_offer(&mut self) -> Result<SessionDescription, NegotiationError> {
        self.borrow_mut().create_offer()
    }

    fn create_answer(
        &mut self,
        remote_offer: &SessionDescription,
    ) -> Result<SessionDescription, NegotiationError> {
        self.borrow_mut().create_answer(remote_offer)
    }

    fn set_remote_description(
        &mut self,
        remote_answer: &SessionDescription,
    ) -> Result<(), NegotiationError> {
        self.borrow_mut().set_remote_description(remote_answer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    /// Read until an empty line or end of input
    Stdin,
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Sink {
    Stdout,
    /// Append one JSON document per line
    File(PathBuf),
}

/// Negotiator for copy-pasting descriptions to and from an external WebRTC
/// stack, such as a browser console
///
/// Local descriptions are read from a file or stdin, either as raw SDP or
/// as a `{"type": ..., "sdp": ...}` JSON object. Remote descriptions are
/// written as JSON objects to a file or stdout. When answering, the remote
/// offer is written out before the local answer is read.
#[derive(Debug, Clone)]
pub struct FileNegotiator {
    source: Source,
    sink: Sink,
}

impl FileNegotiator {
    pub fn new(config: &NegotiationConfig) -> Self {
        let source = if config.local_description_path.as_os_str().is_empty() {
            Source::Stdin
        } else {
            Source::File(config.local_description_path.clone())
        };
        let sink = if config.remote_description_path.as_os_str().is_empty() {
            Sink::Stdout
        } else {
            Sink::File(config.remote_description_path.clone())
        };

        Self { source, sink }
    }

    fn read_local(&self, kind: &str) -> Result<SessionDescription, NegotiationError> {
        let text = match &self.source {
            Source::Stdin => {
                eprintln!("Paste local {} and finish with an empty line:", kind);

                read_until_empty_line(std::io::stdin().lock())?
            }
            Source::File(path) => {
                let mut text = String::new();

                File::open(path)?.read_to_string(&mut text)?;

                text
            }
        };

        parse_description(&text, kind)
    }

    fn write_remote(&self, description: &SessionDescription) -> Result<(), NegotiationError> {
        let json = ::serde_json::to_string(&description.0)
            .map_err(|err| NegotiationError::RemoteDescription(err.to_string()))?;

        match &self.sink {
            Sink::Stdout => {
                let mut stdout = std::io::stdout().lock();

                writeln!(stdout, "{}", json)?;
                stdout.flush()?;
            }
            Sink::File(path) => {
                let mut file = OpenOptions::new().create(true).append(true).open(path)?;

                writeln!(file, "{}", json)?;
            }
        }

        Ok(())
    }
}

impl Negotiator for FileNegotiator {
    fn create_offer(&mut self) -> Result<SessionDescription, NegotiationError> {
        self.read_local("offer")
            .map_err(|err| NegotiationError::CreateOffer(err.to_string()))
    }

    fn create_answer(
        &mut self,
        remote_offer: &SessionDescription,
    ) -> Result<SessionDescription, NegotiationError> {
        self.write_remote(remote_offer)?;

        self.read_local("answer")
            .map_err(|err| NegotiationError::CreateAnswer(err.to_string()))
    }

    fn set_remote_description(
        &mut self,
        remote_answer: &SessionDescription,
    ) -> Result<(), NegotiationError> {
        self.write_remote(remote_answer)
    }
}

fn read_until_empty_line(reader: impl BufRead) -> std::io::Result<String> {
    let mut text = String::new();

    for line in reader.lines() {
        let line = line?;

        if line.trim().is_empty() {
            break;
        }

        text.push_str(&line);
        text.push_str("\r\n");
    }

    Ok(text)
}

/// Accept a JSON description object or raw SDP of the given kind
fn parse_description(text: &str, kind: &str) -> Result<SessionDescription, NegotiationError> {
    let text = text.trim();

    if text.is_empty() {
        return Err(NegotiationError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "empty session description",
        )));
    }

    if text.starts_with('{') {
        let value: ::serde_json::Value = ::serde_json::from_str(text).map_err(|err| {
            NegotiationError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
        })?;

        Ok(SessionDescription(value))
    } else {
        // SDP lines are CRLF terminated, including the last one
        let mut sdp = text.lines().collect::<Vec<_>>().join("\r\n");

        sdp.push_str("\r\n");

        Ok(SessionDescription::from_sdp(kind, &sdp))
    }
}
