// Session with one addressed controller board
//
// Owns the serial link for the life of the process. Readiness must be
// confirmed once before set-points are pushed.

use serialport::SerialPort;
use std::io::{Read, Write};
use tracing::{debug, info, warn};

use super::kinematics::WheelCommandPair;
use super::protocol::{BoardLink, ProtocolError};

/// Errors raised by a controller session
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Serial link {path} unavailable: {reason}")]
    LinkUnavailable { path: String, reason: String },

    #[error("Board {id} did not answer the readiness check")]
    ReadinessFailure { id: u8 },

    #[error("Board {id} has not passed the readiness check")]
    NotReady { id: u8 },

    #[error("Failed to transmit to board {id}: {source}")]
    TransmitFailure {
        id: u8,
        #[source]
        source: ProtocolError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Opened,
    Ready,
}

/// A board that can be probed once and then fed wheel set-points
pub trait WheelSink {
    fn identity(&self) -> u8;

    fn is_ready(&mut self) -> bool;

    fn send(&mut self, pair: WheelCommandPair) -> Result<(), SessionError>;
}

/// Serial session with the board at `identity`
pub struct ControllerSession<P = Box<dyn SerialPort>> {
    link: BoardLink<P>,
    identity: u8,
    state: SessionState,
}

impl ControllerSession {
    /// Open the device exclusively. Does not talk to the board yet.
    pub fn open(device_path: &str, baud_rate: u32, identity: u8) -> Result<Self, SessionError> {
        info!("Opening serial link on {} at {} baud", device_path, baud_rate);
        let link = BoardLink::open(device_path, baud_rate).map_err(|e| {
            SessionError::LinkUnavailable {
                path: device_path.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self::with_link(link, identity))
    }
}

impl<P: Read + Write> ControllerSession<P> {
    /// Build a session over an already open transport
    pub fn from_transport(transport: P, identity: u8) -> Self {
        Self::with_link(BoardLink::new(transport), identity)
    }

    fn with_link(link: BoardLink<P>, identity: u8) -> Self {
        Self {
            link,
            identity,
            state: SessionState::Opened,
        }
    }

    pub fn identity(&self) -> u8 {
        self.identity
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handshake with the board. Any protocol error counts as not ready.
    pub fn is_ready(&mut self) -> bool {
        match self.link.ready(self.identity) {
            Ok(true) => {
                info!("Board {} is ready", self.identity);
                self.state = SessionState::Ready;
                true
            }
            Ok(false) => {
                warn!("Board {} did not acknowledge readiness", self.identity);
                false
            }
            Err(e) => {
                warn!("Readiness check on board {} failed: {}", self.identity, e);
                false
            }
        }
    }

    /// Push a set-point pair as [right, left]
    pub fn send(&mut self, pair: WheelCommandPair) -> Result<(), SessionError> {
        if self.state != SessionState::Ready {
            return Err(SessionError::NotReady { id: self.identity });
        }
        debug!("Sending R: {} L: {} to board {}", pair.right, pair.left, self.identity);
        self.link
            .move_wheels(self.identity, pair.as_array())
            .map_err(|source| SessionError::TransmitFailure {
                id: self.identity,
                source,
            })
    }

    /// Give the transport back
    pub fn into_transport(self) -> P {
        self.link.into_inner()
    }
}

impl<P: Read + Write> WheelSink for ControllerSession<P> {
    fn identity(&self) -> u8 {
        self.identity
    }

    fn is_ready(&mut self) -> bool {
        ControllerSession::is_ready(self)
    }

    fn send(&mut self, pair: WheelCommandPair) -> Result<(), SessionError> {
        ControllerSession::send(self, pair)
    }
}
