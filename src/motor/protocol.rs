// Serial message protocol spoken by the UGV controller board
//
// Packet format: [STX, ID, Function, Length lo, Length hi, Data..., ETX]
// Length is the little-endian byte count of Data.

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// Default serial configuration for the controller board
pub const DEFAULT_BAUDRATE: u32 = 57_600;
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

/// Frame delimiters
pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;

/// Bytes around the payload: STX, ID, function, 2 length bytes, ETX
const FRAME_OVERHEAD: usize = 6;

/// Function codes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Ack = 0x01,
    Move = 0x02,
    Ready = 0x04,
}

impl TryFrom<u8> for Function {
    type Error = u8;

    fn try_from(code: u8) -> std::result::Result<Self, u8> {
        match code {
            0x01 => Ok(Function::Ack),
            0x02 => Ok(Function::Move),
            0x04 => Ok(Function::Ready),
            other => Err(other),
        }
    }
}

/// Error types for board communication
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from board {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Timeout waiting for response from board {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// A decoded frame received from the board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: u8,
    pub function: Function,
    pub data: Vec<u8>,
}

/// Build a frame addressed to `id`
pub fn build_frame(id: u8, function: Function, data: &[u8]) -> Vec<u8> {
    let length = (data.len() as u16).to_le_bytes();
    let mut frame = Vec::with_capacity(FRAME_OVERHEAD + data.len());

    frame.push(STX);
    frame.push(id);
    frame.push(function as u8);
    frame.extend_from_slice(&length);
    frame.extend_from_slice(data);
    frame.push(ETX);

    frame
}

/// Board link - frames messages over a byte transport
pub struct BoardLink<P = Box<dyn SerialPort>> {
    port: P,
}

impl BoardLink {
    /// Open the serial device at `baudrate`
    pub fn open(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port })
    }
}

impl<P: Read + Write> BoardLink<P> {
    /// Wrap an already open transport
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// Give the transport back
    pub fn into_inner(self) -> P {
        self.port
    }

    /// Write a frame to the board
    pub fn send_message(&mut self, id: u8, function: Function, data: &[u8]) -> Result<()> {
        let frame = build_frame(id, function, data);
        debug!("-> board {}: {:?} {:02X?}", id, function, data);
        self.port.write_all(&frame)?;
        self.port.flush()?;
        Ok(())
    }

    /// Fill `buf`, reporting a stalled board as a timeout
    fn read_exact(&mut self, buf: &mut [u8], id: u8) -> Result<()> {
        self.port.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                ProtocolError::Timeout { id }
            } else {
                ProtocolError::Io(e)
            }
        })
    }

    /// Read one frame, which must come from `expected_id`
    pub fn read_message(&mut self, expected_id: u8) -> Result<Frame> {
        let mut head = [0u8; 5];
        self.read_exact(&mut head, expected_id)?;

        if head[0] != STX {
            return Err(ProtocolError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid start byte: {:02X}", head[0]),
            });
        }

        let id = head[1];
        if id != expected_id {
            return Err(ProtocolError::InvalidResponse {
                id: expected_id,
                reason: format!("ID mismatch: expected {}, got {}", expected_id, id),
            });
        }

        let function = Function::try_from(head[2]).map_err(|code| ProtocolError::InvalidResponse {
            id,
            reason: format!("Unknown function code: {:02X}", code),
        })?;

        // Data followed by ETX
        let length = u16::from_le_bytes([head[3], head[4]]) as usize;
        let mut rest = vec![0u8; length + 1];
        self.read_exact(&mut rest, id)?;

        if rest[length] != ETX {
            return Err(ProtocolError::InvalidResponse {
                id,
                reason: format!("Invalid end byte: {:02X}", rest[length]),
            });
        }
        rest.truncate(length);

        debug!("<- board {}: {:?} {:02X?}", id, function, rest);
        Ok(Frame {
            id,
            function,
            data: rest,
        })
    }

    /// Ask the board whether it is alive. A timeout is a `false`, not an error.
    pub fn ready(&mut self, id: u8) -> Result<bool> {
        self.send_message(id, Function::Ready, &[])?;

        match self.read_message(id) {
            Ok(frame) => Ok(frame.function == Function::Ack),
            Err(ProtocolError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Push a [right, left] set-point pair. The board does not answer.
    pub fn move_wheels(&mut self, id: u8, setpoints: [u8; 2]) -> Result<()> {
        self.send_message(id, Function::Move, &setpoints)
    }
}
