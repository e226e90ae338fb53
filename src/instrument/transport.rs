//! Transport abstraction: any byte-oriented channel.
//!
//! Concrete implementations:
//! - RS-485 / USB serial port to the temperature controller
//! - In-memory loopback with scripted responses (tests, dry runs)
//!
//! The Modbus master is generic over `Transport`, so adding a new
//! transport requires zero changes to the protocol logic.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::Duration;

use log::{info, warn};
use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};

use crate::config::SerialConfig;
use crate::error::CommsError;

/// Poll granularity for serial reads; the master enforces the real timeout.
const SERIAL_POLL: Duration = Duration::from_millis(20);

/// Byte-oriented transport channel.
pub trait Transport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns 0 if no data arrived within the poll interval.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write all of `data`.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Discard unread input (stale bytes from an earlier exchange).
    fn clear(&mut self) -> Result<(), Self::Error>;
}

impl From<std::io::Error> for CommsError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Self::Timeout,
            _ => Self::Io,
        }
    }
}

// ---------------------------------------------------------------------------
// Serial
// ---------------------------------------------------------------------------

/// 8N1 serial port.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub fn open(cfg: &SerialConfig) -> Result<Self, CommsError> {
        let port = serialport::new(&cfg.port, cfg.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(SERIAL_POLL)
            .open()
            .map_err(|e| {
                warn!("Failed to open {}: {e}", cfg.port);
                CommsError::OpenFailed
            })?;
        info!("Opened {} at {} baud (8N1)", cfg.port, cfg.baud_rate);
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    type Error = std::io::Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, std::io::Error> {
        match self.port.read(buf) {
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            other => other,
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, std::io::Error> {
        self.port.write_all(data)?;
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), std::io::Error> {
        self.port.flush()
    }

    fn clear(&mut self) -> Result<(), std::io::Error> {
        self.port
            .clear(ClearBuffer::Input)
            .map_err(std::io::Error::from)
    }
}

// ---------------------------------------------------------------------------
// Loopback
// ---------------------------------------------------------------------------

/// In-memory transport: every write releases the next scripted response.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    responses: VecDeque<Vec<u8>>,
    pending: VecDeque<u8>,
    writes: Vec<Vec<u8>>,
    /// Deliver at most this many bytes per read (0 = unlimited).
    chunk: usize,
    fail_writes: bool,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split responses into reads of at most `chunk` bytes.
    pub fn with_chunk(chunk: usize) -> Self {
        Self {
            chunk,
            ..Self::default()
        }
    }

    pub fn push_response(&mut self, frame: Vec<u8>) {
        self.responses.push_back(frame);
    }

    /// Every request written so far.
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn remaining_responses(&self) -> usize {
        self.responses.len()
    }
}

impl Transport for LoopbackTransport {
    type Error = CommsError;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CommsError> {
        let limit = if self.chunk == 0 { buf.len() } else { self.chunk.min(buf.len()) };
        let mut n = 0;
        while n < limit {
            let Some(b) = self.pending.pop_front() else {
                break;
            };
            buf[n] = b;
            n += 1;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, CommsError> {
        if self.fail_writes {
            return Err(CommsError::Io);
        }
        self.writes.push(data.to_vec());
        if let Some(resp) = self.responses.pop_front() {
            self.pending.extend(resp);
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), CommsError> {
        Ok(())
    }

    fn clear(&mut self) -> Result<(), CommsError> {
        self.pending.clear();
        Ok(())
    }
}
