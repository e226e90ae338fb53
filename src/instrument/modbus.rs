//! Modbus-RTU framing.
//!
//! Request / response layout (RTU):
//! ```text
//! ┌───────┬────┬──────────────────────┬──────────────┐
//! │ slave │ FC │ function data        │ CRC16 (LE)   │
//! │  1 B  │ 1B │ N B                  │ 2 B          │
//! └───────┴────┴──────────────────────┴──────────────┘
//!
//! FC 0x03 response: slave 03 <byte count> <registers, BE u16 …> crc
//! FC 0x10 response: slave 10 <addr BE u16> <count BE u16> crc
//! exception       : slave (FC|0x80) <code> crc
//! ```
//!
//! [`ResponseDecoder`] accumulates bytes from the transport and yields a
//! validated [`Response`] once the function-specific length is complete,
//! so responses split across several reads (or followed by line noise)
//! decode the same way.

use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use super::transport::Transport;
use crate::error::CommsError;

pub const FC_READ_HOLDING: u8 = 0x03;
pub const FC_WRITE_MULTIPLE: u8 = 0x10;
const EXCEPTION_BIT: u8 = 0x80;

/// Largest RTU application data unit.
pub const MAX_ADU_SIZE: usize = 256;
/// Largest register payload of a read response (125 registers).
const MAX_READ_BYTES: usize = 250;
/// Largest number of registers per write request.
pub const MAX_WRITE_REGISTERS: usize = 123;
/// slave + function + first data byte.
const HEADER_SIZE: usize = 3;
const CRC_SIZE: usize = 2;

/// CRC-16/MODBUS (reflected polynomial 0xA001, initial value 0xFFFF).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

fn push_crc(frame: &mut Vec<u8>) {
    let crc = crc16(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}

/// FC 0x03 request for `count` registers starting at `addr`.
pub fn read_holding_request(slave: u8, addr: u16, count: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8);
    frame.push(slave);
    frame.push(FC_READ_HOLDING);
    frame.extend_from_slice(&addr.to_be_bytes());
    frame.extend_from_slice(&count.to_be_bytes());
    push_crc(&mut frame);
    frame
}

/// FC 0x10 request writing `values` starting at `addr`.
pub fn write_multiple_request(slave: u8, addr: u16, values: &[u16]) -> Vec<u8> {
    let count = values.len().min(MAX_WRITE_REGISTERS);
    let mut frame = Vec::with_capacity(9 + 2 * count);
    frame.push(slave);
    frame.push(FC_WRITE_MULTIPLE);
    frame.extend_from_slice(&addr.to_be_bytes());
    frame.extend_from_slice(&(count as u16).to_be_bytes());
    frame.push((2 * count) as u8);
    for v in &values[..count] {
        frame.extend_from_slice(&v.to_be_bytes());
    }
    push_crc(&mut frame);
    frame
}

// ---------------------------------------------------------------------------
// Slave-side encoders (simulated controllers and tests)
// ---------------------------------------------------------------------------

pub fn read_holding_response(slave: u8, registers: &[u16]) -> Vec<u8> {
    let count = registers.len().min(MAX_READ_BYTES / 2);
    let mut frame = vec![slave, FC_READ_HOLDING, (2 * count) as u8];
    for r in &registers[..count] {
        frame.extend_from_slice(&r.to_be_bytes());
    }
    push_crc(&mut frame);
    frame
}

pub fn write_multiple_response(slave: u8, addr: u16, count: u16) -> Vec<u8> {
    let mut frame = vec![slave, FC_WRITE_MULTIPLE];
    frame.extend_from_slice(&addr.to_be_bytes());
    frame.extend_from_slice(&count.to_be_bytes());
    push_crc(&mut frame);
    frame
}

pub fn exception_response(slave: u8, function: u8, code: u8) -> Vec<u8> {
    let mut frame = vec![slave, function | EXCEPTION_BIT, code];
    push_crc(&mut frame);
    frame
}

// ---------------------------------------------------------------------------
// Scaled register values
// ---------------------------------------------------------------------------

/// Interpret `raw` as a signed fixed-point value with `decimals` places.
pub fn decode_scaled(raw: u16, decimals: u8) -> f64 {
    f64::from(raw as i16) / 10f64.powi(i32::from(decimals))
}

/// Encode `value` with `decimals` places, rounding to nearest.
/// `None` if the result does not fit a signed 16-bit register.
pub fn encode_scaled(value: f64, decimals: u8) -> Option<u16> {
    let scaled = (value * 10f64.powi(i32::from(decimals))).round();
    if !scaled.is_finite() || scaled < f64::from(i16::MIN) || scaled > f64::from(i16::MAX) {
        return None;
    }
    Some(scaled as i16 as u16)
}

// ---------------------------------------------------------------------------
// Response decoder
// ---------------------------------------------------------------------------

/// A validated response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    ReadHolding(Vec<u16>),
    WriteMultiple { addr: u16, count: u16 },
}

enum DecoderState {
    /// Waiting for slave, function and first data byte.
    ReadingHeader { collected: usize },
    /// Total frame length known.
    ReadingBody { expected: usize, collected: usize },
}

/// Streaming decoder for the response to one request.
pub struct ResponseDecoder {
    slave: u8,
    function: u8,
    state: DecoderState,
    buf: [u8; MAX_ADU_SIZE],
}

impl ResponseDecoder {
    pub fn new(slave: u8, function: u8) -> Self {
        Self {
            slave,
            function,
            state: DecoderState::ReadingHeader { collected: 0 },
            buf: [0; MAX_ADU_SIZE],
        }
    }

    /// Feed bytes.  Returns `Some` once a full frame has been seen (or the
    /// header is already known to be bad); trailing bytes are discarded.
    pub fn feed(&mut self, data: &[u8]) -> Option<Result<Response, CommsError>> {
        let mut offset = 0;

        while offset < data.len() {
            match &mut self.state {
                DecoderState::ReadingHeader { collected } => {
                    let to_copy = (HEADER_SIZE - *collected).min(data.len() - offset);
                    self.buf[*collected..*collected + to_copy]
                        .copy_from_slice(&data[offset..offset + to_copy]);
                    *collected += to_copy;
                    offset += to_copy;

                    if *collected == HEADER_SIZE {
                        match self.frame_length() {
                            Ok(expected) => {
                                self.state = DecoderState::ReadingBody {
                                    expected,
                                    collected: HEADER_SIZE,
                                };
                            }
                            Err(e) => {
                                self.reset();
                                return Some(Err(e));
                            }
                        }
                    }
                }

                DecoderState::ReadingBody { expected, collected } => {
                    let to_copy = (*expected - *collected).min(data.len() - offset);
                    self.buf[*collected..*collected + to_copy]
                        .copy_from_slice(&data[offset..offset + to_copy]);
                    *collected += to_copy;
                    offset += to_copy;

                    if *collected == *expected {
                        let len = *expected;
                        self.reset();
                        return Some(self.validate(len));
                    }
                }
            }
        }

        None
    }

    pub fn reset(&mut self) {
        self.state = DecoderState::ReadingHeader { collected: 0 };
    }

    fn frame_length(&self) -> Result<usize, CommsError> {
        let (slave, fc, third) = (self.buf[0], self.buf[1], self.buf[2]);
        if slave != self.slave {
            return Err(CommsError::UnexpectedResponse);
        }
        if fc == self.function | EXCEPTION_BIT {
            return Ok(HEADER_SIZE + CRC_SIZE);
        }
        if fc != self.function {
            return Err(CommsError::UnexpectedResponse);
        }
        match fc {
            FC_READ_HOLDING => {
                let byte_count = third as usize;
                if byte_count == 0 || byte_count % 2 != 0 || byte_count > MAX_READ_BYTES {
                    return Err(CommsError::UnexpectedResponse);
                }
                Ok(HEADER_SIZE + byte_count + CRC_SIZE)
            }
            FC_WRITE_MULTIPLE => Ok(8),
            _ => Err(CommsError::UnexpectedResponse),
        }
    }

    fn validate(&self, len: usize) -> Result<Response, CommsError> {
        let frame = &self.buf[..len];
        let (body, crc_bytes) = frame.split_at(len - CRC_SIZE);
        let received = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
        if crc16(body) != received {
            return Err(CommsError::BadCrc);
        }
        if body[1] & EXCEPTION_BIT != 0 {
            return Err(CommsError::Exception(body[2]));
        }
        match body[1] {
            FC_READ_HOLDING => Ok(Response::ReadHolding(
                body[HEADER_SIZE..]
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect(),
            )),
            _ => Ok(Response::WriteMultiple {
                addr: u16::from_be_bytes([body[2], body[3]]),
                count: u16::from_be_bytes([body[4], body[5]]),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Master
// ---------------------------------------------------------------------------

/// Request/response master over any byte transport.
pub struct ModbusClient<T: Transport> {
    transport: T,
    slave: u8,
    timeout: Duration,
}

impl<T: Transport> ModbusClient<T>
where
    CommsError: From<T::Error>,
{
    pub fn new(transport: T, slave: u8, timeout: Duration) -> Self {
        Self {
            transport,
            slave,
            timeout,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn read_holding(&mut self, addr: u16, count: u16) -> Result<Vec<u16>, CommsError> {
        let request = read_holding_request(self.slave, addr, count);
        match self.transact(&request, FC_READ_HOLDING)? {
            Response::ReadHolding(regs) if regs.len() == count as usize => Ok(regs),
            _ => Err(CommsError::UnexpectedResponse),
        }
    }

    pub fn write_multiple(&mut self, addr: u16, values: &[u16]) -> Result<(), CommsError> {
        let request = write_multiple_request(self.slave, addr, values);
        match self.transact(&request, FC_WRITE_MULTIPLE)? {
            Response::WriteMultiple { addr: a, count } if a == addr && count as usize == values.len() => {
                Ok(())
            }
            _ => Err(CommsError::UnexpectedResponse),
        }
    }

    fn transact(&mut self, request: &[u8], function: u8) -> Result<Response, CommsError> {
        self.transport.clear()?;
        trace!("modbus tx {request:02X?}");
        self.transport.write(request)?;
        self.transport.flush()?;

        let mut decoder = ResponseDecoder::new(self.slave, function);
        let deadline = Instant::now() + self.timeout;
        let mut chunk = [0u8; 64];
        loop {
            let n = self.transport.read(&mut chunk)?;
            if n > 0 {
                trace!("modbus rx {:02X?}", &chunk[..n]);
                if let Some(result) = decoder.feed(&chunk[..n]) {
                    if let Err(e) = &result {
                        warn!("modbus fc {function:#04x} from slave {}: {e}", self.slave);
                    }
                    return result;
                }
            }
            if Instant::now() >= deadline {
                debug!("modbus fc {function:#04x} timed out");
                return Err(CommsError::Timeout);
            }
        }
    }
}
