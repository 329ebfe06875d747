//! Software bus messages
//!
//! Every message on the bus is a CCSDS space packet:
//!
//! ```text
//! +--------------+---------------+-------------+------------------+---------+
//! | stream (u16) | sequence (u16)| length (u16)| secondary header | payload |
//! +--------------+---------------+-------------+------------------+---------+
//! ```
//!
//! - stream: `0b000` version, type bit (0x1000, set for commands),
//!   secondary-header bit (0x0800), 11-bit APID. The message id is the
//!   stream word with the version bits masked off.
//! - length: total packet length minus 7.
//! - command secondary header: function code (7 bits) + checksum.
//! - telemetry secondary header: seconds (u32) + subseconds (u16).
//!
//! Headers are big-endian. Payload fields use the native little-endian,
//! C-aligned layout (see [`payload`]).

pub mod payload;

use crate::error::{GatewayError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Primary header length
pub const PRIMARY_HEADER_LEN: usize = 6;
/// Primary + command secondary header
pub const CMD_HEADER_LEN: usize = 8;
/// Primary + telemetry secondary header
pub const TLM_HEADER_LEN: usize = 12;

const MSG_ID_MASK: u16 = 0x1FFF;
const TYPE_CMD_BIT: u16 = 0x1000;
const SEC_HDR_BIT: u16 = 0x0800;
const SEQ_UNSEGMENTED: u16 = 0xC000;
const SEQ_COUNT_MASK: u16 = 0x3FFF;
const FCN_CODE_MASK: u8 = 0x7F;

// =============================================================================
// Message ID
// =============================================================================

/// Topic identifier on the software bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MsgId(u16);

impl MsgId {
    /// Sentinel marking an unused table slot
    pub const RESERVED: MsgId = MsgId(0);

    /// Highest id the bus accepts
    pub const HIGHEST_VALID: u16 = MSG_ID_MASK;

    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u16 {
        self.0
    }

    /// True unless this is the sentinel or outside the bus id range
    pub fn is_valid(self) -> bool {
        self.0 != 0 && self.0 <= Self::HIGHEST_VALID
    }

    pub fn is_command(self) -> bool {
        self.0 & TYPE_CMD_BIT != 0
    }

    pub fn has_secondary_header(self) -> bool {
        self.0 & SEC_HDR_BIT != 0
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

// =============================================================================
// Message
// =============================================================================

/// One packet on the software bus
///
/// Cheap to clone: the buffer is reference counted, so the bus can fan a
/// message out to several pipes without copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    bytes: Bytes,
}

impl Message {
    /// Wrap a received buffer
    ///
    /// Only the primary header is required; the declared length is checked
    /// later by whoever needs the full packet (encoders, dispatcher).
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.len() < PRIMARY_HEADER_LEN {
            return Err(GatewayError::MalformedMessage { len: bytes.len() });
        }
        Ok(Self { bytes })
    }

    /// Build a command packet with a valid checksum
    ///
    /// The stream word is `msg_id` as given. The function code and checksum
    /// are only written when the id carries the secondary-header bit.
    pub fn command(msg_id: MsgId, function_code: u8, payload: &[u8]) -> Self {
        let sec_hdr = msg_id.has_secondary_header();
        let header_len = if sec_hdr {
            CMD_HEADER_LEN
        } else {
            PRIMARY_HEADER_LEN
        };
        let total = header_len + payload.len();
        let mut buf = BytesMut::with_capacity(total);
        put_primary_header(&mut buf, msg_id.value(), 0, total);
        if sec_hdr {
            buf.put_u8(function_code & FCN_CODE_MASK);
            buf.put_u8(0);
        }
        buf.put_slice(payload);

        if sec_hdr {
            let checksum = buf.iter().fold(0xFFu8, |acc, b| acc ^ b);
            buf[CMD_HEADER_LEN - 1] = checksum;
        }

        Self {
            bytes: buf.freeze(),
        }
    }

    /// Build a telemetry packet stamped with the current time
    pub fn telemetry(msg_id: MsgId, payload: &[u8]) -> Self {
        let now = chrono::Utc::now();
        let seconds = now.timestamp() as u32;
        let subseconds = ((now.timestamp_subsec_nanos() as u64) << 16) / 1_000_000_000;
        Self::telemetry_at(msg_id, seconds, subseconds as u16, payload)
    }

    /// Build a telemetry packet with an explicit timestamp
    ///
    /// The stream word is `msg_id` as given; ids without the secondary-header
    /// bit get a bare primary header and no timestamp.
    pub fn telemetry_at(msg_id: MsgId, seconds: u32, subseconds: u16, payload: &[u8]) -> Self {
        let sec_hdr = msg_id.has_secondary_header();
        let header_len = if sec_hdr {
            TLM_HEADER_LEN
        } else {
            PRIMARY_HEADER_LEN
        };
        let total = header_len + payload.len();
        let mut buf = BytesMut::with_capacity(total);
        put_primary_header(&mut buf, msg_id.value(), 0, total);
        if sec_hdr {
            buf.put_u32(seconds);
            buf.put_u16(subseconds);
        }
        buf.put_slice(payload);
        Self {
            bytes: buf.freeze(),
        }
    }

    fn stream_word(&self) -> u16 {
        u16::from_be_bytes([self.bytes[0], self.bytes[1]])
    }

    pub fn msg_id(&self) -> MsgId {
        MsgId(self.stream_word() & MSG_ID_MASK)
    }

    pub fn is_command(&self) -> bool {
        self.stream_word() & TYPE_CMD_BIT != 0
    }

    fn has_secondary_header(&self) -> bool {
        self.msg_id().has_secondary_header()
    }

    pub fn sequence_count(&self) -> u16 {
        u16::from_be_bytes([self.bytes[2], self.bytes[3]]) & SEQ_COUNT_MASK
    }

    /// Packet size according to the length field
    pub fn declared_size(&self) -> usize {
        u16::from_be_bytes([self.bytes[4], self.bytes[5]]) as usize + 7
    }

    /// Length of primary plus secondary header for this packet type
    pub fn header_len(&self) -> usize {
        match (self.has_secondary_header(), self.is_command()) {
            (false, _) => PRIMARY_HEADER_LEN,
            (true, true) => CMD_HEADER_LEN,
            (true, false) => TLM_HEADER_LEN,
        }
    }

    /// Function code of a command packet
    pub fn function_code(&self) -> Option<u8> {
        if self.is_command() && self.has_secondary_header() && self.bytes.len() >= CMD_HEADER_LEN
        {
            Some(self.bytes[PRIMARY_HEADER_LEN] & FCN_CODE_MASK)
        } else {
            None
        }
    }

    /// True when XOR over the whole command packet is 0xFF
    pub fn checksum_valid(&self) -> bool {
        self.bytes.iter().fold(0u8, |acc, b| acc ^ b) == 0xFF
    }

    /// Payload bytes, bounded by both the buffer and the declared size
    pub fn payload(&self) -> &[u8] {
        let end = self.declared_size().min(self.bytes.len());
        let start = self.header_len();
        if start >= end {
            return &[];
        }
        &self.bytes[start..end]
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Length of the underlying buffer
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn put_primary_header(buf: &mut BytesMut, stream: u16, sequence: u16, total_len: usize) {
    buf.put_u16(stream & MSG_ID_MASK);
    buf.put_u16(SEQ_UNSEGMENTED | (sequence & SEQ_COUNT_MASK));
    buf.put_u16((total_len.saturating_sub(7)) as u16);
}

// ============================================================================
// Tests
// ============================================================================
