//! Command and telemetry payload layouts
//!
//! Payloads are laid out the way the flight software keeps them in memory:
//! little-endian fields at their natural C alignment. The passthrough encoder
//! forwards these bytes untouched; the packed encoder rewrites them.

use crate::bus::Qos;
use crate::message::MsgId;
use bytes::{Buf, BufMut};

/// Length of the destination string in EnableOutput
pub const DEST_IP_LEN: usize = 16;

// =============================================================================
// Commands
// =============================================================================

/// AddPacket payload: `topic u16, priority u8, reliability u8, buf_limit u8, spare u8`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddPacketCmd {
    pub topic: MsgId,
    pub qos: Qos,
    pub buf_limit: u8,
}

impl AddPacketCmd {
    pub const LEN: usize = 6;

    pub fn decode(mut buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }
        let topic = MsgId::new(buf.get_u16_le());
        let priority = buf.get_u8();
        let reliability = buf.get_u8();
        let buf_limit = buf.get_u8();
        Some(Self {
            topic,
            qos: Qos {
                priority,
                reliability,
            },
            buf_limit,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.put_u16_le(self.topic.value());
        out.put_u8(self.qos.priority);
        out.put_u8(self.qos.reliability);
        out.put_u8(self.buf_limit);
        out.put_u8(0);
        out
    }
}

/// RemovePacket payload: `topic u16`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovePacketCmd {
    pub topic: MsgId,
}

impl RemovePacketCmd {
    pub const LEN: usize = 2;

    pub fn decode(mut buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }
        Some(Self {
            topic: MsgId::new(buf.get_u16_le()),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        self.topic.value().to_le_bytes().to_vec()
    }
}

/// EnableOutput payload: fixed 16-byte, NUL-terminated destination string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnableOutputCmd {
    /// Empty means "keep the previous destination"
    pub dest_ip: String,
}

impl EnableOutputCmd {
    pub const LEN: usize = DEST_IP_LEN;

    /// Reads up to the first NUL; a full field without terminator is accepted
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }
        let field = &buf[..Self::LEN];
        let end = field.iter().position(|&b| b == 0).unwrap_or(Self::LEN);
        Some(Self {
            dest_ip: String::from_utf8_lossy(&field[..end]).trim().to_string(),
        })
    }

    /// Truncates to 15 characters so the terminator always fits
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; Self::LEN];
        let src = self.dest_ip.as_bytes();
        let n = src.len().min(Self::LEN - 1);
        out[..n].copy_from_slice(&src[..n]);
        out
    }
}

// =============================================================================
// Telemetry
// =============================================================================

/// Housekeeping payload: `command_counter u8, command_error_counter u8, spare [u8; 2]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HousekeepingTlm {
    pub command_counter: u8,
    pub command_error_counter: u8,
}

impl HousekeepingTlm {
    pub const LEN: usize = 4;

    pub fn encode(&self) -> Vec<u8> {
        vec![self.command_counter, self.command_error_counter, 0, 0]
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }
        Some(Self {
            command_counter: buf[0],
            command_error_counter: buf[1],
        })
    }
}

/// Diagnostic sample with fixed values covering every primitive width
///
/// Ground tools compare the decoded packet against these literals to check
/// byte order and field widths end to end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiagnosticSample {
    pub synch: u16,
    pub bl1: bool,
    pub bl2: bool,
    pub b1: i8,
    pub b2: i8,
    pub b3: i8,
    pub b4: i8,
    pub w1: i16,
    pub w2: i16,
    pub dw1: i32,
    pub dw2: i32,
    pub f1: f32,
    pub f2: f32,
    pub df1: f64,
    pub df2: f64,
    pub str: [u8; 10],
}

impl DiagnosticSample {
    /// Native size including the 4-byte gap before the doubles and tail padding
    pub const LEN: usize = 64;

    pub const FIXED: DiagnosticSample = DiagnosticSample {
        synch: 0x6969,
        bl1: false,
        bl2: true,
        b1: 16,
        b2: 127,
        b3: 0x7F,
        b4: 0x45,
        w1: 0x2468,
        w2: 0x7FFF,
        dw1: 0x12345678,
        dw2: 0x87654321_u32 as i32,
        f1: 90.01,
        f2: 0.0000045,
        df1: 99.9,
        df2: 0.4444,
        str: *b"ABCDEFGHIJ",
    };

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.put_u16_le(self.synch);
        out.put_u8(self.bl1 as u8);
        out.put_u8(self.bl2 as u8);
        out.put_i8(self.b1);
        out.put_i8(self.b2);
        out.put_i8(self.b3);
        out.put_i8(self.b4);
        out.put_i16_le(self.w1);
        out.put_i16_le(self.w2);
        out.put_i32_le(self.dw1);
        out.put_i32_le(self.dw2);
        out.put_f32_le(self.f1);
        out.put_f32_le(self.f2);
        out.put_bytes(0, 4);
        out.put_f64_le(self.df1);
        out.put_f64_le(self.df2);
        out.put_slice(&self.str);
        out.put_bytes(0, Self::LEN - out.len());
        out
    }

    pub fn decode(mut buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }
        let synch = buf.get_u16_le();
        let bl1 = buf.get_u8() != 0;
        let bl2 = buf.get_u8() != 0;
        let b1 = buf.get_i8();
        let b2 = buf.get_i8();
        let b3 = buf.get_i8();
        let b4 = buf.get_i8();
        let w1 = buf.get_i16_le();
        let w2 = buf.get_i16_le();
        let dw1 = buf.get_i32_le();
        let dw2 = buf.get_i32_le();
        let f1 = buf.get_f32_le();
        let f2 = buf.get_f32_le();
        buf.advance(4);
        let df1 = buf.get_f64_le();
        let df2 = buf.get_f64_le();
        let mut str = [0u8; 10];
        buf.copy_to_slice(&mut str);
        Some(Self {
            synch,
            bl1,
            bl2,
            b1,
            b2,
            b3,
            b4,
            w1,
            w2,
            dw1,
            dw2,
            f1,
            f2,
            df1,
            df2,
            str,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_packet_layout() {
        let cmd = AddPacketCmd {
            topic: MsgId::new(0x0881),
            qos: Qos {
                priority: 1,
                reliability: 2,
            },
            buf_limit: 7,
        };
        let raw = cmd.encode();
        assert_eq!(raw, vec![0x81, 0x08, 1, 2, 7, 0]);
        assert_eq!(AddPacketCmd::decode(&raw), Some(cmd));
    }

    #[test]
    fn test_add_packet_short_payload() {
        assert_eq!(AddPacketCmd::decode(&[0x81, 0x08, 1]), None);
    }

    #[test]
    fn test_enable_output_nul_terminated() {
        let mut raw = [0u8; 16];
        raw[..9].copy_from_slice(b"10.0.0.42");
        let cmd = EnableOutputCmd::decode(&raw).unwrap();
        assert_eq!(cmd.dest_ip, "10.0.0.42");
    }

    #[test]
    fn test_enable_output_unterminated_field() {
        let raw = *b"123.123.123.1234";
        let cmd = EnableOutputCmd::decode(&raw).unwrap();
        assert_eq!(cmd.dest_ip, "123.123.123.1234");
    }

    #[test]
    fn test_enable_output_encode_keeps_terminator() {
        let cmd = EnableOutputCmd {
            dest_ip: "255.255.255.255xx".into(),
        };
        let raw = cmd.encode();
        assert_eq!(raw.len(), 16);
        assert_eq!(raw[15], 0);
    }

    #[test]
    fn test_diagnostic_sample_native_offsets() {
        let raw = DiagnosticSample::FIXED.encode();
        assert_eq!(raw.len(), DiagnosticSample::LEN);
        assert_eq!(&raw[0..2], &[0x69, 0x69]);
        assert_eq!(&raw[2..4], &[0, 1]);
        assert_eq!(&raw[4..8], &[16, 127, 0x7F, 0x45]);
        assert_eq!(&raw[8..10], &[0x68, 0x24]);
        assert_eq!(&raw[16..20], &[0x21, 0x43, 0x65, 0x87]);
        // doubles start 8-aligned after the gap
        assert_eq!(&raw[28..32], &[0, 0, 0, 0]);
        assert_eq!(&raw[32..40], &99.9f64.to_le_bytes());
        assert_eq!(&raw[48..58], b"ABCDEFGHIJ");
    }

    #[test]
    fn test_diagnostic_sample_decode() {
        let decoded = DiagnosticSample::decode(&DiagnosticSample::FIXED.encode()).unwrap();
        assert_eq!(decoded, DiagnosticSample::FIXED);
        assert_eq!(decoded.dw2 as u32, 0x87654321);
    }
}
