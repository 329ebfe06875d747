//! Passthrough encoder
//!
//! Forwards the first `declared size` bytes of the bus buffer unchanged.
//! The result is a slice of the original `Bytes`, so nothing is copied.

use super::{checked_size, EncodeError, Encoder};
use crate::constants::DEFAULT_MAX_PACKET_SIZE;
use crate::message::Message;
use bytes::Bytes;

/// Zero-copy encoder for ground systems that read native packets
pub struct PassthroughEncoder {
    max_packet_size: usize,
}

impl PassthroughEncoder {
    pub fn new(max_packet_size: usize) -> Self {
        Self { max_packet_size }
    }
}

impl Default for PassthroughEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PACKET_SIZE)
    }
}

impl Encoder for PassthroughEncoder {
    fn encode(&mut self, msg: &Message) -> Result<Bytes, EncodeError> {
        let size = checked_size(msg, self.max_packet_size)?;
        Ok(msg.as_bytes().slice(..size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MsgId;

    #[test]
    fn test_passthrough_is_identity() {
        let msg = Message::telemetry_at(MsgId::new(0x0880), 7, 1, &[1, 2, 3, 4]);
        let mut enc = PassthroughEncoder::default();

        let out = enc.encode(&msg).unwrap();

        assert_eq!(out, *msg.as_bytes());
    }

    #[test]
    fn test_passthrough_trims_trailing_bytes() {
        let mut raw = Message::telemetry_at(MsgId::new(0x0880), 0, 0, &[9, 9])
            .as_bytes()
            .to_vec();
        raw.extend_from_slice(&[0xEE; 5]);
        let msg = Message::from_bytes(raw).unwrap();

        let out = PassthroughEncoder::default().encode(&msg).unwrap();

        assert_eq!(out.len(), 14);
        assert_eq!(&out[12..], &[9, 9]);
    }

    #[test]
    fn test_passthrough_truncated_buffer() {
        // Length field says 20 bytes, only 10 present
        let raw = vec![0x08, 0x80, 0xC0, 0x00, 0x00, 13, 0, 0, 0, 0];
        let msg = Message::from_bytes(raw).unwrap();

        assert_eq!(
            PassthroughEncoder::default().encode(&msg),
            Err(EncodeError::Truncated {
                declared: 20,
                available: 10
            })
        );
    }

    #[test]
    fn test_passthrough_respects_bound() {
        let msg = Message::telemetry_at(MsgId::new(0x0880), 0, 0, &[0; 100]);
        let mut enc = PassthroughEncoder::new(64);

        assert!(matches!(
            enc.encode(&msg),
            Err(EncodeError::TooLarge { size: 112, max: 64 })
        ));
    }

    #[test]
    fn test_passthrough_empty_payload() {
        let msg = Message::telemetry_at(MsgId::new(0x0880), 0, 0, &[]);
        let out = PassthroughEncoder::default().encode(&msg).unwrap();
        assert_eq!(out.len(), 12);
    }
}
