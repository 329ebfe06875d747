//! Encoder abstraction for outgoing telemetry
//!
//! Separates the wire format from the forwarding loop:
//! - **Encoder**: how a bus message becomes a datagram (passthrough, packed)
//! - **Downlink**: where the datagram goes (see `crate::transport`)
//!
//! The encoder is a type parameter of the forwarder, picked once at startup.
//!
//! # Adding a new encoder
//!
//! 1. Create `codec/my_encoder.rs`
//! 2. Implement the `Encoder` trait
//! 3. Add `pub mod my_encoder;` here and a variant to `EncoderKind`

pub mod packed;
pub mod passthrough;

pub use packed::{FieldType, PackedEncoder, Schema, TypeDatabase};
pub use passthrough::PassthroughEncoder;

use crate::message::{Message, MsgId};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-message encoding failures
///
/// Never fatal: the forwarder reports the error and moves to the next message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Length field claims more bytes than the buffer holds
    Truncated { declared: usize, available: usize },
    /// Encoded packet would not fit the output bound
    TooLarge { size: usize, max: usize },
    /// No schema for this message id
    UnknownType { msg_id: MsgId },
    /// Packet would have no data field after the primary header
    EmptyPacket { msg_id: MsgId },
    /// Payload shorter than its schema
    SizeMismatch {
        msg_id: MsgId,
        expected: usize,
        actual: usize,
    },
}

impl std::error::Error for EncodeError {}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated {
                declared,
                available,
            } => write!(
                f,
                "declared size {} exceeds buffer of {} bytes",
                declared, available
            ),
            Self::TooLarge { size, max } => {
                write!(f, "packet of {} bytes exceeds limit of {}", size, max)
            }
            Self::UnknownType { msg_id } => write!(f, "no schema for {}", msg_id),
            Self::EmptyPacket { msg_id } => {
                write!(f, "packed packet for {} has no data field", msg_id)
            }
            Self::SizeMismatch {
                msg_id,
                expected,
                actual,
            } => write!(
                f,
                "payload of {} is {} bytes, schema needs {}",
                msg_id, actual, expected
            ),
        }
    }
}

/// Encoder trait for outgoing telemetry
///
/// Turns one bus message into the exact bytes of one datagram.
pub trait Encoder: Send {
    fn encode(&mut self, msg: &Message) -> Result<Bytes, EncodeError>;
}

/// Encoder selected in configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderKind {
    /// Forward bus bytes unchanged
    #[default]
    Passthrough,
    /// Schema-driven big-endian packing
    Packed,
}

impl fmt::Display for EncoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passthrough => write!(f, "passthrough"),
            Self::Packed => write!(f, "packed"),
        }
    }
}

impl std::str::FromStr for EncoderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passthrough" => Ok(Self::Passthrough),
            "packed" => Ok(Self::Packed),
            other => Err(format!(
                "unknown encoder '{}' (expected passthrough or packed)",
                other
            )),
        }
    }
}

/// Check the declared size against the buffer and the output bound
pub(crate) fn checked_size(msg: &Message, max: usize) -> Result<usize, EncodeError> {
    let declared = msg.declared_size();
    if declared > msg.len() {
        return Err(EncodeError::Truncated {
            declared,
            available: msg.len(),
        });
    }
    if declared > max {
        return Err(EncodeError::TooLarge {
            size: declared,
            max,
        });
    }
    Ok(declared)
}
