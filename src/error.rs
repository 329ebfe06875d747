//! Centralized error types for the gateway
//!
//! All gateway errors are represented by the `GatewayError` enum.
//! Use `Result<T>` as shorthand for `std::result::Result<T, GatewayError>`.
//!
//! Component-level errors (`BusError`, `EncodeError`) live next to the code
//! that produces them and are wrapped here.

use crate::bus::BusError;
use crate::codec::EncodeError;
use crate::message::MsgId;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

/// All gateway errors
#[derive(Debug)]
pub enum GatewayError {
    // === Configuration ===
    /// Failed to read a config or table file
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Config or table file is not valid TOML for its schema
    ConfigParse { path: PathBuf, reason: String },
    /// Invalid config value
    ConfigValidation { field: &'static str, reason: String },

    // === Software bus ===
    Bus(BusError),

    // === Encoding ===
    Encode(EncodeError),

    // === Sockets ===
    /// Failed to create the telemetry output socket
    SocketOpen { source: std::io::Error },
    /// Telemetry datagram could not be sent
    SocketSend {
        dest: SocketAddr,
        source: std::io::Error,
    },
    /// Send attempted before the output socket was opened
    SocketClosed,
    /// Failed to bind the command uplink socket
    UplinkBind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    // === Command protocol ===
    /// Buffer too short to hold a packet header
    MalformedMessage { len: usize },
    /// Message id is neither the command nor the housekeeping request id
    UnknownMessageId { msg_id: MsgId },
    /// Function code does not name a command
    UnknownFunctionCode { code: u8 },
    /// Command payload length does not match the command definition
    WrongLength {
        msg_id: MsgId,
        code: u8,
        expected: usize,
        actual: usize,
    },
    /// EnableOutput carried something that is not an IPv4 address
    InvalidDestination { value: String },

    // === Runtime ===
    /// Tokio runtime creation failed
    Runtime { source: std::io::Error },
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigRead { source, .. }
            | Self::SocketOpen { source }
            | Self::SocketSend { source, .. }
            | Self::UplinkBind { source, .. }
            | Self::Runtime { source } => Some(source),
            Self::Bus(e) => Some(e),
            Self::Encode(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigRead { path, .. } => write!(f, "Cannot read {}", path.display()),
            Self::ConfigParse { path, reason } => {
                write!(f, "Cannot parse {}: {}", path.display(), reason)
            }
            Self::ConfigValidation { field, reason } => {
                write!(f, "Invalid {}: {}", field, reason)
            }
            Self::Bus(e) => write!(f, "Software bus error: {}", e),
            Self::Encode(e) => write!(f, "Encode error: {}", e),
            Self::SocketOpen { source } => write!(f, "Cannot open telemetry socket: {}", source),
            Self::SocketSend { dest, source } => write!(f, "sendto {} failed: {}", dest, source),
            Self::SocketClosed => write!(f, "Telemetry socket is not open"),
            Self::UplinkBind { addr, .. } => write!(f, "Cannot bind command uplink on {}", addr),
            Self::MalformedMessage { len } => {
                write!(f, "Malformed message ({} bytes, header incomplete)", len)
            }
            Self::UnknownMessageId { msg_id } => write!(f, "Unknown message id {}", msg_id),
            Self::UnknownFunctionCode { code } => {
                write!(f, "Unknown command function code 0x{:x}", code)
            }
            Self::WrongLength {
                msg_id,
                code,
                expected,
                actual,
            } => write!(
                f,
                "Invalid length for command: ID = {}, CC = {}, length = {} (expected {})",
                msg_id, code, actual, expected
            ),
            Self::InvalidDestination { value } => {
                write!(f, "Invalid destination address '{}'", value)
            }
            Self::Runtime { .. } => write!(f, "Failed to create runtime"),
        }
    }
}

impl From<BusError> for GatewayError {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

impl From<EncodeError> for GatewayError {
    fn from(e: EncodeError) -> Self {
        Self::Encode(e)
    }
}

impl GatewayError {
    /// True for errors that count against the command-error counter
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::MalformedMessage { .. }
                | Self::UnknownMessageId { .. }
                | Self::UnknownFunctionCode { .. }
                | Self::WrongLength { .. }
                | Self::InvalidDestination { .. }
        )
    }
}

/// Alias for Result with GatewayError
pub type Result<T> = std::result::Result<T, GatewayError>;
