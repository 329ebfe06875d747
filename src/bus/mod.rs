//! Software bus abstraction
//!
//! The gateway only consumes the bus; it never assumes how messages are
//! delivered. Everything goes through the [`Bus`] trait:
//! - pipes: bounded FIFO mailboxes owned by one consumer
//! - subscriptions: route a message id into a pipe with a QoS and a limit
//! - transmit: publish a message to every subscribed pipe
//!
//! [`LocalBus`] is the in-process implementation used by the binary and tests.
//!
//! # Adding a new bus
//!
//! 1. Create `bus/my_bus.rs`
//! 2. Implement the `Bus` trait
//! 3. Add `pub mod my_bus;` here

pub mod local;

pub use local::LocalBus;

use crate::message::{Message, MsgId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle to a pipe created on a bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipeId(pub(crate) usize);

impl fmt::Display for PipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipe#{}", self.0)
    }
}

/// Quality of service requested for a subscription
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Qos {
    pub priority: u8,
    pub reliability: u8,
}

/// Errors reported by a bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Pipe name already taken
    DuplicatePipe { name: String },
    /// Requested depth is zero or above the bus maximum
    InvalidDepth { depth: usize },
    /// No more pipes available
    MaxPipesReached,
    /// Handle does not name a pipe on this bus
    InvalidPipe { pipe: PipeId },
    /// Message id outside the bus id range
    InvalidMsgId { msg_id: MsgId },
    /// Subscription limit of zero
    InvalidBufLimit { msg_id: MsgId },
    /// Unsubscribe for a route the pipe does not have
    NotSubscribed { msg_id: MsgId, pipe: PipeId },
}

impl std::error::Error for BusError {}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicatePipe { name } => write!(f, "pipe '{}' already exists", name),
            Self::InvalidDepth { depth } => write!(f, "invalid pipe depth {}", depth),
            Self::MaxPipesReached => write!(f, "no pipes left"),
            Self::InvalidPipe { pipe } => write!(f, "{} does not exist", pipe),
            Self::InvalidMsgId { msg_id } => write!(f, "invalid message id {}", msg_id),
            Self::InvalidBufLimit { msg_id } => {
                write!(f, "zero buffer limit for {}", msg_id)
            }
            Self::NotSubscribed { msg_id, pipe } => {
                write!(f, "{} is not subscribed to {}", pipe, msg_id)
            }
        }
    }
}

/// Publish/subscribe message bus
///
/// Implementations guard their own state; every method takes `&self` so the
/// bus can be shared between the gateway task and the uplink.
pub trait Bus: Send + Sync {
    /// Create a bounded pipe
    fn create_pipe(&self, name: &str, depth: usize) -> Result<PipeId, BusError>;

    /// Route `msg_id` into `pipe`
    ///
    /// Subscribing twice is idempotent: the route is refreshed with the new
    /// QoS and limit.
    fn subscribe(
        &self,
        msg_id: MsgId,
        pipe: PipeId,
        qos: Qos,
        buf_limit: u16,
    ) -> Result<(), BusError>;

    /// Remove the route for `msg_id` from `pipe`
    fn unsubscribe(&self, msg_id: MsgId, pipe: PipeId) -> Result<(), BusError>;

    /// Take the oldest message from `pipe` without blocking
    fn poll(&self, pipe: PipeId) -> Option<Message>;

    /// Publish to every pipe subscribed to the message id
    fn transmit(&self, msg: Message) -> Result<(), BusError>;
}
