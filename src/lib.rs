//! Telemetry output gateway
//!
//! Drains subscribed telemetry from a publish/subscribe software bus and
//! forwards it as UDP datagrams, steered by a small ground command protocol
//! (enable output, add/remove streams, housekeeping).
//!
//! Layers, leaf to root:
//! - [`message`] - CCSDS packets and payload layouts
//! - [`bus`] - the software bus trait and the in-process [`bus::LocalBus`]
//! - [`subscription`] - the subscription table and live set
//! - [`codec`] - passthrough and schema-packed encoders
//! - [`transport`] - UDP downlink and command uplink
//! - [`gateway`] - forwarder, dispatcher, handlers and the periodic driver

pub mod bus;
pub mod cli;
pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod message;
pub mod subscription;
pub mod transport;

pub use error::{GatewayError, Result};
