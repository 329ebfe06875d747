//! Transport abstraction for the gateway's network I/O
//!
//! Separates socket concerns from gateway logic:
//! - **Downlink**: how encoded telemetry leaves the process (UDP datagrams)
//! - **Uplink**: how ground commands reach the bus (see [`uplink`])
//!
//! Execution model:
//! - Downlink: owned by the forwarder, single blocking `sendto` per packet
//! - Uplink: async tokio task feeding the bus
//!
//! # Adding a new downlink
//!
//! 1. Create `transport/my_downlink.rs`
//! 2. Implement the `Downlink` trait
//! 3. Add `pub mod my_downlink;` here

pub mod udp;
pub mod uplink;

pub use udp::UdpDownlink;
pub use uplink::CommandUplink;

use crate::error::Result;
use std::net::SocketAddr;

/// Outgoing datagram socket owned by the forwarder
///
/// A downlink does NOT handle:
/// - Encoding (that's the encoder's job)
/// - Suppression after failures (that's the forwarder's job)
///
/// # Lifecycle
///
/// 1. Created closed
/// 2. `open()` on the first EnableOutput; later enables keep the socket
/// 3. `send_to()` one datagram per forwarded packet
/// 4. `close()` on shutdown; dropping the downlink also releases the socket
pub trait Downlink: Send {
    /// Create the socket if it does not exist yet
    ///
    /// # Errors
    ///
    /// `GatewayError::SocketOpen` if the OS refuses the socket.
    fn open(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Send one datagram
    ///
    /// # Errors
    ///
    /// `GatewayError::SocketClosed` before `open()`, `GatewayError::SocketSend`
    /// when the send syscall fails.
    fn send_to(&mut self, buf: &[u8], dest: SocketAddr) -> Result<usize>;

    fn close(&mut self);
}
