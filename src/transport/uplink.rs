//! UDP command uplink
//!
//! Listens for ground command datagrams and publishes each one on the bus,
//! where the gateway's command pipe picks it up. One datagram is one packet;
//! anything shorter than a primary header is dropped.

use crate::bus::Bus;
use crate::constants::{
    MAX_SOCKET_RETRY_ATTEMPTS, RETRY_BASE_DELAY_MS, UPLINK_BUFFER_SIZE, UPLINK_POLL_MS,
};
use crate::error::{GatewayError, Result};
use crate::message::Message;
use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Command ingest from the ground
///
/// # Example
///
/// ```ignore
/// let uplink = CommandUplink::new("127.0.0.1:1234".parse()?);
/// let task = uplink.spawn(bus.clone(), shutdown.clone())?;
/// ```
pub struct CommandUplink {
    addr: SocketAddr,
}

impl CommandUplink {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Bind and start the receive task
    ///
    /// Must be called from within a tokio runtime. The task stops once
    /// `shutdown` is set.
    ///
    /// # Errors
    ///
    /// `GatewayError::UplinkBind` if the port stays busy after retries.
    pub fn spawn(self, bus: Arc<dyn Bus>, shutdown: Arc<AtomicBool>) -> Result<JoinHandle<()>> {
        let socket = create_reusable_udp_socket(self.addr)?;
        let local = socket.local_addr().unwrap_or(self.addr);
        info!("Command uplink listening on {}", local);

        Ok(tokio::spawn(async move {
            let mut buf = vec![0u8; UPLINK_BUFFER_SIZE];

            while !shutdown.load(Ordering::Relaxed) {
                match tokio::time::timeout(
                    Duration::from_millis(UPLINK_POLL_MS),
                    socket.recv_from(&mut buf),
                )
                .await
                {
                    Ok(Ok((len, from))) => {
                        publish(&*bus, Bytes::copy_from_slice(&buf[..len]), from);
                    }
                    Ok(Err(e)) => {
                        debug!("Uplink receive error: {}", e);
                    }
                    Err(_) => {
                        // Timeout - check shutdown flag
                    }
                }
            }
            debug!("Command uplink stopped");
        }))
    }
}

/// Wait for an uplink task to finish
///
/// Returns false when the task panicked or was cancelled; the failure is logged.
pub async fn join(task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            warn!("Command uplink task failed: {}", e);
            false
        }
    }
}

fn publish(bus: &dyn Bus, data: Bytes, from: SocketAddr) {
    let msg = match Message::from_bytes(data) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Dropped datagram from {}: {}", from, e);
            return;
        }
    };

    if msg.is_command() && !msg.checksum_valid() {
        debug!("Command {} from {} has a bad checksum", msg.msg_id(), from);
    }

    if let Err(e) = bus.transmit(msg) {
        warn!("Dropped datagram from {}: {}", from, e);
    }
}

/// Create a UDP socket with SO_REUSEADDR for quick rebind after restart
///
/// Retries a few times if the address is still in use.
fn create_reusable_udp_socket(addr: SocketAddr) -> Result<UdpSocket> {
    let map_err = |e| GatewayError::UplinkBind { addr, source: e };
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    for attempt in 0..MAX_SOCKET_RETRY_ATTEMPTS {
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(map_err)?;
        socket.set_reuse_address(true).map_err(map_err)?;
        socket.set_nonblocking(true).map_err(map_err)?;

        match socket.bind(&addr.into()) {
            Ok(_) => {
                let std_socket: std::net::UdpSocket = socket.into();
                return UdpSocket::from_std(std_socket).map_err(map_err);
            }
            Err(_) if attempt < MAX_SOCKET_RETRY_ATTEMPTS - 1 => {
                // Exponential backoff: 200ms, 400ms, 800ms, 1600ms
                std::thread::sleep(Duration::from_millis(RETRY_BASE_DELAY_MS * (1 << attempt)));
            }
            Err(e) => return Err(map_err(e)),
        }
    }

    Err(GatewayError::UplinkBind {
        addr,
        source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "failed after retries"),
    })
}
