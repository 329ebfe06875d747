//! UDP telemetry downlink
//!
//! One unconnected IPv4 datagram socket bound to an ephemeral port. The
//! destination is passed on every send so EnableOutput can retarget the
//! stream without touching the socket.

use super::Downlink;
use crate::error::{GatewayError, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use tracing::debug;

/// Blocking UDP downlink
#[derive(Default)]
pub struct UdpDownlink {
    socket: Option<UdpSocket>,
}

impl UdpDownlink {
    /// Create a closed downlink
    pub fn new() -> Self {
        Self::default()
    }

    /// Local address of the socket, once open
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }
}

impl Downlink for UdpDownlink {
    fn open(&mut self) -> Result<()> {
        if self.socket.is_some() {
            return Ok(());
        }

        let map_err = |e| GatewayError::SocketOpen { source: e };
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(map_err)?;
        let any = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
        socket.bind(&SocketAddr::V4(any).into()).map_err(map_err)?;

        let socket: UdpSocket = socket.into();
        debug!("Telemetry socket open on {:?}", socket.local_addr().ok());
        self.socket = Some(socket);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn send_to(&mut self, buf: &[u8], dest: SocketAddr) -> Result<usize> {
        let socket = self.socket.as_ref().ok_or(GatewayError::SocketClosed)?;
        socket
            .send_to(buf, dest)
            .map_err(|e| GatewayError::SocketSend { dest, source: e })
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("Telemetry socket closed");
        }
    }
}
