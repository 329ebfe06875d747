//! Telemetry forwarder
//!
//! Drains the telemetry pipe a bounded number of messages per cycle, encodes
//! each one and sends it as a datagram. A failed send latches output
//! suppression until the next EnableOutput; messages drained while
//! suppressed or before the socket exists are discarded.

use crate::bus::{Bus, PipeId};
use crate::codec::Encoder;
use crate::error::Result;
use crate::logging::{EventId, EventReporter};
use crate::transport::Downlink;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tracing::trace;

/// Running totals over the forwarder's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    pub forwarded: u64,
    pub skipped_suppressed: u64,
    pub skipped_disabled: u64,
    pub encode_errors: u64,
    pub send_errors: u64,
}

/// Outcome of one forward cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Messages taken off the pipe
    pub processed: usize,
    /// Datagrams actually sent
    pub sent: usize,
}

/// Telemetry path from the bus to the ground
///
/// # Type Parameters
///
/// - `E`: encoder chosen at startup
/// - `D`: datagram socket, owned exclusively by the forwarder
pub struct Forwarder<E: Encoder, D: Downlink> {
    pipe: PipeId,
    encoder: E,
    downlink: D,
    destination: SocketAddrV4,
    suppressed: bool,
    max_per_cycle: usize,
    stats: ForwardStats,
}

impl<E: Encoder, D: Downlink> Forwarder<E, D> {
    pub fn new(
        pipe: PipeId,
        encoder: E,
        downlink: D,
        destination: SocketAddrV4,
        max_per_cycle: usize,
    ) -> Self {
        Self {
            pipe,
            encoder,
            downlink,
            destination,
            suppressed: false,
            max_per_cycle,
            stats: ForwardStats::default(),
        }
    }

    /// Drain up to `max_per_cycle` messages from the telemetry pipe
    pub fn forward_cycle(&mut self, bus: &dyn Bus, events: &EventReporter) -> CycleReport {
        let mut report = CycleReport::default();

        while report.processed < self.max_per_cycle {
            let Some(msg) = bus.poll(self.pipe) else {
                break;
            };
            report.processed += 1;

            if self.suppressed {
                self.stats.skipped_suppressed += 1;
                continue;
            }
            if !self.downlink.is_open() {
                self.stats.skipped_disabled += 1;
                continue;
            }

            let packet = match self.encoder.encode(&msg) {
                Ok(packet) => packet,
                Err(e) => {
                    self.stats.encode_errors += 1;
                    events.error(
                        EventId::EncodeErr,
                        format!("Error packing output {}: {}", msg.msg_id(), e),
                    );
                    continue;
                }
            };

            match self
                .downlink
                .send_to(&packet, SocketAddr::V4(self.destination))
            {
                Ok(_) => {
                    trace!("{} -> {} ({} B)", msg.msg_id(), self.destination, packet.len());
                    self.stats.forwarded += 1;
                    report.sent += 1;
                }
                Err(e) => {
                    self.stats.send_errors += 1;
                    self.suppressed = true;
                    events.error(
                        EventId::OutputStopped,
                        format!("{}, telemetry output suppressed until next enable", e),
                    );
                }
            }
        }

        report
    }

    /// Point the stream at `ip` (or keep the current address), lift
    /// suppression, and open the socket if this is the first enable
    ///
    /// # Errors
    ///
    /// `GatewayError::SocketOpen` when the socket cannot be created; the
    /// downlink then stays off and the next enable retries.
    pub fn enable_output(&mut self, ip: Option<Ipv4Addr>) -> Result<()> {
        if let Some(ip) = ip {
            self.destination.set_ip(ip);
        }
        self.suppressed = false;

        if !self.downlink.is_open() {
            self.downlink.open()?;
        }
        Ok(())
    }

    /// Release the socket
    pub fn close(&mut self) {
        self.downlink.close();
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn is_open(&self) -> bool {
        self.downlink.is_open()
    }

    pub fn destination(&self) -> SocketAddrV4 {
        self.destination
    }

    pub fn pipe(&self) -> PipeId {
        self.pipe
    }

    pub fn stats(&self) -> ForwardStats {
        self.stats
    }

    pub fn downlink(&self) -> &D {
        &self.downlink
    }
}
