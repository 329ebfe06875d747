//! Ground command handlers
//!
//! Handlers bump the command counter themselves. A handler only returns an
//! error for a malformed argument; bus and socket failures are reported as
//! events and the command still counts as executed.

use super::GatewayContext;
use crate::codec::Encoder;
use crate::constants::{DATA_TYPES_MID, HK_TLM_MID, VERSION};
use crate::error::{GatewayError, Result};
use crate::logging::EventId;
use crate::message::payload::{
    AddPacketCmd, DiagnosticSample, EnableOutputCmd, HousekeepingTlm, RemovePacketCmd,
};
use crate::message::Message;
use crate::subscription::SubscriptionEntry;
use crate::transport::Downlink;
use std::net::Ipv4Addr;

impl<E: Encoder, D: Downlink> GatewayContext<E, D> {
    pub(crate) fn noop(&mut self) -> Result<()> {
        self.events
            .info(EventId::Noop, format!("No-op command, tlm-gateway v{}", VERSION));
        self.counters.inc_command();
        Ok(())
    }

    /// Zero both counters; the reset itself is not counted
    pub(crate) fn reset_counters(&mut self) -> Result<()> {
        self.counters.reset();
        self.events.info(EventId::Reset, "Reset counters command");
        Ok(())
    }

    pub(crate) fn add_packet(&mut self, cmd: AddPacketCmd) -> Result<()> {
        let entry = SubscriptionEntry {
            topic: cmd.topic,
            qos: cmd.qos,
            buf_limit: cmd.buf_limit as u16,
        };

        if self.subscriptions.is_full() && !self.subscriptions.contains(cmd.topic) {
            self.events.error(
                EventId::AddPacketErr,
                format!("Cannot subscribe {}: subscription set full", cmd.topic),
            );
        } else {
            match self
                .bus
                .subscribe(entry.topic, self.tlm_pipe(), entry.qos, entry.buf_limit)
            {
                Ok(()) => {
                    self.subscriptions.upsert(entry);
                    self.events.info(
                        EventId::AddPacket,
                        format!(
                            "Forwarding {} (QoS {}.{}, limit {})",
                            cmd.topic, cmd.qos.priority, cmd.qos.reliability, cmd.buf_limit
                        ),
                    );
                }
                Err(e) => self.events.error(
                    EventId::AddPacketErr,
                    format!("Cannot subscribe {}: {}", cmd.topic, e),
                ),
            }
        }

        self.counters.inc_command();
        Ok(())
    }

    pub(crate) fn remove_packet(&mut self, cmd: RemovePacketCmd) -> Result<()> {
        match self.bus.unsubscribe(cmd.topic, self.tlm_pipe()) {
            Ok(()) => self
                .events
                .info(EventId::RemovePacket, format!("Stopped forwarding {}", cmd.topic)),
            Err(e) => self.events.error(
                EventId::RemovePacketErr,
                format!("Cannot unsubscribe {}: {}", cmd.topic, e),
            ),
        }
        self.subscriptions.remove(cmd.topic);

        self.counters.inc_command();
        Ok(())
    }

    pub(crate) fn remove_all(&mut self) -> Result<()> {
        let pipe = self.tlm_pipe();
        for entry in self.subscriptions.drain() {
            if let Err(e) = self.bus.unsubscribe(entry.topic, pipe) {
                self.events.error(
                    EventId::RemoveAllErr,
                    format!("Cannot unsubscribe {}: {}", entry.topic, e),
                );
            }
        }
        self.events
            .info(EventId::RemoveAll, "Stopped forwarding all telemetry");

        self.counters.inc_command();
        Ok(())
    }

    pub(crate) fn send_data_types(&mut self) -> Result<()> {
        let msg = Message::telemetry(DATA_TYPES_MID, &DiagnosticSample::FIXED.encode());
        if let Err(e) = self.bus.transmit(msg) {
            self.events.error(
                EventId::DataTypesErr,
                format!("Cannot publish data types sample: {}", e),
            );
        }

        self.counters.inc_command();
        Ok(())
    }

    /// # Errors
    ///
    /// `GatewayError::InvalidDestination` when the address is not IPv4; the
    /// output state is left untouched.
    pub(crate) fn enable_output(&mut self, cmd: EnableOutputCmd) -> Result<()> {
        let ip = if cmd.dest_ip.is_empty() {
            None
        } else {
            let ip = cmd
                .dest_ip
                .parse::<Ipv4Addr>()
                .map_err(|_| GatewayError::InvalidDestination {
                    value: cmd.dest_ip.clone(),
                })?;
            Some(ip)
        };

        self.open_output(ip);
        self.counters.inc_command();
        Ok(())
    }

    /// Enable the downlink, reporting the outcome as events
    pub(crate) fn open_output(&mut self, ip: Option<Ipv4Addr>) {
        let result = self.forwarder.enable_output(ip);
        self.events.info(
            EventId::OutputEnabled,
            format!(
                "Telemetry output enabled to {}",
                self.forwarder.destination().ip()
            ),
        );
        if let Err(e) = result {
            self.events
                .error(EventId::SocketErr, format!("Telemetry socket error: {}", e));
        }
    }

    /// Publish the counters; never touches them
    pub(crate) fn send_housekeeping(&mut self) {
        let hk = HousekeepingTlm {
            command_counter: self.counters.command,
            command_error_counter: self.counters.error,
        };
        if let Err(e) = self.bus.transmit(Message::telemetry(HK_TLM_MID, &hk.encode())) {
            self.events.error(
                EventId::HousekeepingErr,
                format!("Cannot publish housekeeping: {}", e),
            );
        }
    }
}
