//! Telemetry output gateway
//!
//! The gateway handles:
//! - Forwarding subscribed telemetry from the bus to the ground (`forwarder`)
//! - Ground commands that steer the forwarding (`dispatcher`, `handlers`)
//! - Housekeeping counters
//!
//! The gateway does NOT handle:
//! - Receiving ground commands from the network (that's the uplink's job)
//! - Signal handling (that's main's job)
//!
//! All state lives in one [`GatewayContext`] owned by the driver task, so no
//! locks are needed; the bus is the only shared piece and guards itself.

pub mod dispatcher;
pub mod forwarder;
pub mod handlers;

pub use dispatcher::CommandCode;
pub use forwarder::{CycleReport, ForwardStats, Forwarder};

use crate::bus::{Bus, PipeId, Qos};
use crate::codec::Encoder;
use crate::constants::{
    CMD_MID, DEFAULT_CMD_PIPE_DEPTH, DEFAULT_MAX_TLM_PER_CYCLE, DEFAULT_TASK_INTERVAL_MS,
    DEFAULT_TLM_PIPE_DEPTH, DEFAULT_TLM_PORT, SEND_HK_MID, VERSION,
};
use crate::error::Result;
use crate::logging::{EventId, EventReporter};
use crate::message::MsgId;
use crate::subscription::{SubscriptionSet, SubscriptionTable};
use crate::transport::Downlink;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

const CMD_PIPE_NAME: &str = "GATEWAY_CMD";
const TLM_PIPE_NAME: &str = "GATEWAY_TLM";

/// Command and command-error counters reported in housekeeping
///
/// Both wrap at 256.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HousekeepingCounters {
    pub command: u8,
    pub error: u8,
}

impl HousekeepingCounters {
    pub fn inc_command(&mut self) {
        self.command = self.command.wrapping_add(1);
    }

    pub fn inc_error(&mut self) {
        self.error = self.error.wrapping_add(1);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Runtime parameters of the gateway
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub cmd_pipe_depth: usize,
    pub tlm_pipe_depth: usize,
    pub max_tlm_per_cycle: usize,
    /// Initial output address; EnableOutput may replace the IP
    pub destination: SocketAddrV4,
    pub task_interval: Duration,
    /// Open the downlink at startup instead of waiting for EnableOutput
    pub enable_on_start: bool,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            cmd_pipe_depth: DEFAULT_CMD_PIPE_DEPTH,
            tlm_pipe_depth: DEFAULT_TLM_PIPE_DEPTH,
            max_tlm_per_cycle: DEFAULT_MAX_TLM_PER_CYCLE,
            destination: SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_TLM_PORT),
            task_interval: Duration::from_millis(DEFAULT_TASK_INTERVAL_MS),
            enable_on_start: false,
        }
    }
}

/// Where the initial subscriptions come from
#[derive(Debug, Clone, Copy)]
pub enum TableSource<'a> {
    /// Built-in table
    Defaults,
    /// Table file; a load failure leaves the gateway with no subscriptions
    File(&'a Path),
}

/// Owned gateway state, mutated only by the driver task
pub struct GatewayContext<E: Encoder, D: Downlink> {
    bus: Arc<dyn Bus>,
    events: EventReporter,
    cmd_pipe: PipeId,
    forwarder: Forwarder<E, D>,
    subscriptions: SubscriptionSet,
    counters: HousekeepingCounters,
    interval: Duration,
}

impl<E: Encoder, D: Downlink> GatewayContext<E, D> {
    /// Create the pipes, subscribe, and announce the gateway
    ///
    /// # Errors
    ///
    /// Only pipe creation is fatal; subscription and table problems are
    /// reported as events and the gateway starts anyway.
    pub fn init(
        bus: Arc<dyn Bus>,
        events: EventReporter,
        settings: &GatewaySettings,
        encoder: E,
        downlink: D,
        table: TableSource<'_>,
    ) -> Result<Self> {
        let cmd_pipe = bus
            .create_pipe(CMD_PIPE_NAME, settings.cmd_pipe_depth)
            .map_err(|e| {
                events.error(EventId::CmdPipeErr, format!("Cannot create command pipe: {}", e));
                e
            })?;

        for msg_id in [CMD_MID, SEND_HK_MID] {
            subscribe_or_report(&*bus, &events, msg_id, cmd_pipe, Qos::default(), settings.cmd_pipe_depth as u16);
        }

        let tlm_pipe = bus
            .create_pipe(TLM_PIPE_NAME, settings.tlm_pipe_depth)
            .map_err(|e| {
                events.error(EventId::TlmPipeErr, format!("Cannot create telemetry pipe: {}", e));
                e
            })?;

        let subscriptions = match table {
            TableSource::Defaults => SubscriptionTable::defaults(),
            TableSource::File(path) => match SubscriptionTable::load(path) {
                Ok(set) => set,
                Err(e) => {
                    events.error(EventId::TableErr, format!("Cannot load subscription table: {}", e));
                    SubscriptionSet::new()
                }
            },
        };

        for entry in subscriptions.iter() {
            subscribe_or_report(&*bus, &events, entry.topic, tlm_pipe, entry.qos, entry.buf_limit);
        }
        debug!("{} telemetry subscriptions", subscriptions.len());

        let forwarder = Forwarder::new(
            tlm_pipe,
            encoder,
            downlink,
            settings.destination,
            settings.max_tlm_per_cycle,
        );

        let mut ctx = Self {
            bus,
            events,
            cmd_pipe,
            forwarder,
            subscriptions,
            counters: HousekeepingCounters::default(),
            interval: settings.task_interval,
        };

        ctx.events.info(
            EventId::Init,
            format!("tlm-gateway v{} initialized, awaiting EnableOutput", VERSION),
        );

        if settings.enable_on_start {
            ctx.open_output(None);
        }

        Ok(ctx)
    }

    /// One driver iteration: telemetry first, then commands
    pub fn run_cycle(&mut self) -> CycleReport {
        let report = self.forwarder.forward_cycle(&*self.bus, &self.events);
        self.process_commands();
        report
    }

    /// Run cycles at the configured cadence until `shutdown` is set
    ///
    /// The current cycle always completes; the socket is closed on return.
    pub async fn run(mut self, shutdown: Arc<AtomicBool>) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Gateway running every {} ms, output to {}",
            self.interval.as_millis(),
            self.forwarder.destination()
        );

        while !shutdown.load(Ordering::Relaxed) {
            ticker.tick().await;
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            self.run_cycle();
        }

        let stats = self.forwarder.stats();
        info!(
            "Gateway stopped: {} forwarded, {} suppressed, {} disabled, {} encode errors",
            stats.forwarded, stats.skipped_suppressed, stats.skipped_disabled, stats.encode_errors
        );
        self.forwarder.close();
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn counters(&self) -> HousekeepingCounters {
        self.counters
    }

    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }

    pub fn forwarder(&self) -> &Forwarder<E, D> {
        &self.forwarder
    }

    pub fn cmd_pipe(&self) -> PipeId {
        self.cmd_pipe
    }

    pub fn tlm_pipe(&self) -> PipeId {
        self.forwarder.pipe()
    }
}

fn subscribe_or_report(
    bus: &dyn Bus,
    events: &EventReporter,
    msg_id: MsgId,
    pipe: PipeId,
    qos: Qos,
    buf_limit: u16,
) {
    if let Err(e) = bus.subscribe(msg_id, pipe, qos, buf_limit) {
        events.error(
            EventId::SubscribeErr,
            format!("Cannot subscribe {}: {}", msg_id, e),
        );
    }
}
