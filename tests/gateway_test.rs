//! Integration tests for the gateway command and forwarding paths
//!
//! Drives a real `LocalBus` and `GatewayContext` with a mock downlink that
//! captures datagrams instead of sending them.

use bytes::Bytes;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tlm_gateway::bus::{Bus, LocalBus, Qos};
use tlm_gateway::codec::PassthroughEncoder;
use tlm_gateway::constants::{CMD_MID, DATA_TYPES_MID, HK_TLM_MID, MAX_SUBSCRIPTIONS, SEND_HK_MID};
use tlm_gateway::error::{GatewayError, Result};
use tlm_gateway::gateway::{CommandCode, GatewayContext, GatewaySettings, TableSource};
use tlm_gateway::logging::{Event, EventId, EventReporter};
use tlm_gateway::message::payload::{
    AddPacketCmd, DiagnosticSample, EnableOutputCmd, HousekeepingTlm, RemovePacketCmd,
};
use tlm_gateway::message::{Message, MsgId, TLM_HEADER_LEN};
use tlm_gateway::transport::Downlink;
use tokio::sync::mpsc;

// =============================================================================
// Mock Downlink
// =============================================================================

/// Mock downlink for testing forwarding without real sockets
///
/// Clones share state, so a test keeps one handle while the gateway owns
/// the other.
#[derive(Clone, Default)]
struct MockDownlink {
    open: Arc<AtomicBool>,
    fail_send: Arc<AtomicBool>,
    sent: Arc<Mutex<Vec<(Bytes, SocketAddr)>>>,
}

impl MockDownlink {
    fn sent(&self) -> Vec<(Bytes, SocketAddr)> {
        self.sent.lock().clone()
    }

    fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    fn fail_sends(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }
}

impl Downlink for MockDownlink {
    fn open(&mut self) -> Result<()> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn send_to(&mut self, buf: &[u8], dest: SocketAddr) -> Result<usize> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(GatewayError::SocketSend {
                dest,
                source: std::io::Error::new(std::io::ErrorKind::Other, "network down"),
            });
        }
        self.sent.lock().push((Bytes::copy_from_slice(buf), dest));
        Ok(buf.len())
    }

    fn close(&mut self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// Harness
// =============================================================================

type TestGateway = GatewayContext<PassthroughEncoder, MockDownlink>;

struct Harness {
    bus: Arc<LocalBus>,
    gw: TestGateway,
    downlink: MockDownlink,
    events: mpsc::Receiver<Event>,
}

impl Harness {
    fn new() -> Self {
        Self::with(GatewaySettings::default(), TableSource::Defaults)
    }

    fn with(settings: GatewaySettings, table: TableSource<'_>) -> Self {
        let bus = Arc::new(LocalBus::new());
        let shared: Arc<dyn Bus> = bus.clone();
        let (reporter, events) = EventReporter::channel();
        let downlink = MockDownlink::default();

        let gw = GatewayContext::init(
            shared,
            reporter,
            &settings,
            PassthroughEncoder::default(),
            downlink.clone(),
            table,
        )
        .unwrap();

        let mut harness = Self {
            bus,
            gw,
            downlink,
            events,
        };
        harness.drain_events();
        harness
    }

    /// Publish a ground command and let the gateway handle it
    fn command(&mut self, code: CommandCode, payload: &[u8]) {
        self.bus
            .transmit(Message::command(CMD_MID, code as u8, payload))
            .unwrap();
        self.gw.process_commands();
    }

    fn enable_output(&mut self, ip: &str) {
        let cmd = EnableOutputCmd {
            dest_ip: ip.to_string(),
        };
        self.command(CommandCode::EnableOutput, &cmd.encode());
    }

    fn add_packet(&mut self, topic: u16, buf_limit: u8) {
        let cmd = AddPacketCmd {
            topic: MsgId::new(topic),
            qos: Qos::default(),
            buf_limit,
        };
        self.command(CommandCode::AddPacket, &cmd.encode());
    }

    fn remove_packet(&mut self, topic: u16) {
        let cmd = RemovePacketCmd {
            topic: MsgId::new(topic),
        };
        self.command(CommandCode::RemovePacket, &cmd.encode());
    }

    fn publish(&self, topic: u16, count: usize) {
        for i in 0..count {
            self.bus
                .transmit(Message::telemetry_at(MsgId::new(topic), i as u32, 0, &[0xAB; 8]))
                .unwrap();
        }
    }

    /// Run one cycle; the command pipe is empty between steps, so this only forwards
    fn forward(&mut self) -> usize {
        let before = self.downlink.sent_count();
        let report = self.gw.run_cycle();
        assert_eq!(report.sent, self.downlink.sent_count() - before);
        report.processed
    }

    fn drain_events(&mut self) -> Vec<EventId> {
        let mut ids = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            ids.push(event.id);
        }
        ids
    }
}

const TEST_TOPIC: u16 = 0x0900;

// =============================================================================
// Drain bound
// =============================================================================

#[test]
fn test_drain_bound_per_cycle() {
    let settings = GatewaySettings {
        max_tlm_per_cycle: 5,
        ..GatewaySettings::default()
    };
    let mut h = Harness::with(settings, TableSource::Defaults);
    h.enable_output("127.0.0.1");
    h.add_packet(TEST_TOPIC, 200);

    h.publish(TEST_TOPIC, 30);

    assert_eq!(h.forward(), 5);
    assert_eq!(h.downlink.sent_count(), 5);
    assert_eq!(h.bus.queued(h.gw.tlm_pipe()), 25);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_drain_bound(queued in 0usize..50, max in 1usize..20) {
        let settings = GatewaySettings {
            max_tlm_per_cycle: max,
            ..GatewaySettings::default()
        };
        let mut h = Harness::with(settings, TableSource::Defaults);
        h.enable_output("127.0.0.1");
        h.add_packet(TEST_TOPIC, 200);
        h.publish(TEST_TOPIC, queued);

        let processed = h.forward();

        prop_assert_eq!(processed, queued.min(max));
        prop_assert_eq!(h.bus.queued(h.gw.tlm_pipe()), queued - queued.min(max));
    }
}

// =============================================================================
// Output suppression
// =============================================================================

#[test]
fn test_no_output_before_enable() {
    let mut h = Harness::new();
    h.publish(0x0800, 3);

    assert_eq!(h.forward(), 3);
    assert_eq!(h.downlink.sent_count(), 0);
    assert!(!h.downlink.is_open());
}

#[test]
fn test_suppression_latch() {
    let mut h = Harness::new();
    h.enable_output("127.0.0.1");
    h.drain_events();

    h.downlink.fail_sends(true);
    h.publish(0x0800, 3);
    h.forward();
    assert!(h.gw.forwarder().is_suppressed());
    assert_eq!(h.drain_events(), vec![EventId::OutputStopped]);

    // Network is back but the latch holds until EnableOutput
    h.downlink.fail_sends(false);
    h.publish(0x0800, 2);
    h.forward();
    assert_eq!(h.downlink.sent_count(), 0);
    assert!(h.drain_events().is_empty());

    h.enable_output("");
    assert!(!h.gw.forwarder().is_suppressed());
    h.publish(0x0800, 2);
    h.forward();
    assert_eq!(h.downlink.sent_count(), 2);
}

// =============================================================================
// Commands
// =============================================================================

#[test]
fn test_enable_output_sets_destination() {
    let mut h = Harness::new();
    h.enable_output("10.0.0.5");

    assert!(h.downlink.is_open());
    assert_eq!(h.gw.counters().command, 1);
    assert_eq!(*h.gw.forwarder().destination().ip(), Ipv4Addr::new(10, 0, 0, 5));
    assert_eq!(h.drain_events(), vec![EventId::OutputEnabled]);

    h.publish(0x0800, 1);
    h.forward();
    let sent = h.downlink.sent();
    assert_eq!(sent[0].1, "10.0.0.5:1235".parse::<SocketAddr>().unwrap());
}

#[test]
fn test_enable_output_empty_keeps_destination() {
    let mut h = Harness::new();
    h.enable_output("10.0.0.5");
    h.enable_output("");

    assert_eq!(*h.gw.forwarder().destination().ip(), Ipv4Addr::new(10, 0, 0, 5));
    assert_eq!(h.gw.counters().command, 2);
    assert_eq!(h.gw.counters().error, 0);
}

#[test]
fn test_enable_output_invalid_destination() {
    let mut h = Harness::new();
    h.enable_output("999.1.1.1");

    assert_eq!(h.gw.counters().command, 0);
    assert_eq!(h.gw.counters().error, 1);
    assert!(!h.downlink.is_open());
    assert_eq!(h.drain_events(), vec![EventId::DestinationErr]);
}

#[test]
fn test_idempotent_remove_all() {
    let mut h = Harness::new();
    assert!(!h.gw.subscriptions().is_empty());

    h.command(CommandCode::RemoveAll, &[]);
    assert!(h.gw.subscriptions().is_empty());
    assert!(h.bus.routes(h.gw.tlm_pipe()).is_empty());

    h.drain_events();
    h.command(CommandCode::RemoveAll, &[]);

    assert!(h.gw.subscriptions().is_empty());
    assert_eq!(h.gw.counters().error, 0);
    assert_eq!(h.gw.counters().command, 2);
    assert_eq!(h.drain_events(), vec![EventId::RemoveAll]);
}

#[test]
fn test_counter_reset() {
    let mut h = Harness::new();
    h.command(CommandCode::Noop, &[]);
    h.command(CommandCode::Noop, &[]);
    h.bus
        .transmit(Message::command(CMD_MID, 42, &[]))
        .unwrap();
    h.gw.process_commands();
    assert_eq!(h.gw.counters().command, 2);
    assert_eq!(h.gw.counters().error, 1);

    h.command(CommandCode::ResetCounters, &[]);

    assert_eq!(h.gw.counters().command, 0);
    assert_eq!(h.gw.counters().error, 0);
}

#[test]
fn test_unknown_function_code() {
    let mut h = Harness::new();
    h.enable_output("127.0.0.1");
    let subs_before = h.gw.subscriptions().clone();
    let routes_before = h.bus.routes(h.gw.tlm_pipe());
    h.drain_events();

    h.bus
        .transmit(Message::command(CMD_MID, 99, &[]))
        .unwrap();
    h.gw.process_commands();

    assert_eq!(h.gw.counters().error, 1);
    assert_eq!(h.gw.counters().command, 1);
    assert_eq!(h.gw.subscriptions(), &subs_before);
    assert_eq!(h.bus.routes(h.gw.tlm_pipe()), routes_before);
    assert!(!h.gw.forwarder().is_suppressed());
    assert_eq!(h.drain_events(), vec![EventId::FnCodeErr]);
}

#[test]
fn test_wrong_length_rejected() {
    let mut h = Harness::new();
    h.command(CommandCode::Noop, &[0, 0]);
    // AddPacket one byte short
    h.command(CommandCode::AddPacket, &[0x00, 0x09, 0, 0, 4]);

    assert_eq!(h.gw.counters().command, 0);
    assert_eq!(h.gw.counters().error, 2);
    assert!(!h.gw.subscriptions().contains(MsgId::new(TEST_TOPIC)));
    assert_eq!(h.drain_events(), vec![EventId::LengthErr, EventId::LengthErr]);
}

#[test]
fn test_truncated_command_is_a_length_error() {
    let mut h = Harness::new();
    // Primary header only: no room for the function code
    let short = Message::from_bytes(vec![0x18, 0x80, 0xC0, 0x00, 0x00, 0x00]).unwrap();
    h.bus.transmit(short).unwrap();
    h.gw.process_commands();

    assert_eq!(h.gw.counters().error, 1);
    assert_eq!(h.gw.counters().command, 0);
    assert_eq!(h.drain_events(), vec![EventId::LengthErr]);
}

#[test]
fn test_unknown_message_id() {
    let mut h = Harness::new();
    let stray = Message::command(MsgId::new(0x1882), 0, &[]);

    h.gw.dispatch(&stray);

    assert_eq!(h.gw.counters().error, 1);
    assert_eq!(h.gw.counters().command, 0);
    assert_eq!(h.drain_events(), vec![EventId::MsgIdErr]);
}

#[test]
fn test_add_remove_round_trip() {
    let mut h = Harness::new();
    let subs_before = h.gw.subscriptions().clone();
    let routes_before = h.bus.routes(h.gw.tlm_pipe());

    h.add_packet(TEST_TOPIC, 4);
    assert!(h.gw.subscriptions().contains(MsgId::new(TEST_TOPIC)));
    assert!(h.bus.is_subscribed(MsgId::new(TEST_TOPIC), h.gw.tlm_pipe()));

    h.remove_packet(TEST_TOPIC);

    assert_eq!(h.gw.subscriptions(), &subs_before);
    assert_eq!(h.bus.routes(h.gw.tlm_pipe()), routes_before);
    assert_eq!(h.gw.counters().command, 2);
    assert_eq!(
        h.drain_events(),
        vec![EventId::AddPacket, EventId::RemovePacket]
    );
}

#[test]
fn test_topic_without_secondary_header_keeps_route() {
    let mut h = Harness::new();
    h.enable_output("127.0.0.1");
    h.add_packet(0x0100, 4);
    assert!(h.bus.is_subscribed(MsgId::new(0x0100), h.gw.tlm_pipe()));

    h.publish(0x0100, 2);
    assert_eq!(h.forward(), 2);

    let sent = h.downlink.sent();
    assert_eq!(sent.len(), 2);
    for (packet, _) in &sent {
        let msg = Message::from_bytes(packet.clone()).unwrap();
        assert_eq!(msg.msg_id(), MsgId::new(0x0100));
        assert_eq!(msg.payload(), &[0xAB; 8]);
    }
}

#[test]
fn test_duplicate_add_replaces_entry() {
    let mut h = Harness::new();
    let before = h.gw.subscriptions().len();

    h.add_packet(0x0800, 9);

    assert_eq!(h.gw.subscriptions().len(), before);
    assert_eq!(
        h.gw.subscriptions().get(MsgId::new(0x0800)).unwrap().buf_limit,
        9
    );
    assert_eq!(h.bus.route(MsgId::new(0x0800), h.gw.tlm_pipe()).unwrap().1, 9);
}

#[test]
fn test_add_packet_bus_failure_still_counts() {
    let mut h = Harness::new();
    // Reserved id is refused by the bus
    h.add_packet(0x0000, 4);

    assert_eq!(h.gw.counters().command, 1);
    assert_eq!(h.gw.counters().error, 0);
    assert!(!h.gw.subscriptions().contains(MsgId::RESERVED));
    assert_eq!(h.drain_events(), vec![EventId::AddPacketErr]);
}

#[test]
fn test_remove_unsubscribed_topic() {
    let mut h = Harness::new();
    h.remove_packet(TEST_TOPIC);

    assert_eq!(h.gw.counters().command, 1);
    assert_eq!(h.gw.counters().error, 0);
    assert_eq!(h.drain_events(), vec![EventId::RemovePacketErr]);
}

#[test]
fn test_add_packet_when_set_full() {
    let path = std::env::temp_dir().join(format!("tlm-gateway-full-{}.toml", std::process::id()));
    let mut table = String::new();
    for i in 0..MAX_SUBSCRIPTIONS {
        table.push_str(&format!(
            "[[subscription]]\ntopic = {}\npriority = 0\nreliability = 0\nbuf_limit = 1\n\n",
            0x0100 + i
        ));
    }
    std::fs::write(&path, table).unwrap();

    let mut h = Harness::with(GatewaySettings::default(), TableSource::File(&path));
    assert_eq!(h.gw.subscriptions().len(), MAX_SUBSCRIPTIONS);

    h.add_packet(0x1000, 4);

    assert_eq!(h.gw.counters().command, 1);
    assert!(!h.bus.is_subscribed(MsgId::new(0x1000), h.gw.tlm_pipe()));
    assert_eq!(h.drain_events(), vec![EventId::AddPacketErr]);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_diagnostic_sample_is_deterministic() {
    let mut h = Harness::new();
    h.enable_output("127.0.0.1");

    h.command(CommandCode::SendDataTypes, &[]);
    h.command(CommandCode::SendDataTypes, &[]);
    h.forward();

    let sent = h.downlink.sent();
    assert_eq!(sent.len(), 2);
    for (packet, _) in &sent {
        let msg = Message::from_bytes(packet.clone()).unwrap();
        assert_eq!(msg.msg_id(), DATA_TYPES_MID);
        assert_eq!(packet.len(), TLM_HEADER_LEN + DiagnosticSample::LEN);
        let sample = DiagnosticSample::decode(&packet[TLM_HEADER_LEN..]).unwrap();
        assert_eq!(sample, DiagnosticSample::FIXED);
    }
    assert_eq!(sent[0].0[TLM_HEADER_LEN..], sent[1].0[TLM_HEADER_LEN..]);
    assert_eq!(h.gw.counters().command, 3);
}

#[test]
fn test_housekeeping_request() {
    let mut h = Harness::new();
    h.enable_output("127.0.0.1");
    h.bus
        .transmit(Message::command(MsgId::new(0x1880), 77, &[]))
        .unwrap();
    h.gw.process_commands();

    h.bus
        .transmit(Message::command(SEND_HK_MID, 0, &[]))
        .unwrap();
    h.gw.process_commands();

    // Request itself does not count
    assert_eq!(h.gw.counters().command, 1);
    assert_eq!(h.gw.counters().error, 1);

    h.forward();
    let sent = h.downlink.sent();
    assert_eq!(sent.len(), 1);
    let msg = Message::from_bytes(sent[0].0.clone()).unwrap();
    assert_eq!(msg.msg_id(), HK_TLM_MID);
    assert_eq!(
        HousekeepingTlm::decode(msg.payload()),
        Some(HousekeepingTlm {
            command_counter: 1,
            command_error_counter: 1
        })
    );
}

// =============================================================================
// Driver
// =============================================================================

#[tokio::test]
async fn test_run_forwards_until_shutdown() {
    let settings = GatewaySettings {
        task_interval: Duration::from_millis(10),
        ..GatewaySettings::default()
    };
    let h = Harness::with(settings, TableSource::Defaults);
    let Harness {
        bus, gw, downlink, ..
    } = h;

    let shutdown = Arc::new(AtomicBool::new(false));
    let task = tokio::spawn(gw.run(shutdown.clone()));

    let enable = EnableOutputCmd {
        dest_ip: "127.0.0.1".into(),
    };
    bus.transmit(Message::command(
        CMD_MID,
        CommandCode::EnableOutput as u8,
        &enable.encode(),
    ))
    .unwrap();

    // Wait for the enable to land, then publish
    for _ in 0..100 {
        if downlink.is_open() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(downlink.is_open());

    bus.transmit(Message::telemetry_at(MsgId::new(0x0800), 0, 0, &[1, 2, 3, 4]))
        .unwrap();
    for _ in 0..100 {
        if downlink.sent_count() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    shutdown.store(true, Ordering::SeqCst);
    task.await.unwrap().unwrap();

    assert_eq!(downlink.sent_count(), 1);
    // Socket released on exit
    assert!(!downlink.is_open());
}
