//! Application-wide constants
//!
//! Centralized constants to avoid duplication and ensure consistency.

use crate::message::MsgId;

/// Crate version reported by Noop and the init event
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Message IDs
// =============================================================================

/// Ground commands addressed to the gateway
pub const CMD_MID: MsgId = MsgId::new(0x1880);

/// Periodic housekeeping request (from the scheduler)
pub const SEND_HK_MID: MsgId = MsgId::new(0x1881);

/// Housekeeping telemetry published by the gateway
pub const HK_TLM_MID: MsgId = MsgId::new(0x0880);

/// Diagnostic data-types sample published by the gateway
pub const DATA_TYPES_MID: MsgId = MsgId::new(0x0881);

// =============================================================================
// Network
// =============================================================================

/// UDP port telemetry is sent to on the ground side
pub const DEFAULT_TLM_PORT: u16 = 1235;

/// Destination used until the first EnableOutput names one
pub const DEFAULT_TLM_DEST: &str = "127.0.0.1";

/// UDP port the command uplink listens on
pub const DEFAULT_CMD_PORT: u16 = 1234;

/// Largest payload a single UDP datagram can carry
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Default bound on an encoded output packet (largest software bus message)
pub const DEFAULT_MAX_PACKET_SIZE: usize = 32_768;

/// Uplink receive buffer size
pub const UPLINK_BUFFER_SIZE: usize = 4096;

// =============================================================================
// Timing
// =============================================================================

/// Driver wake cadence (milliseconds, 2 Hz)
pub const DEFAULT_TASK_INTERVAL_MS: u64 = 500;

/// Uplink receive poll timeout, lets the task observe shutdown (milliseconds)
pub const UPLINK_POLL_MS: u64 = 100;

// =============================================================================
// Queues
// =============================================================================

/// Depth of the gateway command pipe
pub const DEFAULT_CMD_PIPE_DEPTH: usize = 8;

/// Depth of the telemetry pipe
pub const DEFAULT_TLM_PIPE_DEPTH: usize = 50;

/// Telemetry messages handled per driver cycle
pub const DEFAULT_MAX_TLM_PER_CYCLE: usize = 50;

/// Maximum entries in the subscription set
pub const MAX_SUBSCRIPTIONS: usize = 256;

/// Maximum pipes the local bus hands out
pub const MAX_PIPES: usize = 64;

/// Maximum depth of a single pipe
pub const MAX_PIPE_DEPTH: usize = 256;

/// Per-subscription message limit used by the built-in table
pub const DEFAULT_BUF_LIMIT: u16 = 4;

/// Channel capacity for the event stream
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Retry
// =============================================================================

/// Maximum socket bind retry attempts
pub const MAX_SOCKET_RETRY_ATTEMPTS: u32 = 5;

/// Base delay between retry attempts (milliseconds)
pub const RETRY_BASE_DELAY_MS: u64 = 200;
