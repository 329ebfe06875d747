//! Configuration management
//!
//! The config file is `config.toml` in the working directory, falling back to
//! `config/default.toml`. Every field has a default, so a partial file (or no
//! file at all) is fine. An unreadable or malformed file logs a warning and
//! the defaults are used.

use crate::codec::{EncoderKind, Schema};
use crate::constants::{
    DEFAULT_CMD_PIPE_DEPTH, DEFAULT_CMD_PORT, DEFAULT_MAX_PACKET_SIZE, DEFAULT_MAX_TLM_PER_CYCLE,
    DEFAULT_TASK_INTERVAL_MS, DEFAULT_TLM_DEST, DEFAULT_TLM_PIPE_DEPTH, DEFAULT_TLM_PORT,
    MAX_PIPE_DEPTH, MAX_UDP_PAYLOAD,
};
use crate::error::{GatewayError, Result};
use crate::gateway::GatewaySettings;
use crate::logging::EventLogConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Smallest packet the encoders can produce (command header + payload)
const MIN_PACKET_SIZE: usize = 16;

// =============================================================================
// Application Configuration
// =============================================================================

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub uplink: UplinkConfig,
    pub encoder: EncoderConfig,
    pub logs: LogsConfig,
}

// =============================================================================
// Gateway
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Output encoding: "passthrough" or "packed"
    pub encoder: EncoderKind,

    /// Telemetry destination until EnableOutput names another one
    pub tlm_dest: String,

    /// Destination UDP port (fixed for the process lifetime)
    pub tlm_port: u16,

    /// Open the downlink at startup without waiting for EnableOutput
    pub enable_on_start: bool,

    /// Driver cadence in milliseconds
    pub task_interval_ms: u64,

    /// Telemetry messages drained per cycle
    pub max_tlm_per_cycle: usize,

    pub cmd_pipe_depth: usize,
    pub tlm_pipe_depth: usize,

    /// Upper bound on one encoded packet
    pub max_packet_size: usize,

    /// Subscription table file (None = built-in table)
    pub table: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            encoder: EncoderKind::Passthrough,
            tlm_dest: DEFAULT_TLM_DEST.to_string(),
            tlm_port: DEFAULT_TLM_PORT,
            enable_on_start: false,
            task_interval_ms: DEFAULT_TASK_INTERVAL_MS,
            max_tlm_per_cycle: DEFAULT_MAX_TLM_PER_CYCLE,
            cmd_pipe_depth: DEFAULT_CMD_PIPE_DEPTH,
            tlm_pipe_depth: DEFAULT_TLM_PIPE_DEPTH,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            table: None,
        }
    }
}

// =============================================================================
// Uplink
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UplinkConfig {
    pub enabled: bool,
    /// Listen address
    pub bind: String,
    pub port: u16,
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1".to_string(),
            port: DEFAULT_CMD_PORT,
        }
    }
}

// =============================================================================
// Encoder
// =============================================================================

/// Extra schemas for the packed encoder
///
/// ```toml
/// [[encoder.schema]]
/// msg_id = 0x0801
/// name = "event_hk"
/// fields = ["u8", "u8", "pad[2]", "u32"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub schema: Vec<Schema>,
}

// =============================================================================
// Logs
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    /// Event log file (None = events only go to the console)
    pub file: Option<PathBuf>,
    /// Rotate once the file reaches this size
    pub max_bytes: u64,
    /// Rotated files kept
    pub max_files: usize,
    pub flush_interval_ms: u64,
    /// Events queued for the writer before new ones are dropped
    pub channel_capacity: usize,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            file: None,
            max_bytes: 1024 * 1024,
            max_files: 3,
            flush_interval_ms: 250,
            channel_capacity: 1024,
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Get the config file path
///
/// Looks for config.toml, falls back to config/default.toml
pub fn config_path() -> PathBuf {
    let user_config = PathBuf::from("config.toml");
    if user_config.exists() {
        return user_config;
    }

    let default_config = Path::new("config").join("default.toml");
    if default_config.exists() {
        return default_config;
    }

    user_config
}

impl Config {
    /// Load config from file, falling back to defaults
    pub fn load(path: &Path) -> Config {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Config::default();
        }

        match Self::read(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}, using defaults", e);
                Config::default()
            }
        }
    }

    /// Read and parse a config file, surfacing every error
    pub fn read(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| GatewayError::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| GatewayError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Check values serde cannot check
    pub fn validate(&self) -> Result<()> {
        let g = &self.gateway;

        if g.task_interval_ms == 0 {
            return Err(invalid("gateway.task_interval_ms", "must be positive"));
        }
        if g.max_tlm_per_cycle == 0 {
            return Err(invalid("gateway.max_tlm_per_cycle", "must be positive"));
        }
        for (field, depth) in [
            ("gateway.cmd_pipe_depth", g.cmd_pipe_depth),
            ("gateway.tlm_pipe_depth", g.tlm_pipe_depth),
        ] {
            if depth == 0 || depth > MAX_PIPE_DEPTH {
                return Err(invalid(
                    field,
                    format!("{} is outside 1..={}", depth, MAX_PIPE_DEPTH),
                ));
            }
        }
        if !(MIN_PACKET_SIZE..=MAX_UDP_PAYLOAD).contains(&g.max_packet_size) {
            return Err(invalid(
                "gateway.max_packet_size",
                format!(
                    "{} is outside {}..={}",
                    g.max_packet_size, MIN_PACKET_SIZE, MAX_UDP_PAYLOAD
                ),
            ));
        }
        self.tlm_dest()?;

        if self.uplink.enabled {
            self.uplink_addr()?;
        }

        for schema in &self.encoder.schema {
            if !schema.msg_id.is_valid() {
                return Err(invalid(
                    "encoder.schema.msg_id",
                    format!("{} is outside the bus id range", schema.msg_id),
                ));
            }
            if schema.fields.is_empty() {
                return Err(invalid(
                    "encoder.schema.fields",
                    format!("schema for {} has no fields", schema.msg_id),
                ));
            }
            if schema.packed_size() == 0 {
                return Err(invalid(
                    "encoder.schema.fields",
                    format!("schema for {} packs to zero bytes", schema.msg_id),
                ));
            }
        }

        Ok(())
    }

    pub fn tlm_dest(&self) -> Result<Ipv4Addr> {
        self.gateway
            .tlm_dest
            .trim()
            .parse()
            .map_err(|_| invalid("gateway.tlm_dest", format!("'{}' is not IPv4", self.gateway.tlm_dest)))
    }

    pub fn uplink_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .uplink
            .bind
            .trim()
            .parse()
            .map_err(|_| invalid("uplink.bind", format!("'{}' is not an IP address", self.uplink.bind)))?;
        Ok(SocketAddr::new(ip, self.uplink.port))
    }

    /// Runtime parameters for the gateway
    pub fn gateway_settings(&self) -> Result<GatewaySettings> {
        let g = &self.gateway;
        Ok(GatewaySettings {
            cmd_pipe_depth: g.cmd_pipe_depth,
            tlm_pipe_depth: g.tlm_pipe_depth,
            max_tlm_per_cycle: g.max_tlm_per_cycle,
            destination: SocketAddrV4::new(self.tlm_dest()?, g.tlm_port),
            task_interval: Duration::from_millis(g.task_interval_ms),
            enable_on_start: g.enable_on_start,
        })
    }

    /// Event file settings, if a file is configured
    pub fn event_log(&self) -> Option<EventLogConfig> {
        let logs = &self.logs;
        logs.file.as_ref().map(|path| EventLogConfig {
            path: path.clone(),
            max_bytes: logs.max_bytes,
            max_files: logs.max_files,
            flush_interval: Duration::from_millis(logs.flush_interval_ms),
            channel_capacity: logs.channel_capacity,
        })
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> GatewayError {
    GatewayError::ConfigValidation {
        field,
        reason: reason.into(),
    }
}

// ============================================================================
// Tests
// ============================================================================
