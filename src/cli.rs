//! Command-line interface definition using clap
//!
//! Provides structured argument parsing with automatic help generation.
//! Flags given on the command line override the config file.

use crate::codec::EncoderKind;
use crate::config::Config;
use clap::{Parser, Subcommand};
use std::net::Ipv4Addr;
use std::path::PathBuf;

// =============================================================================
// CLI Definition
// =============================================================================

/// Telemetry output gateway: software bus to UDP downlink
#[derive(Parser, Debug, Default)]
#[command(name = "tlm-gateway")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose debug output
    #[arg(short, long)]
    pub verbose: bool,

    /// Config file (default: config.toml, then config/default.toml)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Subscription table file (overrides config)
    #[arg(long, value_name = "PATH")]
    pub table: Option<PathBuf>,

    /// Telemetry destination IP (overrides config)
    #[arg(long, value_name = "IP")]
    pub dest: Option<Ipv4Addr>,

    /// Output encoder: passthrough or packed (overrides config)
    #[arg(long, value_name = "KIND")]
    pub encoder: Option<EncoderKind>,

    /// Open the downlink at startup instead of waiting for EnableOutput
    #[arg(long)]
    pub enable: bool,

    /// Do not listen for ground commands
    #[arg(long)]
    pub no_uplink: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate config and table, print the resolved setup as JSON
    CheckConfig,
}

impl Cli {
    /// Apply command-line overrides to a loaded config
    pub fn apply(&self, config: &mut Config) {
        if let Some(table) = &self.table {
            config.gateway.table = Some(table.clone());
        }
        if let Some(dest) = self.dest {
            config.gateway.tlm_dest = dest.to_string();
        }
        if let Some(encoder) = self.encoder {
            config.gateway.encoder = encoder;
        }
        if self.enable {
            config.gateway.enable_on_start = true;
        }
        if self.no_uplink {
            config.uplink.enabled = false;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
