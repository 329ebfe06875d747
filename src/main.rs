//! Telemetry output gateway
//!
//! Usage:
//!   tlm-gateway                        Run with config.toml / config/default.toml
//!   tlm-gateway --config gw.toml       Run with an explicit config
//!   tlm-gateway --dest 10.0.0.5 --enable
//!                                      Start forwarding immediately
//!   tlm-gateway check-config           Validate and print the resolved setup

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tlm_gateway::bus::{Bus, LocalBus};
use tlm_gateway::cli::{Cli, Command};
use tlm_gateway::codec::{Encoder, EncoderKind, PackedEncoder, PassthroughEncoder, TypeDatabase};
use tlm_gateway::config::{self, Config};
use tlm_gateway::gateway::{GatewayContext, GatewaySettings, TableSource};
use tlm_gateway::logging::{self, EventReporter};
use tlm_gateway::subscription::{SubscriptionEntry, SubscriptionSet, SubscriptionTable};
use tlm_gateway::transport::{self, CommandUplink, UdpDownlink};
use tlm_gateway::GatewayError;
use tracing::{info, warn};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let path = cli.config.clone().unwrap_or_else(config::config_path);

    if let Some(Command::CheckConfig) = cli.command {
        let mut config = if path.exists() {
            Config::read(&path)?
        } else {
            Config::default()
        };
        cli.apply(&mut config);
        return check_config(&config);
    }

    let mut config = Config::load(&path);
    cli.apply(&mut config);
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;

    let rt = tokio::runtime::Runtime::new().map_err(|e| GatewayError::Runtime { source: e })?;
    rt.block_on(run(config))
}

// ============================================================================
// check-config
// ============================================================================

#[derive(Serialize)]
struct ResolvedSetup<'a> {
    config: &'a Config,
    subscriptions: Vec<SubscriptionEntry>,
}

fn check_config(config: &Config) -> Result<()> {
    config.validate()?;

    let subscriptions = match &config.gateway.table {
        Some(table) => SubscriptionTable::load(table)?,
        None => SubscriptionTable::defaults(),
    };

    let setup = ResolvedSetup {
        config,
        subscriptions: subscriptions.iter().copied().collect(),
    };
    println!("{}", serde_json::to_string_pretty(&setup)?);
    Ok(())
}

// ============================================================================
// Gateway
// ============================================================================

async fn run(config: Config) -> Result<()> {
    let mut events = EventReporter::new();
    if let Some(log_cfg) = config.event_log() {
        let path = log_cfg.path.clone();
        match logging::spawn_event_log(log_cfg) {
            Ok(tx) => events = events.with_file(tx),
            Err(e) => warn!("Event log {} disabled: {}", path.display(), e),
        }
    }

    let bus: Arc<dyn Bus> = Arc::new(LocalBus::new());

    // Setup shutdown handler
    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_signal_handler(shutdown.clone());

    let uplink = if config.uplink.enabled {
        let task = CommandUplink::new(config.uplink_addr()?).spawn(bus.clone(), shutdown.clone())?;
        Some(task)
    } else {
        info!("Command uplink disabled");
        None
    };

    let settings = config.gateway_settings()?;
    let table = match config.gateway.table.as_deref() {
        Some(path) => TableSource::File(path),
        None => TableSource::Defaults,
    };
    let max_packet = config.gateway.max_packet_size;

    info!("Encoder: {}", config.gateway.encoder);
    match config.gateway.encoder {
        EncoderKind::Passthrough => {
            let encoder = PassthroughEncoder::new(max_packet);
            start(bus, events, &settings, encoder, table, shutdown.clone()).await?
        }
        EncoderKind::Packed => {
            let types = TypeDatabase::with_schemas(config.encoder.schema.iter().cloned());
            let encoder = PackedEncoder::new(types, max_packet);
            start(bus, events, &settings, encoder, table, shutdown.clone()).await?
        }
    }

    shutdown.store(true, Ordering::SeqCst);
    if let Some(task) = uplink {
        transport::uplink::join(task).await;
    }
    Ok(())
}

async fn start<E: Encoder>(
    bus: Arc<dyn Bus>,
    events: EventReporter,
    settings: &GatewaySettings,
    encoder: E,
    table: TableSource<'_>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let ctx = GatewayContext::init(bus, events, settings, encoder, UdpDownlink::new(), table)
        .context("gateway initialization failed")?;
    log_subscriptions(ctx.subscriptions());
    ctx.run(shutdown).await?;
    Ok(())
}

fn log_subscriptions(set: &SubscriptionSet) {
    for entry in set.iter() {
        tracing::debug!(
            "Forwarding {} (QoS {}.{}, limit {})",
            entry.topic,
            entry.qos.priority,
            entry.qos.reliability,
            entry.buf_limit
        );
    }
}

fn spawn_signal_handler(shutdown: Arc<AtomicBool>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        tokio::spawn(async move {
            let (mut sigterm, mut sigint) =
                match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                    (Ok(term), Ok(int)) => (term, int),
                    _ => {
                        warn!("Cannot install signal handlers, falling back to Ctrl-C");
                        let _ = tokio::signal::ctrl_c().await;
                        shutdown.store(true, Ordering::SeqCst);
                        return;
                    }
                };

            tokio::select! {
                _ = sigterm.recv() => {},
                _ = sigint.recv() => {},
            }
            info!("Shutdown requested");
            shutdown.store(true, Ordering::SeqCst);
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
            shutdown.store(true, Ordering::SeqCst);
        });
    }
}
