mod output;
mod telemetry;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use wattsync_alerts::SilenceManager;
use wattsync_core::config::Config;
use wattsync_core::labels::derive_labels;
use wattsync_core::time::parse_time_or_date;
use wattsync_ingest::device::IotaWattClient;
use wattsync_ingest::sync::{SyncOptions, run_forever, run_pass};
use wattsync_ingest::transform::{TransformOptions, run_transform};
use wattsync_store::VmClient;

use crate::output::{
    print_labels_human, print_monitor_human, print_removal_human, print_silences_human,
    print_sync_human, print_transform_human, print_watermarks_human,
};
use crate::telemetry::{init_tracing, shutdown_tracing};

#[derive(Parser, Debug)]
#[command(name = "wattsync")]
#[command(about = "IoTaWatt to VictoriaMetrics sync and backup-window alert silencing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true, help = "Config file (default: $WATTSYNC_CONFIG or XDG path)")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Copy new device readings into the metrics store")]
    Sync {
        #[arg(long, help = "Run a single pass and exit")]
        once: bool,
    },
    #[command(about = "Rewrite legacy Power_<measurement> series into the power label scheme")]
    Transform {
        #[arg(long, help = "RFC3339 time or YYYY-MM-DD (default 2025-01-31T23:59:59Z)")]
        end: Option<String>,
        #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u32).range(1..))]
        chunk_days: u32,
        #[arg(long, default_value = "1m")]
        step: String,
        #[arg(long, default_value = "Power_")]
        source_prefix: String,
    },
    #[command(about = "Print the label set a measurement is written with")]
    Labels { host: String, measurement: String },
    #[command(about = "Show the newest stored timestamp per measurement")]
    Watermark {
        measurement: Option<String>,
        #[arg(long)]
        host: Option<String>,
    },
    #[command(subcommand, about = "Manage backup-window alert silences")]
    Silence(SilenceCommand),
}

#[derive(Subcommand, Debug)]
enum SilenceCommand {
    #[command(about = "Create a silence and list active matching silences")]
    Start {
        #[arg(default_value_t = 15, value_parser = clap::value_parser!(u64).range(1..))]
        minutes: u64,
    },
    #[command(about = "Remove all active matching silences")]
    Stop,
    #[command(about = "List matching silences in any state")]
    Status,
    #[command(about = "Silence for the window (or until ctrl-c or SIGTERM), then clean up")]
    Monitor {
        #[arg(default_value_t = 15, value_parser = clap::value_parser!(u64).range(1..))]
        minutes: u64,
    },
}

/// One line of `wattsync watermark`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct WatermarkRow {
    pub host: String,
    pub measurement: String,
    pub watermark: Option<i64>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
struct SilenceStarted {
    silence_id: String,
    active: Vec<wattsync_core::model::silence::Silence>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let load_config =
        || Config::load_with(cli.config.as_deref()).context("failed to load configuration");

    match cli.command {
        Commands::Labels { host, measurement } => {
            let labels = derive_labels(&host, &measurement);
            emit(cli.json, &labels, print_labels_human)
        }
        Commands::Sync { once } => run_sync(&load_config()?, once, cli.json).await,
        Commands::Transform {
            end,
            chunk_days,
            step,
            source_prefix,
        } => {
            let mut opts = TransformOptions {
                chunk_days,
                step,
                source_prefix,
                ..TransformOptions::default()
            };
            if let Some(end) = end {
                opts.end = parse_time_or_date(&end)
                    .with_context(|| format!("invalid --end {end}"))?
                    .timestamp();
            }
            let cfg = load_config()?;
            let vm = VmClient::from_config(&cfg)?;
            let report = run_transform(&cfg.registry, &vm, &opts).await?;
            emit(cli.json, &report, print_transform_human)
        }
        Commands::Watermark { measurement, host } => {
            let cfg = load_config()?;
            let vm = VmClient::from_config(&cfg)?;
            let mut rows = Vec::new();
            for (dev, m) in cfg.registry.measurements() {
                if host.as_deref().is_some_and(|h| h != dev.host)
                    || measurement.as_deref().is_some_and(|want| want != m)
                {
                    continue;
                }
                let (watermark, error) = match vm.last_timestamp(&dev.host, m).await {
                    Ok(w) => (w, None),
                    Err(e) => (None, Some(e.to_string())),
                };
                rows.push(WatermarkRow {
                    host: dev.host.clone(),
                    measurement: m.to_string(),
                    watermark,
                    error,
                });
            }
            if rows.is_empty() {
                anyhow::bail!("no registered measurement matches");
            }
            emit(cli.json, &rows, |r| print_watermarks_human(r))
        }
        Commands::Silence(cmd) => run_silence(&load_config()?, cmd, cli.json).await,
    }
}

async fn run_sync(cfg: &Config, once: bool, json: bool) -> anyhow::Result<()> {
    let device = IotaWattClient::from_config(cfg)?;
    let vm = VmClient::from_config(cfg)?;
    let opts = SyncOptions::from_config(cfg);

    if once {
        let report = run_pass(&cfg.registry, &device, &vm, &opts).await;
        return emit(json, &report, print_sync_human);
    }

    tracing::info!(
        interval = ?cfg.sync_interval,
        measurements = cfg.registry.len(),
        "starting sync loop"
    );
    run_forever(
        &cfg.registry,
        &device,
        &vm,
        &opts,
        cfg.sync_interval,
        shutdown_signal(),
    )
    .await;
    Ok(())
}

async fn run_silence(cfg: &Config, cmd: SilenceCommand, json: bool) -> anyhow::Result<()> {
    let manager = SilenceManager::from_config(cfg)?;
    match cmd {
        SilenceCommand::Start { minutes } => {
            let silence_id = manager
                .create(minutes_to_duration(minutes))
                .await
                .context("failed to create silence")?;
            // The silence exists at this point, so a listing failure is not fatal.
            let active = match manager.active().await {
                Ok(active) => active,
                Err(e) => {
                    tracing::warn!(silence_id = %silence_id, error = %e, "failed to list active silences");
                    Vec::new()
                }
            };
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&SilenceStarted { silence_id, active })?
                );
            } else {
                println!("created {silence_id}");
                print_silences_human(&active);
            }
            Ok(())
        }
        SilenceCommand::Stop => {
            let report = manager.remove_matching().await?;
            emit(json, &report, print_removal_human)?;
            if !report.succeeded() {
                anyhow::bail!("none of {} matching silences could be removed", report.matched);
            }
            Ok(())
        }
        SilenceCommand::Status => {
            let silences = manager.status().await?;
            emit(json, &silences, |s| print_silences_human(s))
        }
        SilenceCommand::Monitor { minutes } => {
            let report = manager
                .monitor(minutes_to_duration(minutes), shutdown_signal())
                .await
                .context("silence monitor failed")?;
            emit(json, &report, print_monitor_human)?;
            if !report.removal.succeeded() {
                anyhow::bail!("silence {} was not removed", report.silence_id);
            }
            Ok(())
        }
    }
}

fn minutes_to_duration(minutes: u64) -> Duration {
    Duration::from_secs(minutes * 60)
}

/// Resolves on ctrl-c or SIGTERM. The SIGTERM handler is installed when this
/// is called, not when first polled, so a signal during setup is not lost.
fn shutdown_signal() -> impl Future<Output = ()> {
    #[cfg(unix)]
    let sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(sigterm) => Some(sigterm),
        Err(err) => {
            tracing::warn!(error = ?err, "failed to listen for SIGTERM");
            None
        }
    };

    async move {
        let ctrl_c = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = ?err, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async move {
            match sigterm {
                Some(mut sigterm) => {
                    sigterm.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
            _ = terminate => tracing::info!("received SIGTERM, shutting down"),
        }
    }
}

fn emit<T: Serialize + ?Sized>(json: bool, value: &T, human: impl FnOnce(&T)) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}
