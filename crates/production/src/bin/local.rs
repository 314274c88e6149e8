//! Canopy local cluster
//!
//! Runs a full committee of replicas in one process, feeds them
//! transactions, and checks every replica committed the same chain.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: 4 two-chain replicas for 10 seconds
//! canopy-local
//!
//! # From a configuration file, overriding the variant
//! canopy-local --config cluster.toml --variant streamlet
//!
//! # Stop early with Ctrl+C
//! canopy-local --nodes 7 --duration-secs 600
//! ```

use anyhow::{bail, Context, Result};
use canopy_bft::{ForkChoice, ProtocolVariant};
use canopy_production::{init_telemetry, LocalCluster, NodeConfig};
use canopy_types::ValidatorId;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

/// Canopy local cluster
///
/// Runs an in-process committee over the production runner.
#[derive(Parser, Debug)]
#[command(name = "canopy-local")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of replicas (overrides config)
    #[arg(short, long)]
    nodes: Option<usize>,

    /// Protocol variant (overrides config)
    #[arg(long, value_enum)]
    variant: Option<VariantArg>,

    /// Make replica 1 a Byzantine forking leader
    #[arg(long)]
    byzantine_leader: bool,

    /// How long to run before shutting down
    #[arg(long, default_value_t = 10)]
    duration_secs: u64,

    /// Transactions submitted per second
    #[arg(long, default_value_t = 100)]
    tx_rate: u64,

    /// Log level filter (overrides config, RUST_LOG still wins)
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum VariantArg {
    Hotstuff,
    TwoChain,
    Fast,
    Lbft,
    Streamlet,
}

impl From<VariantArg> for ProtocolVariant {
    fn from(arg: VariantArg) -> Self {
        match arg {
            VariantArg::Hotstuff => ProtocolVariant::HotStuff,
            VariantArg::TwoChain => ProtocolVariant::TwoChain,
            VariantArg::Fast => ProtocolVariant::Fast,
            VariantArg::Lbft => ProtocolVariant::Lbft,
            VariantArg::Streamlet => ProtocolVariant::Streamlet,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => NodeConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => NodeConfig::default(),
    };
    if let Some(nodes) = cli.nodes {
        config.cluster.size = nodes;
    }
    if let Some(variant) = cli.variant {
        config.consensus.variant = variant.into();
    }
    if let Some(level) = &cli.log_level {
        config.telemetry.filter = level.clone();
    }
    config.validate()?;

    init_telemetry(&config.telemetry).context("initializing logging")?;

    let cluster = if cli.byzantine_leader {
        warn!("Replica 1 runs the forking fork choice");
        config.consensus.fork_choice = ForkChoice::Forking;
        LocalCluster::launch_with(&config, |validator, consensus| {
            consensus.byzantine = validator == ValidatorId(1);
        })?
    } else {
        LocalCluster::launch(&config)?
    };
    info!(
        nodes = config.cluster.size,
        variant = ?config.consensus.variant,
        duration_secs = cli.duration_secs,
        "Cluster running"
    );

    let run_for = tokio::time::sleep(Duration::from_secs(cli.duration_secs));
    tokio::pin!(run_for);
    let period = Duration::from_micros((1_000_000 / cli.tx_rate.max(1)).max(1));
    let mut ticker = tokio::time::interval(period);
    let mut sequence: u64 = 0;

    loop {
        tokio::select! {
            _ = &mut run_for => break,
            result = signal::ctrl_c() => {
                result.context("installing Ctrl+C handler")?;
                info!("Received Ctrl+C");
                break;
            }
            _ = ticker.tick() => {
                sequence += 1;
                cluster
                    .submit_to_all(format!("tx-{sequence}").into_bytes())
                    .await?;
            }
        }
    }

    let report = cluster.shutdown().await?;
    for replica in &report.replicas {
        info!(
            validator = %replica.report.validator,
            committed = replica.committed.len(),
            forked = replica.report.forked_blocks,
            final_view = replica.report.final_view.0,
            proposals = replica.report.stats.proposals,
            timeouts = replica.report.stats.view_timeouts,
            "Replica finished"
        );
    }
    report.check_agreement()?;

    if report.min_committed() == 0 {
        bail!("a replica committed nothing in {}s", cli.duration_secs);
    }
    info!(
        min_committed = report.min_committed(),
        transactions = report.committed_transactions(),
        "All replicas agree"
    );
    Ok(())
}
