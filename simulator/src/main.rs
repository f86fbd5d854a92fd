//! SplitBook Simulator
//!
//! Workload driver for the ledger core: builds a book, hammers it with
//! concurrent edits and removals, then sweeps it for broken invariants.

use clap::Parser;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod scenario;
mod controller;
mod metrics;

use controller::{SimulationController, Verification};
use metrics::SimulationMetrics;
use scenario::Scenario;
use splitbook_ledger::LedgerConfig;

/// SplitBook Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "SplitBook ledger workload driver")]
struct Args {
    /// Number of accounts to create
    #[arg(short, long, default_value = "8")]
    accounts: usize,

    /// Number of transactions to generate
    #[arg(short, long, default_value = "1000")]
    transactions: usize,

    /// Concurrent workers
    #[arg(short, long, default_value = "4")]
    workers: usize,

    /// Random edits applied to each transaction
    #[arg(short, long, default_value = "6")]
    edits: usize,

    /// Scripted scenario to run instead of the random workload
    #[arg(short, long)]
    scenario: Option<String>,

    /// Mirror lone source splits instead of leaving them single-entry
    #[arg(long)]
    forced_double_entry: bool,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Emit JSON logs
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Report {
    seed: u64,
    accounts: usize,
    workers: usize,
    forced_double_entry: bool,
    elapsed_ms: u128,
    average_rebalance_us: u64,
    p99_rebalance_us: u64,
    metrics: SimulationMetrics,
    verification: Verification,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );
    if args.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let mut config = LedgerConfig::from_env();
    config.forced_double_entry |= args.forced_double_entry;

    if let Some(name) = &args.scenario {
        let scenario = Scenario::load(name)?;
        config.forced_double_entry |= scenario.forced_double_entry;
        config.validate()?;

        let controller = SimulationController::new(config, args.seed);
        controller.run_scenario(scenario).await?;
        info!("Scenario {} passed", name);
        return Ok(());
    }

    config.validate()?;

    info!("Starting SplitBook Simulator");
    info!("Accounts: {}", args.accounts);
    info!("Workers: {}", args.workers);

    let forced_double_entry = config.forced_double_entry;
    let mut controller = SimulationController::new(config, args.seed);
    controller.initialize(args.accounts).await?;

    let started = std::time::Instant::now();
    controller
        .run(args.transactions, args.workers, args.edits)
        .await?;
    let elapsed_ms = started.elapsed().as_millis();

    let verification = controller.verify().await;
    let metrics = controller.get_metrics().await;

    info!("Simulation complete");
    info!("Transactions: {}", metrics.transactions);
    info!("Rebalances: {}", metrics.rebalances);
    info!("Average rebalance latency: {}us", metrics.average_latency_us());

    let consistent = verification.is_consistent() && metrics.is_clean();
    let report = Report {
        seed: controller.seed(),
        accounts: args.accounts,
        workers: args.workers,
        forced_double_entry,
        elapsed_ms,
        average_rebalance_us: metrics.average_latency_us(),
        p99_rebalance_us: metrics.p99_latency_us(),
        metrics,
        verification,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !consistent {
        error!("Ledger invariants violated");
        anyhow::bail!("Ledger invariants violated (seed {})", report.seed);
    }

    Ok(())
}
