use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use tradegate::config::GateConfig;
use tradegate::engine::{GateContext, Scheduler};
use tradegate::models::{MarketRegime, MarketSnapshot, TradeOutcomeSample};
use tradegate::sizing::{MarketConditions, SizingDecision, TradeHistory};
use tradegate::trigger::TriggerSignal;

#[derive(Parser)]
#[command(name = "tradegate")]
#[command(about = "Admission control, position sizing and risk budget for market signals", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML, JSON or YAML); TRADEGATE__* variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines snapshot file through the scheduler
    Run {
        /// One MarketSnapshot per line
        #[arg(short, long)]
        replay: PathBuf,
    },

    /// Evaluate one snapshot and print the gate decision
    Evaluate {
        #[arg(short, long)]
        snapshot: PathBuf,
    },

    /// Print a sizing recommendation for a trade history file
    Size {
        /// JSON array of trade outcomes, oldest first
        #[arg(long)]
        history: PathBuf,

        /// Override starting capital
        #[arg(long)]
        capital: Option<f64>,

        /// Current drawdown (0.1 = 10%)
        #[arg(long, default_value = "0.0")]
        drawdown: f64,

        #[arg(long, default_value = "0.15")]
        volatility: f64,

        /// trending, ranging, volatile, uncertain or neutral
        #[arg(long, default_value = "uncertain")]
        regime: String,
    },

    /// Load and validate the configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let config = GateConfig::load(cli.config.as_deref()).context("invalid configuration")?;

    match cli.command {
        Commands::Run { replay } => run_replay(config, &replay).await,
        Commands::Evaluate { snapshot } => evaluate_snapshot(config, &snapshot),
        Commands::Size {
            history,
            capital,
            drawdown,
            volatility,
            regime,
        } => {
            let conditions = MarketConditions {
                current_drawdown: drawdown,
                volatility,
                regime: parse_regime(&regime)?,
            };
            size_history(config, &history, capital, conditions)
        }
        Commands::CheckConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            tracing::info!("✅ Configuration valid");
            Ok(())
        }
    }
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tradegate=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn parse_regime(value: &str) -> anyhow::Result<MarketRegime> {
    serde_json::from_value(serde_json::Value::String(value.to_lowercase()))
        .with_context(|| format!("unknown regime '{}'", value))
}

// ============================================================================
// Commands
// ============================================================================

async fn run_replay(config: GateConfig, replay: &Path) -> anyhow::Result<()> {
    tracing::info!("🚀 tradegate starting replay of {}", replay.display());

    let snapshot_buffer = config.scheduler.snapshot_buffer;
    let signal_buffer = config.scheduler.signal_buffer;
    let context = Arc::new(GateContext::new(config)?);

    let (snap_tx, snap_rx) = mpsc::channel::<MarketSnapshot>(snapshot_buffer);
    let (sig_tx, sig_rx) = mpsc::channel::<TriggerSignal>(signal_buffer);

    let contents = tokio::fs::read_to_string(replay)
        .await
        .with_context(|| format!("failed to read {}", replay.display()))?;

    // Feed snapshots
    let feed_task = tokio::spawn(async move {
        let mut sent = 0usize;
        for (line_no, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<MarketSnapshot>(line) {
                Ok(snapshot) => {
                    if snap_tx.send(snapshot).await.is_err() {
                        break;
                    }
                    sent += 1;
                }
                Err(e) => tracing::warn!("Skipping line {}: {}", line_no + 1, e),
            }
        }
        sent
    });

    // Size admitted signals
    let sizing_task = {
        let context = context.clone();
        tokio::spawn(async move { consume_signals(context, sig_rx).await })
    };

    let scheduler = Scheduler::new(context.clone(), snap_rx, sig_tx);
    let summary = scheduler
        .run(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
            }
        })
        .await;

    let fed = feed_task.await?;
    let sized = sizing_task.await?;

    let capacity = context.risk_capacity()?;
    tracing::info!("\n📊 Replay summary:");
    tracing::info!("  Snapshots fed:    {}", fed);
    tracing::info!("  Ticks:            {}", summary.ticks);
    tracing::info!("  Admitted:         {}", summary.admitted);
    tracing::info!("  Blocked:          {}", summary.blocked);
    tracing::info!("  Sized:            {}", sized);
    tracing::info!("  Daily risk left:  ${:.2}", capacity.daily_risk_remaining);

    tracing::info!("👋 tradegate stopped");
    Ok(())
}

async fn consume_signals(
    context: Arc<GateContext>,
    mut signals: mpsc::Receiver<TriggerSignal>,
) -> usize {
    let mut sized = 0;
    while let Some(signal) = signals.recv().await {
        tracing::info!("🔔 {}", signal.summary());

        let sizing = context.clone();
        let decision =
            tokio::task::spawn_blocking(move || sizing.recommend_size(&MarketConditions::default())).await;

        match decision {
            Ok(Ok(SizingDecision::Approved(rec))) => {
                sized += 1;
                tracing::info!(
                    "   💰 {}: {:.2}% of capital (${:.2}, {:?} confidence)",
                    signal.symbol,
                    rec.final_fraction * 100.0,
                    rec.position_size,
                    rec.confidence
                );
            }
            Ok(Ok(SizingDecision::Refused { reason })) => {
                tracing::warn!("   🛑 {} sizing refused: {}", signal.symbol, reason);
            }
            Ok(Err(e)) => tracing::error!("   Sizing failed for {}: {}", signal.symbol, e),
            Err(e) => tracing::error!("   Sizing task panicked for {}: {}", signal.symbol, e),
        }
    }
    sized
}

fn evaluate_snapshot(config: GateConfig, path: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let snapshot: MarketSnapshot = serde_json::from_str(&raw).context("invalid snapshot JSON")?;

    let context = GateContext::new(config)?;
    let decision = context.evaluate(&snapshot);
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

fn size_history(
    mut config: GateConfig,
    path: &Path,
    capital: Option<f64>,
    conditions: MarketConditions,
) -> anyhow::Result<()> {
    if let Some(capital) = capital {
        config.budget.starting_capital = capital;
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let samples: Vec<TradeOutcomeSample> =
        serde_json::from_str(&raw).context("invalid trade history JSON")?;

    let mut history = TradeHistory::new(config.sizing.history_capacity);
    for sample in samples {
        history.push(sample);
    }

    let context = GateContext::with_history(config, history)?;
    if let Some(job) = context.validation_job()? {
        match job.run() {
            Ok(report) => {
                if report.truncated {
                    tracing::warn!("Monte Carlo time budget hit, result covers part of the grid");
                }
                context.store_validation(job.generation, report);
            }
            Err(e) => tracing::warn!("Monte Carlo validation skipped: {}", e),
        }
    }

    let decision = context.recommend_size(&conditions)?;
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}
