use clap::Parser;
use tradegate::backtest::{OutcomeScenario, SyntheticDataGenerator};
use tradegate::sizing::{
    candidate_grid, KellyCalculator, KellyConfig, MonteCarloConfig, MonteCarloReport,
    MonteCarloValidator, TradeHistory, TradeStats,
};

#[derive(Parser)]
#[command(name = "kelly_sweep")]
#[command(about = "Kelly sizing and Monte Carlo validation over synthetic trade histories", long_about = None)]
struct Args {
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Trades per synthetic history
    #[arg(long, default_value = "200")]
    trades: usize,

    #[arg(long, default_value = "1000")]
    simulations: usize,
}

struct SweepRow {
    name: &'static str,
    stats: TradeStats,
    base: f64,
    adjusted: f64,
    report: Option<MonteCarloReport>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("tradegate=warn")
        .init();

    let args = Args::parse();

    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║            KELLY SIZING SWEEP                         ║");
    println!("╚═══════════════════════════════════════════════════════╝");
    println!(
        "\n  Seed: {}  Trades: {}  Simulations: {}\n",
        args.seed, args.trades, args.simulations
    );

    let kelly = KellyConfig::default();
    let calculator = KellyCalculator::new(kelly.clone());
    let validator = MonteCarloValidator::new(MonteCarloConfig {
        seed: Some(args.seed),
        ..Default::default()
    });
    let grid = candidate_grid(
        kelly.min_fraction,
        kelly.max_fraction,
        validator.config().candidate_count,
    );

    let mut rows = Vec::new();
    for scenario in OutcomeScenario::all() {
        let mut generator = SyntheticDataGenerator::new(args.seed);
        let samples = generator.outcomes(scenario, args.trades, chrono::Utc::now());
        let history: TradeHistory = samples.into_iter().collect();

        let (base, adjusted, stats) = calculator.optimal_fraction(&history);
        let report = match validator.validate(&history.returns(), &grid, args.simulations) {
            Ok(report) => Some(report),
            Err(e) => {
                println!("  ⚠️  {}: Monte Carlo skipped ({})", scenario.name(), e);
                None
            }
        };

        rows.push(SweepRow {
            name: scenario.name(),
            stats: stats.unwrap_or_default(),
            base,
            adjusted,
            report,
        });
    }

    print_sweep_table(&rows);
    Ok(())
}

fn print_sweep_table(rows: &[SweepRow]) {
    println!(
        "{:<12} {:>7} {:>8} {:>8} {:>8} {:>9} {:>8} {:>8}",
        "Scenario", "Win%", "Sharpe", "Kelly%", "Adj%", "MC best%", "Ruin%", "E[ret]%"
    );
    println!("{}", "─".repeat(78));

    for row in rows {
        let (best, ruin, expected) = match &row.report {
            Some(report) => (
                report.best.fraction * 100.0,
                report.best.ruin_probability * 100.0,
                report.best.expected_return * 100.0,
            ),
            None => (0.0, 0.0, 0.0),
        };
        println!(
            "{:<12} {:>7.1} {:>8.2} {:>8.2} {:>8.2} {:>9.2} {:>8.1} {:>8.1}",
            row.name,
            row.stats.win_rate * 100.0,
            row.stats.sharpe_ratio,
            row.base * 100.0,
            row.adjusted * 100.0,
            best,
            ruin,
            expected
        );
    }

    if let Some(best) = rows
        .iter()
        .filter(|r| r.report.is_some())
        .max_by(|a, b| a.adjusted.total_cmp(&b.adjusted))
    {
        println!("\n🏆 Largest adjusted fraction: {} ({:.2}%)", best.name, best.adjusted * 100.0);
    }

    let truncated = rows
        .iter()
        .filter(|r| r.report.as_ref().is_some_and(|rep| rep.truncated))
        .count();
    if truncated > 0 {
        println!("⚠️  {} scenario(s) hit the Monte Carlo time budget", truncated);
    }

    println!("\n═══════════════════════════════════════════════════════\n");
}
