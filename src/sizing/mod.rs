// Kelly position sizing with Monte Carlo validation
pub mod history;
pub mod kelly;
pub mod monte_carlo;
pub mod optimizer;
pub mod stats;

pub use history::{TradeHistory, DEFAULT_HISTORY_CAPACITY};
pub use kelly::{
    dynamic_adjustment, kelly_fraction, recommendation_text, ConfidenceTier, KellyCalculator,
    KellyConfig, PositionSize,
};
pub use monte_carlo::{
    candidate_grid, CandidateResult, MonteCarloConfig, MonteCarloReport, MonteCarloValidator,
};
pub use optimizer::{
    KellyRecommendation, MarketConditions, SizingConfig, SizingDecision, SizingOptimizer,
    ValidationJob,
};
pub use stats::{max_drawdown, stats_from_returns, trade_stats, TradeStats, DEFAULT_ANNUALIZATION};
