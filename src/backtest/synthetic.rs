use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::{MarketSnapshot, PositionSide, TradeOutcomeSample};

/// Outcome distributions for synthetic trade histories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeScenario {
    /// 55% winners, +4% average win vs -3% average loss
    Edge,
    /// 50/50 with symmetric ±3% results
    CoinFlip,
    /// 40% winners, +3% vs -4%
    Losing,
    /// Positive edge with ±15% swings
    Volatile,
    /// Edge for the first half, then a losing streak
    DrawdownTest,
}

impl OutcomeScenario {
    pub fn all() -> [OutcomeScenario; 5] {
        [
            OutcomeScenario::Edge,
            OutcomeScenario::CoinFlip,
            OutcomeScenario::Losing,
            OutcomeScenario::Volatile,
            OutcomeScenario::DrawdownTest,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutcomeScenario::Edge => "Edge",
            OutcomeScenario::CoinFlip => "Coin flip",
            OutcomeScenario::Losing => "Losing",
            OutcomeScenario::Volatile => "Volatile",
            OutcomeScenario::DrawdownTest => "Drawdown",
        }
    }

    /// (win probability, average win, average loss)
    fn profile(&self) -> (f64, f64, f64) {
        match self {
            OutcomeScenario::Edge => (0.55, 0.04, 0.03),
            OutcomeScenario::CoinFlip => (0.50, 0.03, 0.03),
            OutcomeScenario::Losing => (0.40, 0.03, 0.04),
            OutcomeScenario::Volatile => (0.55, 0.15, 0.15),
            OutcomeScenario::DrawdownTest => (0.55, 0.04, 0.03),
        }
    }
}

/// Seeded generator of trade outcomes and market snapshots
pub struct SyntheticDataGenerator {
    rng: StdRng,
    notional: f64,
    base_price: f64,
}

impl SyntheticDataGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            notional: 10_000.0,
            base_price: 150.0,
        }
    }

    /// Generate `count` closed trades, one per hour from `start`
    pub fn outcomes(
        &mut self,
        scenario: OutcomeScenario,
        count: usize,
        start: DateTime<Utc>,
    ) -> Vec<TradeOutcomeSample> {
        let (win_rate, avg_win, avg_loss) = scenario.profile();
        let mut samples = Vec::with_capacity(count);

        for i in 0..count {
            let losing_streak = scenario == OutcomeScenario::DrawdownTest && i >= count / 2;
            let win = !losing_streak && self.rng.gen_bool(win_rate);

            // ±50% jitter around the average result
            let magnitude = (if win { avg_win } else { avg_loss }) * self.rng.gen_range(0.5..1.5);
            let ret = if win { magnitude } else { -magnitude };

            let closed_at = start + Duration::hours(i as i64);
            let entry = self.base_price * self.rng.gen_range(0.9..1.1);
            let mut sample = TradeOutcomeSample::new(
                "SYNTH",
                PositionSide::Long,
                entry,
                entry * (1.0 + ret),
                self.notional,
                self.rng.gen_range(30..4_320),
                closed_at,
            );
            sample.pnl_ratio = ret;
            samples.push(sample);
        }

        samples
    }

    /// Returns only, for Monte Carlo sweeps
    pub fn returns(&mut self, scenario: OutcomeScenario, count: usize) -> Vec<f64> {
        let start = DateTime::<Utc>::default();
        self.outcomes(scenario, count, start)
            .into_iter()
            .map(|s| s.pnl_ratio)
            .collect()
    }

    /// Random-walk snapshots for `symbol`; roughly one in `spike_every` carries a volume spike
    pub fn snapshots(
        &mut self,
        symbol: &str,
        count: usize,
        interval_secs: i64,
        spike_every: usize,
        start: DateTime<Utc>,
    ) -> Vec<MarketSnapshot> {
        let mut snapshots = Vec::with_capacity(count);
        let mut price = self.base_price;
        let open_price = price;

        for i in 0..count {
            price *= 1.0 + self.rng.gen_range(-0.004..0.004);

            let volume_ratio = if spike_every > 0 && self.rng.gen_range(0..spike_every) == 0 {
                self.rng.gen_range(2.0..6.0)
            } else {
                self.rng.gen_range(0.6..1.4)
            };

            let snapshot = MarketSnapshot::new(symbol, price, start + Duration::seconds(i as i64 * interval_secs))
                .with_price_change((price - open_price) / open_price)
                .with_volume_ratio(volume_ratio)
                .with_rsi(self.rng.gen_range(30.0..70.0));
            snapshots.push(snapshot);
        }

        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sizing::{stats_from_returns, DEFAULT_ANNUALIZATION};

    #[test]
    fn test_same_seed_same_outcomes() {
        let a = SyntheticDataGenerator::new(42).returns(OutcomeScenario::Edge, 100);
        let b = SyntheticDataGenerator::new(42).returns(OutcomeScenario::Edge, 100);
        assert_eq!(a, b);
    }

    #[test]
    fn test_edge_beats_losing() {
        let edge = SyntheticDataGenerator::new(7).returns(OutcomeScenario::Edge, 500);
        let losing = SyntheticDataGenerator::new(7).returns(OutcomeScenario::Losing, 500);

        let edge_stats = stats_from_returns(&edge, DEFAULT_ANNUALIZATION);
        let losing_stats = stats_from_returns(&losing, DEFAULT_ANNUALIZATION);
        assert!(edge_stats.sharpe_ratio > losing_stats.sharpe_ratio);
        assert!(edge_stats.win_rate > losing_stats.win_rate);
    }

    #[test]
    fn test_drawdown_second_half_all_losses() {
        let returns = SyntheticDataGenerator::new(1).returns(OutcomeScenario::DrawdownTest, 40);
        assert!(returns[20..].iter().all(|r| *r < 0.0));
    }

    #[test]
    fn test_outcome_timestamps_are_sequential() {
        let start = Utc::now();
        let samples =
            SyntheticDataGenerator::new(3).outcomes(OutcomeScenario::CoinFlip, 50, start);

        assert_eq!(samples.len(), 50);
        for i in 1..samples.len() {
            assert!(samples[i].closed_at > samples[i - 1].closed_at);
        }
    }

    #[test]
    fn test_snapshots_shape() {
        let start = Utc::now();
        let snapshots = SyntheticDataGenerator::new(9).snapshots("SOL", 200, 60, 10, start);

        assert_eq!(snapshots.len(), 200);
        assert!(snapshots.iter().all(|s| s.symbol == "SOL" && s.price > 0.0));
        assert!(snapshots.iter().any(|s| s.volume_ratio.unwrap_or(0.0) >= 2.0));
    }
}
