use serde::{Deserialize, Serialize};

use super::history::TradeHistory;
use super::stats::{trade_stats, TradeStats, DEFAULT_ANNUALIZATION};
use crate::error::ConfigError;
use crate::models::MarketRegime;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KellyConfig {
    pub max_fraction: f64,
    pub min_fraction: f64,
    /// Below this many samples sizing falls back to `min_fraction`
    pub min_samples: usize,
    pub annualization: f64,
    /// Max capital at risk per trade
    pub risk_per_trade: f64,
    /// Position cap as a multiple of per-trade risk (an implied ~33% stop)
    pub stop_multiple: f64,
    /// Samples needed before confidence can rise above Low
    pub confidence_min_samples: usize,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            max_fraction: 0.25, // quarter Kelly cap
            min_fraction: 0.01,
            min_samples: 10,
            annualization: DEFAULT_ANNUALIZATION,
            risk_per_trade: 0.02,
            stop_multiple: 3.0,
            confidence_min_samples: 20,
        }
    }
}

impl KellyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("max_fraction", self.max_fraction),
            ("min_fraction", self.min_fraction),
            ("risk_per_trade", self.risk_per_trade),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::FractionOutOfRange { field, value });
            }
        }
        if self.min_fraction > self.max_fraction {
            return Err(ConfigError::Invalid(format!(
                "min_fraction {} exceeds max_fraction {}",
                self.min_fraction, self.max_fraction
            )));
        }
        if self.stop_multiple <= 0.0 || self.annualization <= 0.0 {
            return Err(ConfigError::Invalid(
                "stop_multiple and annualization must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

/// Dollar sizing derived from a fraction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PositionSize {
    pub base_position: f64,
    pub max_position: f64,
    pub actual_position: f64,
    pub position_percent: f64,
}

/// Raw Kelly fraction `(p*b - q) / b`, floored at 0 and capped at `max_fraction`.
///
/// Returns 0 for `p <= 0`, `p >= 1`, `b <= 0` and non-finite inputs.
pub fn kelly_fraction(win_rate: f64, win_loss_ratio: f64, max_fraction: f64) -> f64 {
    if !win_rate.is_finite() || !win_loss_ratio.is_finite() {
        return 0.0;
    }
    if win_rate <= 0.0 || win_rate >= 1.0 || win_loss_ratio <= 0.0 {
        return 0.0;
    }

    let p = win_rate;
    let q = 1.0 - p;
    let b = win_loss_ratio;

    ((p * b - q) / b).max(0.0).min(max_fraction.max(0.0))
}

/// Live-conditions multiplier in [0.1, 1.5]
pub fn dynamic_adjustment(current_drawdown: f64, volatility: f64, regime: MarketRegime) -> f64 {
    let mut adjustment = 1.0;

    if current_drawdown > 0.20 {
        adjustment *= 0.3;
    } else if current_drawdown > 0.10 {
        adjustment *= 0.5;
    } else if current_drawdown > 0.05 {
        adjustment *= 0.75;
    }

    if volatility > 0.30 {
        adjustment *= 0.5;
    } else if volatility > 0.20 {
        adjustment *= 0.75;
    } else if volatility < 0.10 {
        adjustment *= 1.25;
    }

    adjustment *= regime.sizing_multiplier();

    adjustment.clamp(0.1, 1.5)
}

pub struct KellyCalculator {
    config: KellyConfig,
}

impl KellyCalculator {
    pub fn new(config: KellyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KellyConfig {
        &self.config
    }

    pub fn kelly_fraction(&self, win_rate: f64, win_loss_ratio: f64) -> f64 {
        kelly_fraction(win_rate, win_loss_ratio, self.config.max_fraction)
    }

    /// Scale the base fraction by Sharpe, drawdown and sample-size step multipliers
    pub fn adjusted_fraction(&self, base: f64, stats: &TradeStats) -> f64 {
        let mut adjusted = base;

        if stats.sharpe_ratio < 0.5 {
            adjusted *= 0.5;
        } else if stats.sharpe_ratio < 1.0 {
            adjusted *= 0.75;
        } else if stats.sharpe_ratio > 2.0 {
            adjusted *= 1.25;
        }

        if stats.max_drawdown > 0.30 {
            adjusted *= 0.3;
        } else if stats.max_drawdown > 0.20 {
            adjusted *= 0.5;
        } else if stats.max_drawdown > 0.10 {
            adjusted *= 0.75;
        }

        if stats.trades_count < 30 {
            adjusted *= 0.5;
        } else if stats.trades_count < 50 {
            adjusted *= 0.75;
        } else if stats.trades_count > 100 {
            adjusted *= 1.1;
        }

        adjusted.clamp(self.config.min_fraction, self.config.max_fraction)
    }

    /// Base and adjusted fraction for a history.
    ///
    /// Cold start (fewer than `min_samples`) yields `min_fraction` for both and no stats.
    pub fn optimal_fraction(&self, history: &TradeHistory) -> (f64, f64, Option<TradeStats>) {
        if history.len() < self.config.min_samples {
            tracing::warn!(
                "Insufficient trade history ({} < {}), using minimum fraction {:.2}%",
                history.len(),
                self.config.min_samples,
                self.config.min_fraction * 100.0
            );
            return (self.config.min_fraction, self.config.min_fraction, None);
        }

        let stats = trade_stats(history.iter(), self.config.annualization);
        let base = self.kelly_fraction(stats.win_rate, stats.win_loss_ratio());
        let adjusted = self.adjusted_fraction(base, &stats);

        tracing::debug!(
            "Kelly: win_rate={:.2}% ratio={:.2} base={:.2}% adjusted={:.2}%",
            stats.win_rate * 100.0,
            stats.win_loss_ratio(),
            base * 100.0,
            adjusted * 100.0
        );

        (base, adjusted, Some(stats))
    }

    /// `min(capital * fraction, capital * risk_cap * stop_multiple)`, never above `available`
    pub fn position_size(
        &self,
        capital: f64,
        available: f64,
        fraction: f64,
        risk_cap_per_trade: f64,
    ) -> PositionSize {
        let capital = capital.max(0.0);
        let base_position = capital * fraction.max(0.0);
        let max_position = capital * risk_cap_per_trade.max(0.0) * self.config.stop_multiple;
        let actual_position = base_position.min(max_position).min(available.max(0.0));

        PositionSize {
            base_position,
            max_position,
            actual_position,
            position_percent: if capital > 0.0 {
                actual_position / capital
            } else {
                0.0
            },
        }
    }

    pub fn confidence(&self, stats: Option<&TradeStats>, fraction: f64) -> ConfidenceTier {
        let Some(stats) = stats else {
            return ConfidenceTier::Low;
        };
        if stats.trades_count < self.config.confidence_min_samples {
            return ConfidenceTier::Low;
        }

        if stats.sharpe_ratio > 1.5 && stats.win_rate > 0.55 && fraction > 0.05 {
            ConfidenceTier::High
        } else if stats.sharpe_ratio > 1.0 && stats.win_rate > 0.50 {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }
}

/// Operator-facing guidance for a final fraction
pub fn recommendation_text(fraction: f64) -> &'static str {
    if fraction < 0.02 {
        "Risk too high: stay out or use the minimum size"
    } else if fraction < 0.05 {
        "Trade cautiously with small size"
    } else if fraction < 0.10 {
        "Normal conditions, standard size"
    } else if fraction < 0.15 {
        "Favorable conditions, size may be increased moderately"
    } else {
        "Strong edge, keep risk controls in place"
    }
}
