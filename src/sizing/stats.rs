use serde::{Deserialize, Serialize};

use crate::models::TradeOutcomeSample;

pub const DEFAULT_ANNUALIZATION: f64 = 252.0;

/// Summary statistics over a window of closed trades
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct TradeStats {
    pub win_rate: f64,
    /// Mean return of winning trades
    pub avg_win: f64,
    /// Mean absolute return of losing trades
    pub avg_loss: f64,
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough decline of the compounded return curve (0.25 = 25%)
    pub max_drawdown: f64,
    pub volatility: f64,
    pub trades_count: usize,
}

impl TradeStats {
    /// Average win over average loss, 0 when either side is missing
    pub fn win_loss_ratio(&self) -> f64 {
        if self.avg_loss > 0.0 && self.avg_win > 0.0 {
            self.avg_win / self.avg_loss
        } else {
            0.0
        }
    }
}

/// Compute statistics for a sequence of samples, oldest first.
///
/// Deterministic: the same input always yields bit-identical output.
pub fn trade_stats<'a, I>(samples: I, annualization: f64) -> TradeStats
where
    I: IntoIterator<Item = &'a TradeOutcomeSample>,
{
    let returns: Vec<f64> = samples
        .into_iter()
        .map(|s| s.pnl_ratio)
        .filter(|r| r.is_finite())
        .collect();
    stats_from_returns(&returns, annualization)
}

pub fn stats_from_returns(returns: &[f64], annualization: f64) -> TradeStats {
    if returns.is_empty() {
        return TradeStats::default();
    }

    let wins: Vec<f64> = returns.iter().copied().filter(|r| *r > 0.0).collect();
    let losses: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();

    let win_rate = wins.len() as f64 / returns.len() as f64;
    let avg_win = mean(&wins);
    let avg_loss = mean(&losses).abs();

    let volatility = std_dev(returns);
    let sharpe_ratio = if volatility > 0.0 {
        mean(returns) / volatility * annualization.max(0.0).sqrt()
    } else {
        0.0
    };

    TradeStats {
        win_rate,
        avg_win,
        avg_loss,
        sharpe_ratio,
        max_drawdown: max_drawdown(returns),
        volatility,
        trades_count: returns.len(),
    }
}

/// Max drawdown of the cumulative product of (1 + r)
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut equity = 1.0;
    let mut peak = f64::MIN;
    let mut max_dd: f64 = 0.0;

    for r in returns {
        equity *= 1.0 + r;
        peak = peak.max(equity);

        if peak > 0.0 {
            max_dd = max_dd.max((peak - equity) / peak);
        }
    }

    max_dd
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let avg = mean(values);
    let variance = values
        .iter()
        .map(|v| {
            let diff = v - avg;
            diff * diff
        })
        .sum::<f64>()
        / values.len() as f64;

    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_win_rate_and_averages() {
        let stats = stats_from_returns(&[0.10, 0.05, -0.05, -0.15], DEFAULT_ANNUALIZATION);

        assert_eq!(stats.trades_count, 4);
        assert!((stats.win_rate - 0.5).abs() < 1e-12);
        assert!((stats.avg_win - 0.075).abs() < 1e-12);
        assert!((stats.avg_loss - 0.10).abs() < 1e-12);
        assert!((stats.win_loss_ratio() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_drawdown_from_compounded_curve() {
        // 1.0 -> 1.1 -> 0.88 -> 0.924
        let dd = max_drawdown(&[0.10, -0.20, 0.05]);
        assert!((dd - 0.20).abs() < 1e-12);
    }

    #[test]
    fn test_sharpe_annualized() {
        let returns = [0.02, 0.0, 0.02, 0.0];
        let stats = stats_from_returns(&returns, 1.0);
        // mean 0.01, population std 0.01
        assert!((stats.sharpe_ratio - 1.0).abs() < 1e-9);

        let annualized = stats_from_returns(&returns, 252.0);
        assert!((annualized.sharpe_ratio - 252f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_empty_and_constant_returns() {
        assert_eq!(stats_from_returns(&[], 252.0), TradeStats::default());

        let flat = stats_from_returns(&[0.01, 0.01, 0.01], 252.0);
        assert_eq!(flat.sharpe_ratio, 0.0);
        assert_eq!(flat.max_drawdown, 0.0);
        assert_eq!(flat.win_loss_ratio(), 0.0);
    }

    #[test]
    fn test_deterministic() {
        let returns = [0.031, -0.012, 0.044, -0.027, 0.008];
        let a = stats_from_returns(&returns, 252.0);
        let b = stats_from_returns(&returns, 252.0);
        assert_eq!(a.sharpe_ratio.to_bits(), b.sharpe_ratio.to_bits());
        assert_eq!(a, b);
    }
}
