use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Point-in-time market data for one symbol, produced by an external collector.
///
/// Every metric except `price` is optional. An absent or non-finite metric simply
/// does not trigger anything.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub price: f64,
    /// 24h change as a ratio (0.012 = +1.2%)
    #[serde(default)]
    pub price_change_24h: Option<f64>,
    /// Current volume divided by average volume
    #[serde(default)]
    pub volume_ratio: Option<f64>,
    /// Momentum oscillator, 0..100
    #[serde(default)]
    pub rsi: Option<f64>,
    #[serde(default)]
    pub whale_transfer_usd: Option<f64>,
    #[serde(default)]
    pub liquidations_usd: Option<f64>,
    #[serde(default)]
    pub top_trader_actions: u32,
    #[serde(default)]
    pub technical_signal_count: u32,
    /// News importance score, 0..10
    #[serde(default)]
    pub news_importance: Option<u8>,
    #[serde(default)]
    pub panic_selling: bool,
    #[serde(default)]
    pub exchange_issue: bool,
    #[serde(default)]
    pub volume_spike: bool,
    #[serde(default)]
    pub sentiment_extreme: bool,
    pub timestamp: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Snapshot with only a price; all other metrics absent.
    pub fn new(symbol: impl Into<String>, price: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            price_change_24h: None,
            volume_ratio: None,
            rsi: None,
            whale_transfer_usd: None,
            liquidations_usd: None,
            top_trader_actions: 0,
            technical_signal_count: 0,
            news_importance: None,
            panic_selling: false,
            exchange_issue: false,
            volume_spike: false,
            sentiment_extreme: false,
            timestamp,
        }
    }

    pub fn with_price_change(mut self, ratio: f64) -> Self {
        self.price_change_24h = Some(ratio);
        self
    }

    pub fn with_volume_ratio(mut self, ratio: f64) -> Self {
        self.volume_ratio = Some(ratio);
        self
    }

    pub fn with_rsi(mut self, rsi: f64) -> Self {
        self.rsi = Some(rsi);
        self
    }

    pub fn with_liquidations(mut self, usd: f64) -> Self {
        self.liquidations_usd = Some(usd);
        self
    }

    pub fn with_whale_transfer(mut self, usd: f64) -> Self {
        self.whale_transfer_usd = Some(usd);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    #[default]
    Long,
    Short,
}

impl PositionSide {
    /// +1 for long, -1 for short
    pub fn sign(&self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }
}

/// Realized result of one closed position, fed back into the ledger and history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeOutcomeSample {
    pub id: Uuid,
    pub symbol: String,
    #[serde(default)]
    pub side: PositionSide,
    pub entry_price: f64,
    pub exit_price: f64,
    /// Realized return on committed capital (0.05 = +5%)
    pub pnl_ratio: f64,
    /// Capital committed to the position
    pub notional: f64,
    pub holding_minutes: i64,
    pub closed_at: DateTime<Utc>,
}

impl TradeOutcomeSample {
    pub fn new(
        symbol: impl Into<String>,
        side: PositionSide,
        entry_price: f64,
        exit_price: f64,
        notional: f64,
        holding_minutes: i64,
        closed_at: DateTime<Utc>,
    ) -> Self {
        let pnl_ratio = if entry_price > 0.0 {
            side.sign() * (exit_price - entry_price) / entry_price
        } else {
            0.0
        };

        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            side,
            entry_price,
            exit_price,
            pnl_ratio,
            notional,
            holding_minutes,
            closed_at,
        }
    }

    /// Long sample entered at 100 that realized `pnl_ratio`
    pub fn from_return(
        symbol: impl Into<String>,
        pnl_ratio: f64,
        notional: f64,
        closed_at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            symbol,
            PositionSide::Long,
            100.0,
            100.0 * (1.0 + pnl_ratio),
            notional,
            0,
            closed_at,
        )
    }

    /// Realized P&L in currency
    pub fn pnl(&self) -> f64 {
        self.notional * self.pnl_ratio
    }

    pub fn is_win(&self) -> bool {
        self.pnl_ratio > 0.0
    }
}

/// Coarse market regime supplied by the caller for dynamic sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MarketRegime {
    Trending,
    Ranging,
    Volatile,
    Uncertain,
    #[default]
    Neutral,
}

impl MarketRegime {
    pub fn sizing_multiplier(&self) -> f64 {
        match self {
            MarketRegime::Trending => 1.2,
            MarketRegime::Ranging => 0.8,
            MarketRegime::Volatile => 0.5,
            MarketRegime::Uncertain => 0.6,
            MarketRegime::Neutral => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_deserializes_with_missing_metrics() {
        let json = r#"{"symbol":"BTC","price":50000.0,"timestamp":"2024-01-01T00:00:00Z"}"#;
        let snapshot: MarketSnapshot = serde_json::from_str(json).unwrap();

        assert_eq!(snapshot.symbol, "BTC");
        assert_eq!(snapshot.price_change_24h, None);
        assert_eq!(snapshot.top_trader_actions, 0);
        assert!(!snapshot.panic_selling);
    }

    #[test]
    fn test_outcome_pnl_ratio_long_and_short() {
        let now = Utc::now();
        let long = TradeOutcomeSample::new("SOL", PositionSide::Long, 100.0, 110.0, 1000.0, 60, now);
        assert!((long.pnl_ratio - 0.10).abs() < 1e-12);
        assert!((long.pnl() - 100.0).abs() < 1e-9);

        let short = TradeOutcomeSample::new("SOL", PositionSide::Short, 100.0, 110.0, 1000.0, 60, now);
        assert!((short.pnl_ratio + 0.10).abs() < 1e-12);
        assert!(!short.is_win());
    }

    #[test]
    fn test_regime_multipliers() {
        assert_eq!(MarketRegime::Trending.sizing_multiplier(), 1.2);
        assert_eq!(MarketRegime::Volatile.sizing_multiplier(), 0.5);
        assert_eq!(MarketRegime::default().sizing_multiplier(), 1.0);
    }
}
