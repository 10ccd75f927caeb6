use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TriggerLevel {
    None,
    /// Local/cheap handling
    Level1,
    /// Standard paid analysis
    Level2,
    /// Emergency deep analysis
    Level3,
}

impl TriggerLevel {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => TriggerLevel::None,
            1 => TriggerLevel::Level1,
            2 => TriggerLevel::Level2,
            _ => TriggerLevel::Level3,
        }
    }

    pub fn value(&self) -> u8 {
        match self {
            TriggerLevel::None => 0,
            TriggerLevel::Level1 => 1,
            TriggerLevel::Level2 => 2,
            TriggerLevel::Level3 => 3,
        }
    }

    /// Raise by one, never above `cap`
    pub fn escalate(self, cap: TriggerLevel) -> Self {
        let raised = TriggerLevel::from_u8(self.value() + 1);
        raised.min(cap).max(self)
    }

    /// Queue priority 0..10 for downstream consumers
    pub fn priority(&self) -> u8 {
        match self {
            TriggerLevel::None => 0,
            TriggerLevel::Level1 => 2,
            TriggerLevel::Level2 => 5,
            TriggerLevel::Level3 => 9,
        }
    }
}

/// Dominant driver of a trigger, used as the cooldown key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    NewsDriven,
    TraderDriven,
    WhaleActivity,
    PriceMovement,
    VolumeSpike,
    LiquidationCascade,
    TechnicalSignal,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::NewsDriven => "news_driven",
            TriggerType::TraderDriven => "trader_driven",
            TriggerType::WhaleActivity => "whale_activity",
            TriggerType::PriceMovement => "price_movement",
            TriggerType::VolumeSpike => "volume_spike",
            TriggerType::LiquidationCascade => "liquidation_cascade",
            TriggerType::TechnicalSignal => "technical_signal",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonKind {
    BlackSwan,
    ExtremePriceChange,
    MassiveLiquidation,
    PriceChange,
    VolumeSpike,
    MomentumExtreme,
    TopTraderAction,
    WhaleTransfer,
    Liquidations,
    TechnicalConfluence,
    MultiSymbol,
    VolumeSpikeFlag,
    SentimentExtreme,
}

impl ReasonKind {
    pub fn code(&self) -> &'static str {
        match self {
            ReasonKind::BlackSwan => "black_swan",
            ReasonKind::ExtremePriceChange => "extreme_price_change",
            ReasonKind::MassiveLiquidation => "massive_liquidation",
            ReasonKind::PriceChange => "price_change",
            ReasonKind::VolumeSpike => "volume_spike",
            ReasonKind::MomentumExtreme => "momentum_extreme",
            ReasonKind::TopTraderAction => "top_trader_action",
            ReasonKind::WhaleTransfer => "whale_transfer",
            ReasonKind::Liquidations => "liquidations",
            ReasonKind::TechnicalConfluence => "technical_confluence",
            ReasonKind::MultiSymbol => "multi_symbol",
            ReasonKind::VolumeSpikeFlag => "volume_spike_flag",
            ReasonKind::SentimentExtreme => "sentiment_extreme",
        }
    }

    /// Snapshot metric this reason is derived from, if any
    pub fn metric(&self) -> Option<&'static str> {
        match self {
            ReasonKind::ExtremePriceChange | ReasonKind::PriceChange => Some("price"),
            ReasonKind::VolumeSpike => Some("volume"),
            ReasonKind::MomentumExtreme => Some("momentum"),
            ReasonKind::WhaleTransfer => Some("whale"),
            ReasonKind::MassiveLiquidation | ReasonKind::Liquidations => Some("liquidation"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerReason {
    pub kind: ReasonKind,
    pub detail: String,
}

impl TriggerReason {
    pub fn new(kind: ReasonKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.detail)
    }
}

/// Admitted trigger handed to the downstream analysis layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSignal {
    pub symbol: String,
    pub level: TriggerLevel,
    pub trigger_type: TriggerType,
    /// Determining reasons first
    pub reasons: Vec<TriggerReason>,
    /// score / 100, capped at 1
    pub confidence: f64,
    pub score: f64,
    pub priority: u8,
    pub timestamp: DateTime<Utc>,
}

impl TriggerSignal {
    pub fn has_reason(&self, kind: ReasonKind) -> bool {
        self.reasons.iter().any(|r| r.kind == kind)
    }

    pub fn summary(&self) -> String {
        self.reasons
            .iter()
            .map(|r| r.detail.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Why a qualifying trigger was refused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockReason {
    SignalCooldown {
        trigger_type: TriggerType,
        remaining_secs: i64,
    },
    SymbolCooldown {
        remaining_secs: i64,
    },
    RateLimited {
        count: usize,
        cap: usize,
    },
}

impl BlockReason {
    pub fn code(&self) -> &'static str {
        match self {
            BlockReason::SignalCooldown { .. } => "signal_cooldown",
            BlockReason::SymbolCooldown { .. } => "symbol_cooldown",
            BlockReason::RateLimited { .. } => "rate_limited",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::SignalCooldown {
                trigger_type,
                remaining_secs,
            } => write!(
                f,
                "signal cooldown for {} ({}s remaining)",
                trigger_type, remaining_secs
            ),
            BlockReason::SymbolCooldown { remaining_secs } => {
                write!(f, "symbol cooldown ({}s remaining)", remaining_secs)
            }
            BlockReason::RateLimited { count, cap } => {
                write!(f, "hourly rate limit reached ({}/{})", count, cap)
            }
        }
    }
}

/// Outcome of one gate evaluation. `NoSignal` and `Blocked` are never conflated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    Admitted(TriggerSignal),
    NoSignal,
    Blocked {
        symbol: String,
        level: TriggerLevel,
        reason: BlockReason,
    },
}

impl GateDecision {
    pub fn signal(&self) -> Option<&TriggerSignal> {
        match self {
            GateDecision::Admitted(signal) => Some(signal),
            _ => None,
        }
    }

    pub fn into_signal(self) -> Option<TriggerSignal> {
        match self {
            GateDecision::Admitted(signal) => Some(signal),
            _ => None,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, GateDecision::Blocked { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalate_respects_cap() {
        assert_eq!(
            TriggerLevel::Level1.escalate(TriggerLevel::Level2),
            TriggerLevel::Level2
        );
        assert_eq!(
            TriggerLevel::Level2.escalate(TriggerLevel::Level2),
            TriggerLevel::Level2
        );
        assert_eq!(
            TriggerLevel::Level2.escalate(TriggerLevel::Level3),
            TriggerLevel::Level3
        );
        // Never lowers an already-higher level
        assert_eq!(
            TriggerLevel::Level3.escalate(TriggerLevel::Level2),
            TriggerLevel::Level3
        );
    }

    #[test]
    fn test_block_reason_serializes_with_kind() {
        let reason = BlockReason::RateLimited { count: 100, cap: 100 };
        let json = serde_json::to_string(&reason).unwrap();
        assert!(json.contains("\"kind\":\"rate_limited\""));
        assert_eq!(reason.code(), "rate_limited");
    }
}
