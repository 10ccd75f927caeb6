use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::cooldown::{CooldownConfig, CooldownLedger};
use super::signal::{
    BlockReason, GateDecision, ReasonKind, TriggerLevel, TriggerReason, TriggerSignal,
    TriggerType,
};
use super::thresholds::TriggerThresholds;
use crate::error::ConfigError;
use crate::models::MarketSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerConfig {
    pub thresholds: TriggerThresholds,
    pub cooldown: CooldownConfig,
    /// News importance that counts toward the black-swan rule
    pub critical_news_importance: u8,
    /// News importance that classifies a trigger as news-driven
    pub news_driven_importance: u8,
    /// Top-trader actions that classify a trigger as trader-driven
    pub trader_driven_actions: u32,
    /// Technical signals needed for the level-2 confluence condition
    pub technical_confluence: u32,
    /// Distinct symbols triggering within the window to escalate
    pub multi_symbol_count: usize,
    pub multi_symbol_window_secs: i64,
    /// Highest level escalation may reach (level 3 is otherwise reserved for extreme events)
    pub max_escalated_level: u8,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            thresholds: TriggerThresholds::default(),
            cooldown: CooldownConfig::default(),
            critical_news_importance: 9,
            news_driven_importance: 7,
            trader_driven_actions: 2,
            technical_confluence: 3,
            multi_symbol_count: 3,
            multi_symbol_window_secs: 60,
            max_escalated_level: 2,
        }
    }
}

impl TriggerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;
        self.cooldown.validate()?;

        if self.critical_news_importance > 10 || self.news_driven_importance > 10 {
            return Err(ConfigError::Invalid(
                "news importance thresholds must be within 0..=10".to_string(),
            ));
        }
        if !(1..=3).contains(&self.max_escalated_level) {
            return Err(ConfigError::Invalid(format!(
                "max_escalated_level must be 1..=3, got {}",
                self.max_escalated_level
            )));
        }
        if self.multi_symbol_count < 2 || self.multi_symbol_window_secs <= 0 {
            return Err(ConfigError::Invalid(
                "multi-symbol escalation needs count >= 2 and a positive window".to_string(),
            ));
        }
        Ok(())
    }
}

/// Running counters for operators
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GateStats {
    pub evaluations: u64,
    pub no_signal: u64,
    pub level1_admitted: u64,
    pub level2_admitted: u64,
    pub level3_admitted: u64,
    pub blocked_signal_cooldown: u64,
    pub blocked_symbol_cooldown: u64,
    pub blocked_rate_limited: u64,
    pub admitted_last_hour: usize,
    pub active_cooldowns: usize,
}

impl GateStats {
    pub fn total_admitted(&self) -> u64 {
        self.level1_admitted + self.level2_admitted + self.level3_admitted
    }

    pub fn total_blocked(&self) -> u64 {
        self.blocked_signal_cooldown + self.blocked_symbol_cooldown + self.blocked_rate_limited
    }
}

/// Sanitized per-metric deviations. Missing, negative and non-finite inputs are `None`.
#[derive(Debug, Clone, Copy)]
struct Deviations {
    price_change: Option<f64>,
    volume_ratio: Option<f64>,
    momentum: Option<f64>,
    whale: Option<f64>,
    liquidations: Option<f64>,
}

impl Deviations {
    fn from_snapshot(snapshot: &MarketSnapshot) -> Self {
        Self {
            price_change: snapshot
                .price_change_24h
                .filter(|v| v.is_finite())
                .map(f64::abs),
            volume_ratio: non_negative(snapshot.volume_ratio),
            momentum: snapshot
                .rsi
                .filter(|v| v.is_finite() && (0.0..=100.0).contains(v))
                .map(|rsi| (rsi - 50.0).abs()),
            whale: non_negative(snapshot.whale_transfer_usd),
            liquidations: non_negative(snapshot.liquidations_usd),
        }
    }
}

fn non_negative(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

struct Assessment {
    level: TriggerLevel,
    score: f64,
    reasons: Vec<TriggerReason>,
}

/// Multi-level admission gate.
///
/// Scoring is a pure function of the snapshot and thresholds; the cooldown ledger is
/// only touched when a trigger is admitted.
pub struct TriggerGate {
    config: TriggerConfig,
    cooldowns: CooldownLedger,
    // Last base-level trigger per symbol, for multi-symbol escalation
    recent_activity: HashMap<String, DateTime<Utc>>,
    stats: GateStats,
}

impl TriggerGate {
    pub fn new(config: TriggerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let cooldowns = CooldownLedger::new(config.cooldown.clone());
        Ok(Self {
            config,
            cooldowns,
            recent_activity: HashMap::new(),
            stats: GateStats::default(),
        })
    }

    pub fn thresholds(&self) -> &TriggerThresholds {
        &self.config.thresholds
    }

    pub fn scale_sensitivity(&mut self, factor: f64) -> Result<(), ConfigError> {
        self.config.thresholds.scale_sensitivity(factor)
    }

    /// Evaluate one snapshot. Snapshots for a symbol must arrive in timestamp order.
    pub fn evaluate(&mut self, snapshot: &MarketSnapshot) -> GateDecision {
        self.stats.evaluations += 1;
        let now = snapshot.timestamp;
        let deviations = Deviations::from_snapshot(snapshot);

        let Some(mut assessment) = self.assess(snapshot, &deviations) else {
            self.stats.no_signal += 1;
            return GateDecision::NoSignal;
        };

        self.apply_escalation(snapshot, &mut assessment, now);
        self.append_supporting_reasons(&deviations, &mut assessment.reasons);

        let trigger_type = self.classify(snapshot, &deviations);

        if let Err(reason) = self.cooldowns.check(&snapshot.symbol, trigger_type, now) {
            self.count_block(&reason);
            tracing::debug!(
                "Trigger blocked for {} (level {}): {}",
                snapshot.symbol,
                assessment.level.value(),
                reason
            );
            return GateDecision::Blocked {
                symbol: snapshot.symbol.clone(),
                level: assessment.level,
                reason,
            };
        }

        self.cooldowns
            .record(&snapshot.symbol, trigger_type, assessment.level, now);

        let signal = TriggerSignal {
            symbol: snapshot.symbol.clone(),
            level: assessment.level,
            trigger_type,
            confidence: (assessment.score / 100.0).min(1.0),
            score: assessment.score,
            priority: assessment.level.priority(),
            reasons: assessment.reasons,
            timestamp: now,
        };

        match signal.level {
            TriggerLevel::Level1 => self.stats.level1_admitted += 1,
            TriggerLevel::Level2 => self.stats.level2_admitted += 1,
            TriggerLevel::Level3 => self.stats.level3_admitted += 1,
            TriggerLevel::None => {}
        }

        if signal.level == TriggerLevel::Level3 {
            tracing::warn!(
                "🚨 Level 3 trigger: {} [{}] {}",
                signal.symbol,
                signal.trigger_type,
                signal.summary()
            );
        } else {
            tracing::info!(
                "Trigger admitted: {} - Level {} [{}] {}",
                signal.symbol,
                signal.level.value(),
                signal.trigger_type,
                signal.summary()
            );
        }

        GateDecision::Admitted(signal)
    }

    /// Counters plus live cooldown occupancy at `now`
    pub fn stats(&self, now: DateTime<Utc>) -> GateStats {
        GateStats {
            admitted_last_hour: self.cooldowns.admitted_last_hour(now),
            active_cooldowns: self.cooldowns.active_cooldowns(now),
            ..self.stats.clone()
        }
    }

    /// Operator override: forget every cooldown and the hourly window
    pub fn reset_cooldowns(&mut self) {
        self.cooldowns.clear();
        self.recent_activity.clear();
        tracing::info!("Trigger cooldowns cleared");
    }

    fn assess(&self, snapshot: &MarketSnapshot, d: &Deviations) -> Option<Assessment> {
        let t = &self.config.thresholds;

        // Level 3: black swan co-occurrence
        let extreme_price = t.price_change.reaches(d.price_change, 3);
        let massive_liquidation = t.liquidation_usd.reaches(d.liquidations, 3);
        let critical_news = snapshot
            .news_importance
            .is_some_and(|n| n >= self.config.critical_news_importance);

        let extremes: Vec<&str> = [
            (extreme_price, "extreme price change"),
            (massive_liquidation, "massive liquidations"),
            (critical_news, "critical news"),
            (snapshot.panic_selling, "panic selling"),
            (snapshot.exchange_issue, "exchange issue"),
        ]
        .iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, name)| *name)
        .collect();

        if extremes.len() >= 2 {
            return Some(Assessment {
                level: TriggerLevel::Level3,
                score: 100.0,
                reasons: vec![TriggerReason::new(
                    ReasonKind::BlackSwan,
                    format!("Black swan event: {}", extremes.join(", ")),
                )],
            });
        }

        if extreme_price {
            return Some(Assessment {
                level: TriggerLevel::Level3,
                score: 50.0,
                reasons: vec![price_reason(ReasonKind::ExtremePriceChange, d)],
            });
        }

        if massive_liquidation {
            return Some(Assessment {
                level: TriggerLevel::Level3,
                score: 45.0,
                reasons: vec![liquidation_reason(ReasonKind::MassiveLiquidation, d)],
            });
        }

        // Level 2: at least two weighted conditions
        let mut level2 = Vec::new();
        if t.price_change.reaches(d.price_change, 2) {
            level2.push((30.0, price_reason(ReasonKind::PriceChange, d)));
        }
        if t.volume_ratio.reaches(d.volume_ratio, 2) {
            level2.push((25.0, volume_reason(d)));
        }
        if snapshot.top_trader_actions >= 1 {
            level2.push((
                30.0,
                TriggerReason::new(
                    ReasonKind::TopTraderAction,
                    format!("Top traders action: {} traders", snapshot.top_trader_actions),
                ),
            ));
        }
        if t.whale_transfer_usd.reaches(d.whale, 2) {
            level2.push((20.0, whale_reason(d)));
        }
        if snapshot.technical_signal_count >= self.config.technical_confluence {
            level2.push((
                15.0,
                TriggerReason::new(
                    ReasonKind::TechnicalConfluence,
                    format!(
                        "Technical confluence: {} signals",
                        snapshot.technical_signal_count
                    ),
                ),
            ));
        }

        if level2.len() >= 2 {
            let score = level2.iter().map(|(w, _)| w).sum();
            return Some(Assessment {
                level: TriggerLevel::Level2,
                score,
                reasons: level2.into_iter().map(|(_, r)| r).collect(),
            });
        }

        // Level 1: simple OR
        let mut level1 = Vec::new();
        if t.price_change.reaches(d.price_change, 1) {
            level1.push(price_reason(ReasonKind::PriceChange, d));
        }
        if t.volume_ratio.reaches(d.volume_ratio, 1) {
            level1.push(volume_reason(d));
        }
        if t.momentum.reaches(d.momentum, 1) {
            level1.push(TriggerReason::new(
                ReasonKind::MomentumExtreme,
                format!(
                    "Momentum extreme: RSI {:.1}",
                    snapshot.rsi.unwrap_or_default()
                ),
            ));
        }

        if level1.is_empty() {
            return None;
        }

        Some(Assessment {
            level: TriggerLevel::Level1,
            score: 10.0 * level1.len() as f64,
            reasons: level1,
        })
    }

    fn apply_escalation(
        &mut self,
        snapshot: &MarketSnapshot,
        assessment: &mut Assessment,
        now: DateTime<Utc>,
    ) {
        let cap = TriggerLevel::from_u8(self.config.max_escalated_level);

        let active = self.note_activity(&snapshot.symbol, now);
        if active >= self.config.multi_symbol_count {
            assessment.level = assessment.level.escalate(cap);
            assessment.reasons.push(TriggerReason::new(
                ReasonKind::MultiSymbol,
                format!("{} symbols triggering simultaneously", active),
            ));
        }

        if snapshot.volume_spike {
            assessment.level = assessment.level.escalate(cap);
            assessment.reasons.push(TriggerReason::new(
                ReasonKind::VolumeSpikeFlag,
                "Volume spike flagged",
            ));
        }

        if snapshot.sentiment_extreme {
            assessment.level = assessment.level.escalate(cap);
            assessment.reasons.push(TriggerReason::new(
                ReasonKind::SentimentExtreme,
                "Extreme sentiment flagged",
            ));
        }
    }

    /// Record that `symbol` reached a base level and return how many distinct
    /// symbols have done so within the window
    fn note_activity(&mut self, symbol: &str, now: DateTime<Utc>) -> usize {
        let window = Duration::seconds(self.config.multi_symbol_window_secs);
        self.recent_activity.insert(symbol.to_string(), now);
        self.recent_activity.retain(|_, at| {
            let age = now.signed_duration_since(*at);
            age < window && age > -window
        });
        self.recent_activity.len()
    }

    /// Every other metric that crossed level 1, after the determining reasons
    fn append_supporting_reasons(&self, d: &Deviations, reasons: &mut Vec<TriggerReason>) {
        let t = &self.config.thresholds;
        let candidates = [
            (t.price_change.reaches(d.price_change, 1), "price"),
            (t.volume_ratio.reaches(d.volume_ratio, 1), "volume"),
            (t.momentum.reaches(d.momentum, 1), "momentum"),
            (t.whale_transfer_usd.reaches(d.whale, 1), "whale"),
            (t.liquidation_usd.reaches(d.liquidations, 1), "liquidation"),
        ];

        for (hit, metric) in candidates {
            if !hit || reasons.iter().any(|r| r.kind.metric() == Some(metric)) {
                continue;
            }
            let reason = match metric {
                "price" => price_reason(ReasonKind::PriceChange, d),
                "volume" => volume_reason(d),
                "momentum" => TriggerReason::new(
                    ReasonKind::MomentumExtreme,
                    format!("Momentum deviation: {:.1}", d.momentum.unwrap_or_default()),
                ),
                "whale" => whale_reason(d),
                _ => liquidation_reason(ReasonKind::Liquidations, d),
            };
            reasons.push(reason);
        }
    }

    fn classify(&self, snapshot: &MarketSnapshot, d: &Deviations) -> TriggerType {
        let t = &self.config.thresholds;

        if snapshot
            .news_importance
            .is_some_and(|n| n >= self.config.news_driven_importance)
        {
            TriggerType::NewsDriven
        } else if snapshot.top_trader_actions >= self.config.trader_driven_actions {
            TriggerType::TraderDriven
        } else if t.whale_transfer_usd.reaches(d.whale, 1) {
            TriggerType::WhaleActivity
        } else if t.price_change.reaches(d.price_change, 1) {
            TriggerType::PriceMovement
        } else if t.volume_ratio.reaches(d.volume_ratio, 1) {
            TriggerType::VolumeSpike
        } else if t.liquidation_usd.reaches(d.liquidations, 1) {
            TriggerType::LiquidationCascade
        } else {
            TriggerType::TechnicalSignal
        }
    }

    fn count_block(&mut self, reason: &BlockReason) {
        match reason {
            BlockReason::SignalCooldown { .. } => self.stats.blocked_signal_cooldown += 1,
            BlockReason::SymbolCooldown { .. } => self.stats.blocked_symbol_cooldown += 1,
            BlockReason::RateLimited { .. } => self.stats.blocked_rate_limited += 1,
        }
    }
}

fn price_reason(kind: ReasonKind, d: &Deviations) -> TriggerReason {
    let label = match kind {
        ReasonKind::ExtremePriceChange => "Extreme price change",
        _ => "Price change",
    };
    TriggerReason::new(
        kind,
        format!("{}: {:.2}%", label, d.price_change.unwrap_or_default() * 100.0),
    )
}

fn volume_reason(d: &Deviations) -> TriggerReason {
    TriggerReason::new(
        ReasonKind::VolumeSpike,
        format!("Volume spike: {:.1}x", d.volume_ratio.unwrap_or_default()),
    )
}

fn whale_reason(d: &Deviations) -> TriggerReason {
    TriggerReason::new(
        ReasonKind::WhaleTransfer,
        format!("Whale transfer: ${:.1}M", d.whale.unwrap_or_default() / 1e6),
    )
}

fn liquidation_reason(kind: ReasonKind, d: &Deviations) -> TriggerReason {
    TriggerReason::new(
        kind,
        format!("Liquidations: ${:.1}M", d.liquidations.unwrap_or_default() / 1e6),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn gate() -> TriggerGate {
        TriggerGate::new(TriggerConfig::default()).unwrap()
    }

    #[test]
    fn test_quiet_snapshot_is_no_signal() {
        let mut gate = gate();
        let snapshot = MarketSnapshot::new("BTC", 50_000.0, t0())
            .with_price_change(0.002)
            .with_volume_ratio(1.1)
            .with_rsi(55.0);

        assert_eq!(gate.evaluate(&snapshot), GateDecision::NoSignal);
        assert_eq!(gate.stats(t0()).no_signal, 1);
    }

    #[test]
    fn test_small_price_move_is_level_one() {
        let mut gate = gate();
        let snapshot = MarketSnapshot::new("BTC", 50_000.0, t0()).with_price_change(0.012);

        let signal = gate.evaluate(&snapshot).into_signal().unwrap();
        assert_eq!(signal.level, TriggerLevel::Level1);
        assert_eq!(signal.reasons[0].code(), "price_change");
        assert_eq!(signal.trigger_type, TriggerType::PriceMovement);
        assert!((signal.confidence - 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_equality_triggers() {
        let mut gate = gate();
        let snapshot = MarketSnapshot::new("BTC", 50_000.0, t0()).with_volume_ratio(2.0);

        let signal = gate.evaluate(&snapshot).into_signal().unwrap();
        assert_eq!(signal.level, TriggerLevel::Level1);
        assert_eq!(signal.reasons[0].kind, ReasonKind::VolumeSpike);
    }

    #[test]
    fn test_level_two_needs_two_conditions() {
        let mut gate = gate();

        // Price alone at level-2 strength is only a level-1 trigger
        let single = MarketSnapshot::new("ETH", 3_000.0, t0()).with_price_change(-0.04);
        let signal = gate.evaluate(&single).into_signal().unwrap();
        assert_eq!(signal.level, TriggerLevel::Level1);

        let mut double = MarketSnapshot::new("SOL", 150.0, t0())
            .with_price_change(0.04)
            .with_volume_ratio(3.5);
        double.top_trader_actions = 1;
        let signal = gate.evaluate(&double).into_signal().unwrap();
        assert_eq!(signal.level, TriggerLevel::Level2);
        // 30 price + 25 volume + 30 top trader
        assert!((signal.score - 85.0).abs() < 1e-12);
        assert!((signal.confidence - 0.85).abs() < 1e-12);
        assert_eq!(signal.priority, 5);
    }

    #[test]
    fn test_black_swan_requires_two_extremes() {
        let mut gate = gate();
        let mut snapshot = MarketSnapshot::new("BTC", 40_000.0, t0()).with_price_change(-0.15);
        snapshot.panic_selling = true;

        let signal = gate.evaluate(&snapshot).into_signal().unwrap();
        assert_eq!(signal.level, TriggerLevel::Level3);
        assert_eq!(signal.reasons[0].kind, ReasonKind::BlackSwan);
        assert_eq!(signal.confidence, 1.0);
    }

    #[test]
    fn test_single_extreme_shortcuts() {
        let mut gate = gate();

        let price = MarketSnapshot::new("BTC", 40_000.0, t0()).with_price_change(0.10);
        let signal = gate.evaluate(&price).into_signal().unwrap();
        assert_eq!(signal.level, TriggerLevel::Level3);
        assert_eq!(signal.reasons[0].kind, ReasonKind::ExtremePriceChange);
        assert_eq!(signal.score, 50.0);

        let liq = MarketSnapshot::new("ETH", 3_000.0, t0()).with_liquidations(150_000_000.0);
        let signal = gate.evaluate(&liq).into_signal().unwrap();
        assert_eq!(signal.level, TriggerLevel::Level3);
        assert_eq!(signal.reasons[0].kind, ReasonKind::MassiveLiquidation);
        assert_eq!(signal.trigger_type, TriggerType::LiquidationCascade);
    }

    #[test]
    fn test_flags_escalate_but_cap_at_two_by_default() {
        let mut gate = gate();
        let mut snapshot = MarketSnapshot::new("BTC", 50_000.0, t0()).with_price_change(0.012);
        snapshot.volume_spike = true;
        snapshot.sentiment_extreme = true;

        let signal = gate.evaluate(&snapshot).into_signal().unwrap();
        assert_eq!(signal.level, TriggerLevel::Level2);
        assert!(signal.has_reason(ReasonKind::VolumeSpikeFlag));
        assert!(signal.has_reason(ReasonKind::SentimentExtreme));
    }

    #[test]
    fn test_escalation_cap_configurable_to_three() {
        let config = TriggerConfig {
            max_escalated_level: 3,
            ..Default::default()
        };
        let mut gate = TriggerGate::new(config).unwrap();
        let mut snapshot = MarketSnapshot::new("BTC", 50_000.0, t0()).with_price_change(0.012);
        snapshot.volume_spike = true;
        snapshot.sentiment_extreme = true;

        let signal = gate.evaluate(&snapshot).into_signal().unwrap();
        assert_eq!(signal.level, TriggerLevel::Level3);
    }

    #[test]
    fn test_multi_symbol_escalation() {
        let mut gate = gate();
        let symbols = ["BTC", "ETH", "SOL"];
        let mut last = None;
        for (i, symbol) in symbols.iter().enumerate() {
            let snapshot = MarketSnapshot::new(*symbol, 100.0, t0() + Duration::seconds(i as i64))
                .with_price_change(0.012);
            last = gate.evaluate(&snapshot).into_signal();
        }

        let signal = last.unwrap();
        assert_eq!(signal.symbol, "SOL");
        assert_eq!(signal.level, TriggerLevel::Level2);
        assert!(signal.has_reason(ReasonKind::MultiSymbol));
    }

    #[test]
    fn test_cooldown_block_is_distinct_from_no_signal() {
        let mut gate = gate();
        let snapshot = MarketSnapshot::new("BTC", 50_000.0, t0()).with_price_change(0.012);
        assert!(gate.evaluate(&snapshot).signal().is_some());

        let again = MarketSnapshot::new("BTC", 50_100.0, t0() + Duration::seconds(30))
            .with_price_change(0.013);
        let decision = gate.evaluate(&again);
        assert!(decision.is_blocked());
        if let GateDecision::Blocked { reason, level, .. } = decision {
            assert_eq!(reason.code(), "signal_cooldown");
            assert_eq!(level, TriggerLevel::Level1);
        }

        let stats = gate.stats(t0() + Duration::seconds(30));
        assert_eq!(stats.level1_admitted, 1);
        assert_eq!(stats.blocked_signal_cooldown, 1);
        assert_eq!(stats.admitted_last_hour, 1);
    }

    #[test]
    fn test_malformed_metrics_do_not_trigger() {
        let mut gate = gate();
        let snapshot = MarketSnapshot::new("BTC", 50_000.0, t0())
            .with_price_change(f64::NAN)
            .with_volume_ratio(f64::INFINITY)
            .with_rsi(-20.0)
            .with_liquidations(-5.0e9);

        assert_eq!(gate.evaluate(&snapshot), GateDecision::NoSignal);
    }

    #[test]
    fn test_supporting_reasons_follow_determining() {
        let mut gate = gate();
        let snapshot = MarketSnapshot::new("BTC", 50_000.0, t0())
            .with_price_change(0.012)
            .with_whale_transfer(2_000_000.0);

        let signal = gate.evaluate(&snapshot).into_signal().unwrap();
        assert_eq!(signal.level, TriggerLevel::Level1);
        assert_eq!(signal.reasons[0].kind, ReasonKind::PriceChange);
        assert_eq!(signal.reasons[1].kind, ReasonKind::WhaleTransfer);
        assert_eq!(signal.trigger_type, TriggerType::WhaleActivity);
    }

    #[test]
    fn test_reset_cooldowns() {
        let mut gate = gate();
        let snapshot = MarketSnapshot::new("BTC", 50_000.0, t0()).with_price_change(0.012);
        gate.evaluate(&snapshot);
        gate.reset_cooldowns();

        assert!(gate.evaluate(&snapshot).signal().is_some());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = TriggerConfig {
            max_escalated_level: 0,
            ..Default::default()
        };
        assert!(TriggerGate::new(config).is_err());
    }
}
