use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::position_manager::Position;
use crate::error::{ConfigError, PositionError};
use crate::models::PositionSide;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StopLossConfig {
    // Technical
    pub support_buffer: f64,    // 0.2% beyond support
    pub pattern_fail_pct: f64,  // -3% pattern failure

    // Fixed
    pub fixed_stop_pct: f64,    // -5%
    pub atr_multiple: f64,
    pub max_dollar_loss: f64,
    pub hard_max_loss_pct: f64, // never looser than -8%

    /// Closed positions kept for inspection
    pub archive_capacity: usize,

    // Time
    pub no_profit_days: i64,
    pub sideways_days: i64,
    pub sideways_band: f64,     // within +/-3% of entry
    pub event_horizon_hours: i64,

    // Trailing
    pub breakeven_buffer: f64,  // entry + 0.2%
    pub trailing_activation: f64,
    pub trailing_distance: f64,
    /// Profit beyond which the trailing distance is multiplied by `tighten_factor`
    pub tighten_above: f64,
    pub tighten_factor: f64,
}

impl Default for StopLossConfig {
    fn default() -> Self {
        Self {
            support_buffer: 0.002,
            pattern_fail_pct: 0.03,

            fixed_stop_pct: 0.05,
            atr_multiple: 2.0,
            max_dollar_loss: 1_000.0,
            hard_max_loss_pct: 0.08,

            archive_capacity: 1_000,

            no_profit_days: 3,
            sideways_days: 7,
            sideways_band: 0.03,
            event_horizon_hours: 4,

            breakeven_buffer: 0.002,
            trailing_activation: 0.10,
            trailing_distance: 0.05,
            tighten_above: 0.20,
            tighten_factor: 0.5,
        }
    }
}

impl StopLossConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("support_buffer", self.support_buffer),
            ("pattern_fail_pct", self.pattern_fail_pct),
            ("fixed_stop_pct", self.fixed_stop_pct),
            ("hard_max_loss_pct", self.hard_max_loss_pct),
            ("sideways_band", self.sideways_band),
            ("breakeven_buffer", self.breakeven_buffer),
            ("trailing_activation", self.trailing_activation),
            ("trailing_distance", self.trailing_distance),
            ("tighten_factor", self.tighten_factor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::FractionOutOfRange { field, value });
            }
        }
        if self.fixed_stop_pct > self.hard_max_loss_pct {
            return Err(ConfigError::Invalid(
                "fixed_stop_pct must not exceed hard_max_loss_pct".to_string(),
            ));
        }
        if self.tighten_above < self.trailing_activation {
            return Err(ConfigError::Invalid(
                "tighten_above must be at or above trailing_activation".to_string(),
            ));
        }
        if self.archive_capacity == 0 {
            return Err(ConfigError::Invalid(
                "archive_capacity must be positive".to_string(),
            ));
        }
        if self.no_profit_days <= 0 || self.sideways_days <= 0 || self.event_horizon_hours <= 0 {
            return Err(ConfigError::Invalid(
                "time stop windows must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopMethod {
    Technical,
    Fixed,
    Trailing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeTrigger {
    NoProfit,
    Sideways,
    ScheduledEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CloseReason {
    TargetHit,
    StopHit { method: StopMethod },
    Timeout { trigger: TimeTrigger },
    TrailingStop,
    Emergency,
    /// Closed outside the stop engine (broker fill, manual exit)
    External,
}

impl CloseReason {
    pub fn code(&self) -> &'static str {
        match self {
            CloseReason::TargetHit => "target_hit",
            CloseReason::StopHit { .. } => "stop_hit",
            CloseReason::Timeout { .. } => "timeout",
            CloseReason::TrailingStop => "trailing_stop",
            CloseReason::Emergency => "emergency",
            CloseReason::External => "external",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PositionState {
    #[default]
    Active,
    /// Profit crossed the activation threshold; the stop only tightens from here
    Trailing,
    Closed(CloseReason),
}

impl PositionState {
    pub fn is_open(&self) -> bool {
        !matches!(self, PositionState::Closed(_))
    }
}

/// Market context for one stop evaluation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StopContext {
    pub now: DateTime<Utc>,
    #[serde(default)]
    pub support: Option<f64>,
    #[serde(default)]
    pub resistance: Option<f64>,
    #[serde(default)]
    pub atr: Option<f64>,
    /// Next scheduled high-impact event
    #[serde(default)]
    pub next_event: Option<DateTime<Utc>>,
}

impl StopContext {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            support: None,
            resistance: None,
            atr: None,
            next_event: None,
        }
    }

    pub fn with_support(mut self, level: f64) -> Self {
        self.support = Some(level);
        self
    }

    pub fn with_resistance(mut self, level: f64) -> Self {
        self.resistance = Some(level);
        self
    }

    pub fn with_atr(mut self, atr: f64) -> Self {
        self.atr = Some(atr);
        self
    }

    pub fn with_event(mut self, at: DateTime<Utc>) -> Self {
        self.next_event = Some(at);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopCandidates {
    pub technical: f64,
    pub fixed: f64,
    /// None until price clears the breakeven level
    pub trailing: Option<f64>,
    pub time: Option<TimeTrigger>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopDecision {
    pub position_id: Uuid,
    pub price: f64,
    pub stop_price: f64,
    pub method: StopMethod,
    pub state: PositionState,
    pub candidates: StopCandidates,
    /// Distance from price to stop as a share of price, positive while protected
    pub distance: f64,
    /// A looser combined stop was rejected and the previous one kept
    pub ratchet_held: bool,
    pub closed: Option<CloseReason>,
}

impl StopDecision {
    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }
}

/// Combines technical, fixed, time and trailing stops per tick
#[derive(Debug, Clone)]
pub struct StopLossEngine {
    config: StopLossConfig,
}

impl StopLossEngine {
    pub fn new(config: StopLossConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StopLossConfig {
        &self.config
    }

    /// Hard-max-loss stop used when a position opens
    pub fn initial_stop(&self, side: PositionSide, entry_price: f64) -> f64 {
        offset(side, entry_price, self.config.hard_max_loss_pct)
    }

    /// Key level beyond the buffer vs pattern failure, tighter wins
    pub fn technical_stop(&self, position: &Position, ctx: &StopContext) -> f64 {
        let side = position.side;
        let pattern = offset(side, position.entry_price, self.config.pattern_fail_pct);

        let level = match side {
            PositionSide::Long => ctx.support,
            PositionSide::Short => ctx.resistance,
        };

        match level.filter(|l| l.is_finite() && *l > 0.0) {
            Some(level) => tighter(side, offset(side, level, self.config.support_buffer), pattern),
            None => pattern,
        }
    }

    /// Tightest of percentage, ATR and dollar-loss stops, clamped to the hard max loss
    pub fn fixed_stop(&self, position: &Position, ctx: &StopContext) -> f64 {
        let side = position.side;
        let entry = position.entry_price;
        let mut stop = offset(side, entry, self.config.fixed_stop_pct);

        if let Some(atr) = ctx.atr.filter(|a| a.is_finite() && *a > 0.0) {
            stop = tighter(side, stop, entry - side.sign() * atr * self.config.atr_multiple);
        }
        if position.quantity > 0.0 {
            let dollar = entry - side.sign() * self.config.max_dollar_loss / position.quantity;
            stop = tighter(side, stop, dollar);
        }

        tighter(side, stop, offset(side, entry, self.config.hard_max_loss_pct))
    }

    pub fn time_trigger(&self, position: &Position, price: f64, ctx: &StopContext) -> Option<TimeTrigger> {
        let holding_days = (ctx.now - position.entry_time).num_days();

        if position.profit_ratio(price) <= 0.0 && holding_days >= self.config.no_profit_days {
            return Some(TimeTrigger::NoProfit);
        }

        let drift = (price - position.entry_price).abs() / position.entry_price;
        if drift < self.config.sideways_band && holding_days >= self.config.sideways_days {
            return Some(TimeTrigger::Sideways);
        }

        if let Some(event) = ctx.next_event {
            let minutes = (event - ctx.now).num_minutes();
            if minutes > 0 && minutes <= self.config.event_horizon_hours * 60 {
                return Some(TimeTrigger::ScheduledEvent);
            }
        }

        None
    }

    /// Breakeven protection until activation, then a trail off the best price
    pub fn trailing_stop(&self, position: &Position, price: f64) -> Option<f64> {
        let side = position.side;
        let peak_profit = position.peak_profit_ratio();

        if peak_profit < self.config.trailing_activation {
            let breakeven = offset(side, position.entry_price, -self.config.breakeven_buffer);
            let beyond = match side {
                PositionSide::Long => price > breakeven,
                PositionSide::Short => price < breakeven,
            };
            return beyond.then_some(breakeven);
        }

        let mut distance = self.config.trailing_distance;
        if peak_profit > self.config.tighten_above {
            distance *= self.config.tighten_factor;
        }

        Some(offset(side, position.best_price(), distance))
    }

    /// Evaluate one tick. Updates extremes, state and stop on the position; closing
    /// is reported in the decision and left to the caller.
    pub fn evaluate(
        &self,
        position: &mut Position,
        price: f64,
        ctx: &StopContext,
    ) -> Result<StopDecision, PositionError> {
        if !position.state.is_open() {
            return Err(PositionError::AlreadyClosed(position.id));
        }
        if !price.is_finite() || price <= 0.0 {
            return Err(PositionError::InvalidPrice(price));
        }

        let side = position.side;
        position.last_price = price;
        position.highest_price = position.highest_price.max(price);
        position.lowest_price = position.lowest_price.min(price);

        let candidates = StopCandidates {
            technical: self.technical_stop(position, ctx),
            fixed: self.fixed_stop(position, ctx),
            trailing: self.trailing_stop(position, price),
            time: self.time_trigger(position, price, ctx),
        };

        if position.state == PositionState::Active
            && position.peak_profit_ratio() >= self.config.trailing_activation
        {
            position.state = PositionState::Trailing;
            tracing::info!(
                "📈 {} trailing stop activated at peak {:.2} (+{:.1}%)",
                position.symbol,
                position.best_price(),
                position.peak_profit_ratio() * 100.0
            );
        }

        let mut method = StopMethod::Technical;
        let mut stop = candidates.technical;
        for (candidate, m) in [
            (Some(candidates.fixed), StopMethod::Fixed),
            (candidates.trailing, StopMethod::Trailing),
        ] {
            if let Some(candidate) = candidate {
                if is_tighter(side, candidate, stop) {
                    stop = candidate;
                    method = m;
                }
            }
        }

        let mut ratchet_held = false;
        if position.state == PositionState::Trailing && is_tighter(side, position.stop_price, stop) {
            tracing::debug!(
                "{} ratchet kept stop {:.4} over looser {:.4}",
                position.symbol,
                position.stop_price,
                stop
            );
            stop = position.stop_price;
            method = position.stop_method;
            ratchet_held = true;
        }

        position.stop_price = stop;
        position.stop_method = method;

        let crossed = match side {
            PositionSide::Long => price <= stop,
            PositionSide::Short => price >= stop,
        };
        let target_hit = position.take_profit.is_some_and(|target| match side {
            PositionSide::Long => price >= target,
            PositionSide::Short => price <= target,
        });

        let closed = if let Some(trigger) = candidates.time {
            Some(CloseReason::Timeout { trigger })
        } else if crossed {
            Some(match method {
                StopMethod::Trailing => CloseReason::TrailingStop,
                method => CloseReason::StopHit { method },
            })
        } else if target_hit {
            Some(CloseReason::TargetHit)
        } else {
            None
        };

        let state = match closed {
            Some(reason) => PositionState::Closed(reason),
            None => position.state,
        };

        Ok(StopDecision {
            position_id: position.id,
            price,
            stop_price: stop,
            method,
            state,
            candidates,
            distance: side.sign() * (price - stop) / price,
            ratchet_held,
            closed,
        })
    }
}

/// Price moved `pct` against the position from `from`
fn offset(side: PositionSide, from: f64, pct: f64) -> f64 {
    from * (1.0 - side.sign() * pct)
}

fn is_tighter(side: PositionSide, a: f64, b: f64) -> bool {
    match side {
        PositionSide::Long => a > b,
        PositionSide::Short => a < b,
    }
}

fn tighter(side: PositionSide, a: f64, b: f64) -> f64 {
    if is_tighter(side, a, b) {
        a
    } else {
        b
    }
}
