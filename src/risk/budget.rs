use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use uuid::Uuid;

use crate::error::ConfigError;
use crate::models::TradeOutcomeSample;

/// Loss limits for the three accounting windows, as ratios of starting capital
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetConfig {
    pub starting_capital: f64,

    pub daily_max_loss: f64,
    pub daily_loss_warning: f64,
    pub max_daily_trades: u32,
    pub daily_trades_warning: u32,
    pub max_risk_per_trade: f64,
    /// Share of the remaining daily budget offered to one trade
    pub suggested_risk_share: f64,
    /// Share of available capital one position may take
    pub max_position_share: f64,

    pub weekly_max_loss: f64,
    pub weekly_review: f64,
    pub weekly_size_multiplier: f64,

    pub monthly_max_loss: f64,
    pub monthly_circuit_warning: f64,

    pub profit: ProfitRules,

    /// Outcome ids remembered for duplicate suppression
    pub dedup_window: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            starting_capital: 100_000.0,

            daily_max_loss: 0.10,     // -10% halts new positions
            daily_loss_warning: 0.07, // -7% warns
            max_daily_trades: 10,
            daily_trades_warning: 8,
            max_risk_per_trade: 0.03, // 3% per trade
            suggested_risk_share: 0.3,
            max_position_share: 0.3,

            weekly_max_loss: 0.20, // -20% halves sizing
            weekly_review: 0.15,   // -15% strategy review
            weekly_size_multiplier: 0.5,

            monthly_max_loss: 0.40,        // -40% absolute stop
            monthly_circuit_warning: 0.30, // -30% circuit breaker warning

            profit: ProfitRules::default(),
            dedup_window: 256,
        }
    }
}

impl BudgetConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.starting_capital.is_finite() || self.starting_capital <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "starting_capital must be positive, got {}",
                self.starting_capital
            )));
        }

        for (field, value) in [
            ("daily_max_loss", self.daily_max_loss),
            ("daily_loss_warning", self.daily_loss_warning),
            ("max_risk_per_trade", self.max_risk_per_trade),
            ("suggested_risk_share", self.suggested_risk_share),
            ("max_position_share", self.max_position_share),
            ("weekly_max_loss", self.weekly_max_loss),
            ("weekly_review", self.weekly_review),
            ("weekly_size_multiplier", self.weekly_size_multiplier),
            ("monthly_max_loss", self.monthly_max_loss),
            ("monthly_circuit_warning", self.monthly_circuit_warning),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::FractionOutOfRange { field, value });
            }
        }

        if self.daily_loss_warning > self.daily_max_loss
            || self.weekly_review > self.weekly_max_loss
            || self.monthly_circuit_warning > self.monthly_max_loss
        {
            return Err(ConfigError::Invalid(
                "warning ratios must not exceed their loss limits".to_string(),
            ));
        }
        if self.daily_trades_warning > self.max_daily_trades {
            return Err(ConfigError::Invalid(
                "daily_trades_warning exceeds max_daily_trades".to_string(),
            ));
        }

        self.profit.validate()
    }
}

/// How monthly profit above target is distributed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfitRules {
    pub monthly_target: f64,
    pub withdraw_ratio: f64,
    pub reinvest_ratio: f64,
    pub reserve_ratio: f64,
}

impl Default for ProfitRules {
    fn default() -> Self {
        Self {
            monthly_target: 0.20,
            withdraw_ratio: 0.50,
            reinvest_ratio: 0.30,
            reserve_ratio: 0.20,
        }
    }
}

impl ProfitRules {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let total = self.withdraw_ratio + self.reinvest_ratio + self.reserve_ratio;
        if (total - 1.0).abs() > 1e-9 {
            return Err(ConfigError::Invalid(format!(
                "profit split must sum to 1.0, got {:.4}",
                total
            )));
        }
        Ok(())
    }

    /// Split monthly profit once it reaches the target share of `base_capital`
    pub fn split(&self, monthly_pnl: f64, base_capital: f64) -> Option<ProfitSplit> {
        if monthly_pnl <= 0.0 || base_capital <= 0.0 {
            return None;
        }

        let profit_ratio = monthly_pnl / base_capital;
        if profit_ratio < self.monthly_target {
            return None;
        }

        Some(ProfitSplit {
            total_profit: monthly_pnl,
            profit_ratio,
            withdraw: monthly_pnl * self.withdraw_ratio,
            reinvest: monthly_pnl * self.reinvest_ratio,
            reserve: monthly_pnl * self.reserve_ratio,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ProfitSplit {
    pub total_profit: f64,
    pub profit_ratio: f64,
    pub withdraw: f64,
    pub reinvest: f64,
    pub reserve: f64,
}

/// Why new positions are refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    DailyLossLimit,
    DailyTradeLimit,
    MonthlyAbsoluteStop,
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::DailyLossLimit => write!(f, "daily loss limit reached"),
            HaltReason::DailyTradeLimit => write!(f, "daily trade limit reached"),
            HaltReason::MonthlyAbsoluteStop => write!(f, "monthly absolute stop active"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCheck {
    pub can_trade: bool,
    pub restrictions: Vec<HaltReason>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionAdjustment {
    /// Scale new sizing by the weekly multiplier
    Reduce,
    Review,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyCheck {
    pub adjustment: Option<PositionAdjustment>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyAction {
    AbsoluteStop,
    CircuitBreaker,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyCheck {
    pub action: Option<EmergencyAction>,
    pub warnings: Vec<String>,
}

/// Remaining room under the budget, consumed by the sizing optimizer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskCapacity {
    pub capital: f64,
    pub available_capital: f64,
    pub daily_risk_remaining: f64,
    pub trades_remaining: u32,
    pub max_position: f64,
    /// Currency amount one trade may put at risk
    pub suggested_risk_per_trade: f64,
    pub size_multiplier: f64,
    pub daily_breaker: bool,
    pub weekly_reduction: bool,
    pub monthly_stop: bool,
    pub halt: Option<HaltReason>,
}

impl RiskCapacity {
    pub fn can_trade(&self) -> bool {
        self.halt.is_none()
    }
}

/// Calendar window rolled over by [`RiskBudget::roll_windows`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetWindow {
    Daily,
    Weekly,
    Monthly,
}

/// Realized P&L bookkeeping with sticky breakers.
///
/// A tripped breaker stays set until the matching reset, regardless of later P&L.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskBudget {
    config: BudgetConfig,
    pub starting_capital: f64,
    pub current_capital: f64,
    pub committed_capital: f64,
    pub daily_pnl: f64,
    pub weekly_pnl: f64,
    pub monthly_pnl: f64,
    pub trades_today: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub daily_breaker: bool,
    pub weekly_reduction: bool,
    pub monthly_stop: bool,
    pub last_roll: DateTime<Utc>,
    recent_ids: VecDeque<Uuid>,
}

impl RiskBudget {
    pub fn new(config: BudgetConfig, now: DateTime<Utc>) -> Self {
        let capital = config.starting_capital;
        Self {
            config,
            starting_capital: capital,
            current_capital: capital,
            committed_capital: 0.0,
            daily_pnl: 0.0,
            weekly_pnl: 0.0,
            monthly_pnl: 0.0,
            trades_today: 0,
            winning_trades: 0,
            losing_trades: 0,
            daily_breaker: false,
            weekly_reduction: false,
            monthly_stop: false,
            last_roll: now,
            recent_ids: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    pub fn available_capital(&self) -> f64 {
        (self.current_capital - self.committed_capital).max(0.0)
    }

    /// Apply realized P&L to every window without counting a trade
    pub fn record_pnl(&mut self, pnl: f64) {
        if !pnl.is_finite() {
            tracing::warn!("Ignoring non-finite P&L {}", pnl);
            return;
        }
        self.daily_pnl += pnl;
        self.weekly_pnl += pnl;
        self.monthly_pnl += pnl;
        self.current_capital += pnl;
    }

    /// Book a closed trade and re-run every check.
    ///
    /// Returns false for an outcome id already recorded.
    pub fn record_outcome(&mut self, sample: &TradeOutcomeSample) -> bool {
        if self.recent_ids.contains(&sample.id) {
            tracing::debug!("Duplicate outcome {} ignored", sample.id);
            return false;
        }
        if self.recent_ids.len() >= self.config.dedup_window.max(1) {
            self.recent_ids.pop_front();
        }
        self.recent_ids.push_back(sample.id);

        self.record_pnl(sample.pnl());
        self.trades_today += 1;
        if sample.is_win() {
            self.winning_trades += 1;
        } else {
            self.losing_trades += 1;
        }

        self.check_all();
        true
    }

    pub fn check_all(&mut self) -> (DailyCheck, WeeklyCheck, MonthlyCheck) {
        (self.check_daily(), self.check_weekly(), self.check_monthly())
    }

    pub fn check_daily(&mut self) -> DailyCheck {
        let mut restrictions = Vec::new();
        let mut warnings = Vec::new();

        let loss_ratio = self.loss_ratio(self.daily_pnl);
        if loss_ratio >= self.config.daily_max_loss {
            if !self.daily_breaker {
                tracing::error!("🛑 Daily loss breaker tripped: {:.1}%", loss_ratio * 100.0);
            }
            self.daily_breaker = true;
        } else if loss_ratio >= self.config.daily_loss_warning {
            warnings.push(format!(
                "Daily loss approaching limit: {:.1}%",
                loss_ratio * 100.0
            ));
        }
        if self.daily_breaker {
            restrictions.push(HaltReason::DailyLossLimit);
        }

        if self.trades_today >= self.config.max_daily_trades {
            restrictions.push(HaltReason::DailyTradeLimit);
        } else if self.trades_today >= self.config.daily_trades_warning {
            warnings.push(format!(
                "Approaching daily trade limit: {}/{}",
                self.trades_today, self.config.max_daily_trades
            ));
        }

        for warning in &warnings {
            tracing::warn!("{}", warning);
        }

        DailyCheck {
            can_trade: restrictions.is_empty(),
            restrictions,
            warnings,
        }
    }

    pub fn check_weekly(&mut self) -> WeeklyCheck {
        let mut warnings = Vec::new();
        let loss_ratio = self.loss_ratio(self.weekly_pnl);

        if loss_ratio >= self.config.weekly_max_loss && !self.weekly_reduction {
            tracing::error!(
                "🛑 Weekly loss {:.1}%: new sizing reduced by {:.0}%",
                loss_ratio * 100.0,
                (1.0 - self.config.weekly_size_multiplier) * 100.0
            );
            self.weekly_reduction = true;
        }

        let adjustment = if self.weekly_reduction {
            Some(PositionAdjustment::Reduce)
        } else if loss_ratio >= self.config.weekly_review {
            warnings.push(format!(
                "Weekly loss {:.1}%: strategy review required",
                loss_ratio * 100.0
            ));
            Some(PositionAdjustment::Review)
        } else {
            None
        };

        for warning in &warnings {
            tracing::warn!("{}", warning);
        }

        WeeklyCheck {
            adjustment,
            warnings,
        }
    }

    pub fn check_monthly(&mut self) -> MonthlyCheck {
        let mut warnings = Vec::new();
        let loss_ratio = self.loss_ratio(self.monthly_pnl);

        if loss_ratio >= self.config.monthly_max_loss && !self.monthly_stop {
            tracing::error!(
                "🛑 Monthly loss {:.1}%: absolute stop, all trading halted",
                loss_ratio * 100.0
            );
            self.monthly_stop = true;
        }

        let action = if self.monthly_stop {
            Some(EmergencyAction::AbsoluteStop)
        } else if loss_ratio >= self.config.monthly_circuit_warning {
            warnings.push(format!(
                "Monthly loss {:.1}%: reduce all risk immediately",
                loss_ratio * 100.0
            ));
            Some(EmergencyAction::CircuitBreaker)
        } else {
            None
        };

        for warning in &warnings {
            tracing::warn!("{}", warning);
        }

        MonthlyCheck { action, warnings }
    }

    /// First active reason refusing new positions, if any
    pub fn halt_reason(&self) -> Option<HaltReason> {
        if self.monthly_stop {
            Some(HaltReason::MonthlyAbsoluteStop)
        } else if self.daily_breaker {
            Some(HaltReason::DailyLossLimit)
        } else if self.trades_today >= self.config.max_daily_trades {
            Some(HaltReason::DailyTradeLimit)
        } else {
            None
        }
    }

    pub fn can_trade(&self) -> bool {
        self.halt_reason().is_none()
    }

    pub fn risk_capacity(&self) -> RiskCapacity {
        let max_loss_amount = self.starting_capital * self.config.daily_max_loss;
        let daily_remaining = (max_loss_amount + self.daily_pnl).max(0.0);
        let available = self.available_capital();

        RiskCapacity {
            capital: self.current_capital,
            available_capital: available,
            daily_risk_remaining: daily_remaining,
            trades_remaining: self.config.max_daily_trades.saturating_sub(self.trades_today),
            max_position: available * self.config.max_position_share,
            suggested_risk_per_trade: (daily_remaining * self.config.suggested_risk_share)
                .min(self.current_capital.max(0.0) * self.config.max_risk_per_trade),
            size_multiplier: if self.weekly_reduction {
                self.config.weekly_size_multiplier
            } else {
                1.0
            },
            daily_breaker: self.daily_breaker,
            weekly_reduction: self.weekly_reduction,
            monthly_stop: self.monthly_stop,
            halt: self.halt_reason(),
        }
    }

    /// Pure: split of `monthly_pnl` once it reaches the monthly target
    pub fn profit_management(&self, monthly_pnl: f64) -> Option<ProfitSplit> {
        self.config.profit.split(monthly_pnl, self.starting_capital)
    }

    /// Reserve capital for an opening position. Returns the amount actually committed.
    pub fn commit_capital(&mut self, amount: f64) -> f64 {
        let committed = amount.max(0.0).min(self.available_capital());
        self.committed_capital += committed;
        committed
    }

    pub fn release_capital(&mut self, amount: f64) {
        self.committed_capital = (self.committed_capital - amount.max(0.0)).max(0.0);
    }

    pub fn reset_daily(&mut self) {
        self.daily_pnl = 0.0;
        self.trades_today = 0;
        self.daily_breaker = false;
        tracing::info!("Daily risk budget reset");
    }

    pub fn reset_weekly(&mut self) {
        self.weekly_pnl = 0.0;
        self.weekly_reduction = false;
        tracing::info!("Weekly risk budget reset");
    }

    pub fn reset_monthly(&mut self) {
        self.monthly_pnl = 0.0;
        self.winning_trades = 0;
        self.losing_trades = 0;
        self.monthly_stop = false;
        tracing::info!("Monthly risk budget reset");
    }

    /// Reset every window whose calendar boundary lies between the last roll and `now`
    pub fn roll_windows(&mut self, now: DateTime<Utc>) -> Vec<BudgetWindow> {
        if now <= self.last_roll {
            return Vec::new();
        }

        let last = self.last_roll;
        let mut rolled = Vec::new();

        if now.date_naive() != last.date_naive() {
            self.reset_daily();
            rolled.push(BudgetWindow::Daily);
        }
        if now.iso_week() != last.iso_week() {
            self.reset_weekly();
            rolled.push(BudgetWindow::Weekly);
        }
        if (now.year(), now.month()) != (last.year(), last.month()) {
            self.reset_monthly();
            rolled.push(BudgetWindow::Monthly);
        }

        self.last_roll = now;
        rolled
    }

    pub fn win_rate(&self) -> f64 {
        let total = self.winning_trades + self.losing_trades;
        if total == 0 {
            0.0
        } else {
            self.winning_trades as f64 / total as f64
        }
    }

    fn loss_ratio(&self, pnl: f64) -> f64 {
        if pnl >= 0.0 || self.starting_capital <= 0.0 {
            0.0
        } else {
            -pnl / self.starting_capital
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        // Wednesday
        Utc.with_ymd_and_hms(2024, 3, 13, 10, 0, 0).unwrap()
    }

    fn budget() -> RiskBudget {
        RiskBudget::new(BudgetConfig::default(), t0())
    }

    fn loss(amount: f64) -> TradeOutcomeSample {
        // notional 100k so pnl_ratio * notional == amount
        TradeOutcomeSample::from_return("BTC", amount / 100_000.0, 100_000.0, t0())
    }

    #[test]
    fn test_daily_breaker_trips_at_limit() {
        let mut budget = budget();
        budget.record_pnl(-10_000.0);

        let check = budget.check_daily();
        assert!(!check.can_trade);
        assert_eq!(check.restrictions, vec![HaltReason::DailyLossLimit]);
        assert!(budget.daily_breaker);
    }

    #[test]
    fn test_daily_breaker_is_sticky() {
        let mut budget = budget();
        budget.record_pnl(-10_000.0);
        budget.check_daily();

        // Later gains do not clear the breaker
        budget.record_pnl(8_000.0);
        assert!(!budget.check_daily().can_trade);
        assert!(!budget.can_trade());

        budget.reset_daily();
        assert!(budget.can_trade());
        assert!(budget.check_daily().can_trade);
    }

    #[test]
    fn test_daily_warning_below_limit() {
        let mut budget = budget();
        budget.record_pnl(-7_500.0);

        let check = budget.check_daily();
        assert!(check.can_trade);
        assert_eq!(check.warnings.len(), 1);
    }

    #[test]
    fn test_daily_trade_cap() {
        let mut budget = budget();
        for _ in 0..10 {
            budget.record_outcome(&loss(-10.0));
        }

        let check = budget.check_daily();
        assert!(!check.can_trade);
        assert_eq!(check.restrictions, vec![HaltReason::DailyTradeLimit]);
        assert_eq!(budget.risk_capacity().trades_remaining, 0);
    }

    #[test]
    fn test_weekly_reduction_and_review() {
        let mut budget = budget();
        budget.weekly_pnl = -16_000.0;
        assert_eq!(
            budget.check_weekly().adjustment,
            Some(PositionAdjustment::Review)
        );
        assert!(!budget.weekly_reduction);

        budget.weekly_pnl = -20_000.0;
        assert_eq!(
            budget.check_weekly().adjustment,
            Some(PositionAdjustment::Reduce)
        );
        assert_eq!(budget.risk_capacity().size_multiplier, 0.5);
        // Reduction alone does not halt trading
        assert!(budget.can_trade());
    }

    #[test]
    fn test_monthly_absolute_stop() {
        let mut budget = budget();
        budget.monthly_pnl = -31_000.0;
        assert_eq!(
            budget.check_monthly().action,
            Some(EmergencyAction::CircuitBreaker)
        );
        assert!(budget.can_trade());

        budget.monthly_pnl = -40_000.0;
        assert_eq!(
            budget.check_monthly().action,
            Some(EmergencyAction::AbsoluteStop)
        );
        assert_eq!(budget.halt_reason(), Some(HaltReason::MonthlyAbsoluteStop));

        budget.reset_monthly();
        assert!(budget.can_trade());
    }

    #[test]
    fn test_risk_capacity() {
        let mut budget = budget();
        budget.record_pnl(-4_000.0);

        let capacity = budget.risk_capacity();
        // 10k daily budget - 4k lost
        assert!((capacity.daily_risk_remaining - 6_000.0).abs() < 1e-9);
        // min(6k * 0.3, 96k * 0.03)
        assert!((capacity.suggested_risk_per_trade - 1_800.0).abs() < 1e-9);
        assert!((capacity.max_position - 96_000.0 * 0.3).abs() < 1e-9);
        assert!(capacity.can_trade());
    }

    #[test]
    fn test_record_outcome_is_idempotent() {
        let mut budget = budget();
        let sample = loss(-1_000.0);

        assert!(budget.record_outcome(&sample));
        assert!(!budget.record_outcome(&sample));
        assert_eq!(budget.trades_today, 1);
        assert!((budget.daily_pnl + 1_000.0).abs() < 1e-6);
        assert_eq!(budget.losing_trades, 1);
    }

    #[test]
    fn test_profit_management_split() {
        let budget = budget();
        assert!(budget.profit_management(10_000.0).is_none());
        assert!(budget.profit_management(-5_000.0).is_none());

        let split = budget.profit_management(25_000.0).unwrap();
        assert!((split.withdraw - 12_500.0).abs() < 1e-9);
        assert!((split.reinvest - 7_500.0).abs() < 1e-9);
        assert!((split.reserve - 5_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_commit_and_release_capital() {
        let mut budget = budget();
        assert_eq!(budget.commit_capital(30_000.0), 30_000.0);
        assert_eq!(budget.available_capital(), 70_000.0);
        assert_eq!(budget.commit_capital(80_000.0), 70_000.0);

        budget.release_capital(50_000.0);
        assert_eq!(budget.available_capital(), 50_000.0);
    }

    #[test]
    fn test_roll_windows() {
        let mut budget = budget();
        budget.record_pnl(-10_000.0);
        budget.check_daily();
        budget.weekly_reduction = true;

        // Same day: nothing rolls
        assert!(budget.roll_windows(t0() + Duration::hours(2)).is_empty());

        // Next day (Thursday): daily only
        let rolled = budget.roll_windows(t0() + Duration::days(1));
        assert_eq!(rolled, vec![BudgetWindow::Daily]);
        assert!(!budget.daily_breaker);
        assert!(budget.weekly_reduction);

        // Following Monday: daily and weekly
        let rolled = budget.roll_windows(t0() + Duration::days(5));
        assert_eq!(rolled, vec![BudgetWindow::Daily, BudgetWindow::Weekly]);

        // April: all three
        let rolled = budget.roll_windows(Utc.with_ymd_and_hms(2024, 4, 2, 0, 0, 0).unwrap());
        assert!(rolled.contains(&BudgetWindow::Monthly));
    }

    #[test]
    fn test_config_validation() {
        assert!(BudgetConfig::default().validate().is_ok());

        let bad_split = BudgetConfig {
            profit: ProfitRules {
                withdraw_ratio: 0.6,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(bad_split.validate().is_err());

        let inverted = BudgetConfig {
            daily_loss_warning: 0.2,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());
    }
}
