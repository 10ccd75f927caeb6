use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::config::GateConfig;
use crate::error::PositionError;
use crate::execution::{
    CloseReason, Position, PositionManager, StopContext, StopDecision, StopLossEngine,
};
use crate::models::{MarketSnapshot, PositionSide, TradeOutcomeSample};
use crate::risk::{BudgetWindow, RiskBudget, RiskCapacity, RiskLedger};
use crate::sizing::{
    MarketConditions, MonteCarloReport, SizingDecision, SizingOptimizer, TradeHistory,
    ValidationJob,
};
use crate::trigger::{GateDecision, GateStats, TriggerGate};
use crate::Result;

/// Owns every component of the decision gate.
///
/// Lock order is ledger, then optimizer or positions; the gate is locked alone.
/// Opening, closing and stop ticks run inside the ledger lock so a position never
/// changes state without its capital and outcome being booked.
pub struct GateContext {
    config: GateConfig,
    gate: Mutex<TriggerGate>,
    ledger: RiskLedger,
    optimizer: Mutex<SizingOptimizer>,
    stop_loss: StopLossEngine,
    positions: Mutex<PositionManager>,
}

impl GateContext {
    pub fn new(config: GateConfig) -> Result<Self> {
        Self::with_history(config, TradeHistory::default())
    }

    /// Build with previously recorded outcomes
    pub fn with_history(config: GateConfig, mut history: TradeHistory) -> Result<Self> {
        config.validate()?;

        if history.capacity() != config.sizing.history_capacity {
            history = history
                .iter()
                .cloned()
                .fold(TradeHistory::new(config.sizing.history_capacity), |mut h, s| {
                    h.push(s);
                    h
                });
        }

        let gate = TriggerGate::new(config.trigger.clone())?;
        let budget = RiskBudget::new(config.budget.clone(), Utc::now());

        tracing::info!(
            "Gate context ready: capital ${:.2}, {} historical outcomes",
            config.budget.starting_capital,
            history.len()
        );

        Ok(Self {
            gate: Mutex::new(gate),
            ledger: RiskLedger::new(budget, history),
            optimizer: Mutex::new(SizingOptimizer::new(config.sizing.clone())),
            stop_loss: StopLossEngine::new(config.stop_loss.clone()),
            positions: Mutex::new(PositionManager::new(
                config.stop_loss.hard_max_loss_pct,
                config.stop_loss.archive_capacity,
            )),
            config,
        })
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn ledger(&self) -> &RiskLedger {
        &self.ledger
    }

    // ========================================================================
    // Admission
    // ========================================================================

    pub fn evaluate(&self, snapshot: &MarketSnapshot) -> GateDecision {
        lock(&self.gate).evaluate(snapshot)
    }

    pub fn gate_stats(&self, now: DateTime<Utc>) -> GateStats {
        lock(&self.gate).stats(now)
    }

    pub fn scale_sensitivity(&self, factor: f64) -> Result<()> {
        lock(&self.gate).scale_sensitivity(factor)?;
        Ok(())
    }

    // ========================================================================
    // Sizing
    // ========================================================================

    pub fn recommend_size(&self, conditions: &MarketConditions) -> Result<SizingDecision> {
        self.recommend_size_at(conditions, Utc::now())
    }

    pub fn recommend_size_at(
        &self,
        conditions: &MarketConditions,
        now: DateTime<Utc>,
    ) -> Result<SizingDecision> {
        if lock(&self.positions).protection_mode() {
            return Ok(SizingDecision::Refused {
                reason: "protection mode active after emergency close".to_string(),
            });
        }

        let decision = self.ledger.with_state(|state| {
            let capacity = state.budget.risk_capacity();
            lock(&self.optimizer).recommend(&state.history, &capacity, conditions, now)
        })?;
        Ok(decision)
    }

    /// Monte Carlo work for the current history, if the stored result is stale
    pub fn validation_job(&self) -> Result<Option<ValidationJob>> {
        let job = self
            .ledger
            .with_state(|state| lock(&self.optimizer).validation_job(&state.history))?;
        Ok(job)
    }

    pub fn store_validation(&self, generation: u64, report: MonteCarloReport) -> bool {
        lock(&self.optimizer).store_validation(generation, report)
    }

    pub fn latest_validation(&self) -> Option<MonteCarloReport> {
        lock(&self.optimizer).latest_validation().cloned()
    }

    // ========================================================================
    // Positions and stops
    // ========================================================================

    /// Open a position for `notional` of capital, committing it in the budget
    pub fn open_position(
        &self,
        symbol: &str,
        side: PositionSide,
        entry_price: f64,
        notional: f64,
        size_fraction: f64,
        at: DateTime<Utc>,
    ) -> Result<Uuid> {
        if !entry_price.is_finite() || entry_price <= 0.0 {
            return Err(PositionError::InvalidPrice(entry_price).into());
        }

        let opened = self.ledger.with_state(|state| {
            let mut positions = lock(&self.positions);
            if positions.has_open_position(symbol) {
                return Err(PositionError::DuplicateOpen(symbol.to_string()));
            }

            let committed = state.budget.commit_capital(notional);
            let quantity = committed / entry_price;
            positions
                .open_position_at(symbol.to_string(), side, entry_price, quantity, size_fraction, Some(at))
                .inspect_err(|_| state.budget.release_capital(committed))
        })?;
        Ok(opened?)
    }

    pub fn set_take_profit(&self, position_id: Uuid, target: f64) -> Result<()> {
        lock(&self.positions).set_take_profit(position_id, target)?;
        Ok(())
    }

    /// Evaluate stops for one tick; a close is settled into the ledger.
    ///
    /// The ledger is held for the whole tick, so a contended ledger leaves the
    /// position untouched and the tick can be retried.
    pub fn update_stop(
        &self,
        position_id: Uuid,
        price: f64,
        ctx: &StopContext,
    ) -> Result<StopDecision> {
        let decision = self.ledger.with_state(|state| {
            let (decision, outcome) =
                lock(&self.positions).update_stop_at(position_id, price, ctx, &self.stop_loss)?;
            if let Some(outcome) = outcome {
                state.settle(&outcome, outcome.notional);
            }
            Ok::<_, PositionError>(decision)
        })?;
        Ok(decision?)
    }

    /// Close a position outside the stop engine and settle it
    pub fn close_position(
        &self,
        position_id: Uuid,
        exit_price: f64,
        reason: CloseReason,
        at: DateTime<Utc>,
    ) -> Result<TradeOutcomeSample> {
        let outcome = self.ledger.with_state(|state| {
            let outcome =
                lock(&self.positions).close_position_at(position_id, exit_price, reason, Some(at))?;
            state.settle(&outcome, outcome.notional);
            Ok::<_, PositionError>(outcome)
        })?;
        Ok(outcome?)
    }

    /// Close everything and stop sizing new positions until protection mode is cleared
    pub fn emergency_close_all(&self, at: DateTime<Utc>) -> Result<Vec<TradeOutcomeSample>> {
        let outcomes = self.ledger.with_state(|state| {
            let outcomes = lock(&self.positions).emergency_close_all(Some(at));
            for outcome in &outcomes {
                state.settle(outcome, outcome.notional);
            }
            outcomes
        })?;
        Ok(outcomes)
    }

    pub fn clear_protection_mode(&self) {
        lock(&self.positions).clear_protection_mode();
    }

    pub fn open_positions(&self) -> Vec<Position> {
        lock(&self.positions)
            .open_positions()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn position(&self, position_id: Uuid) -> Result<Position> {
        Ok(lock(&self.positions).get_position(position_id)?.clone())
    }

    /// Retained closed positions, oldest first
    pub fn closed_positions(&self) -> Vec<Position> {
        lock(&self.positions).closed_positions().cloned().collect()
    }

    pub fn realized_pnl(&self) -> f64 {
        lock(&self.positions).total_pnl()
    }

    // ========================================================================
    // Risk budget
    // ========================================================================

    /// Book an externally closed trade. Returns false for a duplicate id.
    ///
    /// When `sample.id` names an open position, that position is archived as
    /// `External` and its committed capital released.
    pub fn record_outcome(&self, sample: TradeOutcomeSample) -> Result<bool> {
        let booked = self.ledger.with_state(|state| {
            let mut positions = lock(&self.positions);
            if positions.is_open(sample.id) {
                match positions.close_position_at(
                    sample.id,
                    sample.exit_price,
                    CloseReason::External,
                    Some(sample.closed_at),
                ) {
                    Ok(closed) => state.budget.release_capital(closed.notional),
                    Err(e) => tracing::warn!("External close of {} failed: {}", sample.id, e),
                }
            }
            state.record_outcome(&sample)
        })?;
        Ok(booked)
    }

    pub fn risk_capacity(&self) -> Result<RiskCapacity> {
        Ok(self.ledger.risk_capacity()?)
    }

    pub fn reset_daily(&self) -> Result<()> {
        Ok(self.ledger.reset(BudgetWindow::Daily)?)
    }

    pub fn reset_weekly(&self) -> Result<()> {
        Ok(self.ledger.reset(BudgetWindow::Weekly)?)
    }

    pub fn reset_monthly(&self) -> Result<()> {
        Ok(self.ledger.reset(BudgetWindow::Monthly)?)
    }

    pub fn roll_windows(&self, now: DateTime<Utc>) -> Result<Vec<BudgetWindow>> {
        Ok(self.ledger.roll_windows(now)?)
    }
}

/// Lock, recovering the guard if a previous holder panicked
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Recovering poisoned lock");
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, LedgerError};
    use crate::execution::PositionState;
    use crate::trigger::TriggerLevel;

    fn ctx() -> GateContext {
        GateContext::new(GateConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = GateConfig::default();
        config.scheduler.worker_count = 0;
        assert!(matches!(GateContext::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_evaluate_admits_price_move() {
        let ctx = ctx();
        let snapshot =
            MarketSnapshot::new("BTC", 50_000.0, Utc::now()).with_price_change(0.012);

        let decision = ctx.evaluate(&snapshot);
        assert_eq!(decision.signal().unwrap().level, TriggerLevel::Level1);
    }

    #[test]
    fn test_open_and_stop_out_settles_ledger() {
        let ctx = ctx();
        let now = Utc::now();
        let id = ctx
            .open_position("SOL", PositionSide::Long, 100.0, 10_000.0, 0.1, now)
            .unwrap();
        assert!((ctx.risk_capacity().unwrap().available_capital - 90_000.0).abs() < 1e-6);

        let decision = ctx.update_stop(id, 96.0, &StopContext::at(now)).unwrap();
        assert!(decision.is_closed());

        let capacity = ctx.risk_capacity().unwrap();
        // 4% loss on 10k released back
        assert!((capacity.capital - 99_600.0).abs() < 1e-6);
        assert!((capacity.available_capital - 99_600.0).abs() < 1e-6);
        assert_eq!(capacity.trades_remaining, 9);

        let position = ctx.position(id).unwrap();
        assert!(!position.state.is_open());
    }

    #[test]
    fn test_emergency_close_enables_protection_mode() {
        let ctx = ctx();
        let now = Utc::now();
        ctx.open_position("SOL", PositionSide::Long, 100.0, 5_000.0, 0.05, now)
            .unwrap();

        let outcomes = ctx.emergency_close_all(now).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(ctx.open_positions().is_empty());
        assert_eq!(
            ctx.position(outcomes[0].id).unwrap().state,
            PositionState::Closed(CloseReason::Emergency)
        );

        let decision = ctx.recommend_size(&MarketConditions::default()).unwrap();
        assert!(matches!(decision, SizingDecision::Refused { .. }));

        ctx.clear_protection_mode();
        let decision = ctx.recommend_size(&MarketConditions::default()).unwrap();
        assert!(decision.recommendation().is_some());
    }

    #[test]
    fn test_daily_halt_refuses_sizing() {
        let ctx = ctx();
        let sample = TradeOutcomeSample::from_return("ETH", -0.5, 20_000.0, Utc::now());
        assert!(ctx.record_outcome(sample.clone()).unwrap());
        assert!(!ctx.record_outcome(sample).unwrap());

        let decision = ctx.recommend_size(&MarketConditions::default()).unwrap();
        assert!(matches!(decision, SizingDecision::Refused { .. }));

        ctx.reset_daily().unwrap();
        let decision = ctx.recommend_size(&MarketConditions::default()).unwrap();
        assert!(decision.recommendation().is_some());
    }

    #[test]
    fn test_stop_out_under_contended_ledger_can_be_retried() {
        let ctx = ctx();
        let now = Utc::now();
        let id = ctx
            .open_position("SOL", PositionSide::Long, 100.0, 10_000.0, 0.1, now)
            .unwrap();
        let tick = StopContext::at(now);

        let held = ctx
            .ledger()
            .with_state(|_| ctx.update_stop(id, 90.0, &tick))
            .unwrap();
        assert!(matches!(
            held,
            Err(Error::Ledger(LedgerError::Contended { .. }))
        ));
        assert!(ctx.position(id).unwrap().is_open());

        let decision = ctx.update_stop(id, 90.0, &tick).unwrap();
        assert!(decision.is_closed());

        let capacity = ctx.risk_capacity().unwrap();
        assert!((capacity.capital - 99_000.0).abs() < 1e-6);
        assert!((capacity.available_capital - 99_000.0).abs() < 1e-6);
        assert_eq!(capacity.trades_remaining, 9);
        assert_eq!(ctx.ledger().snapshot().unwrap().history.len(), 1);
    }

    #[test]
    fn test_external_outcome_archives_open_position() {
        let ctx = ctx();
        let now = Utc::now();
        let id = ctx
            .open_position("SOL", PositionSide::Long, 100.0, 10_000.0, 0.1, now)
            .unwrap();

        let mut sample = TradeOutcomeSample::from_return("SOL", 0.02, 10_000.0, now);
        sample.id = id;
        assert!(ctx.record_outcome(sample.clone()).unwrap());

        assert!(ctx.open_positions().is_empty());
        assert_eq!(
            ctx.position(id).unwrap().state,
            PositionState::Closed(CloseReason::External)
        );
        let capacity = ctx.risk_capacity().unwrap();
        assert!((capacity.capital - 100_200.0).abs() < 1e-6);
        assert!((capacity.available_capital - 100_200.0).abs() < 1e-6);

        assert!(!ctx.record_outcome(sample).unwrap());
        assert!(ctx
            .open_position("SOL", PositionSide::Long, 101.0, 5_000.0, 0.05, now)
            .is_ok());
    }

    #[test]
    fn test_close_position_settles_ledger() {
        let ctx = ctx();
        let now = Utc::now();
        let id = ctx
            .open_position("ETH", PositionSide::Short, 100.0, 10_000.0, 0.1, now)
            .unwrap();

        let outcome = ctx
            .close_position(id, 95.0, CloseReason::External, now)
            .unwrap();
        assert_eq!(outcome.id, id);
        assert!((outcome.pnl() - 500.0).abs() < 1e-6);

        let state = ctx.ledger().snapshot().unwrap();
        assert_eq!(state.budget.committed_capital, 0.0);
        assert!((state.budget.daily_pnl - 500.0).abs() < 1e-6);
        assert!(state.history.contains(id));
        assert_eq!(ctx.closed_positions().len(), 1);
        assert!((ctx.realized_pnl() - 500.0).abs() < 1e-6);

        assert!(matches!(
            ctx.close_position(id, 90.0, CloseReason::External, now),
            Err(Error::Position(PositionError::AlreadyClosed(_)))
        ));
    }
}
