use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Duration;

use super::budget::{BudgetWindow, RiskBudget, RiskCapacity};
use crate::error::LedgerError;
use crate::models::TradeOutcomeSample;
use crate::sizing::TradeHistory;

/// Bounded retry for contended ledger access
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// First backoff; doubles on every retry
    pub base_backoff_us: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_backoff_us: 200,
        }
    }
}

/// Budget and outcome history, always mutated together
#[derive(Debug, Clone)]
pub struct LedgerState {
    pub budget: RiskBudget,
    pub history: TradeHistory,
}

impl LedgerState {
    /// Book a closed trade into budget and history.
    ///
    /// Returns false when the outcome id is already in either the history or the
    /// budget's recent ids.
    pub fn record_outcome(&mut self, sample: &TradeOutcomeSample) -> bool {
        if self.history.contains(sample.id) {
            tracing::debug!("Duplicate outcome {} ignored", sample.id);
            return false;
        }
        if !self.budget.record_outcome(sample) {
            return false;
        }
        self.history.push(sample.clone());
        tracing::info!(
            "📒 Recorded {} outcome: {:+.2}% (${:+.2}), day P&L ${:.2}",
            sample.symbol,
            sample.pnl_ratio * 100.0,
            sample.pnl(),
            self.budget.daily_pnl
        );
        true
    }

    /// Release the capital a closed position held and book its outcome
    pub fn settle(&mut self, outcome: &TradeOutcomeSample, committed: f64) -> bool {
        self.budget.release_capital(committed);
        self.record_outcome(outcome)
    }
}

/// Shared handle to the risk budget ledger.
///
/// Every access goes through `try_lock` with bounded backoff so a stuck writer
/// surfaces as [`LedgerError::Contended`] instead of blocking a worker.
/// The backoff sleeps the calling thread (about 6ms across all attempts with
/// the default retry), so async callers go through `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct RiskLedger {
    inner: Arc<Mutex<LedgerState>>,
    retry: RetryPolicy,
}

impl RiskLedger {
    pub fn new(budget: RiskBudget, history: TradeHistory) -> Self {
        Self::with_retry(budget, history, RetryPolicy::default())
    }

    pub fn with_retry(budget: RiskBudget, history: TradeHistory, retry: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LedgerState { budget, history })),
            retry,
        }
    }

    /// Run `f` under the ledger lock
    pub fn with_state<T>(&self, f: impl FnOnce(&mut LedgerState) -> T) -> Result<T, LedgerError> {
        let mut guard = self.acquire()?;
        Ok(f(&mut guard))
    }

    /// Book a closed trade into budget and history atomically.
    ///
    /// Returns false when the outcome id was already recorded.
    pub fn record_outcome(&self, sample: &TradeOutcomeSample) -> Result<bool, LedgerError> {
        self.with_state(|state| state.record_outcome(sample))
    }

    pub fn risk_capacity(&self) -> Result<RiskCapacity, LedgerError> {
        self.with_state(|state| state.budget.risk_capacity())
    }

    pub fn roll_windows(&self, now: DateTime<Utc>) -> Result<Vec<BudgetWindow>, LedgerError> {
        self.with_state(|state| state.budget.roll_windows(now))
    }

    pub fn reset(&self, window: BudgetWindow) -> Result<(), LedgerError> {
        self.with_state(|state| match window {
            BudgetWindow::Daily => state.budget.reset_daily(),
            BudgetWindow::Weekly => state.budget.reset_weekly(),
            BudgetWindow::Monthly => state.budget.reset_monthly(),
        })
    }

    /// Consistent copy of budget and history
    pub fn snapshot(&self) -> Result<LedgerState, LedgerError> {
        self.with_state(|state| state.clone())
    }

    fn acquire(&self) -> Result<MutexGuard<'_, LedgerState>, LedgerError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut backoff = Duration::from_micros(self.retry.base_backoff_us);

        for attempt in 1..=attempts {
            match self.inner.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(_)) => return Err(LedgerError::Poisoned),
                Err(TryLockError::WouldBlock) if attempt < attempts => {
                    std::thread::sleep(backoff);
                    backoff *= 2;
                }
                Err(TryLockError::WouldBlock) => {}
            }
        }

        tracing::warn!("Risk ledger contended after {} attempts", attempts);
        Err(LedgerError::Contended { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::BudgetConfig;

    fn ledger() -> RiskLedger {
        RiskLedger::new(
            RiskBudget::new(BudgetConfig::default(), Utc::now()),
            TradeHistory::default(),
        )
    }

    #[test]
    fn test_record_outcome_updates_budget_and_history() {
        let ledger = ledger();
        let sample = TradeOutcomeSample::from_return("SOL", -0.02, 50_000.0, Utc::now());

        assert!(ledger.record_outcome(&sample).unwrap());
        assert!(!ledger.record_outcome(&sample).unwrap());

        let state = ledger.snapshot().unwrap();
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.budget.trades_today, 1);
        assert!((state.budget.daily_pnl + 1_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_duplicate_outside_budget_window_is_ignored() {
        let ledger = ledger();
        let window = ledger.snapshot().unwrap().budget.config().dedup_window;

        let first = TradeOutcomeSample::from_return("SOL", 0.01, 1_000.0, Utc::now());
        assert!(ledger.record_outcome(&first).unwrap());
        for _ in 0..window {
            let other = TradeOutcomeSample::from_return("SOL", 0.0, 1_000.0, Utc::now());
            assert!(ledger.record_outcome(&other).unwrap());
        }

        // evicted from the budget's recent ids but still in history
        assert!(!ledger.record_outcome(&first).unwrap());

        let state = ledger.snapshot().unwrap();
        assert_eq!(state.history.len(), window + 1);
        assert_eq!(state.budget.trades_today as usize, window + 1);
        assert!((state.budget.daily_pnl - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_settle_releases_committed_capital() {
        let ledger = ledger();
        let sample = TradeOutcomeSample::from_return("SOL", -0.05, 10_000.0, Utc::now());

        let booked = ledger
            .with_state(|state| {
                state.budget.commit_capital(10_000.0);
                state.settle(&sample, 10_000.0)
            })
            .unwrap();

        assert!(booked);
        let state = ledger.snapshot().unwrap();
        assert_eq!(state.budget.committed_capital, 0.0);
        assert!((state.budget.current_capital - 99_500.0).abs() < 1e-6);
    }

    #[test]
    fn test_contended_lock_reports_error() {
        let ledger = RiskLedger::with_retry(
            RiskBudget::new(BudgetConfig::default(), Utc::now()),
            TradeHistory::default(),
            RetryPolicy {
                max_attempts: 3,
                base_backoff_us: 10,
            },
        );

        let _held = ledger.inner.lock().unwrap();
        let err = ledger.risk_capacity().unwrap_err();
        assert!(matches!(err, LedgerError::Contended { attempts: 3 }));
    }

    #[test]
    fn test_concurrent_outcomes_are_all_booked() {
        let ledger = RiskLedger::with_retry(
            RiskBudget::new(
                BudgetConfig {
                    max_daily_trades: 1_000,
                    daily_trades_warning: 1_000,
                    ..Default::default()
                },
                Utc::now(),
            ),
            TradeHistory::default(),
            RetryPolicy {
                max_attempts: 50,
                base_backoff_us: 50,
            },
        );

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        let sample =
                            TradeOutcomeSample::from_return("ETH", 0.01, 1_000.0, Utc::now());
                        ledger.record_outcome(&sample).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let state = ledger.snapshot().unwrap();
        assert_eq!(state.budget.trades_today, 80);
        assert_eq!(state.history.len(), 80);
        assert!((state.budget.daily_pnl - 800.0).abs() < 1e-6);
    }

    #[test]
    fn test_reset_window() {
        let ledger = ledger();
        ledger
            .with_state(|state| {
                state.budget.record_pnl(-12_000.0);
                state.budget.check_daily();
            })
            .unwrap();
        assert!(!ledger.risk_capacity().unwrap().can_trade());

        ledger.reset(BudgetWindow::Daily).unwrap();
        assert!(ledger.risk_capacity().unwrap().can_trade());
    }
}
