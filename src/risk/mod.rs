// Risk budget ledger
pub mod budget;
pub mod ledger;

pub use budget::{
    BudgetConfig, BudgetWindow, DailyCheck, EmergencyAction, HaltReason, MonthlyCheck,
    PositionAdjustment, ProfitRules, ProfitSplit, RiskBudget, RiskCapacity, WeeklyCheck,
};
pub use ledger::{LedgerState, RetryPolicy, RiskLedger};
