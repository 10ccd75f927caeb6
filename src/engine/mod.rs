// Owned runtime context and periodic scheduler
pub mod context;
pub mod scheduler;

pub use context::GateContext;
pub use scheduler::{Scheduler, SchedulerSummary, TickReport};
