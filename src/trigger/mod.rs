// Admission control for downstream analysis
pub mod cooldown;
pub mod gate;
pub mod signal;
pub mod thresholds;

pub use cooldown::{CooldownConfig, CooldownLedger};
pub use gate::{GateStats, TriggerConfig, TriggerGate};
pub use signal::{
    BlockReason, GateDecision, ReasonKind, TriggerLevel, TriggerReason, TriggerSignal,
    TriggerType,
};
pub use thresholds::{LevelBands, TriggerThresholds};
