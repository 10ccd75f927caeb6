// Stop-loss state machine and position archive
pub mod position_manager;
pub mod stop_loss;

pub use position_manager::{Position, PositionManager};
pub use stop_loss::{
    CloseReason, PositionState, StopCandidates, StopContext, StopDecision, StopLossConfig,
    StopLossEngine, StopMethod, TimeTrigger,
};
