// Core modules
pub mod backtest;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod models;
pub mod risk;
pub mod sizing;
pub mod trigger;

// Re-export commonly used types
pub use config::GateConfig;
pub use engine::GateContext;
pub use error::Error;
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Error>;
