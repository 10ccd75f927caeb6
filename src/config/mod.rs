use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::execution::StopLossConfig;
use crate::risk::BudgetConfig;
use crate::sizing::SizingConfig;
use crate::trigger::TriggerConfig;

/// Environment prefix; `TRADEGATE__BUDGET__STARTING_CAPITAL=50000` overrides one field
pub const ENV_PREFIX: &str = "TRADEGATE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    pub tick_interval_ms: u64,
    /// Concurrent per-symbol evaluation jobs
    pub worker_count: usize,
    pub snapshot_buffer: usize,
    pub signal_buffer: usize,
    /// Background Monte Carlo refresh every N ticks, 0 disables it
    pub validation_every_ticks: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            worker_count: 4,
            snapshot_buffer: 1_024,
            signal_buffer: 256,
            validation_every_ticks: 30,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be > 0".to_string()));
        }
        if self.worker_count == 0 {
            return Err(ConfigError::Invalid("worker_count must be > 0".to_string()));
        }
        if self.snapshot_buffer == 0 || self.signal_buffer == 0 {
            return Err(ConfigError::Invalid("channel buffers must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Complete configuration for one [`GateContext`](crate::engine::GateContext)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GateConfig {
    pub trigger: TriggerConfig,
    pub sizing: SizingConfig,
    pub stop_loss: StopLossConfig,
    pub budget: BudgetConfig,
    pub scheduler: SchedulerConfig,
}

impl GateConfig {
    /// Defaults, then `path` if given, then `TRADEGATE__*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = config::Config::try_from(&GateConfig::default())?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            tracing::info!("Loading configuration from {}", path.display());
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: GateConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.trigger.validate()?;
        self.sizing.validate()?;
        self.stop_loss.validate()?;
        self.budget.validate()?;
        self.scheduler.validate()
    }
}
