use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use super::signal::{BlockReason, TriggerLevel, TriggerType};
use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CooldownConfig {
    pub level1_secs: i64,
    pub level2_secs: i64,
    pub level3_secs: i64,
    /// Any trigger for the same symbol
    pub symbol_secs: i64,
    /// Admitted triggers per rolling hour
    pub hourly_cap: usize,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            level1_secs: 300,  // 5 min
            level2_secs: 900,  // 15 min
            level3_secs: 1800, // 30 min
            symbol_secs: 120,  // 2 min
            hourly_cap: 100,
        }
    }
}

impl CooldownConfig {
    pub fn for_level(&self, level: TriggerLevel) -> Duration {
        let secs = match level {
            TriggerLevel::None | TriggerLevel::Level1 => self.level1_secs,
            TriggerLevel::Level2 => self.level2_secs,
            TriggerLevel::Level3 => self.level3_secs,
        };
        Duration::seconds(secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.level1_secs <= 0 || self.level2_secs <= 0 || self.level3_secs <= 0 {
            return Err(ConfigError::Invalid(
                "level cooldowns must be positive".to_string(),
            ));
        }
        if self.symbol_secs < 0 || self.symbol_secs > self.level1_secs {
            return Err(ConfigError::Invalid(format!(
                "symbol cooldown {}s must be within [0, level1 cooldown {}s]",
                self.symbol_secs, self.level1_secs
            )));
        }
        if self.hourly_cap == 0 {
            return Err(ConfigError::Invalid("hourly_cap must be > 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct CooldownEntry {
    at: DateTime<Utc>,
    level: TriggerLevel,
}

/// Last-trigger bookkeeping for admission control.
///
/// Only mutated by [`CooldownLedger::record`] when a trigger is admitted.
#[derive(Debug, Clone)]
pub struct CooldownLedger {
    config: CooldownConfig,
    by_signal: HashMap<(String, TriggerType), CooldownEntry>,
    by_symbol: HashMap<String, DateTime<Utc>>,
    // Holds at most `hourly_cap` entries
    admitted: VecDeque<DateTime<Utc>>,
}

impl CooldownLedger {
    pub fn new(config: CooldownConfig) -> Self {
        let capacity = config.hourly_cap;
        Self {
            config,
            by_signal: HashMap::new(),
            by_symbol: HashMap::new(),
            admitted: VecDeque::with_capacity(capacity),
        }
    }

    pub fn config(&self) -> &CooldownConfig {
        &self.config
    }

    /// Check whether a trigger may be admitted at `now`
    pub fn check(
        &self,
        symbol: &str,
        trigger_type: TriggerType,
        now: DateTime<Utc>,
    ) -> Result<(), BlockReason> {
        let recent = self.admitted_last_hour(now);
        if recent >= self.config.hourly_cap {
            return Err(BlockReason::RateLimited {
                count: recent,
                cap: self.config.hourly_cap,
            });
        }

        if let Some(entry) = self.by_signal.get(&(symbol.to_string(), trigger_type)) {
            let window = self.config.for_level(entry.level);
            let elapsed = now.signed_duration_since(entry.at);
            if elapsed < window {
                return Err(BlockReason::SignalCooldown {
                    trigger_type,
                    remaining_secs: (window - elapsed).num_seconds(),
                });
            }
        }

        if let Some(last) = self.by_symbol.get(symbol) {
            let window = Duration::seconds(self.config.symbol_secs);
            let elapsed = now.signed_duration_since(*last);
            if elapsed < window {
                return Err(BlockReason::SymbolCooldown {
                    remaining_secs: (window - elapsed).num_seconds(),
                });
            }
        }

        Ok(())
    }

    /// Record an admitted trigger under every cooldown key
    pub fn record(
        &mut self,
        symbol: &str,
        trigger_type: TriggerType,
        level: TriggerLevel,
        now: DateTime<Utc>,
    ) {
        self.prune(now);

        self.by_signal.insert(
            (symbol.to_string(), trigger_type),
            CooldownEntry { at: now, level },
        );
        self.by_symbol.insert(symbol.to_string(), now);

        if self.admitted.len() >= self.config.hourly_cap {
            self.admitted.pop_front();
        }
        self.admitted.push_back(now);
    }

    pub fn admitted_last_hour(&self, now: DateTime<Utc>) -> usize {
        let hour_ago = now - Duration::hours(1);
        self.admitted.iter().filter(|t| **t > hour_ago).count()
    }

    /// Cooldown keys still inside their window at `now`
    pub fn active_cooldowns(&self, now: DateTime<Utc>) -> usize {
        self.by_signal
            .values()
            .filter(|e| now.signed_duration_since(e.at) < self.config.for_level(e.level))
            .count()
    }

    pub fn clear(&mut self) {
        self.by_signal.clear();
        self.by_symbol.clear();
        self.admitted.clear();
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let hour_ago = now - Duration::hours(1);
        while let Some(front) = self.admitted.front() {
            if *front <= hour_ago {
                self.admitted.pop_front();
            } else {
                break;
            }
        }

        let longest = Duration::seconds(
            self.config
                .level1_secs
                .max(self.config.level2_secs)
                .max(self.config.level3_secs),
        );
        self.by_signal
            .retain(|_, e| now.signed_duration_since(e.at) < longest);
        let symbol_window = Duration::seconds(self.config.symbol_secs);
        self.by_symbol
            .retain(|_, at| now.signed_duration_since(*at) < symbol_window);
    }
}
