use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Level 1..3 cutoffs for a single metric. Equality satisfies a level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LevelBands {
    pub level1: f64,
    pub level2: f64,
    pub level3: f64,
}

impl LevelBands {
    pub const fn new(level1: f64, level2: f64, level3: f64) -> Self {
        Self {
            level1,
            level2,
            level3,
        }
    }

    /// Highest level whose cutoff `value` reaches, 0 if none
    pub fn level_for(&self, value: f64) -> u8 {
        if value >= self.level3 {
            3
        } else if value >= self.level2 {
            2
        } else if value >= self.level1 {
            1
        } else {
            0
        }
    }

    pub fn reaches(&self, value: Option<f64>, level: u8) -> bool {
        match value {
            Some(v) => self.level_for(v) >= level,
            None => false,
        }
    }

    fn is_ordered(&self) -> bool {
        self.level1 <= self.level2 && self.level2 <= self.level3
    }

    fn scaled(&self, factor: f64) -> Self {
        Self::new(
            self.level1 * factor,
            self.level2 * factor,
            self.level3 * factor,
        )
    }

    fn validate(&self, metric: &'static str) -> Result<(), ConfigError> {
        let all_finite = [self.level1, self.level2, self.level3]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0);
        if !all_finite || !self.is_ordered() {
            return Err(ConfigError::InvertedThresholds {
                metric,
                l1: self.level1,
                l2: self.level2,
                l3: self.level3,
            });
        }
        Ok(())
    }
}

/// Per-level trigger cutoffs owned by the gate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerThresholds {
    /// Absolute 24h price change ratio
    pub price_change: LevelBands,
    /// Volume multiple of average
    pub volume_ratio: LevelBands,
    /// Distance of RSI from 50
    pub momentum: LevelBands,
    pub whale_transfer_usd: LevelBands,
    pub liquidation_usd: LevelBands,
}

impl Default for TriggerThresholds {
    fn default() -> Self {
        Self {
            price_change: LevelBands::new(0.01, 0.03, 0.10), // 1% / 3% / 10%
            volume_ratio: LevelBands::new(2.0, 3.0, 5.0),
            momentum: LevelBands::new(20.0, 30.0, 35.0), // RSI 30/70, 20/80, 15/85
            whale_transfer_usd: LevelBands::new(1_000_000.0, 10_000_000.0, 50_000_000.0),
            liquidation_usd: LevelBands::new(10_000_000.0, 50_000_000.0, 100_000_000.0),
        }
    }
}

impl TriggerThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.price_change.validate("price_change")?;
        self.volume_ratio.validate("volume_ratio")?;
        self.momentum.validate("momentum")?;
        self.whale_transfer_usd.validate("whale_transfer_usd")?;
        self.liquidation_usd.validate("liquidation_usd")?;
        Ok(())
    }

    /// Multiply every cutoff by `factor`.
    ///
    /// Values below 1.0 make the gate more sensitive. Ordering is preserved because
    /// the same positive factor is applied to every band.
    pub fn scale_sensitivity(&mut self, factor: f64) -> Result<(), ConfigError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "sensitivity factor must be positive, got {}",
                factor
            )));
        }

        self.price_change = self.price_change.scaled(factor);
        self.volume_ratio = self.volume_ratio.scaled(factor);
        self.momentum = self.momentum.scaled(factor);
        self.whale_transfer_usd = self.whale_transfer_usd.scaled(factor);
        self.liquidation_usd = self.liquidation_usd.scaled(factor);

        tracing::info!("Trigger thresholds scaled by {:.2}", factor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_uses_inclusive_bounds() {
        let bands = LevelBands::new(1.0, 2.0, 3.0);
        assert_eq!(bands.level_for(0.99), 0);
        assert_eq!(bands.level_for(1.0), 1);
        assert_eq!(bands.level_for(2.0), 2);
        assert_eq!(bands.level_for(3.0), 3);
        assert_eq!(bands.level_for(100.0), 3);
    }

    #[test]
    fn test_default_thresholds_are_ordered() {
        assert!(TriggerThresholds::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut thresholds = TriggerThresholds::default();
        thresholds.volume_ratio = LevelBands::new(3.0, 2.0, 5.0);

        let err = thresholds.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvertedThresholds {
                metric: "volume_ratio",
                ..
            }
        ));
    }

    #[test]
    fn test_scale_sensitivity() {
        let mut thresholds = TriggerThresholds::default();
        thresholds.scale_sensitivity(0.5).unwrap();

        assert!((thresholds.price_change.level1 - 0.005).abs() < 1e-12);
        assert!((thresholds.volume_ratio.level3 - 2.5).abs() < 1e-12);
        assert!(thresholds.validate().is_ok());
    }

    #[test]
    fn test_scale_sensitivity_rejects_non_positive() {
        let mut thresholds = TriggerThresholds::default();
        assert!(thresholds.scale_sensitivity(0.0).is_err());
        assert!(thresholds.scale_sensitivity(-1.0).is_err());
        assert!(thresholds.scale_sensitivity(f64::NAN).is_err());
        assert_eq!(thresholds, TriggerThresholds::default());
    }
}
