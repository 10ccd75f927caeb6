use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::history::{TradeHistory, DEFAULT_HISTORY_CAPACITY};
use super::kelly::{
    dynamic_adjustment, recommendation_text, ConfidenceTier, KellyCalculator, KellyConfig,
};
use super::monte_carlo::{candidate_grid, MonteCarloConfig, MonteCarloReport, MonteCarloValidator};
use super::stats::TradeStats;
use crate::error::{ConfigError, SizingError};
use crate::models::MarketRegime;
use crate::risk::RiskCapacity;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SizingConfig {
    pub kelly: KellyConfig,
    pub monte_carlo: MonteCarloConfig,
    /// Lifetime of cached statistics
    pub cache_ttl_secs: i64,
    /// Ring buffer horizon for trade outcomes
    pub history_capacity: usize,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            kelly: KellyConfig::default(),
            monte_carlo: MonteCarloConfig::default(),
            cache_ttl_secs: 60,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.kelly.validate()?;
        self.monte_carlo.validate()?;
        if self.cache_ttl_secs < 0 || self.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "cache_ttl_secs must be >= 0 and history_capacity > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Live conditions supplied with a sizing request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MarketConditions {
    pub current_drawdown: f64,
    pub volatility: f64,
    pub regime: MarketRegime,
}

impl Default for MarketConditions {
    fn default() -> Self {
        Self {
            current_drawdown: 0.0,
            volatility: 0.15,
            regime: MarketRegime::Uncertain,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KellyRecommendation {
    pub base_fraction: f64,
    /// After Sharpe, drawdown and sample-size multipliers
    pub adjusted_fraction: f64,
    pub dynamic_multiplier: f64,
    /// `adjusted_fraction * dynamic_multiplier`
    pub regime_adjusted_fraction: f64,
    /// Best Monte Carlo fraction, when a validation is available
    pub validated_fraction: Option<f64>,
    pub final_fraction: f64,
    pub confidence: ConfidenceTier,
    pub sample_count: usize,
    pub position_size: f64,
    pub position_percent: f64,
    /// Weekly breaker halved the size
    pub size_reduced: bool,
    pub recommendation: String,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum SizingDecision {
    Approved(KellyRecommendation),
    Refused { reason: String },
}

impl SizingDecision {
    pub fn recommendation(&self) -> Option<&KellyRecommendation> {
        match self {
            SizingDecision::Approved(rec) => Some(rec),
            SizingDecision::Refused { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedFractions {
    generation: u64,
    computed_at: DateTime<Utc>,
    base: f64,
    adjusted: f64,
    stats: Option<TradeStats>,
}

#[derive(Debug, Clone)]
struct CachedValidation {
    generation: u64,
    report: MonteCarloReport,
}

/// Inputs for an off-thread Monte Carlo run
#[derive(Debug, Clone)]
pub struct ValidationJob {
    pub generation: u64,
    pub returns: Vec<f64>,
    pub candidates: Vec<f64>,
    pub simulations: usize,
    pub config: MonteCarloConfig,
}

impl ValidationJob {
    /// CPU bound; run on a blocking thread
    pub fn run(&self) -> Result<MonteCarloReport, SizingError> {
        MonteCarloValidator::new(self.config.clone()).validate(
            &self.returns,
            &self.candidates,
            self.simulations,
        )
    }
}

/// Combines Kelly statistics, Monte Carlo validation and the risk budget into a size
pub struct SizingOptimizer {
    config: SizingConfig,
    calculator: KellyCalculator,
    fractions: Option<CachedFractions>,
    validation: Option<CachedValidation>,
}

impl SizingOptimizer {
    pub fn new(config: SizingConfig) -> Self {
        let calculator = KellyCalculator::new(config.kelly.clone());
        Self {
            config,
            calculator,
            fractions: None,
            validation: None,
        }
    }

    pub fn calculator(&self) -> &KellyCalculator {
        &self.calculator
    }

    /// Size a newly admitted signal against the current history and risk capacity
    pub fn recommend(
        &mut self,
        history: &TradeHistory,
        capacity: &RiskCapacity,
        conditions: &MarketConditions,
        now: DateTime<Utc>,
    ) -> SizingDecision {
        if let Some(halt) = &capacity.halt {
            tracing::info!("Sizing refused: {}", halt);
            return SizingDecision::Refused {
                reason: halt.to_string(),
            };
        }

        let cached = self.fractions_for(history, now);
        let kelly = &self.config.kelly;

        let dynamic_multiplier = dynamic_adjustment(
            conditions.current_drawdown,
            conditions.volatility,
            conditions.regime,
        );
        let regime_adjusted = cached.adjusted * dynamic_multiplier;

        let validated_fraction = self.validation.as_ref().map(|v| v.report.best.fraction);
        let capped = match validated_fraction {
            Some(validated) => regime_adjusted.min(validated),
            None => regime_adjusted,
        };
        let mut final_fraction = capped.clamp(kelly.min_fraction, kelly.max_fraction);

        let size_reduced = capacity.size_multiplier < 1.0;
        final_fraction *= capacity.size_multiplier;

        let risk_cap = if capacity.capital > 0.0 {
            kelly
                .risk_per_trade
                .min(capacity.suggested_risk_per_trade / capacity.capital)
        } else {
            0.0
        };
        let available = capacity.available_capital.min(capacity.max_position);
        let size = self.calculator.position_size(
            capacity.capital,
            available,
            final_fraction,
            risk_cap,
        );

        let confidence = self
            .calculator
            .confidence(cached.stats.as_ref(), final_fraction);

        tracing::info!(
            "Sizing: base={:.2}% adjusted={:.2}% x{:.2} final={:.2}% size=${:.2} ({:?})",
            cached.base * 100.0,
            cached.adjusted * 100.0,
            dynamic_multiplier,
            final_fraction * 100.0,
            size.actual_position,
            confidence
        );

        SizingDecision::Approved(KellyRecommendation {
            base_fraction: cached.base,
            adjusted_fraction: cached.adjusted,
            dynamic_multiplier,
            regime_adjusted_fraction: regime_adjusted,
            validated_fraction,
            final_fraction,
            confidence,
            sample_count: history.len(),
            position_size: size.actual_position,
            position_percent: size.position_percent,
            size_reduced,
            recommendation: recommendation_text(final_fraction).to_string(),
            computed_at: now,
        })
    }

    /// Monte Carlo work needed for `history`, if the stored validation is stale
    pub fn validation_job(&self, history: &TradeHistory) -> Option<ValidationJob> {
        let mc = &self.config.monte_carlo;
        if history.len() < mc.min_samples {
            return None;
        }
        if self
            .validation
            .as_ref()
            .is_some_and(|v| v.generation == history.generation())
        {
            return None;
        }

        Some(ValidationJob {
            generation: history.generation(),
            returns: history.returns(),
            candidates: candidate_grid(
                self.config.kelly.min_fraction,
                self.config.kelly.max_fraction,
                mc.candidate_count,
            ),
            simulations: mc.simulations,
            config: mc.clone(),
        })
    }

    /// Store a finished validation unless a newer one is already present
    pub fn store_validation(&mut self, generation: u64, report: MonteCarloReport) -> bool {
        if self
            .validation
            .as_ref()
            .is_some_and(|v| v.generation > generation)
        {
            tracing::debug!("Discarding stale Monte Carlo result (generation {})", generation);
            return false;
        }
        self.validation = Some(CachedValidation { generation, report });
        true
    }

    /// Run validation synchronously (CLI and tests)
    pub fn validate_now(&mut self, history: &TradeHistory) -> Result<Option<MonteCarloReport>, SizingError> {
        let Some(job) = self.validation_job(history) else {
            return Ok(self.validation.as_ref().map(|v| v.report.clone()));
        };
        let report = job.run()?;
        self.store_validation(job.generation, report.clone());
        Ok(Some(report))
    }

    pub fn latest_validation(&self) -> Option<&MonteCarloReport> {
        self.validation.as_ref().map(|v| &v.report)
    }

    fn fractions_for(&mut self, history: &TradeHistory, now: DateTime<Utc>) -> CachedFractions {
        let ttl = Duration::seconds(self.config.cache_ttl_secs);
        if let Some(cached) = &self.fractions {
            if cached.generation == history.generation() && now - cached.computed_at < ttl {
                return cached.clone();
            }
        }

        let (base, adjusted, stats) = self.calculator.optimal_fraction(history);
        let fresh = CachedFractions {
            generation: history.generation(),
            computed_at: now,
            base,
            adjusted,
            stats,
        };
        self.fractions = Some(fresh.clone());
        fresh
    }
}
