use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::stats::{mean, std_dev};
use crate::error::{ConfigError, SizingError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonteCarloConfig {
    pub simulations: usize,
    /// Points in the default candidate grid
    pub candidate_count: usize,
    pub starting_capital: f64,
    /// Equity at or below this share of the start counts as ruin
    pub ruin_threshold: f64,
    /// Candidates at or above this ruin probability are not eligible
    pub max_ruin_probability: f64,
    pub min_samples: usize,
    pub time_budget_ms: u64,
    /// Fixed seed for reproducible runs, entropy when unset
    pub seed: Option<u64>,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            simulations: 1000,
            candidate_count: 50,
            starting_capital: 100_000.0,
            ruin_threshold: 0.10,
            max_ruin_probability: 0.05,
            min_samples: 20,
            time_budget_ms: 2_000,
            seed: None,
        }
    }
}

impl MonteCarloConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("ruin_threshold", self.ruin_threshold),
            ("max_ruin_probability", self.max_ruin_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::FractionOutOfRange { field, value });
            }
        }
        if self.simulations == 0 || self.candidate_count == 0 || self.starting_capital <= 0.0 {
            return Err(ConfigError::Invalid(
                "monte carlo simulations, candidates and capital must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Simulated outcome of betting one fraction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CandidateResult {
    pub fraction: f64,
    pub expected_return: f64,
    pub ruin_probability: f64,
    pub sharpe: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonteCarloReport {
    pub best: CandidateResult,
    pub candidates: Vec<CandidateResult>,
    pub simulations: usize,
    /// True when the time budget ran out before every candidate was evaluated
    pub truncated: bool,
    pub elapsed_ms: u64,
}

/// `n` evenly spaced fractions from `min` to `max` inclusive
pub fn candidate_grid(min: f64, max: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![min],
        _ => {
            let step = (max - min) / (n - 1) as f64;
            (0..n).map(|i| min + step * i as f64).collect()
        }
    }
}

/// Bootstrap validation of candidate Kelly fractions
pub struct MonteCarloValidator {
    config: MonteCarloConfig,
}

impl MonteCarloValidator {
    pub fn new(config: MonteCarloConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MonteCarloConfig {
        &self.config
    }

    /// Validate with the configured seed (or entropy)
    pub fn validate(
        &self,
        returns: &[f64],
        candidates: &[f64],
        simulations: usize,
    ) -> Result<MonteCarloReport, SizingError> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.validate_with_rng(returns, candidates, simulations, &mut rng)
    }

    pub fn validate_with_rng<R: Rng>(
        &self,
        returns: &[f64],
        candidates: &[f64],
        simulations: usize,
        rng: &mut R,
    ) -> Result<MonteCarloReport, SizingError> {
        let returns: Vec<f64> = returns.iter().copied().filter(|r| r.is_finite()).collect();
        if returns.len() < self.config.min_samples {
            return Err(SizingError::InsufficientSamples {
                have: returns.len(),
                need: self.config.min_samples,
            });
        }
        if candidates.is_empty() {
            return Err(SizingError::NoCandidates);
        }
        if let Some(bad) = candidates
            .iter()
            .find(|f| !f.is_finite() || **f <= 0.0 || **f > 1.0)
        {
            return Err(SizingError::InvalidCandidate(*bad));
        }

        let simulations = simulations.max(1);
        let started = Instant::now();
        let budget = Duration::from_millis(self.config.time_budget_ms);
        let mut results = Vec::with_capacity(candidates.len());
        let mut truncated = false;

        for &fraction in candidates {
            if !results.is_empty() && started.elapsed() >= budget {
                truncated = true;
                tracing::warn!(
                    "Monte Carlo budget exhausted after {}/{} candidates",
                    results.len(),
                    candidates.len()
                );
                break;
            }
            results.push(self.simulate(&returns, fraction, simulations, rng));
        }

        let best = select_best(&results, self.config.max_ruin_probability)
            .ok_or(SizingError::NoCandidates)?;

        tracing::debug!(
            "Monte Carlo best fraction {:.2}% (ruin {:.1}%, sharpe {:.2})",
            best.fraction * 100.0,
            best.ruin_probability * 100.0,
            best.sharpe
        );

        Ok(MonteCarloReport {
            best,
            candidates: results,
            simulations,
            truncated,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn simulate<R: Rng>(
        &self,
        returns: &[f64],
        fraction: f64,
        simulations: usize,
        rng: &mut R,
    ) -> CandidateResult {
        let start = self.config.starting_capital;
        let ruin_level = start * self.config.ruin_threshold;
        let mut finals = Vec::with_capacity(simulations);
        let mut ruined = 0usize;

        for _ in 0..simulations {
            let mut equity = start;
            for _ in 0..returns.len() {
                let r = returns[rng.gen_range(0..returns.len())];
                equity *= 1.0 + fraction * r;
                if equity <= ruin_level {
                    equity = 0.0;
                    ruined += 1;
                    break;
                }
            }
            finals.push(equity);
        }

        let expected_return = mean(&finals) / start - 1.0;
        let spread = std_dev(&finals) / start;
        let sharpe = if spread > 0.0 {
            expected_return / spread
        } else {
            0.0
        };

        CandidateResult {
            fraction,
            expected_return,
            ruin_probability: ruined as f64 / simulations as f64,
            sharpe,
        }
    }
}

/// Max Sharpe among candidates under the ruin cap, else the lowest ruin.
/// Ties keep the smaller (earlier) fraction.
fn select_best(results: &[CandidateResult], max_ruin: f64) -> Option<CandidateResult> {
    let eligible = results
        .iter()
        .filter(|r| r.ruin_probability < max_ruin)
        .fold(None::<&CandidateResult>, |best, r| match best {
            Some(b) if b.sharpe >= r.sharpe => Some(b),
            _ => Some(r),
        });

    if let Some(best) = eligible {
        return Some(*best);
    }

    results
        .iter()
        .fold(None::<&CandidateResult>, |best, r| match best {
            Some(b) if b.ruin_probability <= r.ruin_probability => Some(b),
            _ => Some(r),
        })
        .copied()
}
