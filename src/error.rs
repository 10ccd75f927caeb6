use thiserror::Error;
use uuid::Uuid;

/// Configuration problems. Fatal at construction time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("threshold ordering violated for {metric}: level1={l1} level2={l2} level3={l3}")]
    InvertedThresholds {
        metric: &'static str,
        l1: f64,
        l2: f64,
        l3: f64,
    },

    #[error("{field} must be within [0, 1], got {value}")]
    FractionOutOfRange { field: &'static str, value: f64 },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failures from the sizing optimizer.
#[derive(Debug, Error, PartialEq)]
pub enum SizingError {
    #[error("insufficient data: {have} samples, need at least {need}")]
    InsufficientSamples { have: usize, need: usize },

    #[error("no candidate fractions supplied")]
    NoCandidates,

    #[error("candidate fraction {0} outside (0, 1]")]
    InvalidCandidate(f64),
}

/// Failures from the shared risk ledger.
#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("ledger contended after {attempts} attempts")]
    Contended { attempts: u32 },

    #[error("ledger lock poisoned")]
    Poisoned,
}

/// Failures from position bookkeeping.
#[derive(Debug, Error, PartialEq)]
pub enum PositionError {
    #[error("position {0} not found")]
    NotFound(Uuid),

    #[error("position {0} already closed")]
    AlreadyClosed(Uuid),

    #[error("already have open position for {0}")]
    DuplicateOpen(String),

    #[error("invalid price {0}")]
    InvalidPrice(f64),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sizing(#[from] SizingError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Position(#[from] PositionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SizingError::InsufficientSamples { have: 4, need: 20 };
        assert_eq!(err.to_string(), "insufficient data: 4 samples, need at least 20");

        let err: Error = LedgerError::Contended { attempts: 5 }.into();
        assert!(err.to_string().contains("5 attempts"));
    }
}
