// Seeded synthetic data for sizing sweeps and tests
pub mod synthetic;

pub use synthetic::{OutcomeScenario, SyntheticDataGenerator};
