use crate::models::TradeOutcomeSample;

pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Fixed-capacity ring buffer of closed-trade outcomes.
///
/// Once full, each push overwrites the oldest slot. `generation` increases on every
/// change so cached statistics can tell whether they are stale.
#[derive(Debug, Clone)]
pub struct TradeHistory {
    slots: Vec<TradeOutcomeSample>,
    capacity: usize,
    // Index of the oldest sample once the buffer has wrapped
    head: usize,
    generation: u64,
}

impl TradeHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            head: 0,
            generation: 0,
        }
    }

    pub fn push(&mut self, sample: TradeOutcomeSample) {
        if self.slots.len() < self.capacity {
            self.slots.push(sample);
        } else {
            self.slots[self.head] = sample;
            self.head = (self.head + 1) % self.capacity;
        }
        self.generation += 1;
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn contains(&self, id: uuid::Uuid) -> bool {
        self.slots.iter().any(|s| s.id == id)
    }

    /// Samples oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &TradeOutcomeSample> {
        let (newer, older) = self.slots.split_at(self.head);
        older.iter().chain(newer.iter())
    }

    /// Per-trade returns, oldest to newest
    pub fn returns(&self) -> Vec<f64> {
        self.iter().map(|s| s.pnl_ratio).collect()
    }

    pub fn latest(&self) -> Option<&TradeOutcomeSample> {
        if self.slots.is_empty() {
            None
        } else if self.slots.len() < self.capacity || self.head == 0 {
            self.slots.last()
        } else {
            self.slots.get(self.head - 1)
        }
    }

    pub fn to_vec(&self) -> Vec<TradeOutcomeSample> {
        self.iter().cloned().collect()
    }
}

impl Default for TradeHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl FromIterator<TradeOutcomeSample> for TradeHistory {
    fn from_iter<I: IntoIterator<Item = TradeOutcomeSample>>(iter: I) -> Self {
        let mut history = TradeHistory::default();
        for sample in iter {
            history.push(sample);
        }
        history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(ret: f64) -> TradeOutcomeSample {
        TradeOutcomeSample::from_return("SOL", ret, 1000.0, Utc::now())
    }

    #[test]
    fn test_push_below_capacity() {
        let mut history = TradeHistory::new(3);
        history.push(sample(0.01));
        history.push(sample(0.02));

        assert_eq!(history.len(), 2);
        assert_eq!(history.generation(), 2);
        assert!((history.latest().unwrap().pnl_ratio - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let mut history = TradeHistory::new(3);
        for ret in [0.01, 0.02, 0.03, 0.04, 0.05] {
            history.push(sample(ret));
        }

        assert_eq!(history.len(), 3);
        let returns: Vec<f64> = history.returns().iter().map(|r| (r * 100.0).round()).collect();
        assert_eq!(returns, vec![3.0, 4.0, 5.0]);
        assert!((history.latest().unwrap().pnl_ratio - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut history = TradeHistory::new(0);
        history.push(sample(0.01));
        history.push(sample(0.02));
        assert_eq!(history.len(), 1);
        assert_eq!(history.capacity(), 1);
    }
}
