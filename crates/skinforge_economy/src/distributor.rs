//! # Reward Distributor
//!
//! **Exactly one outcome per draw.**
//!
//! Selection draws `r` uniformly in `[0, 1)` and walks the table in the
//! order it was defined, accumulating weights. The first entry whose
//! cumulative weight reaches `r` wins.
//!
//! ```text
//! weights   0.50      0.30     0.20
//!         |---------|-------|-----|
//!         0        0.5     0.8   1.0
//! r = 0.3  ──► entry 0
//! r = 0.65 ──► entry 1
//! ```
//!
//! If the weights sum to less than 1 and `r` lands past the total, the
//! **last** entry is returned. A paid action always yields a reward; the
//! catalog loader is responsible for flagging such tables.
//!
//! The distributor is pure: no I/O, no state, no clock.

use crate::random::RandomSource;

/// One weighted outcome.
#[derive(Clone, Debug, PartialEq)]
pub struct Weighted<T> {
    /// Probability mass in `(0, 1]`.
    pub weight: f64,
    /// What is returned when this entry wins.
    pub outcome: T,
}

/// An ordered weighted table.
#[derive(Clone, Debug, PartialEq)]
pub struct RewardTable<T> {
    entries: Vec<Weighted<T>>,
}

/// Shape of a table's weights.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TableAudit {
    /// Number of entries.
    pub entries: usize,
    /// Sum of all weights.
    pub total_weight: f64,
}

impl TableAudit {
    /// Whether the total is within `tolerance` of 1.
    #[must_use]
    pub fn is_normalized(&self, tolerance: f64) -> bool {
        (self.total_weight - 1.0).abs() <= tolerance
    }

    /// Probability mass that lands on the last-entry fallback.
    #[must_use]
    pub fn fallback_mass(&self) -> f64 {
        (1.0 - self.total_weight).max(0.0)
    }
}

impl<T> RewardTable<T> {
    /// Builds a table from `(weight, outcome)` pairs in walk order.
    pub fn new(entries: impl IntoIterator<Item = (f64, T)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(weight, outcome)| Weighted { weight, outcome })
                .collect(),
        }
    }

    /// Number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if the table has no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in walk order.
    #[must_use]
    pub fn entries(&self) -> &[Weighted<T>] {
        &self.entries
    }

    /// Index of the entry selected by `draw`. `None` only for an empty table.
    #[must_use]
    pub fn index_for_draw(&self, draw: f64) -> Option<usize> {
        let last = self.entries.len().checked_sub(1)?;
        let mut cumulative = 0.0;
        for (index, entry) in self.entries.iter().enumerate() {
            cumulative += entry.weight;
            if cumulative >= draw {
                return Some(index);
            }
        }
        Some(last)
    }

    /// Outcome selected by an explicit draw in `[0, 1)`.
    #[must_use]
    pub fn select_with_draw(&self, draw: f64) -> Option<&T> {
        self.index_for_draw(draw).map(|i| &self.entries[i].outcome)
    }

    /// Draws from `rng` and selects.
    pub fn select(&self, rng: &mut dyn RandomSource) -> Option<&T> {
        if self.entries.is_empty() {
            return None;
        }
        self.select_with_draw(rng.next_unit())
    }

    /// Sum of weights and entry count.
    #[must_use]
    pub fn audit(&self) -> TableAudit {
        TableAudit {
            entries: self.entries.len(),
            total_weight: self.entries.iter().map(|e| e.weight).sum(),
        }
    }

    /// Draws `iterations` times and counts how often each entry wins.
    pub fn run_statistics(&self, rng: &mut dyn RandomSource, iterations: u32) -> SelectionStatistics {
        let mut stats = SelectionStatistics {
            counts: vec![0; self.entries.len()],
            draws: 0,
        };
        if self.entries.is_empty() {
            return stats;
        }
        for _ in 0..iterations {
            if let Some(index) = self.index_for_draw(rng.next_unit()) {
                stats.counts[index] += 1;
                stats.draws += 1;
            }
        }
        stats
    }
}

/// Empirical selection counts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionStatistics {
    /// Wins per entry, in table order.
    pub counts: Vec<u64>,
    /// Total draws.
    pub draws: u64,
}

impl SelectionStatistics {
    /// Observed frequency of entry `index`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn frequency(&self, index: usize) -> f64 {
        if self.draws == 0 {
            return 0.0;
        }
        self.counts.get(index).copied().unwrap_or(0) as f64 / self.draws as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::{ScriptedSource, SeededSource};

    fn abc() -> RewardTable<&'static str> {
        RewardTable::new([(0.5, "A"), (0.3, "B"), (0.2, "C")])
    }

    #[test]
    fn test_walk_order_boundaries() {
        let table = abc();
        assert_eq!(table.select_with_draw(0.0), Some(&"A"));
        assert_eq!(table.select_with_draw(0.3), Some(&"A"));
        assert_eq!(table.select_with_draw(0.5), Some(&"A"));
        assert_eq!(table.select_with_draw(0.500_001), Some(&"B"));
        assert_eq!(table.select_with_draw(0.79), Some(&"B"));
        assert_eq!(table.select_with_draw(0.95), Some(&"C"));
    }

    #[test]
    fn test_empty_table_selects_nothing() {
        let table: RewardTable<u32> = RewardTable::new([]);
        assert!(table.is_empty());
        assert_eq!(table.select_with_draw(0.5), None);
        assert_eq!(table.select(&mut SeededSource::from_seed(1)), None);
    }

    #[test]
    fn test_fallback_to_last_entry_when_underweight() {
        let table = RewardTable::new([(0.25, "first"), (0.25, "last")]);
        assert!(!table.audit().is_normalized(1e-9));
        assert!((table.audit().fallback_mass() - 0.5).abs() < 1e-12);

        for draw in [0.5, 0.51, 0.75, 0.999_999] {
            assert_eq!(table.select_with_draw(draw), Some(&"last"));
        }

        let mut rng = SeededSource::from_seed(3);
        for _ in 0..10_000 {
            assert!(table.select(&mut rng).is_some());
        }
    }

    #[test]
    fn test_scripted_draw_selects_first_half() {
        let table = RewardTable::new([(0.5, "A"), (0.5, "B")]);
        let mut rng = ScriptedSource::new([0.3]);
        assert_eq!(table.select(&mut rng), Some(&"A"));
    }

    #[test]
    fn test_empirical_frequencies_converge() {
        let table = abc();
        let mut rng = SeededSource::from_seed(0xC0FFEE);
        let stats = table.run_statistics(&mut rng, 100_000);

        assert_eq!(stats.draws, 100_000);
        for (index, expected) in [0.5, 0.3, 0.2].into_iter().enumerate() {
            let observed = stats.frequency(index);
            assert!(
                (observed - expected).abs() < 0.01,
                "entry {index}: observed {observed:.4}, expected {expected}"
            );
        }
        println!("distribution over 100k draws: {:?}", stats.counts);
    }

    #[test]
    fn test_audit_normalized() {
        let audit = abc().audit();
        assert_eq!(audit.entries, 3);
        assert!(audit.is_normalized(1e-9));
        assert!(audit.fallback_mass() < 1e-9);
    }
}
