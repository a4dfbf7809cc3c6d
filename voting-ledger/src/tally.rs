//! Per-candidate vote counters
//!
//! Counters are indexed by candidate slot and only ever go up.

use crate::types::CandidateId;
use crate::{Error, Result};

/// Vote counters, one per registered candidate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TallyStore {
    counts: Vec<u64>,
}

impl TallyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from stored counters (slot order)
    pub fn from_counts(counts: Vec<u64>) -> Self {
        Self { counts }
    }

    /// Open a zeroed counter for a newly registered candidate
    pub fn open_counter(&mut self, id: CandidateId) -> Result<()> {
        if id.slot() != Some(self.counts.len()) {
            return Err(Error::InvariantViolation(format!(
                "Counter for candidate {} opened out of order",
                id
            )));
        }
        self.counts.push(0);
        Ok(())
    }

    /// Add one vote for a candidate
    pub fn increment(&mut self, id: CandidateId) -> Result<u64> {
        let count = id
            .slot()
            .and_then(|slot| self.counts.get_mut(slot))
            .ok_or(Error::NotFound(id))?;

        *count = count
            .checked_add(1)
            .ok_or_else(|| Error::InvariantViolation(format!("Tally overflow for {}", id)))?;
        Ok(*count)
    }

    /// Votes for a candidate
    pub fn get(&self, id: CandidateId) -> Result<u64> {
        id.slot()
            .and_then(|slot| self.counts.get(slot))
            .copied()
            .ok_or(Error::NotFound(id))
    }

    /// Sum of all counters
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Number of counters
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Check if no counters exist
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_and_get() {
        let mut tallies = TallyStore::new();
        tallies.open_counter(CandidateId::new(1)).unwrap();
        tallies.open_counter(CandidateId::new(2)).unwrap();

        assert_eq!(tallies.increment(CandidateId::new(2)).unwrap(), 1);
        assert_eq!(tallies.increment(CandidateId::new(2)).unwrap(), 2);
        assert_eq!(tallies.get(CandidateId::new(1)).unwrap(), 0);
        assert_eq!(tallies.get(CandidateId::new(2)).unwrap(), 2);
        assert_eq!(tallies.total(), 2);
    }

    #[test]
    fn test_increment_unknown_candidate() {
        let mut tallies = TallyStore::new();
        tallies.open_counter(CandidateId::new(1)).unwrap();

        assert!(matches!(
            tallies.increment(CandidateId::new(5)),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            tallies.get(CandidateId::new(0)),
            Err(Error::NotFound(_))
        ));
        assert_eq!(tallies.total(), 0);
    }

    #[test]
    fn test_counters_open_in_order() {
        let mut tallies = TallyStore::new();
        assert!(tallies.open_counter(CandidateId::new(2)).is_err());
        tallies.open_counter(CandidateId::new(1)).unwrap();
        assert_eq!(tallies.len(), 1);
    }
}
