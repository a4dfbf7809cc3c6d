//! Candidate registry
//!
//! Records live in a `Vec` arena; a candidate's id is its slot + 1, so ids
//! are contiguous and never reused.

use crate::types::{CandidateId, CandidateRecord};
use crate::{Error, Result};

/// Ordered set of registered candidates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateRegistry {
    records: Vec<CandidateRecord>,
}

impl CandidateRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from stored records, which must be ids 1..=n in order
    pub fn from_records(records: Vec<CandidateRecord>) -> Result<Self> {
        for (slot, record) in records.iter().enumerate() {
            if record.id.slot() != Some(slot) {
                return Err(Error::InvariantViolation(format!(
                    "Candidate ids are not contiguous: slot {} holds id {}",
                    slot, record.id
                )));
            }
        }
        Ok(Self { records })
    }

    /// Id the next registration will receive
    pub fn next_id(&self) -> CandidateId {
        CandidateId::new(self.records.len() as u64 + 1)
    }

    /// Check a name without registering it
    pub fn validate_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Candidate name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Register a candidate and return its id
    pub fn register(&mut self, name: impl Into<String>) -> Result<CandidateId> {
        let name = name.into();
        Self::validate_name(&name)?;

        let id = self.next_id();
        self.records.push(CandidateRecord { id, name });
        Ok(id)
    }

    /// Get record by id
    pub fn get(&self, id: CandidateId) -> Result<&CandidateRecord> {
        id.slot()
            .and_then(|slot| self.records.get(slot))
            .ok_or(Error::NotFound(id))
    }

    /// Check if an id is registered
    pub fn contains(&self, id: CandidateId) -> bool {
        self.get(id).is_ok()
    }

    /// Number of registered candidates
    pub fn count(&self) -> u64 {
        self.records.len() as u64
    }

    /// Check if no candidates are registered
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Snapshot of all records in ascending id order
    pub fn list(&self) -> Vec<CandidateRecord> {
        self.records.clone()
    }

    /// Borrowing iterator in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = &CandidateRecord> {
        self.records.iter()
    }
}
