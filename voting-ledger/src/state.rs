//! In-memory ledger state
//!
//! [`LedgerState`] is the (candidates, voters, tallies) triple. It is the
//! deterministic state machine the actor drives and the audit log replays:
//! the same events always produce the same state.
//!
//! # Invariants
//!
//! - Σ(tallies) == number of identities that have voted
//! - One counter per registered candidate
//! - Candidate ids are 1..=n with no gaps

use crate::registry::{CandidateRegistry, VoterRegistry};
use crate::tally::TallyStore;
use crate::types::{Candidate, CandidateId, ElectionResult, EventKind, Identity, VoterStatus};
use crate::{Error, Result};

/// Candidate registry, voter registry and tallies, kept consistent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerState {
    candidates: CandidateRegistry,
    voters: VoterRegistry,
    tallies: TallyStore,
}

impl LedgerState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble from parts loaded from storage, checking invariants
    pub fn from_parts(
        candidates: CandidateRegistry,
        voters: VoterRegistry,
        tallies: TallyStore,
    ) -> Result<Self> {
        let state = Self {
            candidates,
            voters,
            tallies,
        };
        state.check_invariants()?;
        Ok(state)
    }

    // Writes

    /// Check that a candidate may be registered now
    pub fn validate_registration(&self, name: &str) -> Result<()> {
        CandidateRegistry::validate_name(name)?;
        if !self.registration_open() {
            return Err(Error::RegistrationClosed);
        }
        Ok(())
    }

    /// Check every castVote precondition without mutating
    ///
    /// Order: malformed identity, already voted, unknown candidate.
    pub fn validate_vote(&self, identity: &Identity, candidate_id: CandidateId) -> Result<()> {
        if identity.is_blank() {
            return Err(Error::InvalidInput(
                "Voter identity must not be empty".to_string(),
            ));
        }
        if self.voters.has_voted(identity) {
            return Err(Error::AlreadyVoted(identity.clone()));
        }
        if !self.candidates.contains(candidate_id) {
            return Err(Error::NotFound(candidate_id));
        }
        Ok(())
    }

    /// Register a candidate with a zeroed tally
    pub fn register_candidate(&mut self, name: impl Into<String>) -> Result<CandidateId> {
        let name = name.into();
        self.validate_registration(&name)?;

        let id = self.candidates.next_id();
        self.tallies.open_counter(id)?;
        self.candidates.register(name)?;
        Ok(id)
    }

    /// Increment the tally and mark the voter, or change nothing
    pub fn cast_vote(&mut self, identity: Identity, candidate_id: CandidateId) -> Result<u64> {
        self.validate_vote(&identity, candidate_id)?;

        let count = self.tallies.increment(candidate_id)?;
        self.voters.mark_voted(identity)?;
        Ok(count)
    }

    /// Apply a recorded event (replay)
    pub fn apply(&mut self, kind: &EventKind) -> Result<()> {
        match kind {
            EventKind::CandidateRegistered { candidate_id, name } => {
                let expected = self.candidates.next_id();
                if *candidate_id != expected {
                    return Err(Error::InvariantViolation(format!(
                        "Candidate registered as {} but next id is {}",
                        candidate_id, expected
                    )));
                }
                self.register_candidate(name.clone())?;
            }
            EventKind::VoteCast {
                identity,
                candidate_id,
            } => {
                self.cast_vote(identity.clone(), *candidate_id)?;
            }
        }
        Ok(())
    }

    // Reads

    /// Candidate with its current tally
    pub fn candidate(&self, id: CandidateId) -> Result<Candidate> {
        let record = self.candidates.get(id)?;
        Ok(Candidate {
            id: record.id,
            name: record.name.clone(),
            vote_count: self.tallies.get(id)?,
        })
    }

    /// All candidates in ascending id order
    pub fn candidates(&self) -> Vec<Candidate> {
        self.candidates
            .iter()
            .map(|record| Candidate {
                id: record.id,
                name: record.name.clone(),
                vote_count: self.tallies.get(record.id).unwrap_or(0),
            })
            .collect()
    }

    /// Number of registered candidates
    pub fn candidates_count(&self) -> u64 {
        self.candidates.count()
    }

    /// Check if an identity has voted
    pub fn has_voted(&self, identity: &Identity) -> bool {
        self.voters.has_voted(identity)
    }

    /// Voting state of an identity
    pub fn voter_status(&self, identity: &Identity) -> VoterStatus {
        self.voters.status(identity)
    }

    /// Total votes cast
    pub fn total_votes(&self) -> u64 {
        self.tallies.total()
    }

    /// Registration stays open until the first vote
    pub fn registration_open(&self) -> bool {
        self.voters.is_empty()
    }

    /// Candidate with the most votes; ties go to the lowest id
    pub fn results(&self) -> Result<ElectionResult> {
        let mut winner: Option<Candidate> = None;

        for candidate in self.candidates() {
            let leads = match &winner {
                Some(best) => candidate.vote_count > best.vote_count,
                None => true,
            };
            if leads {
                winner = Some(candidate);
            }
        }

        let winner = winner.ok_or(Error::NoCandidates)?;
        Ok(ElectionResult {
            winner_id: winner.id,
            winner_name: winner.name,
            winner_vote_count: winner.vote_count,
        })
    }

    /// Verify the state invariants
    pub fn check_invariants(&self) -> Result<()> {
        if self.tallies.len() as u64 != self.candidates.count() {
            return Err(Error::InvariantViolation(format!(
                "{} tally counters for {} candidates",
                self.tallies.len(),
                self.candidates.count()
            )));
        }

        let total = self.tallies.total();
        let voted = self.voters.voted_count();
        if total != voted {
            return Err(Error::InvariantViolation(format!(
                "Tallies sum to {} but {} identities have voted",
                total, voted
            )));
        }

        Ok(())
    }

    /// Candidate registry (read-only)
    pub fn candidate_registry(&self) -> &CandidateRegistry {
        &self.candidates
    }

    /// Voter registry (read-only)
    pub fn voter_registry(&self) -> &VoterRegistry {
        &self.voters
    }

    /// Tally store (read-only)
    pub fn tally_store(&self) -> &TallyStore {
        &self.tallies
    }
}
