//! Voter registry
//!
//! Only identities that have voted are stored; an unknown identity reads as
//! [`VoterStatus::NotVoted`] without being inserted.

use crate::types::{Identity, VoterStatus};
use crate::{Error, Result};
use std::collections::HashSet;

/// Set of identities that have cast their vote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoterRegistry {
    voted: HashSet<Identity>,
}

impl VoterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from stored identities
    pub fn from_identities(identities: impl IntoIterator<Item = Identity>) -> Self {
        Self {
            voted: identities.into_iter().collect(),
        }
    }

    /// Check if an identity has voted
    pub fn has_voted(&self, identity: &Identity) -> bool {
        self.voted.contains(identity)
    }

    /// Current state of an identity
    pub fn status(&self, identity: &Identity) -> VoterStatus {
        if self.has_voted(identity) {
            VoterStatus::Voted
        } else {
            VoterStatus::NotVoted
        }
    }

    /// Flip an identity's flag to true
    ///
    /// Fails with `AlreadyVoted` if it is already set. Pairing this with the
    /// tally increment is the caller's job.
    pub fn mark_voted(&mut self, identity: Identity) -> Result<()> {
        if self.voted.contains(&identity) {
            return Err(Error::AlreadyVoted(identity));
        }
        self.voted.insert(identity);
        Ok(())
    }

    /// Number of identities that have voted
    pub fn voted_count(&self) -> u64 {
        self.voted.len() as u64
    }

    /// Check if nobody has voted yet
    pub fn is_empty(&self) -> bool {
        self.voted.is_empty()
    }
}
