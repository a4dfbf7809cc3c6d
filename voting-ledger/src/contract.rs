//! Contract-shaped surface over the ledger
//!
//! Mirrors the call shape clients already speak: the voter never passes an
//! identity to `vote`, it comes from the caller context the gateway resolved.

use crate::{
    types::{Candidate, CandidateId, ElectionResult, Identity, LedgerEvent},
    Ledger, Result,
};
use std::sync::Arc;

/// Authenticated caller of a contract method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    sender: Identity,
}

impl CallerContext {
    /// Context for a resolved caller identity
    pub fn new(sender: Identity) -> Self {
        Self { sender }
    }

    /// Identity the call is made as
    pub fn sender(&self) -> &Identity {
        &self.sender
    }
}

/// Voting contract bound to one ledger instance
#[derive(Debug, Clone)]
pub struct VotingContract {
    ledger: Arc<Ledger>,
}

impl VotingContract {
    /// Bind to a ledger
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    /// `candidatesCount()`
    pub fn candidates_count(&self) -> u64 {
        self.ledger.candidates_count()
    }

    /// `candidates(id)`
    pub fn candidates(&self, id: CandidateId) -> Result<Candidate> {
        self.ledger.candidate(id)
    }

    /// `voters(identity)`
    pub fn voters(&self, identity: &Identity) -> bool {
        self.ledger.has_voted(identity)
    }

    /// `getResults()`
    pub fn get_results(&self) -> Result<ElectionResult> {
        self.ledger.get_results()
    }

    /// `vote(candidateId)` as the caller
    pub async fn vote(
        &self,
        context: &CallerContext,
        candidate_id: CandidateId,
    ) -> Result<LedgerEvent> {
        tracing::debug!(candidate_id = %candidate_id, "Contract vote");
        self.ledger.cast_vote(context.sender(), candidate_id).await
    }

    /// Underlying ledger
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }
}
