//! Main ledger orchestration layer
//!
//! This module ties together storage, state, crypto and the writer actor
//! into the voting API: `cast_vote`, `get_candidates`, `get_results`.
//!
//! Reads take a shared lock on the live state and never wait on the writer;
//! writes are serialized through the actor and return once durable.
//!
//! # Example
//!
//! ```no_run
//! use voting_ledger::{CandidateId, Config, Identity, Ledger};
//!
//! #[tokio::main]
//! async fn main() -> voting_ledger::Result<()> {
//!     let mut config = Config::default();
//!     config.candidates = vec!["Alice".to_string(), "Bob".to_string()];
//!     let ledger = Ledger::open(config).await?;
//!
//!     let voter = Identity::new("0x5FbDB2315678afecb367f032d93F642f64180aa3");
//!     ledger.cast_vote(&voter, CandidateId::new(1)).await?;
//!     let result = ledger.get_results()?;
//!     println!("{} leads with {}", result.winner_name, result.winner_vote_count);
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, ActorContext, LedgerHandle},
    crypto::{self, KeyPair},
    metrics::Metrics,
    state::LedgerState,
    storage::StorageStats,
    types::{
        Candidate, CandidateId, ChainHead, ElectionResult, EventKind, Identity, LedgerEvent,
        VoterStatus,
    },
    Config, Error, Result, Storage,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger {
    /// Actor handle for writes
    handle: LedgerHandle,

    /// Direct storage access (audit reads)
    storage: Arc<Storage>,

    /// Live state (snapshot reads)
    state: Arc<RwLock<LedgerState>>,

    /// Committed events
    events: broadcast::Sender<LedgerEvent>,

    /// Metrics
    metrics: Metrics,

    /// Public key events are signed with (if any)
    public_key: Option<[u8; 32]>,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open ledger with configuration
    ///
    /// Events are signed when `config.signing_key_path` is set.
    pub async fn open(config: Config) -> Result<Self> {
        let signer = match &config.signing_key_path {
            Some(path) => Some(KeyPair::load_or_generate(path)?),
            None => None,
        };
        Self::open_with_signer(config, signer).await
    }

    /// Open ledger that signs every event with `signer`
    pub async fn open_with_signer(config: Config, signer: Option<KeyPair>) -> Result<Self> {
        config.validate()?;

        // Open storage and rebuild state
        let storage = Arc::new(Storage::open(&config)?);
        let (state, head) = storage.load_state()?;
        let needs_seed = state.candidates_count() == 0 && !config.candidates.is_empty();

        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to create metrics: {}", e)))?;
        metrics.set_candidates(state.candidates_count());

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            candidates = state.candidates_count(),
            votes = state.total_votes(),
            head = head.sequence,
            "Ledger state loaded"
        );

        let state = Arc::new(RwLock::new(state));
        let (events, _) = broadcast::channel(config.event_channel_capacity);
        let public_key = signer.as_ref().map(KeyPair::public_key);

        // Spawn actor
        let handle = spawn_ledger_actor(
            ActorContext {
                storage: storage.clone(),
                state: state.clone(),
                events: events.clone(),
                metrics: metrics.clone(),
                signer,
            },
            head,
            &config.batching,
            config.mailbox_capacity,
        );

        let ledger = Self {
            handle,
            storage,
            state,
            events,
            metrics,
            public_key,
            config,
        };

        if needs_seed {
            if let Err(e) = ledger.add_candidates(ledger.config.candidates.clone()).await {
                tracing::error!("Seeding candidates failed: {}", e);
                if let Err(stop) = ledger.handle.shutdown().await {
                    tracing::warn!("Actor did not stop cleanly: {}", stop);
                }
                return Err(e);
            }
        }

        Ok(ledger)
    }

    // Writes

    /// Register a candidate (admin operation, closed once voting starts)
    pub async fn add_candidate(&self, name: impl Into<String>) -> Result<CandidateId> {
        let event = self.handle.register_candidate(name.into()).await?;
        match event.kind {
            EventKind::CandidateRegistered { candidate_id, .. } => Ok(candidate_id),
            EventKind::VoteCast { .. } => Err(Error::InvariantViolation(
                "Registration produced a vote event".to_string(),
            )),
        }
    }

    /// Register several candidates in one commit; on error none are added
    pub async fn add_candidates(&self, names: Vec<String>) -> Result<Vec<CandidateId>> {
        self.handle
            .register_candidates(names)
            .await?
            .into_iter()
            .map(|event| match event.kind {
                EventKind::CandidateRegistered { candidate_id, .. } => Ok(candidate_id),
                EventKind::VoteCast { .. } => Err(Error::InvariantViolation(
                    "Registration produced a vote event".to_string(),
                )),
            })
            .collect()
    }

    /// Cast `identity`'s single vote for `candidate_id`
    ///
    /// Returns the committed `VoteCast` event. A second call for the same
    /// identity fails with `AlreadyVoted`; no failure changes any state.
    pub async fn cast_vote(
        &self,
        identity: &Identity,
        candidate_id: CandidateId,
    ) -> Result<LedgerEvent> {
        self.handle.cast_vote(identity.clone(), candidate_id).await
    }

    // Reads

    /// All candidates with their tallies, ascending id order
    pub fn get_candidates(&self) -> Vec<Candidate> {
        self.state.read().candidates()
    }

    /// One candidate with its tally
    pub fn candidate(&self, id: CandidateId) -> Result<Candidate> {
        self.state.read().candidate(id)
    }

    /// Number of registered candidates
    pub fn candidates_count(&self) -> u64 {
        self.state.read().candidates_count()
    }

    /// Check if an identity has voted
    pub fn has_voted(&self, identity: &Identity) -> bool {
        self.state.read().has_voted(identity)
    }

    /// Voting state of an identity
    pub fn voter_status(&self, identity: &Identity) -> VoterStatus {
        self.state.read().voter_status(identity)
    }

    /// Total committed votes
    pub fn total_votes(&self) -> u64 {
        self.state.read().total_votes()
    }

    /// Current leader; ties go to the lowest id
    pub fn get_results(&self) -> Result<ElectionResult> {
        self.state.read().results()
    }

    /// Copy of the committed state
    pub fn snapshot(&self) -> LedgerState {
        self.state.read().clone()
    }

    /// Check the live state invariants
    pub fn check_invariants(&self) -> Result<()> {
        self.state.read().check_invariants()
    }

    /// Event that recorded an identity's vote
    pub fn vote_receipt(&self, identity: &Identity) -> Result<Option<LedgerEvent>> {
        match self.storage.voter_sequence(identity)? {
            Some(sequence) => self.storage.get_event(sequence),
            None => Ok(None),
        }
    }

    // Audit

    /// Full event log in sequence order
    pub fn audit_log(&self) -> Result<Vec<LedgerEvent>> {
        self.storage.events()
    }

    /// Verify the event log against the live state
    ///
    /// Checks the hash chain (and signatures when the ledger signs), replays
    /// every event into a fresh state and compares it with the committed one.
    pub async fn verify_audit_log(&self) -> Result<ChainHead> {
        let (committed, head) = self.handle.snapshot().await?;

        let events: Vec<LedgerEvent> = self
            .storage
            .events()?
            .into_iter()
            .take_while(|event| event.sequence <= head.sequence)
            .collect();

        let verified = crypto::verify_chain(&events, self.public_key.as_ref())?;
        if verified != head {
            return Err(Error::InvariantViolation(format!(
                "Event log ends at {} but ledger head is {}",
                verified.sequence, head.sequence
            )));
        }

        let mut replayed = LedgerState::new();
        for event in &events {
            replayed.apply(&event.kind)?;
        }
        replayed.check_invariants()?;

        if replayed != committed {
            return Err(Error::InvariantViolation(
                "Replayed event log does not match ledger state".to_string(),
            ));
        }

        tracing::info!(events = events.len(), "Audit log verified");
        Ok(head)
    }

    /// Subscribe to committed events
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Public key events are signed with
    pub fn public_key(&self) -> Option<[u8; 32]> {
        self.public_key
    }

    /// Storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        self.storage.get_stats()
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Flush pending votes immediately
    pub async fn flush(&self) -> Result<()> {
        self.handle.flush_batch().await
    }

    /// Shutdown ledger, committing pending votes first
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await?;
        tracing::info!("Ledger shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir, candidates: &[&str]) -> Config {
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.candidates = candidates.iter().map(|c| c.to_string()).collect();
        config.batching.enabled = false; // Disable batching for tests
        config
    }

    async fn create_test_ledger(candidates: &[&str]) -> (Ledger, TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(test_config(&temp_dir, candidates)).await.unwrap();
        (ledger, temp_dir)
    }

    fn voter(n: usize) -> Identity {
        Identity::new(format!("0x{:040x}", n))
    }

    #[tokio::test]
    async fn test_ledger_open() {
        let (ledger, _temp) = create_test_ledger(&[]).await;
        assert_eq!(ledger.candidates_count(), 0);
        assert!(matches!(ledger.get_results(), Err(Error::NoCandidates)));
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_seeded_candidates() {
        let (ledger, _temp) = create_test_ledger(&["Alice", "Bob"]).await;

        let candidates = ledger.get_candidates();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].id, CandidateId::new(1));
        assert_eq!(candidates[0].name, "Alice");
        assert_eq!(candidates[1].id, CandidateId::new(2));
        assert_eq!(candidates[1].name, "Bob");
        assert!(candidates.iter().all(|c| c.vote_count == 0));
        assert_eq!(ledger.metrics().candidates.get(), 2);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_cast_vote() {
        let (ledger, _temp) = create_test_ledger(&["Alice", "Bob"]).await;

        let event = ledger.cast_vote(&voter(1), CandidateId::new(2)).await.unwrap();
        assert_eq!(event.as_vote(), Some((&voter(1), CandidateId::new(2))));

        assert!(ledger.has_voted(&voter(1)));
        assert_eq!(ledger.voter_status(&voter(1)), VoterStatus::Voted);
        assert_eq!(ledger.candidate(CandidateId::new(2)).unwrap().vote_count, 1);
        assert_eq!(ledger.vote_receipt(&voter(1)).unwrap(), Some(event));
        assert_eq!(ledger.vote_receipt(&voter(2)).unwrap(), None);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_double_vote_rejected() {
        let (ledger, _temp) = create_test_ledger(&["Alice", "Bob"]).await;

        ledger.cast_vote(&voter(1), CandidateId::new(1)).await.unwrap();
        let before = ledger.get_candidates();

        let err = ledger
            .cast_vote(&voter(1), CandidateId::new(2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyVoted(_)));
        assert_eq!(ledger.get_candidates(), before);
        assert_eq!(ledger.total_votes(), 1);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_candidate_rejected() {
        let (ledger, _temp) = create_test_ledger(&["Alice"]).await;

        let err = ledger
            .cast_vote(&voter(1), CandidateId::new(2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(id) if id == CandidateId::new(2)));
        assert!(!ledger.has_voted(&voter(1)));
        assert_eq!(ledger.total_votes(), 0);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_identity_rejected() {
        let (ledger, _temp) = create_test_ledger(&["Alice"]).await;

        let err = ledger
            .cast_vote(&Identity::new(""), CandidateId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_add_candidate_validation() {
        let (ledger, _temp) = create_test_ledger(&[]).await;

        assert!(matches!(
            ledger.add_candidate("").await,
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(ledger.add_candidate("Alice").await.unwrap(), CandidateId::new(1));

        ledger.cast_vote(&voter(1), CandidateId::new(1)).await.unwrap();
        assert!(matches!(
            ledger.add_candidate("Bob").await,
            Err(Error::RegistrationClosed)
        ));
        assert_eq!(ledger.candidates_count(), 1);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_results_tie_break() {
        let (ledger, _temp) = create_test_ledger(&["Alice", "Bob", "Carol"]).await;

        let mut n = 0;
        for (id, votes) in [(2u64, 5), (1, 5), (3, 2)] {
            for _ in 0..votes {
                n += 1;
                ledger.cast_vote(&voter(n), CandidateId::new(id)).await.unwrap();
            }
        }

        let result = ledger.get_results().unwrap();
        assert_eq!(result.winner_id, CandidateId::new(1));
        assert_eq!(result.winner_name, "Alice");
        assert_eq!(result.winner_vote_count, 5);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_sees_committed_votes() {
        let (ledger, _temp) = create_test_ledger(&["Alice"]).await;
        let mut events = ledger.subscribe();

        let committed = ledger.cast_vote(&voter(1), CandidateId::new(1)).await.unwrap();
        let received = events.recv().await.unwrap();
        assert_eq!(received, committed);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_audit_log_verifies() {
        let (ledger, _temp) = create_test_ledger(&["Alice", "Bob"]).await;
        for n in 0..4 {
            ledger
                .cast_vote(&voter(n), CandidateId::new(1 + (n as u64 % 2)))
                .await
                .unwrap();
        }

        let log = ledger.audit_log().unwrap();
        assert_eq!(log.len(), 6);

        let head = ledger.verify_audit_log().await.unwrap();
        assert_eq!(head.sequence, 6);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_signed_ledger() {
        let temp_dir = tempfile::tempdir().unwrap();
        let keypair = KeyPair::from_seed(&[3u8; 32]);
        let public_key = keypair.public_key();
        let ledger = Ledger::open_with_signer(test_config(&temp_dir, &["Alice"]), Some(keypair))
            .await
            .unwrap();

        let event = ledger.cast_vote(&voter(1), CandidateId::new(1)).await.unwrap();
        assert!(event.verify_signature(&public_key));
        assert_eq!(ledger.public_key(), Some(public_key));
        ledger.verify_audit_log().await.unwrap();

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_preserves_votes() {
        let temp_dir = tempfile::tempdir().unwrap();

        let ledger = Ledger::open(test_config(&temp_dir, &["Alice", "Bob"]))
            .await
            .unwrap();
        ledger.cast_vote(&voter(1), CandidateId::new(2)).await.unwrap();
        ledger.shutdown().await.unwrap();

        // Seeding is skipped for a non-empty registry
        let ledger = Ledger::open(test_config(&temp_dir, &["Carol"])).await.unwrap();
        assert_eq!(ledger.candidates_count(), 2);
        assert!(ledger.has_voted(&voter(1)));
        assert_eq!(ledger.candidate(CandidateId::new(2)).unwrap().vote_count, 1);

        let err = ledger
            .cast_vote(&voter(1), CandidateId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyVoted(_)));

        // Chain continues where it left off
        let event = ledger.cast_vote(&voter(2), CandidateId::new(1)).await.unwrap();
        assert_eq!(event.sequence, 4);
        ledger.verify_audit_log().await.unwrap();

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_blank_seed_name_rejected_before_any_write() {
        let temp_dir = tempfile::tempdir().unwrap();

        let err = Ledger::open(test_config(&temp_dir, &["Alice", "", "Bob"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        // Fixed config seeds the full set on the next open
        let ledger = Ledger::open(test_config(&temp_dir, &["Alice", "Bob"]))
            .await
            .unwrap();
        let names: Vec<String> = ledger.get_candidates().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
        assert_eq!(ledger.audit_log().unwrap().len(), 2);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_add_candidates_is_atomic() {
        let (ledger, _temp) = create_test_ledger(&[]).await;

        let err = ledger
            .add_candidates(vec!["Alice".to_string(), "\t".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(ledger.candidates_count(), 0);
        assert!(ledger.audit_log().unwrap().is_empty());

        let ids = ledger
            .add_candidates(vec!["Alice".to_string(), "Bob".to_string()])
            .await
            .unwrap();
        assert_eq!(ids, vec![CandidateId::new(1), CandidateId::new(2)]);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_signing_key_from_config() {
        let temp_dir = tempfile::tempdir().unwrap();
        let key_dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&temp_dir, &["Alice"]);
        config.signing_key_path = Some(key_dir.path().join("node.key"));

        let ledger = Ledger::open(config.clone()).await.unwrap();
        let public_key = ledger.public_key().unwrap();
        let event = ledger.cast_vote(&voter(1), CandidateId::new(1)).await.unwrap();
        assert!(event.verify_signature(&public_key));
        ledger.shutdown().await.unwrap();

        // Same key on restart, so the whole log still verifies
        let ledger = Ledger::open(config).await.unwrap();
        assert_eq!(ledger.public_key(), Some(public_key));
        ledger.verify_audit_log().await.unwrap();
        ledger.shutdown().await.unwrap();
    }
}
