//! Actor-based concurrency for the ledger
//!
//! This module implements the single-writer pattern using Tokio actors:
//! - One task owns every write path, so check-voted / increment / mark-voted
//!   can never interleave between callers
//! - Group commit amortizes fsync cost across concurrent voters
//! - Callers are answered only after their vote is durable
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │            Callers (many identities)                  │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │ Pending: Vec<PendingVote> + staged identities  │  │
//! │  │ Timer: batch_timeout or max_batch_size → flush │  │
//! │  └────────────────────────────────────────────────┘  │
//! │                       │                               │
//! │                       ▼                               │
//! │    Storage::commit()  (one WriteBatch, fsync)         │
//! │                       │                               │
//! │                       ▼                               │
//! │    RwLock<LedgerState>::write() → apply → reply       │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::crypto::KeyPair;
use crate::metrics::Metrics;
use crate::state::LedgerState;
use crate::types::{CandidateId, ChainHead, EventKind, Identity, LedgerEvent};
use crate::{config::BatchingConfig, Error, Result, Storage};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, Duration};

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Register candidates, all or none
    RegisterCandidates {
        names: Vec<String>,
        response: oneshot::Sender<Result<Vec<LedgerEvent>>>,
    },

    /// Cast a vote
    CastVote {
        identity: Identity,
        candidate_id: CandidateId,
        response: oneshot::Sender<Result<LedgerEvent>>,
    },

    /// Flush pending votes immediately
    FlushBatch {
        response: oneshot::Sender<Result<()>>,
    },

    /// Committed state together with the head it corresponds to
    Snapshot {
        response: oneshot::Sender<Result<(LedgerState, ChainHead)>>,
    },

    /// Flush and stop; answered once storage is released
    Shutdown { response: oneshot::Sender<()> },
}

/// Vote accepted into the current commit group
#[derive(Debug)]
struct PendingVote {
    event: LedgerEvent,
    response: oneshot::Sender<Result<LedgerEvent>>,
}

/// Shared pieces the actor writes through
#[derive(Debug, Clone)]
pub struct ActorContext {
    /// Storage backend
    pub storage: Arc<Storage>,
    /// Live state, read concurrently by the ledger
    pub state: Arc<RwLock<LedgerState>>,
    /// Committed events go out here
    pub events: broadcast::Sender<LedgerEvent>,
    /// Metrics
    pub metrics: Metrics,
    /// Signs events when present
    pub signer: Option<KeyPair>,
}

/// Actor that processes ledger messages
#[derive(Debug)]
pub struct LedgerActor {
    ctx: ActorContext,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Last committed event
    head: ChainHead,

    /// Current commit group
    pending: Vec<PendingVote>,

    /// Identities in the current commit group
    pending_voters: HashSet<Identity>,

    /// Maximum votes per group
    max_batch_size: usize,

    /// Batch timeout
    batch_timeout: Duration,

    /// Batching enabled
    batching_enabled: bool,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        ctx: ActorContext,
        mailbox: mpsc::Receiver<LedgerMessage>,
        head: ChainHead,
        batching: &BatchingConfig,
    ) -> Self {
        Self {
            ctx,
            mailbox,
            head,
            pending: Vec::with_capacity(batching.max_batch_size),
            pending_voters: HashSet::new(),
            max_batch_size: batching.max_batch_size.max(1),
            batch_timeout: Duration::from_millis(batching.batch_timeout_ms.max(1)),
            batching_enabled: batching.enabled,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let mut batch_timer = interval(self.batch_timeout);
        batch_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let shutdown_response = loop {
            tokio::select! {
                // Process incoming messages
                Some(msg) = self.mailbox.recv() => {
                    match msg {
                        LedgerMessage::Shutdown { response } => {
                            if let Err(e) = self.flush_batch() {
                                tracing::error!("Error flushing batch on shutdown: {}", e);
                            }
                            break Some(response);
                        }
                        msg => {
                            let group_started = self.pending.is_empty();
                            self.handle_message(msg);
                            // Timeout counts from the first vote of a group
                            if group_started && !self.pending.is_empty() {
                                batch_timer.reset();
                            }
                        }
                    }

                    // Check if batch is full
                    if self.pending.len() >= self.max_batch_size || !self.batching_enabled {
                        if let Err(e) = self.flush_batch() {
                            tracing::error!("Error flushing batch: {}", e);
                        }
                    }
                }

                // Batch timeout expired
                _ = batch_timer.tick(), if !self.pending.is_empty() => {
                    if let Err(e) = self.flush_batch() {
                        tracing::error!("Error flushing batch on timeout: {}", e);
                    }
                }

                // Mailbox closed
                else => {
                    if let Err(e) = self.flush_batch() {
                        tracing::error!("Error flushing batch on close: {}", e);
                    }
                    break None;
                }
            }
        };

        // Release storage before acknowledging shutdown
        drop(self);
        tracing::info!("Ledger actor stopped");

        if let Some(response) = shutdown_response {
            let _ = response.send(());
        }
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::RegisterCandidates { names, response } => {
                // Registration must see every accepted vote
                if let Err(e) = self.flush_batch() {
                    tracing::error!("Error flushing batch before registration: {}", e);
                }
                let _ = response.send(self.register_candidates(names));
            }

            LedgerMessage::CastVote {
                identity,
                candidate_id,
                response,
            } => match self.stage_vote(identity, candidate_id) {
                Ok(event) => {
                    tracing::debug!(sequence = event.sequence, "Vote staged");
                    self.pending.push(PendingVote { event, response });
                }
                Err(e) => {
                    tracing::warn!(
                        candidate_id = %candidate_id,
                        reason = e.label(),
                        "Vote rejected"
                    );
                    self.ctx.metrics.record_rejection();
                    let _ = response.send(Err(e));
                }
            },

            LedgerMessage::FlushBatch { response } => {
                let _ = response.send(self.flush_batch());
            }

            LedgerMessage::Snapshot { response } => {
                let state = self.ctx.state.read().clone();
                let _ = response.send(Ok((state, self.head)));
            }

            LedgerMessage::Shutdown { .. } => {
                // Handled in main loop
            }
        }
    }

    /// Tip of the log including staged votes
    fn tip(&self) -> ChainHead {
        self.pending
            .last()
            .map(|vote| ChainHead::advance(&vote.event))
            .unwrap_or(self.head)
    }

    fn seal(&self, kind: EventKind, after: &ChainHead) -> Result<LedgerEvent> {
        let mut event = LedgerEvent::next(after, kind)?;
        if let Some(signer) = &self.ctx.signer {
            signer.sign_event(&mut event);
        }
        Ok(event)
    }

    /// Validate a vote and stage it in the current group
    fn stage_vote(&mut self, identity: Identity, candidate_id: CandidateId) -> Result<LedgerEvent> {
        if self.pending_voters.contains(&identity) {
            return Err(Error::AlreadyVoted(identity));
        }
        self.ctx.state.read().validate_vote(&identity, candidate_id)?;

        let event = self.seal(
            EventKind::VoteCast {
                identity: identity.clone(),
                candidate_id,
            },
            &self.tip(),
        )?;
        self.pending_voters.insert(identity);
        Ok(event)
    }

    /// Register candidates in one commit (never batched with votes)
    fn register_candidates(&mut self, names: Vec<String>) -> Result<Vec<LedgerEvent>> {
        // Validate everything before writing anything
        let first_id = {
            let state = self.ctx.state.read();
            for name in &names {
                state.validate_registration(name)?;
            }
            state.candidate_registry().next_id()
        };

        let mut events = Vec::with_capacity(names.len());
        let mut tallies = Vec::with_capacity(names.len());
        let mut head = self.head;
        for (offset, name) in names.into_iter().enumerate() {
            let candidate_id = CandidateId::new(first_id.get() + offset as u64);
            let event = self.seal(EventKind::CandidateRegistered { candidate_id, name }, &head)?;
            head = ChainHead::advance(&event);
            tallies.push((candidate_id, 0));
            events.push(event);
        }
        if events.is_empty() {
            return Ok(events);
        }

        self.ctx.storage.commit(&events, &tallies, &head)?;

        let count = {
            let mut state = self.ctx.state.write();
            for event in &events {
                state.apply(&event.kind)?;
            }
            state.candidates_count()
        };
        self.head = head;
        self.ctx.metrics.set_candidates(count);

        for event in &events {
            if let EventKind::CandidateRegistered { candidate_id, name } = &event.kind {
                tracing::info!(candidate_id = %candidate_id, name = %name, "Candidate registered");
            }
            let _ = self.ctx.events.send(event.clone());
        }

        Ok(events)
    }

    /// Write the current group to storage, then apply and answer
    fn flush_batch(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let started = Instant::now();
        let pending = std::mem::take(&mut self.pending);
        self.pending_voters.clear();

        let events: Vec<LedgerEvent> = pending.iter().map(|vote| vote.event.clone()).collect();
        let head = self.tip_of(&events);
        let tallies = match self.next_tallies(&events) {
            Ok(tallies) => tallies,
            Err(e) => {
                Self::fail_all(pending, &e);
                return Err(e);
            }
        };

        if let Err(e) = self.ctx.storage.commit(&events, &tallies, &head) {
            tracing::error!(votes = events.len(), "Commit failed: {}", e);
            Self::fail_all(pending, &e);
            return Err(e);
        }

        // Durable from here on; make it visible in one step
        let mut applied = Vec::with_capacity(pending.len());
        {
            let mut state = self.ctx.state.write();
            for vote in &pending {
                applied.push(state.apply(&vote.event.kind));
            }
        }
        self.head = head;

        let votes = pending.len();
        self.ctx
            .metrics
            .record_commit(votes, started.elapsed().as_secs_f64());
        tracing::debug!(votes, head = head.sequence, "Commit group applied");

        for (vote, result) in pending.into_iter().zip(applied) {
            match result {
                Ok(()) => {
                    let _ = self.ctx.events.send(vote.event.clone());
                    let _ = vote.response.send(Ok(vote.event));
                }
                Err(e) => {
                    tracing::error!(
                        sequence = vote.event.sequence,
                        "Durable vote failed to apply: {}",
                        e
                    );
                    let _ = vote
                        .response
                        .send(Err(Error::InvariantViolation(e.to_string())));
                }
            }
        }

        Ok(())
    }

    fn tip_of(&self, events: &[LedgerEvent]) -> ChainHead {
        events.last().map(ChainHead::advance).unwrap_or(self.head)
    }

    /// Absolute counters after the group lands
    fn next_tallies(&self, events: &[LedgerEvent]) -> Result<Vec<(CandidateId, u64)>> {
        let mut deltas: BTreeMap<CandidateId, u64> = BTreeMap::new();
        for (_, candidate_id) in events.iter().filter_map(LedgerEvent::as_vote) {
            *deltas.entry(candidate_id).or_insert(0) += 1;
        }

        let state = self.ctx.state.read();
        deltas
            .into_iter()
            .map(|(candidate_id, delta)| {
                let current = state.tally_store().get(candidate_id)?;
                Ok::<_, Error>((candidate_id, current + delta))
            })
            .collect()
    }

    fn fail_all(pending: Vec<PendingVote>, cause: &Error) {
        for vote in pending {
            let _ = vote
                .response
                .send(Err(Error::Storage(format!("Vote not committed: {}", cause))));
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Register a candidate
    pub async fn register_candidate(&self, name: String) -> Result<LedgerEvent> {
        self.register_candidates(vec![name])
            .await?
            .pop()
            .ok_or_else(|| Error::InvariantViolation("Registration produced no event".to_string()))
    }

    /// Register several candidates atomically
    pub async fn register_candidates(&self, names: Vec<String>) -> Result<Vec<LedgerEvent>> {
        self.request(|response| LedgerMessage::RegisterCandidates { names, response })
            .await
    }

    /// Cast a vote
    pub async fn cast_vote(
        &self,
        identity: Identity,
        candidate_id: CandidateId,
    ) -> Result<LedgerEvent> {
        self.request(|response| LedgerMessage::CastVote {
            identity,
            candidate_id,
            response,
        })
        .await
    }

    /// Flush pending votes immediately
    pub async fn flush_batch(&self) -> Result<()> {
        self.request(|response| LedgerMessage::FlushBatch { response })
            .await
    }

    /// Committed state and matching chain head
    pub async fn snapshot(&self) -> Result<(LedgerState, ChainHead)> {
        self.request(|response| LedgerMessage::Snapshot { response })
            .await
    }

    /// Shutdown actor and wait until it has released storage
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::Shutdown { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Actor stopped without acknowledging".to_string()))
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    ctx: ActorContext,
    head: ChainHead,
    batching: &BatchingConfig,
    mailbox_capacity: usize,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1)); // Bounded channel for backpressure
    let actor = LedgerActor::new(ctx, rx, head, batching);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}
