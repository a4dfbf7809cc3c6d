//! Core types for the voting ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - ABI-shaped JSON for client collaborators (`voteCount`, `winnerName`)

use crate::{crypto, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Candidate identifier, 1-based and contiguous
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(u64);

impl CandidateId {
    /// Create new candidate ID
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get raw value
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Zero-based slot in the registry arena, `None` for id 0
    pub(crate) fn slot(&self) -> Option<usize> {
        usize::try_from(self.0).ok()?.checked_sub(1)
    }

    /// Big-endian key bytes (sorts in id order)
    pub(crate) fn to_key(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl From<u64> for CandidateId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Voter identity (account address or similar opaque key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Create new identity
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Empty or whitespace-only identities are malformed
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable registry entry for a candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Candidate ID
    pub id: CandidateId,
    /// Display name
    pub name: String,
}

/// Candidate with its current tally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Candidate ID
    pub id: CandidateId,
    /// Display name
    pub name: String,
    /// Votes received so far
    pub vote_count: u64,
}

/// Per-identity voting state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum VoterStatus {
    /// No vote recorded
    NotVoted = 0,
    /// Vote recorded (terminal)
    Voted = 1,
}

impl VoterStatus {
    /// Check if this is the terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, VoterStatus::Voted)
    }
}

/// Winner of the election so far
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionResult {
    /// Winning candidate ID
    pub winner_id: CandidateId,
    /// Winning candidate name
    pub winner_name: String,
    /// Votes held by the winner
    pub winner_vote_count: u64,
}

/// State transition recorded in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Candidate added to the registry
    CandidateRegistered {
        /// Assigned ID
        candidate_id: CandidateId,
        /// Display name
        name: String,
    },
    /// Identity voted for a candidate
    VoteCast {
        /// Voter
        identity: Identity,
        /// Chosen candidate
        candidate_id: CandidateId,
    },
}

/// Ledger event (audit log entry)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Unique event ID (UUIDv7 for time-ordering)
    pub event_id: Uuid,

    /// Position in the log, gap-free from 1
    pub sequence: u64,

    /// State transition
    pub kind: EventKind,

    /// Event timestamp (nanoseconds since Unix epoch)
    pub timestamp_nanos: i64,

    /// Hash of the previous event (zeros for the first)
    pub previous_hash: [u8; 32],

    /// SHA-256 of the canonical bytes
    pub hash: [u8; 32],

    /// Ed25519 signature over `hash` (when the ledger signs)
    pub signature: Option<Signature>,
}

impl LedgerEvent {
    /// Build the event that follows `head`
    pub fn next(head: &ChainHead, kind: EventKind) -> Result<Self> {
        let mut event = Self {
            event_id: Uuid::now_v7(),
            sequence: head.sequence + 1,
            kind,
            timestamp_nanos: Utc::now().timestamp_nanos_opt().unwrap_or(0),
            previous_hash: head.hash,
            hash: [0u8; 32],
            signature: None,
        };
        event.hash = event.compute_hash()?;
        Ok(event)
    }

    /// Create canonical bytes for hashing (everything except hash and signature)
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        let bytes = bincode::serialize(&(
            &self.event_id,
            self.sequence,
            &self.kind,
            self.timestamp_nanos,
            &self.previous_hash,
        ))?;
        Ok(bytes)
    }

    /// Recompute the content hash
    pub fn compute_hash(&self) -> Result<[u8; 32]> {
        Ok(crypto::hash_bytes(&self.canonical_bytes()?))
    }

    /// Verify signature against a public key
    pub fn verify_signature(&self, public_key: &[u8; 32]) -> bool {
        match &self.signature {
            Some(signature) => signature.verify(&self.hash, public_key),
            None => false,
        }
    }

    /// Wall-clock time the event was recorded
    pub fn recorded_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.timestamp_nanos)
    }

    /// Voter and candidate, if this is a vote
    pub fn as_vote(&self) -> Option<(&Identity, CandidateId)> {
        match &self.kind {
            EventKind::VoteCast {
                identity,
                candidate_id,
            } => Some((identity, *candidate_id)),
            EventKind::CandidateRegistered { .. } => None,
        }
    }
}

/// Tip of the event log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChainHead {
    /// Sequence of the last event (0 when empty)
    pub sequence: u64,
    /// Hash of the last event (zeros when empty)
    pub hash: [u8; 32],
}

impl ChainHead {
    /// Head after appending `event`
    pub fn advance(event: &LedgerEvent) -> Self {
        Self {
            sequence: event.sequence,
            hash: event.hash,
        }
    }
}

/// Digital signature (Ed25519)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Signature bytes (64 bytes)
    #[serde(with = "serde_bytes")]
    bytes: [u8; 64],
}

impl Signature {
    /// Create from bytes
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self { bytes }
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.bytes
    }

    /// Verify signature
    pub fn verify(&self, message: &[u8], public_key: &[u8; 32]) -> bool {
        crypto::verify_signature(message, self, public_key)
    }
}
