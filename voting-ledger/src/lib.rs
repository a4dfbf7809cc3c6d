//! Voting Ledger Core
//!
//! One-vote-per-identity ledger with durable tallies and a verifiable event log.
//!
//! # Architecture
//!
//! - **Single Writer**: One actor task owns every mutation, so check-then-record never races
//! - **Group Commit**: Concurrent votes share one synced RocksDB write
//! - **Snapshot Reads**: Queries read the committed state under a shared lock
//! - **Hash Chain**: Every event links to its predecessor, optionally Ed25519-signed
//!
//! # Invariants
//!
//! - Sum of all tallies == number of identities that have voted
//! - An identity votes at most once, ever
//! - Tallies only increase, by exactly one per accepted vote
//! - Deterministic replay: same events → same state

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod config;
pub mod contract;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod registry;
pub mod state;
pub mod storage;
pub mod tally;
pub mod types;

// Re-exports
pub use config::Config;
pub use contract::{CallerContext, VotingContract};
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use state::LedgerState;
pub use storage::Storage;
pub use types::{
    Candidate, CandidateId, ChainHead, ElectionResult, EventKind, Identity, LedgerEvent,
    Signature, VoterStatus,
};
