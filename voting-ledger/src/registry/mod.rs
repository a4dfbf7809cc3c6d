//! Registries owned by the ledger
//!
//! - [`CandidateRegistry`]: immutable candidate records, ids assigned 1..=n
//! - [`VoterRegistry`]: identities whose vote flag has flipped to true

pub mod candidates;
pub mod voters;

pub use candidates::CandidateRegistry;
pub use voters::VoterRegistry;
