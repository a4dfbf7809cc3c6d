//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `events` - Append-only event log (key: sequence, big-endian)
//! - `candidates` - Candidate records (key: candidate id, big-endian)
//! - `tallies` - Vote counters (key: candidate id, value: u64 big-endian)
//! - `voters` - Identities that have voted (key: identity, value: sequence of the vote)
//! - `meta` - Chain head
//!
//! Every commit is one `WriteBatch`: the events and the materialised state
//! they imply land together or not at all.

use crate::{
    error::{Error, Result},
    registry::{CandidateRegistry, VoterRegistry},
    state::LedgerState,
    tally::TallyStore,
    types::{CandidateId, CandidateRecord, ChainHead, EventKind, Identity, LedgerEvent},
    Config,
};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBCompressionType, IteratorMode, Options,
    WriteBatch, WriteOptions, DB,
};
use std::sync::Arc;

/// Column family names
const CF_EVENTS: &str = "events";
const CF_CANDIDATES: &str = "candidates";
const CF_TALLIES: &str = "tallies";
const CF_VOTERS: &str = "voters";
const CF_META: &str = "meta";

const HEAD_KEY: &[u8] = b"head";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
    sync_writes: bool,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_EVENTS, Self::cf_options_events()),
            ColumnFamilyDescriptor::new(CF_CANDIDATES, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_TALLIES, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_VOTERS, Self::cf_options_voters()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(
            path = ?path,
            sync_writes = config.rocksdb.sync_writes,
            "Opened RocksDB"
        );

        Ok(Self {
            db: Arc::new(db),
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    /// Open an existing database without write access (commits fail)
    #[cfg(test)]
    pub(crate) fn open_read_only(config: &Config) -> Result<Self> {
        let db = DB::open_cf_for_read_only(
            &Options::default(),
            &config.data_dir,
            [CF_EVENTS, CF_CANDIDATES, CF_TALLIES, CF_VOTERS, CF_META],
            false,
        )?;

        Ok(Self {
            db: Arc::new(db),
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    // Column family options

    fn cf_options_events() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(DBCompressionType::Zstd);
        opts
    }

    fn cf_options_state() -> Options {
        let mut opts = Options::default();
        // State is frequently read, use LZ4 for speed
        opts.set_compression_type(DBCompressionType::Lz4);
        opts
    }

    fn cf_options_voters() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(DBCompressionType::Lz4);
        // Point lookups by identity benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Writes

    /// Commit a group of events with the state they produce (atomic)
    ///
    /// `tallies` carries the new absolute counter for every candidate the
    /// group touched, including zeroed counters for new registrations.
    pub fn commit(
        &self,
        events: &[LedgerEvent],
        tallies: &[(CandidateId, u64)],
        head: &ChainHead,
    ) -> Result<()> {
        let cf_events = self.cf_handle(CF_EVENTS)?;
        let cf_candidates = self.cf_handle(CF_CANDIDATES)?;
        let cf_tallies = self.cf_handle(CF_TALLIES)?;
        let cf_voters = self.cf_handle(CF_VOTERS)?;
        let cf_meta = self.cf_handle(CF_META)?;

        let mut batch = WriteBatch::default();

        for event in events {
            // 1. Event
            batch.put_cf(&cf_events, event.sequence.to_be_bytes(), bincode::serialize(event)?);

            // 2. Materialised state
            match &event.kind {
                EventKind::CandidateRegistered { candidate_id, name } => {
                    let record = CandidateRecord {
                        id: *candidate_id,
                        name: name.clone(),
                    };
                    batch.put_cf(
                        &cf_candidates,
                        candidate_id.to_key(),
                        bincode::serialize(&record)?,
                    );
                }
                EventKind::VoteCast { identity, .. } => {
                    batch.put_cf(
                        &cf_voters,
                        identity.as_str().as_bytes(),
                        event.sequence.to_be_bytes(),
                    );
                }
            }
        }

        // 3. Counters
        for (candidate_id, count) in tallies {
            batch.put_cf(&cf_tallies, candidate_id.to_key(), count.to_be_bytes());
        }

        // 4. Chain head
        batch.put_cf(&cf_meta, HEAD_KEY, bincode::serialize(head)?);

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db.write_opt(batch, &write_opts)?;

        tracing::debug!(
            events = events.len(),
            head = head.sequence,
            "Commit written"
        );

        Ok(())
    }

    // Reads

    /// Get event by sequence
    pub fn get_event(&self, sequence: u64) -> Result<Option<LedgerEvent>> {
        let cf = self.cf_handle(CF_EVENTS)?;
        match self.db.get_cf(&cf, sequence.to_be_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Full event log in sequence order
    pub fn events(&self) -> Result<Vec<LedgerEvent>> {
        let cf = self.cf_handle(CF_EVENTS)?;

        let mut events = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            events.push(bincode::deserialize(&value)?);
        }
        Ok(events)
    }

    /// Sequence of the event that recorded an identity's vote
    pub fn voter_sequence(&self, identity: &Identity) -> Result<Option<u64>> {
        let cf = self.cf_handle(CF_VOTERS)?;
        match self.db.get_cf(&cf, identity.as_str().as_bytes())? {
            Some(value) => Ok(Some(decode_u64(&value)?)),
            None => Ok(None),
        }
    }

    /// Chain head (default when the log is empty)
    pub fn head(&self) -> Result<ChainHead> {
        let cf = self.cf_handle(CF_META)?;
        match self.db.get_cf(&cf, HEAD_KEY)? {
            Some(value) => Ok(bincode::deserialize(&value)?),
            None => Ok(ChainHead::default()),
        }
    }

    /// Rebuild the in-memory state from the materialised column families
    pub fn load_state(&self) -> Result<(LedgerState, ChainHead)> {
        let cf_candidates = self.cf_handle(CF_CANDIDATES)?;
        let cf_tallies = self.cf_handle(CF_TALLIES)?;
        let cf_voters = self.cf_handle(CF_VOTERS)?;

        let mut records = Vec::new();
        for item in self.db.iterator_cf(&cf_candidates, IteratorMode::Start) {
            let (_, value) = item?;
            records.push(bincode::deserialize::<CandidateRecord>(&value)?);
        }
        let candidates = CandidateRegistry::from_records(records)?;

        let mut counts = Vec::new();
        for item in self.db.iterator_cf(&cf_tallies, IteratorMode::Start) {
            let (key, value) = item?;
            let expected = CandidateId::new(counts.len() as u64 + 1);
            if decode_u64(&key)? != expected.get() {
                return Err(Error::InvariantViolation(format!(
                    "Tally stored out of order, expected candidate {}",
                    expected
                )));
            }
            counts.push(decode_u64(&value)?);
        }
        let tallies = TallyStore::from_counts(counts);

        let mut identities = Vec::new();
        for item in self.db.iterator_cf(&cf_voters, IteratorMode::Start) {
            let (key, _) = item?;
            let identity = String::from_utf8(key.to_vec())
                .map_err(|e| Error::Storage(format!("Voter key is not UTF-8: {}", e)))?;
            identities.push(Identity::new(identity));
        }
        let voters = VoterRegistry::from_identities(identities);

        let state = LedgerState::from_parts(candidates, voters, tallies)?;
        let head = self.head()?;

        Ok((state, head))
    }

    // Statistics

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        let cf_events = self.cf_handle(CF_EVENTS)?;
        let cf_voters = self.cf_handle(CF_VOTERS)?;

        Ok(StorageStats {
            approximate_events: self.approximate_count(&cf_events)?,
            approximate_voters: self.approximate_count(&cf_voters)?,
            head: self.head()?,
        })
    }

    fn approximate_count(&self, cf: &Arc<BoundColumnFamily<'_>>) -> Result<u64> {
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);

        Ok(prop)
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Estimated number of events
    pub approximate_events: u64,
    /// Estimated number of voters
    pub approximate_voters: u64,
    /// Current chain head
    pub head: ChainHead,
}

fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::Storage(format!("Expected 8 bytes, found {}", bytes.len())))?;
    Ok(u64::from_be_bytes(array))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (config, temp_dir)
    }

    fn register(head: &ChainHead, id: u64, name: &str) -> LedgerEvent {
        LedgerEvent::next(
            head,
            EventKind::CandidateRegistered {
                candidate_id: CandidateId::new(id),
                name: name.to_string(),
            },
        )
        .unwrap()
    }

    fn vote(head: &ChainHead, voter: &str, id: u64) -> LedgerEvent {
        LedgerEvent::next(
            head,
            EventKind::VoteCast {
                identity: Identity::new(voter),
                candidate_id: CandidateId::new(id),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_empty_store() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let (state, head) = storage.load_state().unwrap();
        assert_eq!(state, LedgerState::new());
        assert_eq!(head, ChainHead::default());
        assert!(storage.events().unwrap().is_empty());
    }

    #[test]
    fn test_commit_and_load() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let alice = register(&ChainHead::default(), 1, "Alice");
        let head = ChainHead::advance(&alice);
        storage
            .commit(&[alice.clone()], &[(CandidateId::new(1), 0)], &head)
            .unwrap();

        let ballot = vote(&head, "0xabc", 1);
        let head = ChainHead::advance(&ballot);
        storage
            .commit(&[ballot.clone()], &[(CandidateId::new(1), 1)], &head)
            .unwrap();

        let (state, loaded_head) = storage.load_state().unwrap();
        assert_eq!(loaded_head, head);
        assert_eq!(state.candidate(CandidateId::new(1)).unwrap().vote_count, 1);
        assert!(state.has_voted(&Identity::new("0xabc")));

        assert_eq!(storage.events().unwrap(), vec![alice, ballot.clone()]);
        assert_eq!(storage.get_event(2).unwrap(), Some(ballot));
        assert_eq!(storage.get_event(3).unwrap(), None);
        assert_eq!(
            storage.voter_sequence(&Identity::new("0xabc")).unwrap(),
            Some(2)
        );
        assert_eq!(storage.voter_sequence(&Identity::new("0xdef")).unwrap(), None);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let (config, _temp) = test_config();

        let alice = register(&ChainHead::default(), 1, "Alice");
        let head = ChainHead::advance(&alice);
        {
            let storage = Storage::open(&config).unwrap();
            storage
                .commit(&[alice], &[(CandidateId::new(1), 0)], &head)
                .unwrap();
        }

        let storage = Storage::open(&config).unwrap();
        let (state, loaded_head) = storage.load_state().unwrap();
        assert_eq!(state.candidates_count(), 1);
        assert_eq!(loaded_head, head);
    }

    #[test]
    fn test_load_rejects_inconsistent_tallies() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let alice = register(&ChainHead::default(), 1, "Alice");
        let head = ChainHead::advance(&alice);
        // Counter claims a vote nobody cast
        storage
            .commit(&[alice], &[(CandidateId::new(1), 1)], &head)
            .unwrap();

        assert!(matches!(
            storage.load_state(),
            Err(Error::InvariantViolation(_))
        ));
    }
}
