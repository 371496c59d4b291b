// SplitterStore - Persistent key-value storage using sled
//
// Holds one deployment per data directory:
// - Labelled account keypairs
// - Ledger state and custody
// - Deployment record
// - Event history

use crate::custody::{Amount, Custody, MemoryCustody, MemoryCustodyError};
use crate::identity::{Address, Keypair};
use crate::splitter::{EventLog, EventRecord, LedgerState, Splitter, StateError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Key prefixes for organizing data
mod keys {
    pub const ACCOUNT_PREFIX: &[u8] = b"account:";
    pub const LEDGER_STATE: &[u8] = b"ledger:state";
    pub const CUSTODY: &[u8] = b"custody:state";
    pub const DEPLOYMENT: &[u8] = b"deployment";
    pub const EVENT_PREFIX: &[u8] = b"event:";
}

/// Errors from storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open database: {0}")]
    OpenFailed(String),

    #[error("Database operation failed: {0}")]
    DatabaseError(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Flush failed: {0}")]
    FlushFailed(String),

    #[error("No splitter deployed in this store")]
    NotDeployed,

    #[error("A splitter is already deployed in this store")]
    AlreadyDeployed,

    #[error("Stored ledger holds {held} but custody only has {custody}")]
    Inconsistent { held: Amount, custody: Amount },
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::DatabaseError(err.to_string())
    }
}

impl From<StateError> for StoreError {
    fn from(err: StateError) -> Self {
        StoreError::DeserializationFailed(err.to_string())
    }
}

impl From<MemoryCustodyError> for StoreError {
    fn from(err: MemoryCustodyError) -> Self {
        StoreError::DeserializationFailed(err.to_string())
    }
}

/// Who deployed what, and when
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub owner: Address,
    pub recipients: [Address; 3],
    pub deployed_at: DateTime<Utc>,
}

/// Persistent store for one splitter deployment
pub struct SplitterStore {
    db: sled::Db,
}

impl SplitterStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::OpenFailed(e.to_string()))?;
        Ok(Self { db })
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.db.is_empty())
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::FlushFailed(e.to_string()))?;
        Ok(())
    }

    fn put_raw(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.db.insert(key, value)?;
        Ok(())
    }

    fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.get(key)?.map(|v| v.to_vec()))
    }

    // ========================================================================
    // ACCOUNTS
    // ========================================================================

    pub fn save_account(&self, label: &str, keypair: &Keypair) -> Result<(), StoreError> {
        let key = [keys::ACCOUNT_PREFIX, label.as_bytes()].concat();
        self.put_raw(&key, &keypair.to_bytes())
    }

    pub fn load_account(&self, label: &str) -> Result<Option<Keypair>, StoreError> {
        let key = [keys::ACCOUNT_PREFIX, label.as_bytes()].concat();
        match self.get_raw(&key)? {
            Some(bytes) => {
                let keypair = Keypair::from_bytes(&bytes)
                    .map_err(|e| StoreError::DeserializationFailed(e.to_string()))?;
                Ok(Some(keypair))
            }
            None => Ok(None),
        }
    }

    /// All labelled accounts, ordered by label
    pub fn list_accounts(&self) -> Result<Vec<(String, Address)>, StoreError> {
        let mut accounts = Vec::new();
        for result in self.db.scan_prefix(keys::ACCOUNT_PREFIX) {
            let (key, value) = result?;
            let label = String::from_utf8_lossy(&key[keys::ACCOUNT_PREFIX.len()..]).into_owned();
            let keypair = Keypair::from_bytes(&value)
                .map_err(|e| StoreError::DeserializationFailed(e.to_string()))?;
            accounts.push((label, keypair.address()));
        }
        Ok(accounts)
    }

    // ========================================================================
    // CUSTODY
    // ========================================================================

    pub fn save_custody(&self, custody: &MemoryCustody) -> Result<(), StoreError> {
        self.put_raw(keys::CUSTODY, &custody.to_bytes())
    }

    /// The persisted custody, or an empty one for a fresh store
    pub fn load_custody(&self) -> Result<MemoryCustody, StoreError> {
        match self.get_raw(keys::CUSTODY)? {
            Some(bytes) => Ok(MemoryCustody::from_bytes(&bytes)?),
            None => Ok(MemoryCustody::new()),
        }
    }

    // ========================================================================
    // DEPLOYMENT
    // ========================================================================

    pub fn deployment(&self) -> Result<Option<DeploymentRecord>, StoreError> {
        match self.get_raw(keys::DEPLOYMENT)? {
            Some(bytes) => {
                let record = postcard::from_bytes(&bytes)
                    .map_err(|e| StoreError::DeserializationFailed(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Persist a freshly deployed splitter together with its record
    pub fn save_deployment(&self, splitter: &Splitter<MemoryCustody>) -> Result<DeploymentRecord, StoreError> {
        if self.get_raw(keys::DEPLOYMENT)?.is_some() {
            return Err(StoreError::AlreadyDeployed);
        }
        let record = DeploymentRecord {
            owner: *splitter.owner(),
            recipients: splitter.recipients(),
            deployed_at: Utc::now(),
        };
        let bytes = postcard::to_allocvec(&record)
            .map_err(|e| StoreError::SerializationFailed(e.to_string()))?;

        let mut batch = Self::splitter_batch(splitter)?;
        batch.insert(keys::DEPLOYMENT, bytes);
        self.db.apply_batch(batch)?;
        Ok(record)
    }

    /// Persist state, custody and any events not yet written, atomically
    pub fn save_splitter(&self, splitter: &Splitter<MemoryCustody>) -> Result<(), StoreError> {
        self.db.apply_batch(Self::splitter_batch(splitter)?)?;
        Ok(())
    }

    fn splitter_batch(splitter: &Splitter<MemoryCustody>) -> Result<sled::Batch, StoreError> {
        let mut batch = sled::Batch::default();
        batch.insert(keys::LEDGER_STATE, splitter.state().to_bytes());
        batch.insert(keys::CUSTODY, splitter.custody().to_bytes());
        for record in splitter.events().history() {
            let bytes = postcard::to_allocvec(record)
                .map_err(|e| StoreError::SerializationFailed(e.to_string()))?;
            batch.insert(Self::event_key(record.sequence), bytes);
        }
        Ok(batch)
    }

    /// Load the deployment. Custody may hold more than the ledger has
    /// recognised (forced value), never less.
    pub fn load_splitter(&self) -> Result<Splitter<MemoryCustody>, StoreError> {
        let bytes = self.get_raw(keys::LEDGER_STATE)?.ok_or(StoreError::NotDeployed)?;
        let state = LedgerState::from_bytes(&bytes)?;
        let custody = self.load_custody()?;
        if state.held_balance() > custody.balance() {
            return Err(StoreError::Inconsistent {
                held: state.held_balance(),
                custody: custody.balance(),
            });
        }
        let events = EventLog::starting_at(self.next_event_sequence()?);
        Ok(Splitter::from_parts(state, custody, events))
    }

    /// Load, run `op`, and persist only if it succeeds
    pub fn transact<T, E>(&self, op: impl FnOnce(&mut Splitter<MemoryCustody>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut splitter = self.load_splitter()?;
        let value = op(&mut splitter)?;
        self.save_splitter(&splitter)?;
        Ok(value)
    }

    // ========================================================================
    // EVENTS
    // ========================================================================

    fn event_key(sequence: u64) -> Vec<u8> {
        [keys::EVENT_PREFIX, &sequence.to_be_bytes()[..]].concat()
    }

    /// Every persisted event in sequence order
    pub fn events(&self) -> Result<Vec<EventRecord>, StoreError> {
        let mut records = Vec::new();
        for result in self.db.scan_prefix(keys::EVENT_PREFIX) {
            let (_, value) = result?;
            let record: EventRecord = postcard::from_bytes(&value)
                .map_err(|e| StoreError::DeserializationFailed(e.to_string()))?;
            records.push(record);
        }
        Ok(records)
    }

    fn next_event_sequence(&self) -> Result<u64, StoreError> {
        match self.db.scan_prefix(keys::EVENT_PREFIX).next_back() {
            Some(result) => {
                let (key, _) = result?;
                let mut seq = [0u8; 8];
                seq.copy_from_slice(&key[keys::EVENT_PREFIX.len()..]);
                Ok(u64::from_be_bytes(seq) + 1)
            }
            None => Ok(0),
        }
    }
}
