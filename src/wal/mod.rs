//! The write-ahead log engine (`WALStore`) is explicitly out of scope for
//! this crate (spec §1): an append-only durable log with segment rotation
//! owned by the rest of the streaming engine. [`WalStore`] is the opaque
//! interface the [`WalBlockHandler`](crate::block::WalBlockHandler) and the
//! tracker's own event log depend on, plus a `sled`-backed reference
//! implementation — grounded in how the teacher wraps `sled::Db` in
//! `backend::Database` for durable local storage.

use async_trait::async_trait;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::model::WalRecordHandle;

pub mod tracker_log;

/// Append-only durable log used to make stored blocks recoverable after a
/// worker crash, referenced only through this trait.
#[async_trait]
pub trait WalStore: Send + Sync {
    /// Appends `bytes` durably and returns a handle sufficient to read them
    /// back later.
    async fn append(&self, bytes: &[u8]) -> Result<WalRecordHandle, String>;

    /// Reads back previously appended bytes, if the segment holding them
    /// has not yet been rotated away.
    async fn read(&self, handle: &WalRecordHandle) -> Option<Vec<u8>>;

    /// Truncates segments whose records are all older than
    /// `threshold_millis` (wall-clock milliseconds since epoch). Best
    /// effort: a truncation that races with a concurrent `read` may still
    /// serve the old data.
    async fn truncate_before(&self, threshold_millis: i64) -> Result<(), String>;
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}

/// `sled`-backed [`WalStore`]. Every append lands in segment `0`; "segment
/// rotation" is modeled as a periodic compaction that drops records older
/// than the requested threshold, which is the externally observable
/// behavior `cleanupOldBlocks` depends on (spec §4.B).
pub struct SledWalStore {
    records: sled::Tree,
    timestamps: sled::Tree,
    next_offset: std::sync::atomic::AtomicU64,
}

impl SledWalStore {
    pub fn open(db: &sled::Db) -> Result<Self, String> {
        let records = db.open_tree("wal_records").map_err(|e| e.to_string())?;
        let timestamps = db.open_tree("wal_timestamps").map_err(|e| e.to_string())?;
        let next_offset = records
            .iter()
            .keys()
            .filter_map(Result::ok)
            .filter_map(|k| k.as_ref().try_into().ok().map(u64::from_be_bytes))
            .max()
            .map(|max| max + 1)
            .unwrap_or(0);
        Ok(Self {
            records,
            timestamps,
            next_offset: std::sync::atomic::AtomicU64::new(next_offset),
        })
    }
}

#[async_trait]
impl WalStore for SledWalStore {
    async fn append(&self, bytes: &[u8]) -> Result<WalRecordHandle, String> {
        let offset = self
            .next_offset
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let key = offset.to_be_bytes();
        self.records.insert(key, bytes).map_err(|e| e.to_string())?;
        self.timestamps
            .insert(key, &now_millis().to_be_bytes())
            .map_err(|e| e.to_string())?;
        self.records.flush_async().await.map_err(|e| e.to_string())?;
        Ok(WalRecordHandle {
            segment: 0,
            offset,
            length: bytes.len() as u64,
        })
    }

    async fn read(&self, handle: &WalRecordHandle) -> Option<Vec<u8>> {
        self.records
            .get(handle.offset.to_be_bytes())
            .ok()
            .flatten()
            .map(|ivec| ivec.to_vec())
    }

    async fn truncate_before(&self, threshold_millis: i64) -> Result<(), String> {
        let stale: Vec<_> = self
            .timestamps
            .iter()
            .filter_map(Result::ok)
            .filter_map(|(k, v)| {
                let ts = i64::from_be_bytes(v.as_ref().try_into().ok()?);
                (ts < threshold_millis).then(|| k)
            })
            .collect();
        for key in stale {
            self.records.remove(&key).map_err(|e| e.to_string())?;
            self.timestamps.remove(&key).map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

/// In-memory [`WalStore`] used by tests that don't need a real `sled` file.
#[derive(Debug, Default)]
pub struct InMemoryWalStore {
    records: dashmap::DashMap<u64, (Vec<u8>, i64)>,
    next_offset: std::sync::atomic::AtomicU64,
}

impl InMemoryWalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalStore for InMemoryWalStore {
    async fn append(&self, bytes: &[u8]) -> Result<WalRecordHandle, String> {
        let offset = self
            .next_offset
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.records.insert(offset, (bytes.to_vec(), now_millis()));
        Ok(WalRecordHandle {
            segment: 0,
            offset,
            length: bytes.len() as u64,
        })
    }

    async fn read(&self, handle: &WalRecordHandle) -> Option<Vec<u8>> {
        self.records.get(&handle.offset).map(|entry| entry.0.clone())
    }

    async fn truncate_before(&self, threshold_millis: i64) -> Result<(), String> {
        self.records.retain(|_, (_, ts)| *ts >= threshold_millis);
        Ok(())
    }
}

/// A [`WalStore`] that always fails `append`, used to exercise
/// `StoreUnavailable` propagation in tests (spec §8, invariant 6).
#[derive(Debug, Default)]
pub struct FailingWalStore;

#[async_trait]
impl WalStore for FailingWalStore {
    async fn append(&self, _bytes: &[u8]) -> Result<WalRecordHandle, String> {
        Err("wal append unavailable".to_string())
    }

    async fn read(&self, _handle: &WalRecordHandle) -> Option<Vec<u8>> {
        None
    }

    async fn truncate_before(&self, _threshold_millis: i64) -> Result<(), String> {
        Ok(())
    }
}
