//! The data model shared by the coordinator and supervisor: stream and
//! block identifiers, the tagged block variants a [`Receiver`] can hand to
//! its supervisor, the locator a [`ReceivedBlockHandler`] hands back, and
//! the records the tracker's event log is built out of.
//!
//! [`Receiver`]: crate::receiver::Receiver
//! [`ReceivedBlockHandler`]: crate::block::ReceivedBlockHandler

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Dense non-negative integer identifying an input stream. The set of valid
/// ids is fixed when the coordinator's [`ReceiverTracker`] starts.
///
/// [`ReceiverTracker`]: crate::tracker::ReceiverTracker
pub type StreamId = u32;

/// Logical timestamp marking a micro-batch boundary; monotone increasing.
pub type BatchTime = i64;

/// Opaque identifier unique within a worker process: a stream id paired
/// with a monotonically increasing per-stream sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId {
    pub stream_id: StreamId,
    pub sequence: u64,
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "input-{}-{}", self.stream_id, self.sequence)
    }
}

/// Per-stream monotonic counter handing out the sequence half of a
/// [`BlockId`] when the caller does not supply one of its own.
#[derive(Debug, Default)]
pub struct BlockIdCounter(AtomicU64);

impl BlockIdCounter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Returns the next block id for `stream_id`, advancing the counter.
    pub fn next(&self, stream_id: StreamId) -> BlockId {
        let sequence = self.0.fetch_add(1, Ordering::Relaxed);
        BlockId { stream_id, sequence }
    }
}

/// A chunk of ingested data handed from a [`Receiver`] to its supervisor.
/// Only [`ReceivedBlock::ArrayBuffer`] can report a record count; the other
/// variants report `-1` (unknown), matching opaque iterator/byte sources.
///
/// [`Receiver`]: crate::receiver::Receiver
#[derive(Debug, Clone)]
pub enum ReceivedBlock {
    /// Records already materialized in memory.
    ArrayBuffer(Vec<Vec<u8>>),
    /// An opaque, already-consumed iterator's worth of records, serialized.
    Iterator(Vec<u8>),
    /// A raw byte buffer (e.g. pre-serialized by the receiver itself).
    ByteBuffer(bytes::Bytes),
}

impl ReceivedBlock {
    /// Number of records, or `-1` if the block does not expose a count.
    pub fn num_records(&self) -> i64 {
        match self {
            ReceivedBlock::ArrayBuffer(records) => records.len() as i64,
            ReceivedBlock::Iterator(_) | ReceivedBlock::ByteBuffer(_) => -1,
        }
    }

    /// Serializes the block to bytes for storage, independent of storage
    /// path (direct or WAL). Array buffers are framed with `rmp-serde`;
    /// the other two variants are already byte-shaped.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            ReceivedBlock::ArrayBuffer(records) => {
                rmp_serde::to_vec(records).expect("record buffer is always serializable")
            }
            ReceivedBlock::Iterator(bytes) => bytes.clone(),
            ReceivedBlock::ByteBuffer(bytes) => bytes.to_vec(),
        }
    }
}

/// Replication durability requested for a stored block. Mirrors the
/// "storage level" concept of the block store without depending on its
/// concrete implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLevel {
    pub replication: u8,
}

impl StorageLevel {
    pub const MEMORY_ONLY: StorageLevel = StorageLevel { replication: 1 };

    pub fn replicated(factor: u8) -> Self {
        StorageLevel { replication: factor.max(1) }
    }
}

impl Default for StorageLevel {
    fn default() -> Self {
        Self::MEMORY_ONLY
    }
}

/// Opaque handle into the write-ahead log sufficient to rehydrate a block's
/// bytes after the worker that wrote it is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalRecordHandle {
    pub segment: u64,
    pub offset: u64,
    pub length: u64,
}

/// The locator a [`ReceivedBlockHandler`] returns once a block is durable.
///
/// [`ReceivedBlockHandler`]: crate::block::ReceivedBlockHandler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockStoreResult {
    /// Stored only in the cluster block store.
    Direct { block_id: BlockId, storage_level: StorageLevel },
    /// Stored in the block store and appended to the write-ahead log; the
    /// WAL handle alone is enough to recover the block's bytes.
    Wal {
        block_id: BlockId,
        storage_level: StorageLevel,
        wal_record_handle: WalRecordHandle,
    },
}

impl BlockStoreResult {
    pub fn block_id(&self) -> BlockId {
        match self {
            BlockStoreResult::Direct { block_id, .. } => *block_id,
            BlockStoreResult::Wal { block_id, .. } => *block_id,
        }
    }
}

/// Immutable unit of the tracker's log: a block reported by a stream, with
/// its locator. `num_records` is `-1` when unknown (see
/// [`ReceivedBlock::num_records`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedBlockInfo {
    pub stream_id: StreamId,
    pub num_records: i64,
    pub store_result: BlockStoreResult,
}

impl ReceivedBlockInfo {
    pub fn block_id(&self) -> BlockId {
        self.store_result.block_id()
    }
}

/// Mutable bookkeeping record for one receiver instance, living for the
/// life of that instance. `endpoint = None && !active` means the receiver
/// deregistered but its info is retained for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverInfo {
    pub stream_id: StreamId,
    pub name: String,
    pub endpoint: Option<String>,
    pub active: bool,
    pub host: String,
    pub last_error_message: String,
    pub last_error: Option<String>,
    /// Logical registration counter, used only for listener/log ordering.
    pub registered_at: u64,
}

impl ReceiverInfo {
    pub fn new(stream_id: StreamId, name: String, host: String, endpoint: String, registered_at: u64) -> Self {
        Self {
            stream_id,
            name,
            endpoint: Some(endpoint),
            active: true,
            host,
            last_error_message: String::new(),
            last_error: None,
            registered_at,
        }
    }

    /// Marks this receiver inactive and clears its endpoint, as happens on
    /// deregistration or supervisor death detection.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.endpoint = None;
    }
}

/// Tagged write-ahead-log record for the tracker's own event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrackerEvent {
    BlockAdded(ReceivedBlockInfo),
    BatchAllocated(BatchTime, HashMap<StreamId, Vec<ReceivedBlockInfo>>),
    BatchCleanedUp(BatchTime),
}
