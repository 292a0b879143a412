//! The cluster-wide block store is explicitly out of scope for this crate
//! (spec §1): it is a key→bytes map with replication, owned by the rest of
//! the streaming engine. [`BlockStore`] is the opaque interface the block
//! handlers (`crate::block`) depend on, plus an in-process reference
//! implementation used by tests and the demo binaries.

use async_trait::async_trait;

use crate::model::{BlockId, StorageLevel};

/// Cluster-wide key→bytes block store, referenced only through this trait.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Inserts `bytes` under `block_id` at the requested storage level.
    /// Returns `Err` if the requested replication cannot be satisfied.
    async fn put(&self, block_id: BlockId, bytes: Vec<u8>, level: StorageLevel) -> Result<(), String>;

    /// Fetches a previously stored block's bytes, if still present.
    async fn get(&self, block_id: BlockId) -> Option<Vec<u8>>;

    /// Removes a block. Best-effort; the block store is free to expire
    /// blocks independently of this call.
    async fn remove(&self, block_id: BlockId);
}

/// In-process [`BlockStore`] used by tests and single-node demos. Not
/// replicated; `put` always succeeds.
#[derive(Debug, Default)]
pub struct InMemoryBlockStore {
    blocks: dashmap::DashMap<BlockId, Vec<u8>>,
}

impl InMemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlockStore for InMemoryBlockStore {
    async fn put(&self, block_id: BlockId, bytes: Vec<u8>, _level: StorageLevel) -> Result<(), String> {
        self.blocks.insert(block_id, bytes);
        Ok(())
    }

    async fn get(&self, block_id: BlockId) -> Option<Vec<u8>> {
        self.blocks.get(&block_id).map(|entry| entry.value().clone())
    }

    async fn remove(&self, block_id: BlockId) {
        self.blocks.remove(&block_id);
    }
}

/// A [`BlockStore`] that always fails `put`, used to exercise
/// `StoreUnavailable` propagation in tests (spec §8, invariant 6).
#[derive(Debug, Default)]
pub struct FailingBlockStore;

#[async_trait]
impl BlockStore for FailingBlockStore {
    async fn put(&self, _block_id: BlockId, _bytes: Vec<u8>, _level: StorageLevel) -> Result<(), String> {
        Err("block store replication unavailable".to_string())
    }

    async fn get(&self, _block_id: BlockId) -> Option<Vec<u8>> {
        None
    }

    async fn remove(&self, _block_id: BlockId) {}
}
