//! Persists a cut block either directly to the cluster block store or, when
//! durability is requested, to the block store and the write-ahead log
//! concurrently (spec §4.B).

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::{SupervisorError, SupervisorResult};
use crate::model::{BlockId, BlockStoreResult, StorageLevel};
use crate::store::BlockStore;
use crate::wal::WalStore;

/// Turns raw block bytes into a durable, locatable [`BlockStoreResult`].
#[async_trait]
pub trait ReceivedBlockHandler: Send + Sync {
    async fn store_block(
        &self,
        block_id: BlockId,
        bytes: Vec<u8>,
        storage_level: StorageLevel,
    ) -> SupervisorResult<BlockStoreResult>;

    /// Best-effort cleanup of blocks older than `thresh_millis` (spec
    /// §4.B): a no-op for direct storage (the block store expires
    /// independently), a WAL truncation for the WAL-backed handler.
    async fn cleanup_old_blocks(&self, thresh_millis: i64);
}

/// Stores only in the cluster block store; used when the stream's
/// checkpoint/WAL durability is not requested.
pub struct DirectBlockHandler {
    block_store: Arc<dyn BlockStore>,
}

impl DirectBlockHandler {
    pub fn new(block_store: Arc<dyn BlockStore>) -> Self {
        Self { block_store }
    }
}

#[async_trait]
impl ReceivedBlockHandler for DirectBlockHandler {
    async fn store_block(
        &self,
        block_id: BlockId,
        bytes: Vec<u8>,
        storage_level: StorageLevel,
    ) -> SupervisorResult<BlockStoreResult> {
        self.block_store
            .put(block_id, bytes, storage_level)
            .await
            .map_err(SupervisorError::StoreUnavailable)?;
        Ok(BlockStoreResult::Direct { block_id, storage_level })
    }

    async fn cleanup_old_blocks(&self, _thresh_millis: i64) {}
}

/// Stores in the cluster block store and appends to the write-ahead log
/// concurrently, failing if either side fails (spec §4.B: "both writes must
/// succeed before the block is reported").
pub struct WalBlockHandler {
    block_store: Arc<dyn BlockStore>,
    wal_store: Arc<dyn WalStore>,
}

impl WalBlockHandler {
    pub fn new(block_store: Arc<dyn BlockStore>, wal_store: Arc<dyn WalStore>) -> Self {
        Self { block_store, wal_store }
    }
}

#[async_trait]
impl ReceivedBlockHandler for WalBlockHandler {
    async fn store_block(
        &self,
        block_id: BlockId,
        bytes: Vec<u8>,
        storage_level: StorageLevel,
    ) -> SupervisorResult<BlockStoreResult> {
        let put = self.block_store.put(block_id, bytes.clone(), storage_level);
        let append = self.wal_store.append(&bytes);

        let (put_result, append_result) = tokio::join!(put, append);
        put_result.map_err(SupervisorError::StoreUnavailable)?;
        let wal_record_handle = append_result.map_err(SupervisorError::StoreUnavailable)?;

        Ok(BlockStoreResult::Wal {
            block_id,
            storage_level,
            wal_record_handle,
        })
    }

    async fn cleanup_old_blocks(&self, thresh_millis: i64) {
        if let Err(e) = self.wal_store.truncate_before(thresh_millis).await {
            tracing::warn!(error = %e, "wal truncation failed during cleanup");
        }
    }
}
