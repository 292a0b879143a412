//! The [`Receiver`] trait is the user-supplied glue between an external
//! data source and a [`ReceiverSupervisor`](crate::supervisor::ReceiverSupervisor):
//! everything about how bytes are pulled from the outside world is left to
//! the implementer (spec §1, §4.C).

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::SupervisorResult;
use crate::model::{BlockId, StorageLevel};

/// The operations spec §4.C exposes to `Receiver` code: everything a
/// running receiver needs to hand data back to its supervisor without
/// depending on the supervisor's own type.
#[async_trait]
pub trait SupervisorHandle: Send + Sync {
    /// Enqueues `record` into the block generator (`pushSingle`).
    async fn push_single(&self, record: Vec<u8>) -> SupervisorResult<()>;

    /// Bypasses the generator for a pre-batched collection of records
    /// (`pushArrayBuffer`).
    async fn push_array_buffer(&self, records: Vec<Vec<u8>>, block_id: Option<BlockId>) -> SupervisorResult<()>;

    /// Bypasses the generator for a pre-serialized iterator block
    /// (`pushIterator`).
    async fn push_iterator(&self, serialized: Vec<u8>, block_id: Option<BlockId>) -> SupervisorResult<()>;

    /// Bypasses the generator for a raw byte block (`pushBytes`).
    async fn push_bytes(&self, bytes: bytes::Bytes, block_id: Option<BlockId>) -> SupervisorResult<()>;

    /// Forwards an error to the tracker without stopping (`reportError`).
    async fn report_error(&self, message: String, error: Option<String>);

    /// Initiates orderly shutdown of the owning supervisor (`stop`).
    async fn stop(&self, message: String, error: Option<String>);
}

/// Implemented by application code to pull records from an external source
/// and hand them to the supervisor that owns this receiver's lifecycle.
///
/// `on_start`/`on_stop` are driven by the supervisor; the receiver reports
/// data back through the [`SupervisorHandle`] it is given in `on_start`,
/// not through return values of this trait, since ingestion is
/// push-driven and open-ended.
#[async_trait]
pub trait Receiver: Send + Sync {
    /// The storage durability this receiver's blocks should be persisted
    /// with.
    fn storage_level(&self) -> StorageLevel {
        StorageLevel::default()
    }

    /// A short human-readable name, used in `ReceiverInfo` and logs.
    fn name(&self) -> String;

    /// Called once when the supervisor is ready to accept data. Typical
    /// implementations spawn their own background task here that calls
    /// back into `handle` as data arrives, and return once that task is
    /// underway.
    async fn on_start(&self, handle: Arc<dyn SupervisorHandle>);

    /// Called once when the supervisor is stopping, either on request or
    /// because of an unrecoverable error. Implementations should stop
    /// pulling from the external source and release any resources.
    async fn on_stop(&self);
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// A `Receiver` double that records whether it was started/stopped and
    /// retains its handle for tests that want to push data through it,
    /// used by supervisor lifecycle tests.
    #[derive(Default)]
    pub struct RecordingReceiver {
        pub started: AtomicBool,
        pub stopped: AtomicBool,
        pub handle: parking_lot::Mutex<Option<Arc<dyn SupervisorHandle>>>,
    }

    #[async_trait]
    impl Receiver for RecordingReceiver {
        fn name(&self) -> String {
            "recording-receiver".to_string()
        }

        async fn on_start(&self, handle: Arc<dyn SupervisorHandle>) {
            *self.handle.lock() = Some(handle);
            self.started.store(true, Ordering::SeqCst);
        }

        async fn on_stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }
}
