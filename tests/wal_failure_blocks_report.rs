use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eyre::Result;

use rstream::block::{BlockGeneratorConfig, WalBlockHandler};
use rstream::errors::SupervisorError;
use rstream::model::{BlockId, ReceivedBlockInfo, StreamId};
use rstream::receiver::{Receiver, SupervisorHandle};
use rstream::rpc::TrackerRpc;
use rstream::store::InMemoryBlockStore;
use rstream::supervisor::{ReceiverSupervisor, SupervisorConfig};
use rstream::wal::FailingWalStore;

struct NoopReceiver;

#[async_trait]
impl Receiver for NoopReceiver {
    fn name(&self) -> String {
        "noop".to_string()
    }
    async fn on_start(&self, _handle: Arc<dyn SupervisorHandle>) {}
    async fn on_stop(&self) {}
}

/// A [`TrackerRpc`] double whose only job is to count how many times
/// `add_block` is invoked, so the test can assert it is never called.
#[derive(Default)]
struct CountingTrackerRpc {
    add_block_calls: AtomicUsize,
}

#[async_trait]
impl TrackerRpc for CountingTrackerRpc {
    async fn register_receiver(
        &self,
        _stream_id: StreamId,
        _type_name: &str,
        _host: &str,
        _endpoint: &str,
    ) -> Result<bool> {
        Ok(true)
    }

    async fn add_block(&self, _info: ReceivedBlockInfo) -> Result<bool> {
        self.add_block_calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn report_error(&self, _stream_id: StreamId, _message: &str, _error: &str) -> Result<()> {
        Ok(())
    }

    async fn deregister_receiver(&self, _stream_id: StreamId, _message: &str, _error: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Invariant 6: with WAL enabled, `storeBlock` returns only after both the
/// WAL append and the block-store insert complete; a WAL failure must fail
/// the call and must not let an `AddBlock` RPC through.
#[tokio::test]
async fn wal_failure_prevents_store_and_report() {
    let handler = Arc::new(WalBlockHandler::new(
        Arc::new(InMemoryBlockStore::new()),
        Arc::new(FailingWalStore),
    ));
    let tracker_rpc = Arc::new(CountingTrackerRpc::default());

    let supervisor = Arc::new(ReceiverSupervisor::new(
        SupervisorConfig {
            stream_id: 0,
            host: "worker-a".to_string(),
            endpoint: "127.0.0.1:0".to_string(),
            coordinator_addr: "127.0.0.1:0".to_string(),
            ask_timeout: Duration::from_millis(500),
            block_generator: BlockGeneratorConfig::default(),
        },
        Arc::new(NoopReceiver),
        handler,
        tracker_rpc.clone(),
    ));

    supervisor.start().await.unwrap();

    let result = supervisor
        .push_array_buffer(vec![b"a".to_vec()], Some(BlockId { stream_id: 0, sequence: 0 }))
        .await;

    // push_array_buffer's internal store_block failure is surfaced to the
    // caller as a SupervisorError; no AddBlock RPC should ever fire.
    assert!(matches!(result, Err(SupervisorError::StoreUnavailable(_))));
    assert_eq!(tracker_rpc.add_block_calls.load(Ordering::SeqCst), 0);
}
