use std::sync::Arc;

use async_trait::async_trait;

use rstream::model::{BlockId, BlockStoreResult, ReceivedBlockInfo, StorageLevel};
use rstream::receiver::{Receiver, SupervisorHandle};
use rstream::rpc::messages::AddBlock;
use rstream::tracker::{InputStreamSpec, LocalTaskLauncher, ReceiverTracker, ReceiverTrackerConfig};

struct NoopReceiver;

#[async_trait]
impl Receiver for NoopReceiver {
    fn name(&self) -> String {
        "noop".to_string()
    }
    async fn on_start(&self, _handle: Arc<dyn SupervisorHandle>) {}
    async fn on_stop(&self) {}
}

fn info(sequence: u64) -> ReceivedBlockInfo {
    ReceivedBlockInfo {
        stream_id: 0,
        num_records: 1,
        store_result: BlockStoreResult::Direct {
            block_id: BlockId { stream_id: 0, sequence },
            storage_level: StorageLevel::default(),
        },
    }
}

/// Invariant 4: lastAllocatedBatchTime, observed externally through the
/// `LAST_ALLOCATED_BATCH_TIME` gauge, is monotone non-decreasing across
/// successful allocations. Kept in its own test binary since the gauge is a
/// process-wide `lazy_static`, shared by every test that runs in the same
/// process.
#[tokio::test]
async fn last_allocated_batch_time_metric_is_monotone() {
    let input_streams = vec![InputStreamSpec {
        stream_id: 0,
        make_receiver: Arc::new(|| Arc::new(NoopReceiver)),
        preferred_host: None,
    }];
    let tracker = ReceiverTracker::new(
        input_streams,
        ReceiverTrackerConfig::default(),
        Arc::new(LocalTaskLauncher),
        rstream::listener::ListenerBus::default(),
    )
    .unwrap();

    tracker.handle_add_block(AddBlock { info: info(0) });
    tracker.allocate_blocks_to_batch(100).unwrap();
    assert_eq!(rstream::telemetry::metrics::LAST_ALLOCATED_BATCH_TIME.get(), 100);

    tracker.handle_add_block(AddBlock { info: info(1) });
    tracker.allocate_blocks_to_batch(200).unwrap();
    assert_eq!(rstream::telemetry::metrics::LAST_ALLOCATED_BATCH_TIME.get(), 200);

    // A non-monotonic allocation is a no-op and must not regress the gauge.
    tracker.allocate_blocks_to_batch(150).unwrap();
    assert_eq!(rstream::telemetry::metrics::LAST_ALLOCATED_BATCH_TIME.get(), 200);
}
