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

fn tracker_with_stream_zero() -> Arc<ReceiverTracker> {
    let input_streams = vec![InputStreamSpec {
        stream_id: 0,
        make_receiver: Arc::new(|| Arc::new(NoopReceiver)),
        preferred_host: None,
    }];
    ReceiverTracker::new(
        input_streams,
        ReceiverTrackerConfig::default(),
        Arc::new(LocalTaskLauncher),
        rstream::listener::ListenerBus::default(),
    )
    .unwrap()
}

fn direct_info(stream_id: u32, sequence: u64) -> ReceivedBlockInfo {
    ReceivedBlockInfo {
        stream_id,
        num_records: 1,
        store_result: BlockStoreResult::Direct {
            block_id: BlockId { stream_id, sequence },
            storage_level: StorageLevel::default(),
        },
    }
}

/// Scenario 1: single stream, two batches — everything reported before the
/// first `allocateBlocksToBatch` lands in that batch; the next one is empty.
#[tokio::test]
async fn single_stream_two_batches_through_tracker_api() {
    let tracker = tracker_with_stream_zero();

    assert!(tracker.handle_add_block(AddBlock { info: direct_info(0, 0) }));
    assert!(tracker.handle_add_block(AddBlock { info: direct_info(0, 1) }));
    assert!(tracker.handle_add_block(AddBlock { info: direct_info(0, 2) }));

    tracker.allocate_blocks_to_batch(100).unwrap();
    tracker.allocate_blocks_to_batch(200).unwrap();

    let batch_100 = tracker.get_blocks_of_batch(100);
    let batch_200 = tracker.get_blocks_of_batch(200);
    assert_eq!(batch_100.get(&0).unwrap().len(), 3);
    assert!(batch_200.get(&0).unwrap().is_empty());

    // Invariant 1: a block visible in batch 100 for stream 0 is absent from
    // batch 200 for the same stream.
    let ids_100: Vec<_> = batch_100.get(&0).unwrap().iter().map(|b| b.block_id()).collect();
    let ids_200: Vec<_> = batch_200.get(&0).unwrap().iter().map(|b| b.block_id()).collect();
    assert!(ids_100.iter().all(|id| !ids_200.contains(id)));

    // Invariant 2: order within the batch equals addBlock order.
    let sequences: Vec<_> = batch_100.get(&0).unwrap().iter().map(|b| b.block_id().sequence).collect();
    assert_eq!(sequences, vec![0, 1, 2]);
}

/// Scenario 2: interleaved allocation — a block added between two
/// allocations lands only in the later one.
#[tokio::test]
async fn interleaved_allocation_through_tracker_api() {
    let tracker = tracker_with_stream_zero();

    tracker.handle_add_block(AddBlock { info: direct_info(0, 0) });
    tracker.handle_add_block(AddBlock { info: direct_info(0, 1) });
    tracker.handle_add_block(AddBlock { info: direct_info(0, 2) });
    tracker.allocate_blocks_to_batch(100).unwrap();
    tracker.allocate_blocks_to_batch(200).unwrap();

    tracker.handle_add_block(AddBlock { info: direct_info(0, 3) });
    tracker.allocate_blocks_to_batch(300).unwrap();

    assert_eq!(tracker.get_blocks_of_batch(300).get(&0).unwrap().len(), 1);
    assert!(!tracker.has_unallocated_blocks());
}

/// Scenario 5: duplicate allocation at the same batch time is a no-op, and
/// a block added in between stays unallocated.
#[tokio::test]
async fn duplicate_allocation_is_a_noop_through_tracker_api() {
    let tracker = tracker_with_stream_zero();

    tracker.handle_add_block(AddBlock { info: direct_info(0, 0) });
    tracker.allocate_blocks_to_batch(100).unwrap();
    let first = tracker.get_blocks_of_batch(100);

    tracker.handle_add_block(AddBlock { info: direct_info(0, 1) });
    tracker.allocate_blocks_to_batch(100).unwrap();
    let second = tracker.get_blocks_of_batch(100);

    assert_eq!(first, second);
    assert!(tracker.has_unallocated_blocks());
}

/// Invariant 5: cleanup removes every batch strictly older than the
/// threshold and leaves newer ones intact.
#[tokio::test]
async fn cleanup_removes_only_old_batches() {
    let tracker = tracker_with_stream_zero();

    tracker.handle_add_block(AddBlock { info: direct_info(0, 0) });
    tracker.allocate_blocks_to_batch(100).unwrap();
    tracker.handle_add_block(AddBlock { info: direct_info(0, 1) });
    tracker.allocate_blocks_to_batch(200).unwrap();

    tracker.cleanup_old_blocks_and_batches(150).unwrap();

    assert!(tracker.get_blocks_of_batch(100).is_empty());
    assert!(!tracker.get_blocks_of_batch(200).is_empty());
}
