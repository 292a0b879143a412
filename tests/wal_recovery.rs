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

fn wal_config(checkpoint_dir: &std::path::Path) -> ReceiverTrackerConfig {
    ReceiverTrackerConfig {
        wal_enabled: true,
        checkpoint_dir: Some(checkpoint_dir.to_path_buf()),
        ..ReceiverTrackerConfig::default()
    }
}

fn input_streams() -> Vec<InputStreamSpec> {
    vec![InputStreamSpec {
        stream_id: 0,
        make_receiver: Arc::new(|| Arc::new(NoopReceiver)),
        preferred_host: None,
    }]
}

/// Scenario 3: a tracker crashes after allocating batch 100 but before
/// allocating batch 200. Restarting from the checkpoint directory and
/// replaying the remaining operations must land on the same state a single
/// uninterrupted run would have reached.
#[tokio::test]
async fn recovers_through_crash_point_via_tracker() {
    let dir = tempfile::tempdir().unwrap();

    {
        let tracker = ReceiverTracker::new(
            input_streams(),
            wal_config(dir.path()),
            Arc::new(LocalTaskLauncher),
            rstream::listener::ListenerBus::default(),
        )
        .unwrap();

        tracker.handle_add_block(AddBlock { info: info(0) });
        tracker.handle_add_block(AddBlock { info: info(1) });
        tracker.handle_add_block(AddBlock { info: info(2) });
        tracker.allocate_blocks_to_batch(100).unwrap();
        // Process "crashes" here: the tracker (and its Arc) is dropped
        // before allocating batch 200.
    }

    let tracker = ReceiverTracker::new(
        input_streams(),
        wal_config(dir.path()),
        Arc::new(LocalTaskLauncher),
        rstream::listener::ListenerBus::default(),
    )
    .unwrap();
    tracker.handle_add_block(AddBlock { info: info(3) });
    tracker.allocate_blocks_to_batch(200).unwrap();

    assert_eq!(tracker.get_blocks_of_batch(100).get(&0).unwrap().len(), 3);
    assert_eq!(tracker.get_blocks_of_batch(200).get(&0).unwrap().len(), 1);
    assert!(!tracker.has_unallocated_blocks());
}
