//! Receiver launch placement (spec §4.E `startReceivers`): resolving a
//! `Receiver` factory per stream to a worker task via an opaque
//! `TaskLauncher`, the crate's stand-in for the cluster scheduler.

use std::sync::Arc;

use async_trait::async_trait;

use crate::model::StreamId;
use crate::receiver::Receiver;

/// One scheduled unit of work: run `receiver` (already stamped with its
/// `stream_id`) to completion, optionally pinned to `preferred_host`.
pub struct ReceiverTask {
    pub stream_id: StreamId,
    pub receiver: Arc<dyn Receiver>,
    pub preferred_host: Option<String>,
}

/// Opaque scheduler interface (spec §1 Non-goal: the cluster scheduler
/// itself is out of scope). A real binding would submit `tasks` to a
/// cluster and invoke `run_receiver` once per task on the chosen
/// executor; this crate ships only an in-process implementation for tests
/// and single-node demos.
#[async_trait]
pub trait TaskLauncher: Send + Sync {
    /// Runs every task to completion, invoking `run_receiver` for each.
    /// Returns once all tasks have been submitted — in-process
    /// implementations may run them to full completion inline, cluster
    /// implementations would return once jobs are accepted.
    async fn run_job(
        &self,
        tasks: Vec<ReceiverTask>,
        run_receiver: Arc<dyn Fn(ReceiverTask) -> tokio::task::JoinHandle<()> + Send + Sync>,
    );
}

/// Runs every receiver as an in-process tokio task on the current node.
/// There is only ever one "executor" so the warm-up dummy job and
/// preferred-host placement logic of spec §4.E are no-ops here: every
/// task already runs locally (spec §9's documented fast path for
/// launchers that have nothing to warm up).
#[derive(Default)]
pub struct LocalTaskLauncher;

#[async_trait]
impl TaskLauncher for LocalTaskLauncher {
    async fn run_job(
        &self,
        tasks: Vec<ReceiverTask>,
        run_receiver: Arc<dyn Fn(ReceiverTask) -> tokio::task::JoinHandle<()> + Send + Sync>,
    ) {
        let mut handles = Vec::with_capacity(tasks.len());
        for task in tasks {
            handles.push(run_receiver(task));
        }
        // Detach: a real TaskLauncher returns once jobs are accepted by
        // the cluster, not once they finish running.
        for handle in handles {
            drop(handle);
        }
    }
}
