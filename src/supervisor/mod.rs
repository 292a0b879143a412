//! `ReceiverSupervisor` (spec §4.C): worker-side host of one `Receiver`,
//! owner of its `BlockGenerator` and `ReceivedBlockHandler`, driving the
//! store-and-report protocol and consuming coordinator commands.
//!
//! The `async fn run(&mut self)` loop is grounded in
//! `driver::node_driver::NodeDriver::start`'s "check shutdown, advance"
//! shape, generalized to `tokio::select!` over three event sources instead
//! of one polling loop, since the supervisor has pushed blocks, inbound
//! commands, and a shutdown signal to react to independently.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};

use crate::block::{
    BlockGenerator, BlockGeneratorConfig, BlockGeneratorListener, GeneratedBlock, ReceivedBlockHandler,
};
use crate::errors::{SupervisorError, SupervisorResult};
use crate::model::{BlockId, ReceivedBlock, ReceivedBlockInfo, StreamId};
use crate::receiver::{Receiver, SupervisorHandle};
use crate::rpc::client::TrackerRpc;
use crate::telemetry::metrics;

/// Lifecycle states of a [`ReceiverSupervisor`] (spec §4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Initialized,
    Started,
    ReceiverStarted,
    Stopping,
    Stopped,
}

/// Commands the coordinator can push to a running supervisor (spec §4.C
/// command endpoint, spec §6 `StopReceiver`/`CleanupOldBlocks`).
#[derive(Debug, Clone)]
pub enum SupervisorCommand {
    Stop,
    CleanupOldBlocks(i64),
}

/// Tunables for one supervisor instance (spec §6).
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub stream_id: StreamId,
    pub host: String,
    pub endpoint: String,
    pub coordinator_addr: String,
    pub ask_timeout: Duration,
    pub block_generator: BlockGeneratorConfig,
}

/// Bridges [`BlockGenerator`] callbacks into the supervisor's
/// store-and-report algorithm by forwarding pushed blocks over a channel
/// the supervisor's `run` loop selects on.
struct GeneratorBridge {
    pushed: mpsc::Sender<GeneratedBlock>,
}

#[async_trait::async_trait]
impl BlockGeneratorListener for GeneratorBridge {
    async fn on_generate_block(&self, block_id: BlockId) {
        tracing::debug!(%block_id, "cut a new block");
    }

    async fn on_push_block(&self, block: GeneratedBlock) {
        if self.pushed.send(block).await.is_err() {
            tracing::warn!("generator bridge channel closed; dropping pushed block");
        }
    }

    async fn on_error(&self, message: String) {
        tracing::error!(message, "block generator reported an error");
    }
}

/// Worker-side host of one receiver.
pub struct ReceiverSupervisor {
    config: SupervisorConfig,
    receiver: Arc<dyn Receiver>,
    handler: Arc<dyn ReceivedBlockHandler>,
    tracker_client: Arc<dyn TrackerRpc>,
    generator: Mutex<BlockGenerator>,
    pushed_blocks: Mutex<mpsc::Receiver<GeneratedBlock>>,
    commands_tx: mpsc::Sender<SupervisorCommand>,
    commands_rx: Mutex<mpsc::Receiver<SupervisorCommand>>,
    shutdown_tx: watch::Sender<bool>,
    state: Mutex<SupervisorState>,
    block_sequence: AtomicU64,
    last_reported_error_at: AtomicI64,
}

impl ReceiverSupervisor {
    pub fn new(
        config: SupervisorConfig,
        receiver: Arc<dyn Receiver>,
        handler: Arc<dyn ReceivedBlockHandler>,
        tracker_client: Arc<dyn TrackerRpc>,
    ) -> Self {
        let (pushed_tx, pushed_rx) = mpsc::channel(config.block_generator.block_queue_size);
        let bridge = Arc::new(GeneratorBridge { pushed: pushed_tx });
        let generator = BlockGenerator::new(config.stream_id, config.block_generator, bridge);
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);

        Self {
            config,
            receiver,
            handler,
            tracker_client,
            generator: Mutex::new(generator),
            pushed_blocks: Mutex::new(pushed_rx),
            commands_tx,
            commands_rx: Mutex::new(commands_rx),
            shutdown_tx,
            state: Mutex::new(SupervisorState::Initialized),
            block_sequence: AtomicU64::new(0),
            last_reported_error_at: AtomicI64::new(0),
        }
    }

    /// A clonable sender the supervisor's RPC command endpoint forwards
    /// inbound `StopReceiver`/`CleanupOldBlocks` onto.
    pub fn command_sender(&self) -> mpsc::Sender<SupervisorCommand> {
        self.commands_tx.clone()
    }

    async fn transition(&self, next: SupervisorState) {
        *self.state.lock().await = next;
    }

    pub async fn state(&self) -> SupervisorState {
        *self.state.lock().await
    }

    /// `Initialized -> Started -> ReceiverStarted`: starts the block
    /// generator, the user receiver, and registers with the coordinator.
    pub async fn start(self: &Arc<Self>) -> SupervisorResult<()> {
        {
            let state = self.state.lock().await;
            if *state != SupervisorState::Initialized {
                return Err(SupervisorError::AlreadyStarted);
            }
        }
        self.transition(SupervisorState::Started).await;

        self.generator.lock().await.start().await?;
        let handle: Arc<dyn SupervisorHandle> = self.clone();
        self.receiver.on_start(handle).await;

        let registered = self
            .tracker_client
            .register_receiver(
                self.config.stream_id,
                &self.receiver.name(),
                &self.config.host,
                &self.config.endpoint,
            )
            .await
            .unwrap_or(false);
        if !registered {
            return Err(SupervisorError::TrackerUnavailable(
                "registration rejected or unreachable".to_string(),
            ));
        }

        self.transition(SupervisorState::ReceiverStarted).await;
        Ok(())
    }

    /// Enqueues `record` into the block generator (spec §4.C `pushSingle`).
    pub async fn push_single(&self, record: Vec<u8>) -> SupervisorResult<()> {
        self.generator.lock().await.add_data(record).await
    }

    /// Bypasses the generator for pre-batched input (spec §4.C
    /// `pushArrayBuffer`/`pushIterator`/`pushBytes`), running the same
    /// store-and-report algorithm directly.
    pub async fn push_array_buffer(
        &self,
        records: Vec<Vec<u8>>,
        block_id: Option<BlockId>,
    ) -> SupervisorResult<()> {
        self.push_and_report_block(ReceivedBlock::ArrayBuffer(records), block_id).await
    }

    pub async fn push_iterator(&self, serialized: Vec<u8>, block_id: Option<BlockId>) -> SupervisorResult<()> {
        self.push_and_report_block(ReceivedBlock::Iterator(serialized), block_id).await
    }

    pub async fn push_bytes(&self, bytes: bytes::Bytes, block_id: Option<BlockId>) -> SupervisorResult<()> {
        self.push_and_report_block(ReceivedBlock::ByteBuffer(bytes), block_id).await
    }

    fn next_block_id(&self) -> BlockId {
        let sequence = self.block_sequence.fetch_add(1, Ordering::Relaxed);
        BlockId { stream_id: self.config.stream_id, sequence }
    }

    /// Central algorithm (spec §4.C): resolve the block id, store
    /// synchronously, then report over RPC within `ask_timeout`. A report
    /// timeout is escalated to `report_error` and swallowed — the block
    /// stays stored but unreported.
    async fn push_and_report_block(&self, block: ReceivedBlock, block_id: Option<BlockId>) -> SupervisorResult<()> {
        let block_id = block_id.unwrap_or_else(|| self.next_block_id());
        let num_records = block.num_records();
        let storage_level = self.receiver.storage_level();

        let store_result = self
            .handler
            .store_block(block_id, block.to_bytes(), storage_level)
            .await?;

        let info = ReceivedBlockInfo { stream_id: self.config.stream_id, num_records, store_result };

        match tokio::time::timeout(self.config.ask_timeout, self.tracker_client.add_block(info)).await {
            Ok(Ok(true)) => {
                metrics::BLOCKS_REPORTED.inc();
            }
            Ok(Ok(false)) => {
                metrics::BLOCKS_UNREPORTED.inc();
                self.report_error("tracker rejected AddBlock".to_string(), None).await;
            }
            Ok(Err(e)) => {
                metrics::BLOCKS_UNREPORTED.inc();
                self.report_error(format!("AddBlock RPC failed: {e}"), None).await;
            }
            Err(_) => {
                metrics::BLOCKS_UNREPORTED.inc();
                self.report_error("AddBlock RPC timed out".to_string(), None).await;
            }
        }
        Ok(())
    }

    /// Forwards an error to the tracker without stopping (spec §4.C
    /// `reportError`).
    pub async fn report_error(&self, message: String, error: Option<String>) {
        self.last_reported_error_at.store(now_millis(), Ordering::SeqCst);
        let _ = self
            .tracker_client
            .report_error(self.config.stream_id, &message, error.as_deref().unwrap_or(""))
            .await;
    }

    /// Drives the supervisor after `start()`: selects over pushed blocks,
    /// inbound commands, and the shutdown signal until `stop()` is
    /// called or the generator fully drains.
    pub async fn run(&self) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut pushed_blocks = self.pushed_blocks.lock().await;
        let mut commands_rx = self.commands_rx.lock().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        // `initiate_stop` already awaited `generator.stop()`
                        // to completion before signalling shutdown, so any
                        // final flushed block is already sitting in this
                        // channel: drain it before exiting, or it is lost
                        // for good (spec §4.C termination, §8 scenario 6).
                        while let Ok(block) = pushed_blocks.try_recv() {
                            if let Err(err) = self
                                .push_and_report_block(ReceivedBlock::ArrayBuffer(block.records), Some(block.block_id))
                                .await
                            {
                                self.report_error(format!("store-and-report failed: {err}"), None).await;
                            }
                        }
                        break;
                    }
                }
                Some(command) = commands_rx.recv() => {
                    match command {
                        SupervisorCommand::Stop => {
                            self.initiate_stop("Stopped by driver".to_string(), None).await;
                        }
                        SupervisorCommand::CleanupOldBlocks(thresh_millis) => {
                            self.handler.cleanup_old_blocks(thresh_millis).await;
                        }
                    }
                }
                Some(block) = pushed_blocks.recv() => {
                    if let Err(err) = self
                        .push_and_report_block(ReceivedBlock::ArrayBuffer(block.records), Some(block.block_id))
                        .await
                    {
                        self.report_error(format!("store-and-report failed: {err}"), None).await;
                    }
                }
                else => break,
            }
        }
    }

    async fn initiate_stop(&self, message: String, error: Option<String>) {
        {
            let state = self.state.lock().await;
            if *state == SupervisorState::Stopping || *state == SupervisorState::Stopped {
                return;
            }
        }
        self.transition(SupervisorState::Stopping).await;

        self.generator.lock().await.stop().await;
        self.receiver.on_stop().await;

        let _ = self
            .tracker_client
            .deregister_receiver(self.config.stream_id, &message, error.as_deref().unwrap_or(""))
            .await;

        let _ = self.shutdown_tx.send(true);
        self.transition(SupervisorState::Stopped).await;
    }

    /// Initiates orderly shutdown (spec §4.C `stop`).
    pub async fn stop(&self, message: String, error: Option<String>) {
        self.initiate_stop(message, error).await;
    }
}

#[async_trait::async_trait]
impl SupervisorHandle for ReceiverSupervisor {
    async fn push_single(&self, record: Vec<u8>) -> SupervisorResult<()> {
        ReceiverSupervisor::push_single(self, record).await
    }

    async fn push_array_buffer(&self, records: Vec<Vec<u8>>, block_id: Option<BlockId>) -> SupervisorResult<()> {
        ReceiverSupervisor::push_array_buffer(self, records, block_id).await
    }

    async fn push_iterator(&self, serialized: Vec<u8>, block_id: Option<BlockId>) -> SupervisorResult<()> {
        ReceiverSupervisor::push_iterator(self, serialized, block_id).await
    }

    async fn push_bytes(&self, bytes: bytes::Bytes, block_id: Option<BlockId>) -> SupervisorResult<()> {
        ReceiverSupervisor::push_bytes(self, bytes, block_id).await
    }

    async fn report_error(&self, message: String, error: Option<String>) {
        ReceiverSupervisor::report_error(self, message, error).await
    }

    async fn stop(&self, message: String, error: Option<String>) {
        ReceiverSupervisor::stop(self, message, error).await
    }
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}
