//! [`BlockGenerator`]: buffers individual records and cuts them into
//! blocks on a fixed interval, emitting them to a bounded handoff queue
//! (spec §4.A).
//!
//! Grounded in `l1::chain_watcher::ChainWatcher`/`InnerWatcher`: a public
//! handle type owning a `JoinHandle` that aborts its background task on
//! `Drop`, with an inner worker that owns the sending half of an
//! `mpsc::channel` and runs in its own spawned task.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::errors::{SupervisorError, SupervisorResult};
use crate::model::{BlockId, BlockIdCounter, StreamId};

/// Lifecycle states of a [`BlockGenerator`], advanced strictly in order by
/// `stop()` (spec §4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Initialized,
    Active,
    StoppedAddingData,
    StoppedGeneratingBlocks,
    StoppedAll,
}

/// A block cut from the buffer, ready to be handed to a
/// [`ReceivedBlockHandler`](crate::block::ReceivedBlockHandler).
#[derive(Debug, Clone)]
pub struct GeneratedBlock {
    pub block_id: BlockId,
    pub records: Vec<Vec<u8>>,
}

/// Callbacks driven by the generator's timer and consumer tasks. Errors
/// from these callbacks are swallowed at the call site the way the spec's
/// "best-effort fan-out" listener bus is (spec §6) — a listener is not
/// allowed to halt the pipeline.
#[async_trait]
pub trait BlockGeneratorListener: Send + Sync {
    /// Invoked on the timer task the moment a non-empty buffer is cut into
    /// a block, before it reaches the handoff queue.
    async fn on_generate_block(&self, block_id: BlockId);

    /// Invoked on the consumer task once a block is pulled off the handoff
    /// queue; this is what drives the supervisor's store-and-report path.
    async fn on_push_block(&self, block: GeneratedBlock);

    /// Invoked when the handoff queue can no longer accept blocks (e.g. the
    /// consumer side has gone away during shutdown).
    async fn on_error(&self, message: String);
}

/// Tunables for a [`BlockGenerator`] (spec §6 configuration keys
/// `receiver.blockInterval`, `receiver.blockQueueSize`).
#[derive(Debug, Clone, Copy)]
pub struct BlockGeneratorConfig {
    pub block_interval: Duration,
    pub block_queue_size: usize,
}

impl Default for BlockGeneratorConfig {
    fn default() -> Self {
        Self {
            block_interval: Duration::from_millis(200),
            block_queue_size: 10,
        }
    }
}

/// Cuts a record stream into fixed-interval blocks and hands them to a
/// listener over a bounded handoff queue.
pub struct BlockGenerator {
    stream_id: StreamId,
    state: Arc<Mutex<GeneratorState>>,
    buffer: Arc<Mutex<Vec<Vec<u8>>>>,
    block_ids: Arc<BlockIdCounter>,
    listener: Arc<dyn BlockGeneratorListener>,
    /// A sender handle kept only for `stop()`'s final partial-buffer flush;
    /// dropped (set to `None`) once used so the consumer task's queue
    /// closes and its `recv()` loop can terminate.
    block_tx: Option<mpsc::Sender<GeneratedBlock>>,
    shutdown_tx: watch::Sender<bool>,
    timer_handle: Option<JoinHandle<()>>,
    consumer_handle: Option<JoinHandle<()>>,
}

impl Drop for BlockGenerator {
    fn drop(&mut self) {
        if let Some(handle) = self.timer_handle.take() {
            handle.abort();
        }
        if let Some(handle) = self.consumer_handle.take() {
            handle.abort();
        }
    }
}

impl BlockGenerator {
    /// Creates a generator in the `Initialized` state. Call [`start`](Self::start)
    /// to begin ticking.
    pub fn new(stream_id: StreamId, config: BlockGeneratorConfig, listener: Arc<dyn BlockGeneratorListener>) -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        let (block_tx, rx) = mpsc::channel::<GeneratedBlock>(config.block_queue_size);

        let mut generator = Self {
            stream_id,
            state: Arc::new(Mutex::new(GeneratorState::Initialized)),
            buffer: Arc::new(Mutex::new(Vec::new())),
            block_ids: Arc::new(BlockIdCounter::new()),
            listener,
            block_tx: Some(block_tx.clone()),
            shutdown_tx,
            timer_handle: None,
            consumer_handle: None,
        };
        generator.spawn_tasks(config, block_tx, rx);
        generator
    }

    fn spawn_tasks(&mut self, config: BlockGeneratorConfig, tx: mpsc::Sender<GeneratedBlock>, rx: mpsc::Receiver<GeneratedBlock>) {
        let timer_state = self.state.clone();
        let timer_buffer = self.buffer.clone();
        let timer_ids = self.block_ids.clone();
        let timer_listener = self.listener.clone();
        let timer_stream_id = self.stream_id;
        let mut timer_shutdown = self.shutdown_tx.subscribe();

        let timer_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.block_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if *timer_state.lock().await != GeneratorState::Active {
                            continue;
                        }
                        // Holding the buffer lock across the bounded `send`
                        // is what gives `addData` its backpressure: a
                        // concurrent `addData` call blocks on this same
                        // lock until the handoff queue has room.
                        let mut buf = timer_buffer.lock().await;
                        if buf.is_empty() {
                            continue;
                        }
                        let records = std::mem::take(&mut *buf);
                        let block_id = timer_ids.next(timer_stream_id);
                        timer_listener.on_generate_block(block_id).await;
                        if tx.send(GeneratedBlock { block_id, records }).await.is_err() {
                            timer_listener
                                .on_error(format!("handoff queue closed for stream {timer_stream_id}"))
                                .await;
                            drop(buf);
                            break;
                        }
                    }
                    _ = timer_shutdown.changed() => {
                        if *timer_shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        let consumer_listener = self.listener.clone();
        let consumer_handle = tokio::spawn(async move {
            let mut rx = rx;
            while let Some(block) = rx.recv().await {
                consumer_listener.on_push_block(block).await;
            }
        });

        self.timer_handle = Some(timer_handle);
        self.consumer_handle = Some(consumer_handle);
    }

    /// Transitions `Initialized -> Active`. Fails with
    /// [`SupervisorError::AlreadyStarted`] if already active or stopped.
    pub async fn start(&self) -> SupervisorResult<()> {
        let mut state = self.state.lock().await;
        if *state != GeneratorState::Initialized {
            return Err(SupervisorError::AlreadyStarted);
        }
        *state = GeneratorState::Active;
        Ok(())
    }

    /// Appends `record` to the current buffer. Fails with
    /// [`SupervisorError::NotStarted`] unless the generator is `Active`.
    /// Blocks if the handoff queue is currently full and a buffer swap is
    /// in flight.
    pub async fn add_data(&self, record: Vec<u8>) -> SupervisorResult<()> {
        {
            let state = self.state.lock().await;
            if *state != GeneratorState::Active {
                return Err(SupervisorError::NotStarted);
            }
        }
        let mut buf = self.buffer.lock().await;
        buf.push(record);
        Ok(())
    }

    /// Sequentially: reject new `addData`, flush the partial buffer, stop
    /// the timer, drain the queue, stop the consumer.
    pub async fn stop(&mut self) {
        {
            let mut state = self.state.lock().await;
            *state = GeneratorState::StoppedAddingData;
        }

        // Flush whatever partial buffer remains as one last block, rather
        // than racing the ticker for it.
        if let Some(tx) = self.block_tx.take() {
            let mut buf = self.buffer.lock().await;
            if !buf.is_empty() {
                let records = std::mem::take(&mut *buf);
                let block_id = self.block_ids.next(self.stream_id);
                self.listener.on_generate_block(block_id).await;
                if tx.send(GeneratedBlock { block_id, records }).await.is_err() {
                    self.listener
                        .on_error(format!("handoff queue closed for stream {}", self.stream_id))
                        .await;
                }
            }
            // `tx` drops here regardless, closing this sender handle so the
            // consumer task's queue can eventually report EOF.
        }

        let _ = self.shutdown_tx.send(true);
        {
            let mut state = self.state.lock().await;
            *state = GeneratorState::StoppedGeneratingBlocks;
        }

        if let Some(handle) = self.timer_handle.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.consumer_handle.take() {
            let _ = handle.await;
        }

        let mut state = self.state.lock().await;
        *state = GeneratorState::StoppedAll;
    }

    pub async fn state(&self) -> GeneratorState {
        *self.state.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex as AsyncMutex;

    #[derive(Default)]
    struct RecordingListener {
        generated: AsyncMutex<Vec<BlockId>>,
        pushed: AsyncMutex<Vec<GeneratedBlock>>,
        errors: AsyncMutex<Vec<String>>,
    }

    #[async_trait]
    impl BlockGeneratorListener for RecordingListener {
        async fn on_generate_block(&self, block_id: BlockId) {
            self.generated.lock().await.push(block_id);
        }

        async fn on_push_block(&self, block: GeneratedBlock) {
            self.pushed.lock().await.push(block);
        }

        async fn on_error(&self, message: String) {
            self.errors.lock().await.push(message);
        }
    }

    fn fast_config() -> BlockGeneratorConfig {
        BlockGeneratorConfig {
            block_interval: Duration::from_millis(20),
            block_queue_size: 10,
        }
    }

    #[tokio::test]
    async fn add_data_before_start_fails() {
        let listener = Arc::new(RecordingListener::default());
        let generator = BlockGenerator::new(0, fast_config(), listener);
        assert_eq!(generator.state().await, GeneratorState::Initialized);
        assert!(matches!(generator.add_data(b"x".to_vec()).await, Err(SupervisorError::NotStarted)));
    }

    #[tokio::test]
    async fn starting_twice_fails() {
        let listener = Arc::new(RecordingListener::default());
        let generator = BlockGenerator::new(0, fast_config(), listener);
        generator.start().await.unwrap();
        assert!(matches!(generator.start().await, Err(SupervisorError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn cuts_a_block_from_buffered_records_on_tick() {
        let listener = Arc::new(RecordingListener::default());
        let generator = BlockGenerator::new(0, fast_config(), listener.clone());
        generator.start().await.unwrap();

        generator.add_data(b"a".to_vec()).await.unwrap();
        generator.add_data(b"b".to_vec()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;

        let pushed = listener.pushed.lock().await;
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].records, vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(listener.generated.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn empty_buffer_does_not_produce_a_block() {
        let listener = Arc::new(RecordingListener::default());
        let generator = BlockGenerator::new(0, fast_config(), listener.clone());
        generator.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(listener.pushed.lock().await.is_empty());
    }

    #[tokio::test]
    async fn stop_drains_to_stopped_all() {
        let listener = Arc::new(RecordingListener::default());
        let mut generator = BlockGenerator::new(0, fast_config(), listener);
        generator.start().await.unwrap();
        generator.add_data(b"a".to_vec()).await.unwrap();

        generator.stop().await;

        assert_eq!(generator.state().await, GeneratorState::StoppedAll);
        assert!(matches!(generator.add_data(b"late".to_vec()).await, Err(SupervisorError::NotStarted)));
    }
}
