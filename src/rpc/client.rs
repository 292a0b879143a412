//! Client stubs for both RPC directions, resolving the "coordinator
//! endpoint" design note (spec §9): a resolvable `host:port` with a
//! client-side stub that retries on transient failure rather than failing
//! the caller on the first dropped connection.

use std::time::Duration;

use again::RetryPolicy;
use async_trait::async_trait;
use eyre::{eyre, Result};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;

use crate::model::{ReceivedBlockInfo, StreamId};

fn retry_policy(ask_timeout: Duration) -> RetryPolicy {
    RetryPolicy::exponential(Duration::from_millis(50))
        .with_max_retries(3)
        .with_max_delay(ask_timeout)
        .with_jitter(true)
}

/// The four coordinator-bound RPCs a supervisor needs (spec §6), factored
/// as a trait so [`crate::supervisor::ReceiverSupervisor`] can be driven
/// against an in-process double in tests instead of a real HTTP client.
#[async_trait]
pub trait TrackerRpc: Send + Sync {
    async fn register_receiver(
        &self,
        stream_id: StreamId,
        type_name: &str,
        host: &str,
        endpoint: &str,
    ) -> Result<bool>;

    async fn add_block(&self, info: ReceivedBlockInfo) -> Result<bool>;

    async fn report_error(&self, stream_id: StreamId, message: &str, error: &str) -> Result<()>;

    async fn deregister_receiver(&self, stream_id: StreamId, message: &str, error: &str) -> Result<bool>;
}

/// Supervisor-side stub for the coordinator's `ReceiverTrackerEndpoint`.
pub struct TrackerClient {
    inner: HttpClient,
    ask_timeout: Duration,
}

impl TrackerClient {
    pub fn connect(coordinator_addr: &str, ask_timeout: Duration) -> Result<Self> {
        let inner = HttpClientBuilder::default()
            .request_timeout(ask_timeout)
            .build(format!("http://{coordinator_addr}"))?;
        Ok(Self { inner, ask_timeout })
    }
}

#[async_trait]
impl TrackerRpc for TrackerClient {
    async fn register_receiver(
        &self,
        stream_id: StreamId,
        type_name: &str,
        host: &str,
        endpoint: &str,
    ) -> Result<bool> {
        let params = rpc_params![stream_id, type_name, host, endpoint];
        retry_policy(self.ask_timeout)
            .retry(|| self.inner.request::<bool, _>("tracker_registerReceiver", params.clone()))
            .await
            .map_err(|e| eyre!("registerReceiver RPC failed: {e}"))
    }

    async fn add_block(&self, info: ReceivedBlockInfo) -> Result<bool> {
        let params = rpc_params![info];
        retry_policy(self.ask_timeout)
            .retry(|| self.inner.request::<bool, _>("tracker_addBlock", params.clone()))
            .await
            .map_err(|e| eyre!("addBlock RPC failed: {e}"))
    }

    /// Fire-and-forget: no acknowledgement is awaited beyond delivery, per
    /// spec §6.
    async fn report_error(&self, stream_id: StreamId, message: &str, error: &str) -> Result<()> {
        let params = rpc_params![stream_id, message, error];
        self.inner
            .request::<(), _>("tracker_reportError", params)
            .await
            .map_err(|e| eyre!("reportError RPC failed: {e}"))
    }

    async fn deregister_receiver(&self, stream_id: StreamId, message: &str, error: &str) -> Result<bool> {
        let params = rpc_params![stream_id, message, error];
        retry_policy(self.ask_timeout)
            .retry(|| {
                self.inner
                    .request::<bool, _>("tracker_deregisterReceiver", params.clone())
            })
            .await
            .map_err(|e| eyre!("deregisterReceiver RPC failed: {e}"))
    }
}


/// Coordinator-side stub for one supervisor's command endpoint.
/// Fire-and-forget: failures are logged by the caller, never escalated
/// (spec §4.E stop: "best-effort, fire-and-forget").
pub struct SupervisorCommandClient {
    inner: HttpClient,
}

impl SupervisorCommandClient {
    pub fn connect(supervisor_addr: &str) -> Result<Self> {
        let inner = HttpClientBuilder::default().build(format!("http://{supervisor_addr}"))?;
        Ok(Self { inner })
    }

    pub async fn stop_receiver(&self) -> Result<()> {
        self.inner
            .request::<(), _>("supervisor_stopReceiver", rpc_params![])
            .await
            .map_err(|e| eyre!("stopReceiver RPC failed: {e}"))
    }

    pub async fn cleanup_old_blocks(&self, thresh_millis: i64) -> Result<()> {
        self.inner
            .request::<(), _>("supervisor_cleanupOldBlocks", rpc_params![thresh_millis])
            .await
            .map_err(|e| eyre!("cleanupOldBlocks RPC failed: {e}"))
    }
}
