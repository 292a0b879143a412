//! RPC servers hosting the two endpoints of spec §6: the coordinator's
//! `ReceiverTrackerEndpoint` (handles `RegisterReceiver`, `AddBlock`,
//! `ReportError`, `DeregisterReceiver`) and the per-supervisor command
//! endpoint (`StopReceiver`, `CleanupOldBlocks`), both hosted the way the
//! teacher's `rpc::run_server` hosts its `#[rpc(server)]` trait over
//! `jsonrpsee`.

use std::net::SocketAddr;
use std::sync::Arc;

use eyre::Result;
use jsonrpsee::core::{async_trait, Error};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::ServerBuilder;

use crate::model::{ReceivedBlockInfo, StreamId};
use crate::rpc::messages::{AddBlock, DeregisterReceiver, RegisterReceiver, ReportError};
use crate::supervisor::SupervisorCommand;
use crate::tracker::ReceiverTracker;

/// Inbound RPCs the coordinator exposes to every supervisor (spec §4.E,
/// §6).
#[rpc(server, namespace = "tracker")]
pub trait ReceiverTrackerRpc {
    #[method(name = "registerReceiver")]
    async fn register_receiver(
        &self,
        stream_id: StreamId,
        type_name: String,
        host: String,
        endpoint: String,
    ) -> Result<bool, Error>;

    #[method(name = "addBlock")]
    async fn add_block(&self, info: ReceivedBlockInfo) -> Result<bool, Error>;

    #[method(name = "reportError")]
    async fn report_error(&self, stream_id: StreamId, message: String, error: String) -> Result<(), Error>;

    #[method(name = "deregisterReceiver")]
    async fn deregister_receiver(&self, stream_id: StreamId, message: String, error: String) -> Result<bool, Error>;
}

/// `jsonrpsee` implementation delegating every handler straight into
/// [`ReceiverTracker`]. Exceptions during handling are caught and turned
/// into a logged error acknowledgement rather than crashing the endpoint
/// (spec §7: "the tracker does not crash on individual message failures").
pub struct ReceiverTrackerEndpoint {
    tracker: Arc<ReceiverTracker>,
}

impl ReceiverTrackerEndpoint {
    pub fn new(tracker: Arc<ReceiverTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl ReceiverTrackerRpcServer for ReceiverTrackerEndpoint {
    async fn register_receiver(
        &self,
        stream_id: StreamId,
        type_name: String,
        host: String,
        endpoint: String,
    ) -> Result<bool, Error> {
        let message = RegisterReceiver { stream_id, type_name, host, endpoint };
        Ok(self.tracker.handle_register_receiver(message))
    }

    async fn add_block(&self, info: ReceivedBlockInfo) -> Result<bool, Error> {
        let message = AddBlock { info };
        Ok(self.tracker.handle_add_block(message))
    }

    async fn report_error(&self, stream_id: StreamId, message: String, error: String) -> Result<(), Error> {
        self.tracker
            .handle_report_error(ReportError { stream_id, message, error });
        Ok(())
    }

    async fn deregister_receiver(&self, stream_id: StreamId, message: String, error: String) -> Result<bool, Error> {
        let message = DeregisterReceiver { stream_id, message, error };
        Ok(self.tracker.handle_deregister_receiver(message))
    }
}

/// Starts the coordinator's tracker endpoint and returns once it is
/// listening, detaching the serve loop the way the teacher's `run_server`
/// spawns `handle.stopped()` and moves on.
pub async fn run_tracker_server(bind_addr: &str, tracker: Arc<ReceiverTracker>) -> Result<SocketAddr> {
    let server = ServerBuilder::default().build(bind_addr).await?;
    let addr = server.local_addr()?;
    let endpoint = ReceiverTrackerEndpoint::new(tracker);
    let handle = server.start(endpoint.into_rpc())?;
    tokio::spawn(handle.stopped());
    tracing::info!(%addr, "receiver tracker rpc endpoint started");
    Ok(addr)
}

/// Inbound RPCs a supervisor exposes to the coordinator (spec §4.C command
/// endpoint). Both methods are fire-and-forget from the coordinator's
/// perspective; they still return `Result<(), Error>` because `jsonrpsee`
/// methods always produce a reply.
#[rpc(server, namespace = "supervisor")]
pub trait SupervisorCommandRpc {
    #[method(name = "stopReceiver")]
    async fn stop_receiver(&self) -> Result<(), Error>;

    #[method(name = "cleanupOldBlocks")]
    async fn cleanup_old_blocks(&self, thresh_millis: i64) -> Result<(), Error>;
}

/// `jsonrpsee` implementation forwarding commands onto the supervisor's
/// internal command channel, where its `run` loop picks them up alongside
/// pushed blocks and the shutdown signal (spec §4.C).
pub struct SupervisorCommandEndpoint {
    commands: tokio::sync::mpsc::Sender<SupervisorCommand>,
}

impl SupervisorCommandEndpoint {
    pub fn new(commands: tokio::sync::mpsc::Sender<SupervisorCommand>) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl SupervisorCommandRpcServer for SupervisorCommandEndpoint {
    async fn stop_receiver(&self) -> Result<(), Error> {
        let _ = self.commands.send(SupervisorCommand::Stop).await;
        Ok(())
    }

    async fn cleanup_old_blocks(&self, thresh_millis: i64) -> Result<(), Error> {
        let _ = self
            .commands
            .send(SupervisorCommand::CleanupOldBlocks(thresh_millis))
            .await;
        Ok(())
    }
}

/// Starts a supervisor's command endpoint.
pub async fn run_supervisor_command_server(
    bind_addr: &str,
    commands: tokio::sync::mpsc::Sender<SupervisorCommand>,
) -> Result<SocketAddr> {
    let server = ServerBuilder::default().build(bind_addr).await?;
    let addr = server.local_addr()?;
    let endpoint = SupervisorCommandEndpoint::new(commands);
    let handle = server.start(endpoint.into_rpc())?;
    tokio::spawn(handle.stopped());
    tracing::info!(%addr, "supervisor command rpc endpoint started");
    Ok(addr)
}
