//! The six typed wire messages exchanged between a `ReceiverSupervisor`
//! and the coordinator's `ReceiverTrackerEndpoint` (spec §6).

use serde::{Deserialize, Serialize};

use crate::model::{ReceivedBlockInfo, StreamId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterReceiver {
    pub stream_id: StreamId,
    pub type_name: String,
    pub host: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddBlock {
    pub info: ReceivedBlockInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportError {
    pub stream_id: StreamId,
    pub message: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeregisterReceiver {
    pub stream_id: StreamId,
    pub message: String,
    pub error: String,
}

/// Coordinator -> supervisor, no reply expected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopReceiver;

/// Coordinator -> supervisor, no reply expected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupOldBlocks {
    pub thresh_millis: i64,
}
