//! Error taxonomy for the tracker and supervisor, matching the kinds a
//! receiver-tracking deployment needs to distinguish: durability failures
//! that are reported but survivable, RPC failures that leave a block stored
//! but unreported, and lifecycle misuse that is fatal to the caller.

use thiserror::Error;

use crate::model::StreamId;

/// Errors surfaced by the coordinator-side tracker.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// `RegisterReceiver` named a stream id outside the declared set.
    #[error("stream id {0} is not a recognized input stream")]
    UnknownStreamId(StreamId),

    /// A lifecycle method (`start`, recovery) was invoked more than once.
    #[error("tracker already started")]
    AlreadyStarted,

    /// The tracker's own write-ahead log could not be appended to or read.
    #[error("tracker event log unavailable: {0}")]
    StoreUnavailable(String),

    /// Replay of the tracker event log hit a malformed, non-tail record.
    #[error("tracker recovery log corrupted: {0}")]
    RecoveryCorruption(String),
}

/// Errors surfaced by the worker-side supervisor and its collaborators.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// `addData` was called while the block generator was not `Active`.
    #[error("block generator is not accepting data in its current state")]
    NotStarted,

    /// A lifecycle method was invoked out of order.
    #[error("supervisor or block generator already started")]
    AlreadyStarted,

    /// The block store or write-ahead log could not satisfy durability.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The RPC to the coordinator timed out or the connection failed.
    #[error("tracker unavailable: {0}")]
    TrackerUnavailable(String),
}

/// Convenience alias used throughout the coordinator-side modules.
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Convenience alias used throughout the worker-side modules.
pub type SupervisorResult<T> = Result<T, SupervisorError>;
