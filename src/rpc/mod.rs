//! RPC module hosting the wire messages and servers/clients that connect
//! a `ReceiverTracker` coordinator to its `ReceiverSupervisor`s.

/// Typed request payloads exchanged between supervisor and coordinator.
pub mod messages;

/// Client-side stubs (`TrackerRpc`, `SupervisorCommandClient`) used by a
/// supervisor to talk back to the coordinator, and vice versa.
pub mod client;

/// Server-side `#[rpc(server)]` endpoints hosted by both roles.
pub mod server;

pub use client::{SupervisorCommandClient, TrackerClient, TrackerRpc};
pub use server::{
    run_supervisor_command_server, run_tracker_server, ReceiverTrackerEndpoint,
    SupervisorCommandEndpoint,
};
