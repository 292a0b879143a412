//! # rstream
//!
//! `rstream` implements the receiver-tracking core of a distributed
//! micro-batch streaming engine: the coordinator-side bookkeeping of
//! block arrivals and batch allocation, and the worker-side supervision
//! of long-lived receivers that cut an external record stream into
//! blocks and durably report them.
//!
//! ## Modules
//!
//! - [`model`]: shared data types — stream/block ids, received blocks,
//!   storage levels, tracker events.
//! - [`block`]: worker-side block generation and persistence
//!   ([`block::BlockGenerator`], [`block::ReceivedBlockHandler`]).
//! - [`receiver`]: the `Receiver` trait user code implements.
//! - [`supervisor`]: `ReceiverSupervisor`, the worker-side host of one
//!   receiver.
//! - [`tracker`]: `ReceiverTracker` and its recoverable event log
//!   (`ReceivedBlockTracker`), the coordinator-side front-end.
//! - [`listener`]: fire-and-forget receiver lifecycle notifications.
//! - [`store`]/[`wal`]: opaque interfaces to the cluster block store and
//!   write-ahead log, plus reference implementations for tests.
//! - [`rpc`]: wire messages and `jsonrpsee`-based client/server stubs.
//! - [`config`]: layered configuration for the two binaries.
//! - [`telemetry`]: logging and metrics setup.
//! - [`errors`]: the crate's typed error taxonomy.
#![warn(missing_debug_implementations, unreachable_pub, rust_2018_idioms)]

pub mod block;
pub mod config;
pub mod errors;
pub mod listener;
pub mod model;
pub mod receiver;
pub mod rpc;
pub mod store;
pub mod supervisor;
pub mod telemetry;
pub mod tracker;
pub mod version;
pub mod wal;
