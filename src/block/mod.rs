//! Worker-side block machinery (spec §4.A–§4.B): [`BlockGenerator`] cuts a
//! record stream into fixed-interval blocks over a bounded handoff queue,
//! and [`ReceivedBlockHandler`] persists a cut block either directly or
//! through the write-ahead log.

pub mod generator;
pub mod handler;

pub use generator::{BlockGenerator, BlockGeneratorConfig, BlockGeneratorListener, GeneratedBlock, GeneratorState};
pub use handler::{DirectBlockHandler, ReceivedBlockHandler, WalBlockHandler};
