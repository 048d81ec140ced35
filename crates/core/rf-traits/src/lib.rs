//! Collaborator traits for resultflow.
//!
//! The scheduler and storage layer only talk to the outside world through
//! these seams:
//!
//! - [`ChunkFetcher`] - turns a chunk locator into a [`ByteStream`]
//! - [`ChunkParser`] - drives a [`CellSink`] from a byte stream
//! - [`CellSink`] - the write-only view of a chunk store handed to parsers

mod fetch;
mod parse;

pub use fetch::{ByteStream, ChunkFetcher, stream_from_bytes};
pub use parse::{CellSink, ChunkParser};

pub use tokio_util::sync::CancellationToken;
