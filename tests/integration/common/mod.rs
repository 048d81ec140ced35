//! Common utilities for integration tests.

pub mod chunk_server;

pub use chunk_server::{ChunkServer, Route, rowset};
