//! rf-fetch-http - HTTP chunk fetcher for resultflow.
//!
//! Chunk locators are plain (usually presigned) URLs. [`HttpChunkFetcher`]
//! issues a GET with the result set's shared headers and hands the response
//! body back as a [`rf_traits::ByteStream`] without buffering it.
//!
//! Only the connect phase has a timeout; chunk bodies can take arbitrarily
//! long to transfer and are bounded by cancellation instead.

mod config;
mod fetcher;

pub use config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_POOL_MAX_IDLE_PER_HOST, HttpFetcherConfig};
pub use fetcher::{HttpChunkFetcher, redact_locator};
