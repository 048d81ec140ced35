//! Chunk fetcher trait.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use rf_error::Result;
use rf_types::ChunkHeaders;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// A stream of raw body bytes for one chunk.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Trait for fetching chunk bodies from remote storage.
///
/// # Contract
///
/// - Must honor `cancel`: once it fires, pending connects and body reads
///   should stop and surface [`rf_error::RfError::Cancelled`].
/// - Must not impose a timeout on the body read; chunk transfers can be long.
/// - Transport failures are reported as [`rf_error::TransportError`] and are
///   not retried by the caller.
#[async_trait]
pub trait ChunkFetcher: Send + Sync {
    /// Starts a download and returns the body as a stream.
    ///
    /// # Arguments
    ///
    /// * `locator` - Where the chunk lives (usually a presigned URL)
    /// * `headers` - Headers shared by every chunk of the result set
    /// * `cancel` - Cooperative cancellation signal
    async fn fetch(
        &self,
        locator: &str,
        headers: &ChunkHeaders,
        cancel: &CancellationToken,
    ) -> Result<ByteStream>;
}

/// Wraps in-memory parts as a [`ByteStream`].
///
/// Handy for fetchers that already hold the whole body and for tests that
/// need to control where stream chunk boundaries fall.
pub fn stream_from_bytes(parts: Vec<Bytes>) -> ByteStream {
    Box::pin(futures::stream::iter(parts.into_iter().map(Ok)))
}
