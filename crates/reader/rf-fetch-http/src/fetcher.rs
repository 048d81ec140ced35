//! reqwest-backed chunk fetcher.

use crate::config::HttpFetcherConfig;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, Url};
use rf_error::{Result, RfError, TransportError};
use rf_traits::{ByteStream, ChunkFetcher};
use rf_types::ChunkHeaders;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Fetches chunk bodies over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpChunkFetcher {
    client: Client,
}

impl HttpChunkFetcher {
    /// Build a fetcher with its own connection pool.
    pub fn new(config: &HttpFetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RfError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChunkFetcher for HttpChunkFetcher {
    async fn fetch(
        &self,
        locator: &str,
        headers: &ChunkHeaders,
        cancel: &CancellationToken,
    ) -> Result<ByteStream> {
        let url = Url::parse(locator).map_err(|e| {
            TransportError::InvalidLocator(format!("{}: {}", redact_locator(locator), e))
        })?;

        let mut request = self.client.get(url);
        for (name, value) in headers.iter() {
            request = request.header(name, value);
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RfError::Cancelled),
            response = request.send() => response.map_err(|e| {
                warn!(locator = redact_locator(locator), error = %e, "Chunk request failed");
                TransportError::Connection(e.to_string())
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                locator: redact_locator(locator).to_string(),
            }
            .into());
        }

        debug!(
            locator = redact_locator(locator),
            content_length = response.content_length(),
            "Chunk response received"
        );

        let body = response
            .bytes_stream()
            .map_err(|e| RfError::from(TransportError::Body(e.to_string())));

        // Stop reading once cancelled and surface the cancellation as the
        // stream's last item, so parsers do not mistake it for a short body.
        let token = cancel.clone();
        let tail = futures::stream::once(async move { token.is_cancelled() })
            .filter_map(|cancelled| async move { cancelled.then_some(Err(RfError::Cancelled)) });

        Ok(Box::pin(
            body.take_until(cancel.clone().cancelled_owned()).chain(tail),
        ))
    }
}

/// Strips the query string (presigned signatures) from a locator for logging.
pub fn redact_locator(locator: &str) -> &str {
    locator.split_once('?').map_or(locator, |(base, _)| base)
}
