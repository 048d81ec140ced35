//! `ChunkParser` implementation over [`RowsetDecoder`].

use crate::decoder::RowsetDecoder;
use async_trait::async_trait;
use futures::StreamExt;
use rf_error::Result;
use rf_traits::{ByteStream, CellSink, ChunkParser};
use rf_types::ChunkDescriptor;
use tracing::{debug, trace};

/// Parses rowset text into a chunk store.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowsetParser;

impl RowsetParser {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChunkParser for RowsetParser {
    async fn parse(
        &self,
        descriptor: &ChunkDescriptor,
        mut stream: ByteStream,
        sink: &mut (dyn CellSink + Send),
    ) -> Result<()> {
        let mut decoder = RowsetDecoder::new(descriptor.row_count, descriptor.col_count);

        while let Some(part) = stream.next().await {
            let part = part?;
            trace!(chunk = descriptor.index, bytes = part.len(), "Decoding stream part");
            decoder.feed(&part, &mut *sink)?;
        }
        decoder.finish()?;

        debug!(
            chunk = descriptor.index,
            rows = decoder.rows_completed(),
            bytes = decoder.bytes_consumed(),
            "Chunk parsed"
        );
        Ok(())
    }
}
