//! Chunk parser and cell sink traits.

use crate::ByteStream;
use async_trait::async_trait;
use rf_error::Result;
use rf_types::ChunkDescriptor;

/// Write-only view of a chunk store.
///
/// Parsers see nothing but this one operation, so they cannot read back
/// partially populated chunks.
pub trait CellSink {
    /// Writes the next cell.
    ///
    /// Cells must arrive in row-major order: `(0, 0), (0, 1), ..., (1, 0), ...`.
    /// `None` marks a null cell; `Some(&[])` is an empty string.
    fn set_cell(&mut self, row: usize, col: usize, value: Option<&[u8]>) -> Result<()>;
}

/// Trait for turning a downloaded byte stream into cells.
///
/// # Contract
///
/// A successful parse calls `sink.set_cell` exactly
/// `descriptor.row_count * descriptor.col_count` times in row-major order.
#[async_trait]
pub trait ChunkParser: Send + Sync {
    /// Consumes `stream` and writes every cell of the chunk into `sink`.
    async fn parse(
        &self,
        descriptor: &ChunkDescriptor,
        stream: ByteStream,
        sink: &mut (dyn CellSink + Send),
    ) -> Result<()>;
}
