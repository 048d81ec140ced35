//! Chunk descriptor.

use serde::{Deserialize, Serialize};

/// Describes one chunk of a larger result set.
///
/// Descriptors are immutable and supplied before scheduling. The uncompressed
/// size estimate only sizes the chunk's block arena; it is not validated
/// against the downloaded payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDescriptor {
    /// Position of the chunk within the result set
    pub index: usize,

    /// Number of rows in the chunk
    pub row_count: usize,

    /// Number of columns per row
    pub col_count: usize,

    /// Where the chunk is fetched from (usually a presigned URL)
    pub locator: String,

    /// Estimated size of the chunk's uncompressed wire text
    #[serde(default)]
    pub estimated_uncompressed_bytes: u64,
}

impl ChunkDescriptor {
    /// Create a new descriptor.
    pub fn new(
        index: usize,
        row_count: usize,
        col_count: usize,
        locator: impl Into<String>,
        estimated_uncompressed_bytes: u64,
    ) -> Self {
        Self {
            index,
            row_count,
            col_count,
            locator: locator.into(),
            estimated_uncompressed_bytes,
        }
    }

    /// Total number of cells (`row_count * col_count`), or `None` on overflow.
    pub fn cell_count(&self) -> Option<usize> {
        self.row_count.checked_mul(self.col_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_serde_camel_case() {
        let json = r#"{
            "index": 3,
            "rowCount": 100,
            "colCount": 4,
            "locator": "https://stage.example.com/results/chunk_3",
            "estimatedUncompressedBytes": 65536
        }"#;
        let desc: ChunkDescriptor = serde_json::from_str(json).unwrap();

        assert_eq!(desc.index, 3);
        assert_eq!(desc.row_count, 100);
        assert_eq!(desc.col_count, 4);
        assert_eq!(desc.estimated_uncompressed_bytes, 65536);
        assert_eq!(desc.cell_count(), Some(400));
    }

    #[test]
    fn test_descriptor_estimate_defaults_to_zero() {
        let json = r#"{"index": 0, "rowCount": 1, "colCount": 1, "locator": "x"}"#;
        let desc: ChunkDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(desc.estimated_uncompressed_bytes, 0);
    }

    #[test]
    fn test_cell_count_overflow() {
        let desc = ChunkDescriptor::new(0, usize::MAX, 2, "x", 0);
        assert_eq!(desc.cell_count(), None);
    }
}
