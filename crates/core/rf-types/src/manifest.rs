//! Result set manifest and shared request headers.

use crate::ChunkDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Request headers attached to every chunk download.
///
/// Chunk locators are typically presigned, but some stages also require
/// encryption-key or auth headers that the query response hands out once for
/// the whole result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkHeaders(BTreeMap<String, String>);

impl ChunkHeaders {
    /// Create an empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Add or replace a header in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Parse a `Name: value` pair as given on a command line.
    pub fn parse_pair(s: &str) -> Result<(String, String), String> {
        let (name, value) = s
            .split_once(':')
            .ok_or_else(|| format!("'{}' is not a 'Name: value' header", s))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("'{}' has an empty header name", s));
        }
        Ok((name.to_string(), value.trim().to_string()))
    }

    /// Look up a header value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Iterate over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything needed to materialize a result set: shared headers and the
/// ordered chunk descriptors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkManifest {
    /// Headers sent with every chunk request
    #[serde(default)]
    pub headers: ChunkHeaders,

    /// Chunk descriptors in delivery order
    pub chunks: Vec<ChunkDescriptor>,
}

impl ChunkManifest {
    /// Check that descriptors are numbered `0..n` in order.
    pub fn validate(&self) -> Result<(), String> {
        for (position, chunk) in self.chunks.iter().enumerate() {
            if chunk.index != position {
                return Err(format!(
                    "chunk at position {} has index {}",
                    position, chunk.index
                ));
            }
            if chunk.locator.is_empty() {
                return Err(format!("chunk {} has an empty locator", chunk.index));
            }
        }
        Ok(())
    }

    /// Total rows across all chunks.
    pub fn total_rows(&self) -> u64 {
        self.chunks.iter().map(|c| c.row_count as u64).sum()
    }
}
