//! Error types and classification for resultflow.
//!
//! This crate provides:
//! - [`RfError`] - Top-level error enum for everything between fetch and read
//! - Domain-specific errors ([`ArenaError`], [`StoreError`], [`TransportError`], [`ParseError`])
//! - [`ErrorCategory`] so consumers can decide whether a failed chunk is worth refetching
//!
//! Arena and store errors are local invariant violations and surface at the call
//! that detects them. Transport and parse errors come from collaborators and are
//! carried unchanged to the consumer at the failed chunk's position.

use std::str::Utf8Error;
use thiserror::Error;

/// Top-level error type for resultflow.
#[derive(Error, Debug)]
pub enum RfError {
    /// Block arena errors (capacity, encoding, lifecycle)
    #[error("Arena error: {0}")]
    Arena(#[from] ArenaError),

    /// Chunk store errors (write order, sealing)
    #[error("Chunk store error: {0}")]
    Store(#[from] StoreError),

    /// Transport errors from the fetch collaborator
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Parse errors from the stream parser
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The cooperative cancellation signal fired
    #[error("Chunk download cancelled")]
    Cancelled,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors (wrapped anyhow)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Block arena errors.
#[derive(Error, Debug)]
pub enum ArenaError {
    /// A cell payload does not fit in the preallocated blocks
    #[error("Arena overflow: need {needed} bytes, capacity is {capacity} bytes")]
    Overflow { needed: u64, capacity: u64 },

    /// More cells were appended than index slots were reserved
    #[error("Index overflow: cell {cell} exceeds index capacity {capacity}")]
    IndexOverflow { cell: usize, capacity: usize },

    /// Stored bytes are not valid UTF-8
    #[error("Invalid UTF-8 in cell {cell}: {source}")]
    InvalidEncoding {
        cell: usize,
        #[source]
        source: Utf8Error,
    },

    /// The arena was accessed after its buffers went back to the pool
    #[error("Arena used after release")]
    UseAfterRelease,

    /// Block or index sizing could not be derived from the chunk dimensions
    #[error("Capacity computation failed: {0}")]
    CapacityComputation(String),

    /// Read of a cell that has not been written
    #[error("Cell {cell} out of range ({written} cells written)")]
    CellOutOfRange { cell: usize, written: usize },
}

/// Chunk store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Read attempted before every cell was written
    #[error("Chunk not sealed: {written} of {expected} cells written")]
    NotSealed { written: usize, expected: usize },

    /// Cells must be written in row-major order
    #[error("Out-of-order write: expected cell {expected}, got {got}")]
    OutOfOrder { expected: usize, got: usize },

    /// Row or column outside the chunk dimensions
    #[error("Cell ({row}, {col}) outside chunk of {rows}x{cols}")]
    CellOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    /// Write attempted after the chunk was sealed
    #[error("Chunk already sealed")]
    AlreadySealed,
}

/// Transport errors raised by chunk fetchers.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The locator cannot be turned into a request
    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    /// Connection could not be established or was reset
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The remote answered with a non-success status
    #[error("HTTP {status} fetching {locator}")]
    Status { status: u16, locator: String },

    /// Reading the response body failed
    #[error("Body read failed: {0}")]
    Body(String),
}

/// Parse errors raised while turning a byte stream into cells.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Malformed input
    #[error("Syntax error at byte {offset}: {message}")]
    Syntax { offset: u64, message: String },

    /// A row did not have the expected number of columns
    #[error("Row {row} has {found} columns, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// More rows than the descriptor announced
    #[error("More than {expected} rows in chunk")]
    TooManyRows { expected: usize },

    /// The stream ended before every cell was produced
    #[error("Chunk truncated: {written} of {expected} cells")]
    Truncated { written: usize, expected: usize },

    /// An escape sequence produced an invalid code point
    #[error("Invalid escape: {0}")]
    Encoding(String),
}

/// Error classification for refetch decisions.
///
/// Nothing in resultflow retries on its own; the consumer uses this to decide
/// whether restarting the fetch is worthwhile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transient error - refetching the chunk may succeed
    ///
    /// Examples: connection reset, HTTP 503, throttling
    Transient,

    /// Permanent error - refetching will fail the same way
    ///
    /// Examples: HTTP 403, malformed chunk, arena overflow
    Permanent,
}

/// Classifies an error to determine whether a refetch makes sense.
pub fn classify_error(error: &RfError) -> ErrorCategory {
    match error {
        RfError::Transport(e) => classify_transport_error(e),
        RfError::Arena(_) | RfError::Store(_) | RfError::Parse(_) => ErrorCategory::Permanent,
        RfError::Cancelled | RfError::Config(_) => ErrorCategory::Permanent,
        RfError::Other(_) => ErrorCategory::Permanent,
    }
}

fn classify_transport_error(error: &TransportError) -> ErrorCategory {
    match error {
        TransportError::InvalidLocator(_) => ErrorCategory::Permanent,
        TransportError::Connection(_) => ErrorCategory::Transient,
        TransportError::Body(_) => ErrorCategory::Transient,
        TransportError::Status { status, .. } => {
            if *status == 408 || *status == 429 || *status >= 500 {
                ErrorCategory::Transient
            } else {
                ErrorCategory::Permanent
            }
        }
    }
}

/// Result type alias using RfError.
pub type Result<T> = std::result::Result<T, RfError>;
