//! rf-reader-rowset - Streaming parser for row-major JSON rowset chunks.
//!
//! Result chunks arrive as a sequence of JSON arrays, one per row:
//!
//! ```text
//! ["1","alice",null],["2","bob","x"]
//! ```
//!
//! optionally wrapped in an outer `[...]`. Cells are JSON strings, `null`,
//! or bare scalars (numbers, booleans) which are kept as their literal text.
//!
//! [`RowsetDecoder`] is an incremental state machine: stream parts can split
//! tokens anywhere, including inside escape sequences. [`RowsetParser`]
//! drives it from a [`rf_traits::ByteStream`].

mod decoder;
mod parser;

pub use decoder::RowsetDecoder;
pub use parser::RowsetParser;
