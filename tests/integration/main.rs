//! Integration tests for resultflow.
//!
//! Every test starts its own HTTP server on a loopback port, so nothing
//! external needs to be running:
//!
//! ```bash
//! cargo test -p integration-tests
//! ```

mod common;
mod prefetch_test;
