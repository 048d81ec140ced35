//! Shared data types for resultflow.
//!
//! This crate defines the types exchanged between the scheduler, the storage
//! layer and the collaborators:
//!
//! - [`ChunkDescriptor`] - Identity and sizing of one remote result chunk
//! - [`ChunkHeaders`] - Request headers shared by every chunk download
//! - [`ChunkManifest`] - A full result set description (headers + descriptors)

mod descriptor;
mod manifest;

pub use descriptor::ChunkDescriptor;
pub use manifest::{ChunkHeaders, ChunkManifest};
