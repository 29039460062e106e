//! Payload handling module.
//!
//! Provides parsing and chunking for firmware images.

pub mod chunk;
pub mod firmware;

pub use chunk::{Chunk, ChunkIter, Chunks};
pub use firmware::{FirmwareError, FirmwareImage, calc_checksum};
