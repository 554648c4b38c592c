//! Block metadata scanning.
//!
//! Enumerates the blocks of a tenant, fetches their active and compacted
//! metadata with bounded parallelism, and normalizes both shapes into one
//! comparable record per block.

pub mod error;
mod scan;
mod unify;
mod waitgroup;

pub use scan::{
    BlockFailure, BlockInspection, DEFAULT_CONCURRENCY, ScanOptions, ScanReport, ScanSummary, inspect_block,
    scan_blocks,
};
pub use unify::{BlockState, UnifiedBlock, WindowRange, unify, unify_parts};
pub use waitgroup::{Admission, BoundedWaitGroup};
