//! Aggregation of decoded goroutines into a filterable hierarchy.
//!
//! This module provides:
//! - The Category → Stack → FileSection → Group → Unit model
//! - The collection that merges files, tracks pins and recomputes counts
//! - The filter query language
//! - Per-file and per-state statistics

pub mod collection;
pub mod filter;
pub mod metrics;
pub mod model;

// Re-export main types and functions
pub use collection::{AddedFile, Collection, UnitRef};
pub use filter::{parse_wait, FilterMatcher, FilterQuery, UnitContext, WaitConstraint};
pub use metrics::{file_statistics, state_statistics, top_stacks, StatCounts, Statistics};
pub use model::{fingerprint, Category, Counts, FileSection, Group, PinTarget, Stack, Unit};
