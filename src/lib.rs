//! Goroutine Trace Studio
//!
//! Turns Go goroutine dumps (raw `goroutine N [state]:` text, legacy
//! `debug=1` profiles, binary goroutine profiles and zip bundles of dumps)
//! into de-duplicated, named, filterable groups of stacks.
//!
//! This crate provides the core implementation for the
//! `goroutine-trace` CLI tool.
//!
//! ## Getting Started
//!
//! ```ignore
//! use goroutine_trace_studio::aggregator::Collection;
//! use goroutine_trace_studio::parser::{decode, DecodeOptions};
//!
//! let file = decode(&bytes, &DecodeOptions::default())?;
//! let mut collection = Collection::default();
//! collection.add_file(file, "stacks.txt", None);
//! collection.set_filter_text("wait:5+")?;
//! ```

pub mod aggregator;
pub mod commands;
pub mod output;
pub mod parser;
pub mod rules;
pub mod utils;
