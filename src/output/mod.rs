//! Output writers for analysis results.
//!
//! This module handles:
//! - JSON reports (write and read back)
//! - Colored terminal summaries

pub mod json;
pub mod terminal;

// Re-export main functions
pub use json::{
    build_report, read_report, report_to_string, write_report, CategoryEntry, FileEntry, Report,
    StackEntry, StateEntry,
};
pub use terminal::{render_file_status, render_summary};
