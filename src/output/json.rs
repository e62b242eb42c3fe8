//! JSON report output.
//!
//! A report is a snapshot of the collection's counts under the active
//! filter: per-file and per-state statistics and the visible categories with
//! their stacks.

use crate::aggregator::{Category, Collection, Counts, Stack};
use crate::utils::config::SCHEMA_VERSION;
use crate::utils::error::OutputError;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Snapshot of an analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Report schema version
    pub version: String,

    /// ISO 8601 timestamp
    pub generated_at: String,

    /// Query the counts were computed under
    pub filter: Option<String>,

    pub total: usize,
    pub matches: usize,
    pub files: Vec<FileEntry>,
    pub states: Vec<StateEntry>,
    pub categories: Vec<CategoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub total: usize,
    pub matches: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub state: String,
    pub total: usize,
    pub matches: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub name: String,
    pub total: usize,
    pub matches: usize,
    pub pinned: bool,
    pub stacks: Vec<StackEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEntry {
    pub id: String,
    pub name: String,
    pub total: usize,
    pub matches: usize,

    /// Wait bounds over visible goroutines, absent without wait data
    pub min_wait: Option<u32>,
    pub max_wait: Option<u32>,

    /// `function file:line`, innermost first
    pub trace: Vec<String>,
}

/// Build a report from the collection's current counts
///
/// **Public** - main entry point for report generation
///
/// # Arguments
/// * `collection` - Collection with files loaded and the filter applied
/// * `filter` - Query text to record in the report
/// * `top_n` - Maximum number of stacks listed per category
///
/// # Returns
/// Report listing only categories and stacks with visible goroutines,
/// largest first
pub fn build_report(collection: &Collection, filter: Option<&str>, top_n: Option<usize>) -> Report {
    let files = collection
        .file_statistics()
        .into_iter()
        .map(|(name, stats)| FileEntry {
            name,
            total: stats.total,
            matches: stats.matches,
        })
        .collect();

    let mut states: Vec<StateEntry> = collection
        .state_statistics()
        .into_iter()
        .map(|(state, stats)| StateEntry {
            state,
            total: stats.total,
            matches: stats.matches,
        })
        .collect();
    states.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.state.cmp(&b.state)));

    let mut categories: Vec<&Category> = collection
        .categories()
        .iter()
        .filter(|c| c.counts.matches > 0)
        .collect();
    categories.sort_by(|a, b| {
        b.counts
            .matches
            .cmp(&a.counts.matches)
            .then_with(|| a.name.cmp(&b.name))
    });

    let categories = categories
        .into_iter()
        .map(|category| category_entry(category, top_n))
        .collect();

    let (total, matches) = collection
        .categories()
        .iter()
        .fold((0, 0), |(t, m), c| (t + c.counts.total, m + c.counts.matches));

    Report {
        version: SCHEMA_VERSION.to_string(),
        generated_at: chrono::Utc::now().to_rfc3339(),
        filter: filter.map(str::to_string),
        total,
        matches,
        files,
        states,
        categories,
    }
}

fn category_entry(category: &Category, top_n: Option<usize>) -> CategoryEntry {
    let mut stacks: Vec<&Stack> = category
        .stacks
        .iter()
        .filter(|s| s.counts.matches > 0)
        .collect();
    stacks.sort_by(|a, b| {
        b.counts
            .matches
            .cmp(&a.counts.matches)
            .then_with(|| a.name.cmp(&b.name))
    });
    if let Some(n) = top_n {
        stacks.truncate(n);
    }

    CategoryEntry {
        name: category.name.clone(),
        total: category.counts.total,
        matches: category.counts.matches,
        pinned: category.pinned,
        stacks: stacks.into_iter().map(stack_entry).collect(),
    }
}

fn stack_entry(stack: &Stack) -> StackEntry {
    let (min_wait, max_wait) = matching_wait(&stack.counts);
    StackEntry {
        id: stack.id.clone(),
        name: stack.name.clone(),
        total: stack.counts.total,
        matches: stack.counts.matches,
        min_wait,
        max_wait,
        trace: stack
            .trace
            .iter()
            .map(|f| format!("{} {}:{}", f.function, f.file, f.line))
            .collect(),
    }
}

fn matching_wait(counts: &Counts) -> (Option<u32>, Option<u32>) {
    if counts.min_matching_wait.is_finite() {
        (
            Some(counts.min_matching_wait as u32),
            Some(counts.max_matching_wait as u32),
        )
    } else {
        (None, None)
    }
}

/// Write a report to a JSON file
///
/// **Public** - main entry point for JSON output
///
/// # Arguments
/// * `report` - Report to write
/// * `output_path` - Path to output JSON file
///
/// # Errors
/// * `OutputError::WriteFailed` - I/O error during write
/// * `OutputError::SerializationFailed` - JSON serialization error
/// * `OutputError::InvalidPath` - Path cannot be created or is invalid
///
/// # Example
/// ```ignore
/// let report = build_report(&collection, Some("wait:5+"), Some(10));
/// write_report(&report, "report.json")?;
/// ```
pub fn write_report(report: &Report, output_path: impl AsRef<Path>) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();

    info!("Writing report to: {}", output_path.display());

    validate_output_path(output_path)?;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            std::fs::create_dir_all(parent).map_err(|e| {
                OutputError::InvalidPath(format!(
                    "Cannot create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let file = File::create(output_path).map_err(OutputError::WriteFailed)?;
    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, report).map_err(OutputError::SerializationFailed)?;

    info!(
        "Report written successfully ({} bytes)",
        calculate_file_size(output_path)
    );

    Ok(())
}

/// Serialize a report to a pretty JSON string
pub fn report_to_string(report: &Report) -> Result<String, OutputError> {
    serde_json::to_string_pretty(report).map_err(OutputError::SerializationFailed)
}

/// Validate that output path is writable
///
/// **Private** - internal validation
fn validate_output_path(path: &Path) -> Result<(), OutputError> {
    if path.as_os_str().is_empty() {
        return Err(OutputError::InvalidPath("Path is empty".to_string()));
    }

    if path.is_dir() {
        return Err(OutputError::InvalidPath(format!(
            "Path is a directory: {}",
            path.display()
        )));
    }

    Ok(())
}

fn calculate_file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Read a report from a JSON file
///
/// **Public** - used by the `validate` command and tests
///
/// # Errors
/// * `OutputError::WriteFailed` - File read error (reusing WriteFailed for I/O)
/// * `OutputError::SerializationFailed` - JSON parse error
pub fn read_report(input_path: impl AsRef<Path>) -> Result<Report, OutputError> {
    let input_path = input_path.as_ref();

    debug!("Reading report from: {}", input_path.display());

    let file = File::open(input_path).map_err(OutputError::WriteFailed)?;
    let report: Report =
        serde_json::from_reader(file).map_err(OutputError::SerializationFailed)?;

    debug!(
        "Report loaded: version {}, {} categories",
        report.version,
        report.categories.len()
    );

    Ok(report)
}
