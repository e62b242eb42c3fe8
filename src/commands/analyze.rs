//! Analyze command implementation.
//!
//! The analyze command:
//! 1. Loads settings and compiles decode options and rules
//! 2. Decodes every input file, one at a time
//! 3. Applies the filter
//! 4. Writes the JSON report and prints the summary

use super::models::{AnalyzeArgs, FileStatus};
use crate::aggregator::Collection;
use crate::output::{build_report, render_file_status, render_summary, write_report, Report};
use crate::parser::{decode_upload, DecodeOptions};
use crate::rules::RuleSet;
use crate::utils::settings::{load_settings, Settings};
use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Execute the analyze command
///
/// **Public** - main entry point called from main.rs
///
/// # Arguments
/// * `args` - Analyze command arguments
///
/// # Returns
/// The report describing the analysis, whether or not it was written
///
/// # Errors
/// * Settings that cannot be read or compiled
/// * An invalid filter query
/// * Report write errors
///
/// A file that fails to decode is reported and skipped; it never aborts the
/// batch.
///
/// # Example
/// ```ignore
/// let args = AnalyzeArgs {
///     files: vec![PathBuf::from("stacks.txt")],
///     filter: Some("wait:5+".to_string()),
///     print_summary: true,
///     ..AnalyzeArgs::default()
/// };
///
/// execute_analyze(args)?;
/// ```
pub fn execute_analyze(args: AnalyzeArgs) -> Result<Report> {
    let start_time = Instant::now();

    info!("Step 1/4: Loading settings...");
    let (options, rules) = load_configuration(args.settings.as_deref())?;
    debug!(
        "Using {} title rules and {} category rules",
        rules.title.len(),
        rules.category.len()
    );

    info!("Step 2/4: Decoding {} input files...", args.files.len());
    let mut collection = Collection::new(rules);
    let statuses = load_files(&mut collection, &args.files, &options);

    for status in &statuses {
        let name = status.file_name.as_deref().unwrap_or(&status.upload_name);
        let outcome = match &status.error {
            Some(reason) => Err(reason.as_str()),
            None => Ok(status.units),
        };
        println!("{}", render_file_status(name, outcome));
    }

    let failed = statuses.iter().filter(|s| !s.is_ok()).count();
    if failed > 0 {
        warn!("{} of {} files failed to load", failed, statuses.len());
    }

    info!("Step 3/4: Applying filter...");
    if let Some(filter) = args.filter.as_deref() {
        collection
            .set_filter_text(filter)
            .with_context(|| format!("Invalid filter '{}'", filter))?;
    }

    info!("Step 4/4: Writing output...");
    let report = build_report(&collection, args.filter.as_deref(), Some(args.top));

    if let Some(output) = &args.output {
        write_report(&report, output).context("Failed to write report JSON")?;
        info!("✓ Report written to: {}", output.display());
    }

    if args.print_summary {
        println!("{}", render_summary(&collection, args.top));
    }

    let elapsed = start_time.elapsed();
    info!("Analysis completed in {:.2}s", elapsed.as_secs_f64());

    Ok(report)
}

/// Compile decode options and rules from a settings file, or the defaults
fn load_configuration(path: Option<&Path>) -> Result<(DecodeOptions, RuleSet)> {
    let settings = match path {
        Some(path) => load_settings(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };

    let options =
        DecodeOptions::from_settings(&settings).context("Failed to compile decode settings")?;
    Ok((options, RuleSet::from_settings(&settings)))
}

/// Decode and add files one at a time
///
/// **Public** - batch loader shared by the CLI and tests
///
/// Each file (and each archive entry) gets its own status; a read or decode
/// failure is recorded and the batch continues.
pub fn load_files(
    collection: &mut Collection,
    paths: &[PathBuf],
    options: &DecodeOptions,
) -> Vec<FileStatus> {
    let mut statuses = Vec::new();

    for path in paths {
        let upload_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        match std::fs::read(path) {
            Ok(bytes) => statuses.extend(load_upload(collection, &bytes, &upload_name, options)),
            Err(e) => {
                warn!("Cannot read {}: {}", path.display(), e);
                statuses.push(FileStatus {
                    upload_name,
                    file_name: None,
                    units: 0,
                    error: Some(format!("cannot read file: {}", e)),
                });
            }
        }
    }

    statuses
}

/// Decode one upload and add every successfully decoded file
pub fn load_upload(
    collection: &mut Collection,
    bytes: &[u8],
    upload_name: &str,
    options: &DecodeOptions,
) -> Vec<FileStatus> {
    decode_upload(bytes, upload_name, options)
        .into_iter()
        .map(|decoded| match decoded.result {
            Ok(file) => {
                let added = collection.add_file(file, &decoded.file_name, None);
                FileStatus {
                    upload_name: decoded.file_name,
                    file_name: Some(added.file_name),
                    units: added.units,
                    error: None,
                }
            }
            Err(e) => {
                warn!("Failed to decode {}: {}", decoded.file_name, e);
                FileStatus {
                    upload_name: decoded.file_name,
                    file_name: None,
                    units: 0,
                    error: Some(e.to_string()),
                }
            }
        })
        .collect()
}

/// Validate analyze arguments before execution
///
/// **Public** - called by main.rs before execute_analyze
///
/// # Errors
/// * No input files, or an input that does not exist
/// * `top` of zero
/// * A filter query that does not parse
pub fn validate_args(args: &AnalyzeArgs) -> Result<()> {
    if args.files.is_empty() {
        bail!("No input files given");
    }

    for path in &args.files {
        if !path.exists() {
            bail!("Input file not found: {}", path.display());
        }
    }

    if args.top == 0 {
        bail!("--top must be at least 1");
    }

    if let Some(filter) = &args.filter {
        crate::aggregator::FilterQuery::parse(filter)
            .with_context(|| format!("Invalid filter '{}'", filter))?;
    }

    if let Some(settings) = &args.settings {
        if !settings.exists() {
            bail!("Settings file not found: {}", settings.display());
        }
    }

    Ok(())
}
