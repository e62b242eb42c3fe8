use anyhow::{Context, Result};
use std::path::PathBuf;
use crate::output::read_report;
use crate::utils::config::SCHEMA_VERSION;
use crate::utils::settings::Settings;

/// Validate a report JSON file
pub fn validate_report_file(file_path: PathBuf) -> Result<()> {
    println!("Validating report: {}", file_path.display());

    let report = read_report(&file_path)
        .with_context(|| format!("Failed to read report {}", file_path.display()))?;

    println!("✓ Valid report JSON");
    println!("  Version: {}", report.version);
    println!("  Generated: {}", report.generated_at);
    println!("  Filter: {}", report.filter.as_deref().unwrap_or("(none)"));
    println!("  Goroutines: {} visible of {}", report.matches, report.total);
    println!("  Files: {}", report.files.len());
    println!("  Categories: {}", report.categories.len());

    Ok(())
}

/// Display the default settings
pub fn display_settings(show_details: bool) -> Result<()> {
    println!("Goroutine Trace Studio Settings");
    println!();

    if show_details {
        let text = Settings::default()
            .to_toml()
            .context("Failed to render default settings")?;
        println!("{}", text);
    } else {
        println!("Settings are read from a TOML file passed with --settings.");
        println!("Keys: app_package, function_trim_prefixes, file_trim_prefixes,");
        println!("      title_rules, category_rules, name_extraction, archive_entry_pattern");
        println!("Use --show to print the defaults");
    }

    Ok(())
}

/// Display version information
pub fn display_version() {
    println!("Goroutine Trace Studio v{}", env!("CARGO_PKG_VERSION"));
    println!("Report Schema: v{}", SCHEMA_VERSION);
    println!();
    println!("Groups, names and filters goroutines from Go stack dumps and profiles.");
}
