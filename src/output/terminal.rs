//! Terminal rendering of load status and analysis summaries.

use crate::aggregator::{top_stacks, Collection, Stack};
use colored::*;

/// One line per loaded (or failed) file
pub fn render_file_status(file_name: &str, outcome: Result<usize, &str>) -> String {
    match outcome {
        Ok(units) => format!("{} {}: {} goroutines", "✓".green(), file_name, units),
        Err(reason) => format!("{} {}: {}", "✗".red(), file_name, reason.red()),
    }
}

/// Render a human-readable summary of the collection for the terminal
///
/// # Arguments
/// * `collection` - Collection with the filter already applied
/// * `top_n` - Number of stacks to list
pub fn render_summary(collection: &Collection, top_n: usize) -> String {
    let mut out = String::new();

    out.push_str(&render_header(collection));
    out.push_str(&render_files(collection));
    out.push_str(&render_states(collection));
    out.push_str(&render_top_stacks(collection, top_n));

    out
}

fn render_header(collection: &Collection) -> String {
    let (total, matches) = collection
        .categories()
        .iter()
        .fold((0, 0), |(t, m), c| (t + c.counts.total, m + c.counts.matches));
    let stacks = collection.stacks().count();

    let mut out = String::new();
    out.push_str("\n📊 ");
    out.push_str(&"Goroutine Summary".bold().to_string());
    out.push_str("\n---------------------------------------------------\n");
    out.push_str(&format!(
        "Goroutines: {} visible of {} in {} stacks\n",
        matches.to_string().bold(),
        total,
        stacks
    ));
    if !collection.filter().is_empty() {
        out.push_str(&format!("Filter:     {}\n", collection.filter()).dimmed().to_string());
    }
    out.push_str("---------------------------------------------------\n");
    out
}

fn render_files(collection: &Collection) -> String {
    let stats = collection.file_statistics();
    if stats.len() < 2 {
        return String::new();
    }

    let mut out = String::from("\nFiles:\n");
    for (name, counts) in &stats {
        out.push_str(&format!("  {:>6} / {:<6} {}\n", counts.matches, counts.total, name));
    }
    out
}

fn render_states(collection: &Collection) -> String {
    let mut states: Vec<_> = collection.state_statistics().into_iter().collect();
    if states.is_empty() {
        return String::new();
    }
    states.sort_by(|a, b| b.1.total.cmp(&a.1.total).then_with(|| a.0.cmp(&b.0)));

    let mut out = String::from("\nStates:\n");
    for (state, counts) in states {
        out.push_str(&format!(
            "  {:>6} / {:<6} {}\n",
            counts.matches,
            counts.total,
            state.cyan()
        ));
    }
    out
}

fn render_top_stacks(collection: &Collection, top_n: usize) -> String {
    let stacks = top_stacks(collection, top_n);
    if stacks.is_empty() {
        return format!("\n{}\n", "No goroutines match the filter".yellow());
    }

    let mut out = String::from("\nTop Stacks:\n");
    for stack in stacks {
        out.push_str(&format!(
            "  {:>6}  {} {}{}\n",
            stack.counts.matches,
            stack.name.bold(),
            format!("[{}]", stack.category).dimmed(),
            render_wait(stack)
        ));
    }
    out
}

fn render_wait(stack: &Stack) -> String {
    let counts = &stack.counts;
    if !counts.min_matching_wait.is_finite() {
        return String::new();
    }
    let (min, max) = (counts.min_matching_wait, counts.max_matching_wait);
    let text = if min == max {
        format!(" {} min", min)
    } else {
        format!(" {}-{} min", min, max)
    };
    text.yellow().to_string()
}
