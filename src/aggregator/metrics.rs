//! Statistics over the collection: per-file and per-state counts, and the
//! largest visible stacks.

use serde::Serialize;
use std::collections::BTreeMap;

use super::collection::Collection;
use super::model::Stack;
use log::debug;

/// Total and visible units of one bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatCounts {
    pub total: usize,
    pub matches: usize,
}

/// Counts keyed by file name or state
pub type Statistics = BTreeMap<String, StatCounts>;

/// Count units per loaded file
///
/// **Public** - backs [`Collection::file_statistics`]
///
/// Every loaded file is present, even one that contributed no units.
pub fn file_statistics(collection: &Collection) -> Statistics {
    let mut stats: Statistics = collection
        .file_names()
        .iter()
        .map(|name| (name.clone(), StatCounts::default()))
        .collect();

    for found in collection.units() {
        let entry = stats.entry(found.unit.file_name.clone()).or_default();
        entry.total += 1;
        if found.unit.matched {
            entry.matches += 1;
        }
    }
    stats
}

/// Count units per state
///
/// **Public** - backs [`Collection::state_statistics`]
pub fn state_statistics(collection: &Collection) -> Statistics {
    let mut stats = Statistics::new();
    for found in collection.units() {
        let entry = stats.entry(found.unit.state.clone()).or_default();
        entry.total += 1;
        if found.unit.matched {
            entry.matches += 1;
        }
    }
    stats
}

/// The stacks with the most visible units
///
/// # Arguments
/// * `top_n` - Number of stacks to return
///
/// # Returns
/// Stacks with at least one visible unit, largest first; ties are broken by
/// total size, then name
pub fn top_stacks(collection: &Collection, top_n: usize) -> Vec<&Stack> {
    let mut stacks: Vec<&Stack> = collection
        .stacks()
        .filter(|stack| stack.counts.matches > 0)
        .collect();

    stacks.sort_by(|a, b| {
        b.counts
            .matches
            .cmp(&a.counts.matches)
            .then(b.counts.total.cmp(&a.counts.total))
            .then_with(|| a.name.cmp(&b.name))
    });
    stacks.truncate(top_n);

    debug!("Selected {} top stacks", stacks.len());
    stacks
}
