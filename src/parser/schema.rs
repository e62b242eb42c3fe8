//! Decoded dump data shared by every format decoder.
//!
//! Decoders produce a flat list of [`DecodedGroup`]s: one per unique
//! (trace, state, labels) combination within a single uploaded file. The
//! collection merges them across files.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::utils::config::MAX_UNITS_PER_SAMPLE;
use crate::utils::error::DecodeError;

/// A single call frame
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Frame {
    pub function: String,
    pub file: String,
    pub line: u32,
}

impl Frame {
    pub fn new(function: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        Self {
            function: function.into(),
            file: file.into(),
            line,
        }
    }
}

/// One goroutine as seen by a decoder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedUnit {
    /// Goroutine id as it appears in the dump (or a synthesized one)
    pub id: String,

    /// Minutes spent blocked, when the dump reports it
    pub wait_minutes: Option<u32>,

    /// Id of the goroutine that created this one
    pub creator_id: Option<String>,
}

/// Goroutines of one file sharing trace, state and labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedGroup {
    /// Innermost frame first
    pub trace: Vec<Frame>,
    pub state: String,
    pub labels: BTreeSet<String>,
    pub units: Vec<DecodedUnit>,
}

impl DecodedGroup {
    pub fn count(&self) -> usize {
        self.units.len()
    }
}

/// Which decoder handled an input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DumpFormat {
    /// `goroutine N [state]:` blocks
    GoroutineDump,
    /// `count @ addr...` blocks
    Legacy,
    /// gzip + protobuf goroutine profile
    Profile,
    /// zip archive of dumps
    Archive,
}

/// Counters reported alongside a decode result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeStats {
    pub units: usize,
    pub groups: usize,
    pub skipped_lines: usize,
}

/// Result of decoding one input file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedFile {
    pub format: DumpFormat,
    pub groups: Vec<DecodedGroup>,

    /// Name derived by the name extraction rules, overriding the upload name
    pub extracted_name: Option<String>,

    pub stats: DecodeStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupKey {
    trace: Vec<Frame>,
    state: String,
    labels: BTreeSet<String>,
}

/// Accumulates units into groups keyed by (trace, state, labels)
#[derive(Debug, Default)]
pub(crate) struct GroupBuilder {
    groups: Vec<DecodedGroup>,
    index: HashMap<GroupKey, usize>,
    units: usize,
}

impl GroupBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(
        &mut self,
        trace: Vec<Frame>,
        state: String,
        labels: BTreeSet<String>,
        units: impl IntoIterator<Item = DecodedUnit>,
    ) {
        let key = GroupKey {
            trace,
            state,
            labels,
        };

        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                self.groups.push(DecodedGroup {
                    trace: key.trace.clone(),
                    state: key.state.clone(),
                    labels: key.labels.clone(),
                    units: Vec::new(),
                });
                let slot = self.groups.len() - 1;
                self.index.insert(key, slot);
                slot
            }
        };

        let group = &mut self.groups[slot];
        let before = group.units.len();
        group.units.extend(units);
        self.units += group.units.len() - before;
    }

    pub(crate) fn finish(
        self,
        format: DumpFormat,
        extracted_name: Option<String>,
        skipped_lines: usize,
    ) -> DecodedFile {
        let stats = DecodeStats {
            units: self.units,
            groups: self.groups.len(),
            skipped_lines,
        };

        DecodedFile {
            format,
            groups: self.groups,
            extracted_name,
            stats,
        }
    }
}

/// Validate the goroutine count of an aggregated sample
///
/// # Errors
/// * `DecodeError::InvalidFormat` - The count exceeds [`MAX_UNITS_PER_SAMPLE`]
pub(crate) fn checked_unit_count(count: u64) -> Result<usize, DecodeError> {
    if count > MAX_UNITS_PER_SAMPLE {
        return Err(DecodeError::InvalidFormat(format!(
            "sample count {} exceeds limit of {}",
            count, MAX_UNITS_PER_SAMPLE
        )));
    }
    usize::try_from(count).map_err(|_| {
        DecodeError::InvalidFormat(format!("sample count {} does not fit in memory", count))
    })
}

/// Hands out sequential ids for formats that carry none
#[derive(Debug)]
pub(crate) struct SyntheticIds {
    next: u64,
}

impl SyntheticIds {
    pub(crate) fn new() -> Self {
        Self { next: 1 }
    }

    pub(crate) fn next_id(&mut self) -> String {
        let id = self.next;
        self.next += 1;
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: &str) -> DecodedUnit {
        DecodedUnit {
            id: id.to_string(),
            wait_minutes: None,
            creator_id: None,
        }
    }

    #[test]
    fn test_checked_unit_count() {
        assert_eq!(checked_unit_count(3).unwrap(), 3);
        assert!(checked_unit_count(MAX_UNITS_PER_SAMPLE).is_ok());
        assert!(matches!(
            checked_unit_count(MAX_UNITS_PER_SAMPLE + 1),
            Err(DecodeError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_group_builder_merges_identical_keys() {
        let trace = vec![Frame::new("main.worker", "main.go", 10)];
        let mut builder = GroupBuilder::new();
        builder.add(trace.clone(), "select".into(), BTreeSet::new(), [unit("1")]);
        builder.add(trace.clone(), "select".into(), BTreeSet::new(), [unit("2")]);
        builder.add(trace, "running".into(), BTreeSet::new(), [unit("3")]);

        let file = builder.finish(DumpFormat::GoroutineDump, None, 0);
        assert_eq!(file.groups.len(), 2);
        assert_eq!(file.groups[0].count(), 2);
        assert_eq!(file.stats.units, 3);
        assert_eq!(file.stats.groups, 2);
    }

    #[test]
    fn test_synthetic_ids_are_sequential() {
        let mut ids = SyntheticIds::new();
        assert_eq!(ids.next_id(), "1");
        assert_eq!(ids.next_id(), "2");
    }
}
