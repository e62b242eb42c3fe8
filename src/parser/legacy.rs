//! Decoder for the legacy aggregated goroutine profile (`debug=1`).
//!
//! ```text
//! goroutine profile: total 3
//! 2 @ 0x43e1a6 0x40a5d4 0x4a1b2c
//! # labels: {"handler":"api"}
//! #	0x4a1b2b	main.worker+0x2b	/app/main.go:42
//! ```
//!
//! The format has no goroutine ids, so each counted goroutine gets a
//! sequential synthetic id.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use super::options::DecodeOptions;
use super::schema::{
    checked_unit_count, DecodedFile, DecodedUnit, DumpFormat, Frame, GroupBuilder, SyntheticIds,
};
use crate::utils::config::UNKNOWN_STATE;
use crate::utils::error::DecodeError;

static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+) @(?: 0x[0-9a-fA-F]+)*\s*$").expect("legacy header pattern is valid")
});

static LABELS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^# labels:?\s*(\{.*\})\s*$").expect("legacy labels pattern is valid")
});

static FRAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#\s+0x[0-9a-fA-F]+\s+(\S+?)(?:\+0x[0-9a-fA-F]+)?\s+(.+):(\d+)\s*$")
        .expect("legacy frame pattern is valid")
});

/// Quick check used by format detection
pub fn looks_like_legacy(text: &str) -> bool {
    text.lines().any(|line| HEADER_RE.is_match(line))
}

#[derive(Debug)]
struct PendingBlock {
    count: usize,
    labels: BTreeSet<String>,
    trace: Vec<Frame>,
}

impl PendingBlock {
    fn flush(self, builder: &mut GroupBuilder, ids: &mut SyntheticIds) {
        let units: Vec<DecodedUnit> = (0..self.count)
            .map(|_| DecodedUnit {
                id: ids.next_id(),
                wait_minutes: None,
                creator_id: None,
            })
            .collect();
        builder.add(self.trace, UNKNOWN_STATE.to_string(), self.labels, units);
    }
}

/// Decode a legacy aggregated goroutine profile
///
/// **Public** - called by format detection
///
/// # Errors
/// * `DecodeError::InvalidLabels` - A `# labels` line is not a JSON object.
///   This fails the whole input rather than skipping the block.
/// * `DecodeError::InvalidFormat` - A block count exceeds
///   [`MAX_UNITS_PER_SAMPLE`](crate::utils::config::MAX_UNITS_PER_SAMPLE)
pub fn decode_legacy(text: &str, options: &DecodeOptions) -> Result<DecodedFile, DecodeError> {
    let mut builder = GroupBuilder::new();
    let mut ids = SyntheticIds::new();
    let mut header_lines: Vec<&str> = Vec::new();
    let mut current: Option<PendingBlock> = None;
    let mut skipped = 0usize;

    for line in text.lines() {
        if let Some(caps) = HEADER_RE.captures(line) {
            if let Some(done) = current.take() {
                done.flush(&mut builder, &mut ids);
            }
            // Digits only, so parsing fails only on overflow
            let count = caps[1].parse::<u64>().unwrap_or(u64::MAX);
            current = Some(PendingBlock {
                count: checked_unit_count(count)?,
                labels: BTreeSet::new(),
                trace: Vec::new(),
            });
            continue;
        }

        if line.trim().is_empty() {
            if let Some(done) = current.take() {
                done.flush(&mut builder, &mut ids);
            }
            continue;
        }

        let Some(block) = current.as_mut() else {
            header_lines.push(line);
            continue;
        };

        if let Some(caps) = LABELS_RE.captures(line) {
            block.labels = parse_labels(&caps[1])?;
            continue;
        }

        if let Some(caps) = FRAME_RE.captures(line) {
            let line_no = caps[3].parse::<u32>().unwrap_or(0);
            block.trace.push(options.frame(&caps[1], &caps[2], line_no));
            continue;
        }

        skipped += 1;
    }

    if let Some(done) = current.take() {
        done.flush(&mut builder, &mut ids);
    }

    let extracted_name = options.extract_name(header_lines.iter().copied());
    let file = builder.finish(DumpFormat::Legacy, extracted_name, skipped);

    debug!(
        "Decoded legacy profile: {} goroutines in {} groups",
        file.stats.units, file.stats.groups
    );

    Ok(file)
}

/// Parse a `# labels` JSON object into `key=value` labels
fn parse_labels(json: &str) -> Result<BTreeSet<String>, DecodeError> {
    let map: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(json).map_err(|e| DecodeError::InvalidLabels(e.to_string()))?;

    Ok(map
        .into_iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(s) => format!("{}={}", key, s),
            other => format!("{}={}", key, other),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labels() {
        let labels = parse_labels(r#"{"handler":"api","shard":3}"#).unwrap();
        assert!(labels.contains("handler=api"));
        assert!(labels.contains("shard=3"));
    }

    #[test]
    fn test_malformed_labels_fail() {
        let err = parse_labels(r#"{"handler":"#).unwrap_err();
        assert!(err.to_string().starts_with("failed to parse labels"));
    }

    #[test]
    fn test_looks_like_legacy() {
        assert!(looks_like_legacy("goroutine profile: total 1\n1 @ 0x1 0x2\n"));
        assert!(!looks_like_legacy("goroutine 1 [running]:\nmain.main()\n"));
    }
}
