//! Decoder for raw per-goroutine text dumps.
//!
//! Handles the output of `runtime.Stack(buf, true)`, `debug=2` goroutine
//! profiles and panic tracebacks:
//!
//! ```text
//! goroutine 7 [select, 5 minutes, locked to thread, "job":"sync, fast"]:
//! main.worker(0xc000010000)
//!     /app/main.go:42 +0x2c
//! created by main.start in goroutine 1
//!     /app/main.go:20 +0x1d
//! ```
//!
//! Parsing is line oriented and forgiving: lines that match nothing are
//! skipped and a dump truncated mid-block keeps what was parsed so far.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use super::options::DecodeOptions;
use super::schema::{DecodedFile, DecodedUnit, DumpFormat, Frame, GroupBuilder};
use crate::utils::config::{STATE_ALIASES, STATE_FLAGS, UNKNOWN_FILE, UNKNOWN_STATE};
use crate::utils::error::DecodeError;

static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^goroutine (\d+)(?: [^\[]*)?\[(.*)\]:\s*$").expect("header pattern is valid")
});

static CREATED_BY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^created by (\S+)(?: in goroutine (\d+))?\s*$").expect("creator pattern is valid")
});

static CALL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\S.*)\((.*)\)\s*$").expect("call pattern is valid"));

static LOCATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\t| {4})\s*(.+):(\d+)(?: \+0x[0-9a-fA-F]+)?(?: \w+=\S+)*\s*$")
        .expect("location pattern is valid")
});

static WAIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+) minutes?$").expect("wait pattern is valid"));

static QUOTED_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^"((?:[^"\\]|\\.)*)"\s*:\s*"((?:[^"\\]|\\.)*)"$"#)
        .expect("label pattern is valid")
});

/// Parsed contents of the bracketed part of a goroutine header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSpec {
    pub state: String,
    pub wait_minutes: Option<u32>,
    pub labels: BTreeSet<String>,
}

/// Goroutine block being accumulated
#[derive(Debug)]
struct PendingGoroutine {
    id: String,
    spec: StateSpec,
    creator_id: Option<String>,
    trace: Vec<Frame>,
    /// Index of the frame that the next location line belongs to
    awaiting_location: Option<usize>,
}

impl PendingGoroutine {
    fn new(id: String, spec: StateSpec) -> Self {
        Self {
            id,
            spec,
            creator_id: None,
            trace: Vec::new(),
            awaiting_location: None,
        }
    }

    fn push_frame(&mut self, function: &str) {
        self.trace.push(Frame::new(function, UNKNOWN_FILE, 0));
        self.awaiting_location = Some(self.trace.len() - 1);
    }

    fn set_location(&mut self, file: &str, line: u32) -> bool {
        let Some(index) = self.awaiting_location.take() else {
            return false;
        };
        let frame = &mut self.trace[index];
        frame.file = file.to_string();
        frame.line = line;
        true
    }

    fn flush(self, builder: &mut GroupBuilder, options: &DecodeOptions) {
        let trace = self.trace.into_iter().map(|f| options.trim(f)).collect();
        let unit = DecodedUnit {
            id: self.id,
            wait_minutes: self.spec.wait_minutes,
            creator_id: self.creator_id,
        };
        builder.add(trace, self.spec.state, self.spec.labels, [unit]);
    }
}

/// Decode a raw goroutine dump
///
/// **Public** - used directly and for every matching archive entry
///
/// # Arguments
/// * `text` - Full dump text
/// * `options` - Trim prefixes and name extraction rules
///
/// # Returns
/// Groups of identical goroutines, in first-seen order
///
/// # Errors
/// Never fails on malformed lines (they are skipped); the `Result` keeps the
/// signature aligned with the other decoders.
pub fn decode_goroutine_dump(
    text: &str,
    options: &DecodeOptions,
) -> Result<DecodedFile, DecodeError> {
    let mut builder = GroupBuilder::new();
    let mut header_lines: Vec<&str> = Vec::new();
    let mut current: Option<PendingGoroutine> = None;
    let mut seen_block = false;
    let mut skipped = 0usize;

    for line in text.lines() {
        if let Some(caps) = HEADER_RE.captures(line) {
            if let Some(done) = current.take() {
                done.flush(&mut builder, options);
            }
            seen_block = true;
            current = Some(PendingGoroutine::new(
                caps[1].to_string(),
                parse_state_spec(&caps[2]),
            ));
            continue;
        }

        let Some(goroutine) = current.as_mut() else {
            if !seen_block && !line.trim().is_empty() {
                header_lines.push(line);
            } else if !line.trim().is_empty() {
                skipped += 1;
            }
            continue;
        };

        if line.trim().is_empty() {
            if let Some(done) = current.take() {
                done.flush(&mut builder, options);
            }
            continue;
        }

        if let Some(caps) = CREATED_BY_RE.captures(line) {
            goroutine.push_frame(&caps[1]);
            goroutine.creator_id = caps.get(2).map(|m| m.as_str().to_string());
            continue;
        }

        if let Some(caps) = LOCATION_RE.captures(line) {
            let line_no = caps[2].parse::<u32>().unwrap_or(0);
            if !goroutine.set_location(&caps[1], line_no) {
                skipped += 1;
            }
            continue;
        }

        if let Some(caps) = CALL_RE.captures(line) {
            goroutine.push_frame(&caps[1]);
            continue;
        }

        // "...additional frames elided...", "exit status 2", etc.
        skipped += 1;
    }

    if let Some(done) = current.take() {
        done.flush(&mut builder, options);
    }

    let extracted_name = options.extract_name(header_lines.iter().copied());
    let file = builder.finish(DumpFormat::GoroutineDump, extracted_name, skipped);

    debug!(
        "Decoded goroutine dump: {} goroutines in {} groups ({} lines skipped)",
        file.stats.units, file.stats.groups, file.stats.skipped_lines
    );

    Ok(file)
}

/// Parse the bracketed state spec of a goroutine header
///
/// The first plain token is the state (normalized through
/// [`normalize_state`]); `N minutes` sets the wait time; known flags and
/// quoted `"key":"value"` pairs become labels.
pub fn parse_state_spec(spec: &str) -> StateSpec {
    let mut state: Option<String> = None;
    let mut wait_minutes = None;
    let mut labels = BTreeSet::new();

    for part in split_quoted(spec, ',') {
        if part.is_empty() {
            continue;
        }

        if part.starts_with('"') {
            match QUOTED_LABEL_RE.captures(&part) {
                Some(caps) => {
                    labels.insert(format!("{}={}", unescape(&caps[1]), unescape(&caps[2])));
                }
                None => {
                    labels.insert(part);
                }
            }
            continue;
        }

        if let Some(caps) = WAIT_RE.captures(&part) {
            wait_minutes = caps[1].parse::<u32>().ok();
            continue;
        }

        if STATE_FLAGS.contains(&part.as_str()) || state.is_some() {
            labels.insert(part);
            continue;
        }

        state = Some(normalize_state(&part).to_string());
    }

    StateSpec {
        state: state.unwrap_or_else(|| UNKNOWN_STATE.to_string()),
        wait_minutes,
        labels,
    }
}

/// Map lock/wait-group style states onto their canonical names
pub fn normalize_state(state: &str) -> &str {
    STATE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == state)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(state)
}

/// Split on `separator` outside of double quotes, trimming each part
fn split_quoted(input: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in input.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c == separator && !in_quotes => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            c => current.push(c),
        }
    }
    parts.push(current.trim().to_string());
    parts
}

fn unescape(value: &str) -> String {
    value.replace("\\\"", "\"").replace("\\\\", "\\")
}
