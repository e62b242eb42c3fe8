//! Decoder for binary goroutine profiles (gzip-wrapped protobuf).
//!
//! Only the parts of `perftools.profiles.Profile` needed to rebuild call
//! stacks are declared; prost skips every other field.
//!
//! Goroutine metadata travels as synthetic sample labels (see
//! [`crate::utils::config`]). They are lifted out of the label set into unit
//! metadata, and the remaining labels become group labels.

use flate2::read::GzDecoder;
use log::{debug, warn};
use prost::Message;
use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::io::Read;

use super::options::DecodeOptions;
use super::schema::{
    checked_unit_count, DecodedFile, DecodedUnit, DumpFormat, Frame, GroupBuilder, SyntheticIds,
};
use crate::utils::config::{
    BLOCKING_FRAME_STATES, CREATOR_ID_LABEL, GOROUTINE_ID_LABEL, STATE_LABEL, UNKNOWN_STATE,
    WAIT_MINUTES_LABEL,
};
use crate::utils::error::DecodeError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Clone, PartialEq, Message)]
pub struct Profile {
    #[prost(message, repeated, tag = "1")]
    pub sample_type: Vec<ValueType>,
    #[prost(message, repeated, tag = "2")]
    pub sample: Vec<Sample>,
    #[prost(message, repeated, tag = "4")]
    pub location: Vec<Location>,
    #[prost(message, repeated, tag = "5")]
    pub function: Vec<Function>,
    #[prost(string, repeated, tag = "6")]
    pub string_table: Vec<String>,
    #[prost(int64, repeated, tag = "13")]
    pub comment: Vec<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ValueType {
    #[prost(int64, tag = "1")]
    pub r#type: i64,
    #[prost(int64, tag = "2")]
    pub unit: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Sample {
    /// Leaf first
    #[prost(uint64, repeated, tag = "1")]
    pub location_id: Vec<u64>,
    #[prost(int64, repeated, tag = "2")]
    pub value: Vec<i64>,
    #[prost(message, repeated, tag = "3")]
    pub label: Vec<Label>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Label {
    #[prost(int64, tag = "1")]
    pub key: i64,
    #[prost(int64, tag = "2")]
    pub str: i64,
    #[prost(int64, tag = "3")]
    pub num: i64,
    #[prost(int64, tag = "4")]
    pub num_unit: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Location {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(uint64, tag = "2")]
    pub mapping_id: u64,
    #[prost(uint64, tag = "3")]
    pub address: u64,
    /// Innermost inlined call first
    #[prost(message, repeated, tag = "4")]
    pub line: Vec<Line>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Line {
    #[prost(uint64, tag = "1")]
    pub function_id: u64,
    #[prost(int64, tag = "2")]
    pub line: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Function {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(int64, tag = "2")]
    pub name: i64,
    #[prost(int64, tag = "3")]
    pub system_name: i64,
    #[prost(int64, tag = "4")]
    pub filename: i64,
    #[prost(int64, tag = "5")]
    pub start_line: i64,
}

/// Synthetic goroutine metadata lifted out of a sample's labels
#[derive(Debug, Default)]
struct SampleMetadata {
    goroutine_id: Option<String>,
    creator_id: Option<String>,
    state: Option<String>,
    wait_minutes: Option<u32>,
    labels: BTreeSet<String>,
}

/// Check for the gzip magic bytes
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Decode a binary goroutine profile
///
/// **Public** - main entry point for binary input
///
/// # Arguments
/// * `bytes` - Profile bytes, gzip-wrapped or raw protobuf
/// * `options` - Trim prefixes and name extraction rules
///
/// # Errors
/// * `DecodeError::Decompress` - Truncated or corrupt gzip stream
/// * `DecodeError::Protobuf` - Corrupt protobuf message
/// * `DecodeError::InvalidFormat` - A sample without goroutine id claims more
///   than [`MAX_UNITS_PER_SAMPLE`](crate::utils::config::MAX_UNITS_PER_SAMPLE)
///   goroutines
pub fn decode_profile(bytes: &[u8], options: &DecodeOptions) -> Result<DecodedFile, DecodeError> {
    let raw: Cow<'_, [u8]> = if is_gzip(bytes) {
        let mut decoder = GzDecoder::new(bytes);
        let mut buf = Vec::new();
        decoder.read_to_end(&mut buf)?;
        Cow::Owned(buf)
    } else {
        Cow::Borrowed(bytes)
    };

    let profile = Profile::decode(raw.as_ref())?;
    let table = StringTable(&profile.string_table);

    let functions: HashMap<u64, &Function> =
        profile.function.iter().map(|f| (f.id, f)).collect();
    let locations: HashMap<u64, &Location> =
        profile.location.iter().map(|l| (l.id, l)).collect();

    let mut builder = GroupBuilder::new();
    let mut ids = SyntheticIds::new();
    let mut dangling = 0usize;

    for sample in &profile.sample {
        let mut trace = Vec::new();
        for location_id in &sample.location_id {
            let Some(location) = locations.get(location_id) else {
                dangling += 1;
                continue;
            };
            for line in &location.line {
                let Some(function) = functions.get(&line.function_id) else {
                    dangling += 1;
                    continue;
                };
                trace.push(options.frame(
                    table.get(function.name),
                    table.get(function.filename),
                    u32::try_from(line.line).unwrap_or(0),
                ));
            }
        }

        let metadata = extract_metadata(sample, &table);
        let state = match metadata.state {
            Some(state) => state,
            None => synthesize_state(&mut trace).unwrap_or_else(|| UNKNOWN_STATE.to_string()),
        };

        let units: Vec<DecodedUnit> = match metadata.goroutine_id {
            Some(id) => vec![DecodedUnit {
                id,
                wait_minutes: metadata.wait_minutes,
                creator_id: metadata.creator_id,
            }],
            None => {
                let value = sample.value.first().copied().unwrap_or(1);
                let count = checked_unit_count(u64::try_from(value).unwrap_or(0))?;
                (0..count)
                    .map(|_| DecodedUnit {
                        id: ids.next_id(),
                        wait_minutes: metadata.wait_minutes,
                        creator_id: metadata.creator_id.clone(),
                    })
                    .collect()
            }
        };

        if units.is_empty() {
            continue;
        }
        builder.add(trace, state, metadata.labels, units);
    }

    if dangling > 0 {
        warn!("Profile references {} unknown locations or functions", dangling);
    }

    let comments: Vec<&str> = profile.comment.iter().map(|&i| table.get(i)).collect();
    let extracted_name = options.extract_name(comments.iter().copied());
    let file = builder.finish(DumpFormat::Profile, extracted_name, 0);

    debug!(
        "Decoded goroutine profile: {} samples, {} goroutines in {} groups",
        profile.sample.len(),
        file.stats.units,
        file.stats.groups
    );

    Ok(file)
}

struct StringTable<'a>(&'a [String]);

impl<'a> StringTable<'a> {
    fn get(&self, index: i64) -> &'a str {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.0.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }
}

fn extract_metadata(sample: &Sample, table: &StringTable<'_>) -> SampleMetadata {
    let mut metadata = SampleMetadata::default();

    for label in &sample.label {
        let key = table.get(label.key);
        let text = table.get(label.str);
        match key {
            GOROUTINE_ID_LABEL => metadata.goroutine_id = Some(label.num.to_string()),
            CREATOR_ID_LABEL => metadata.creator_id = Some(label.num.to_string()),
            STATE_LABEL if !text.is_empty() => metadata.state = Some(text.to_string()),
            WAIT_MINUTES_LABEL => metadata.wait_minutes = u32::try_from(label.num).ok(),
            _ if label.str != 0 => {
                metadata.labels.insert(format!("{}={}", key, text));
            }
            _ => {
                metadata.labels.insert(format!("{}={}", key, label.num));
            }
        }
    }

    metadata
}

/// Derive a state from a blocking runtime primitive at the top of the
/// trace, dropping that frame
fn synthesize_state(trace: &mut Vec<Frame>) -> Option<String> {
    let top = trace.first()?;
    let (_, state) = BLOCKING_FRAME_STATES
        .iter()
        .find(|(function, _)| *function == top.function)?;
    trace.remove(0);
    Some(state.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesize_state_drops_frame() {
        let mut trace = vec![
            Frame::new("runtime.chanrecv1", "chan.go", 442),
            Frame::new("main.consume", "main.go", 9),
        ];
        assert_eq!(synthesize_state(&mut trace), Some("chan receive".to_string()));
        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0].function, "main.consume");
    }

    #[test]
    fn test_synthesize_state_leaves_other_frames() {
        let mut trace = vec![Frame::new("main.spin", "main.go", 3)];
        assert_eq!(synthesize_state(&mut trace), None);
        assert_eq!(trace.len(), 1);
    }

    #[test]
    fn test_string_table_out_of_range() {
        let strings = vec![String::new(), "a".to_string()];
        let table = StringTable(&strings);
        assert_eq!(table.get(1), "a");
        assert_eq!(table.get(7), "");
        assert_eq!(table.get(-1), "");
    }
}
