//! Dump decoding.
//!
//! This module handles:
//! - Raw goroutine dumps (`goroutine N [state]:` blocks)
//! - Legacy aggregated profiles (`count @ addr...`)
//! - Binary goroutine profiles (gzip + protobuf)
//! - Zip archives of raw dumps
//! - Format detection for uploads

pub mod archive;
pub mod goroutine_dump;
pub mod legacy;
pub mod options;
pub mod pprof;
pub mod schema;

// Re-export main types
pub use archive::{decode_archive, ArchiveEntry};
pub use goroutine_dump::{decode_goroutine_dump, normalize_state, parse_state_spec, StateSpec};
pub use legacy::decode_legacy;
pub use options::DecodeOptions;
pub use pprof::decode_profile;
pub use schema::{DecodeStats, DecodedFile, DecodedGroup, DecodedUnit, DumpFormat, Frame};

use crate::utils::error::DecodeError;
use log::info;

/// One decoded file from an upload; archives yield several
#[derive(Debug)]
pub struct DecodedUpload {
    pub file_name: String,
    pub result: Result<DecodedFile, DecodeError>,
}

/// Detect the format of an input from its leading bytes and content
pub fn detect_format(bytes: &[u8]) -> DumpFormat {
    if archive::is_zip(bytes) {
        return DumpFormat::Archive;
    }
    if pprof::is_gzip(bytes) {
        return DumpFormat::Profile;
    }
    match std::str::from_utf8(bytes) {
        Ok(text) if legacy::looks_like_legacy(text) => DumpFormat::Legacy,
        Ok(_) => DumpFormat::GoroutineDump,
        Err(_) => DumpFormat::Profile,
    }
}

/// Decode a single text dump, choosing between the raw and legacy formats
pub fn decode_text(text: &str, options: &DecodeOptions) -> Result<DecodedFile, DecodeError> {
    if legacy::looks_like_legacy(text) {
        decode_legacy(text, options)
    } else {
        decode_goroutine_dump(text, options)
    }
}

/// Decode one non-archive input
///
/// # Errors
/// * `DecodeError::InvalidFormat` - The input is a zip archive; use
///   [`decode_upload`] for those
pub fn decode(bytes: &[u8], options: &DecodeOptions) -> Result<DecodedFile, DecodeError> {
    match detect_format(bytes) {
        DumpFormat::Archive => Err(DecodeError::InvalidFormat(
            "zip archives hold several dumps; decode them as an upload".to_string(),
        )),
        DumpFormat::Profile => decode_profile(bytes, options),
        DumpFormat::Legacy | DumpFormat::GoroutineDump => {
            decode_text(&String::from_utf8_lossy(bytes), options)
        }
    }
}

/// Decode an uploaded file of any supported format
///
/// **Public** - main entry point for the load pipeline
///
/// Archive entries are named `<upload>/<entry path>`. A failure is reported
/// per decoded file and never hides the results of other entries.
pub fn decode_upload(bytes: &[u8], file_name: &str, options: &DecodeOptions) -> Vec<DecodedUpload> {
    let format = detect_format(bytes);
    info!("Decoding {} as {:?}", file_name, format);

    if format != DumpFormat::Archive {
        return vec![DecodedUpload {
            file_name: file_name.to_string(),
            result: decode(bytes, options),
        }];
    }

    match decode_archive(bytes, options) {
        Ok(entries) => entries
            .into_iter()
            .map(|entry| DecodedUpload {
                file_name: format!("{}/{}", file_name, entry.path),
                result: entry.result,
            })
            .collect(),
        Err(e) => vec![DecodedUpload {
            file_name: file_name.to_string(),
            result: Err(e),
        }],
    }
}
