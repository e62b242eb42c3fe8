//! Zip archive extraction.
//!
//! Support bundles ship one goroutine dump per node, e.g.
//! `nodes/1/stacks.txt`. Every entry whose path matches the configured
//! pattern is decoded independently with the raw dump decoder; other entries
//! are ignored.

use log::{debug, warn};
use std::io::{Cursor, Read};
use zip::result::ZipError;
use zip::ZipArchive;

use super::goroutine_dump::decode_goroutine_dump;
use super::options::DecodeOptions;
use super::schema::DecodedFile;
use crate::utils::error::DecodeError;

const ZIP_MAGIC: [u8; 4] = [b'P', b'K', 0x03, 0x04];

/// One selected archive entry and its decode outcome
#[derive(Debug)]
pub struct ArchiveEntry {
    pub path: String,
    pub result: Result<DecodedFile, DecodeError>,
}

/// Check for the zip local file header magic
pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(&ZIP_MAGIC)
}

/// Decode every matching entry of a zip archive
///
/// # Errors
/// * `DecodeError::Archive` - The archive itself is unreadable. Failures of
///   individual entries are reported in their [`ArchiveEntry::result`].
pub fn decode_archive(
    bytes: &[u8],
    options: &DecodeOptions,
) -> Result<Vec<ArchiveEntry>, DecodeError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = Vec::new();

    for index in 0..archive.len() {
        let mut file = match archive.by_index(index) {
            Ok(file) => file,
            Err(e) => {
                warn!("Skipping unreadable archive entry #{}: {}", index, e);
                continue;
            }
        };

        if file.is_dir() {
            continue;
        }

        let path = file.name().to_string();
        if !options.archive_entry_pattern.is_match(&path) {
            debug!("Ignoring archive entry {}", path);
            continue;
        }

        let mut buf = Vec::new();
        let result = match file.read_to_end(&mut buf) {
            Ok(_) => decode_goroutine_dump(&String::from_utf8_lossy(&buf), options),
            Err(e) => Err(DecodeError::Archive(ZipError::Io(e))),
        };
        entries.push(ArchiveEntry { path, result });
    }

    debug!("Archive yielded {} matching entries", entries.len());
    Ok(entries)
}
