//! Compiled decode-time settings: trim prefixes, name extraction and the
//! archive entry pattern.

use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;

use super::schema::Frame;
use crate::utils::config::DEFAULT_ARCHIVE_ENTRY_PATTERN;
use crate::utils::error::SettingsError;
use crate::utils::settings::Settings;

static DEFAULT_ARCHIVE_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(DEFAULT_ARCHIVE_ENTRY_PATTERN).expect("default entry pattern is valid"));

/// Immutable per-call decode configuration
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    pub function_trim_prefixes: Vec<String>,
    pub file_trim_prefixes: Vec<String>,
    pub name_extraction: Vec<(Regex, String)>,
    pub archive_entry_pattern: Regex,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            function_trim_prefixes: Vec::new(),
            file_trim_prefixes: Vec::new(),
            name_extraction: Vec::new(),
            archive_entry_pattern: DEFAULT_ARCHIVE_ENTRY.clone(),
        }
    }
}

impl DecodeOptions {
    /// Compile decode options from settings
    ///
    /// An invalid name extraction pattern is dropped with a warning. An
    /// invalid archive entry pattern is an error since it would silently
    /// select nothing.
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        let name_extraction = settings
            .name_extraction
            .iter()
            .filter_map(|rule| match Regex::new(&rule.pattern) {
                Ok(re) => Some((re, rule.replacement.clone())),
                Err(e) => {
                    warn!("Dropping name extraction pattern '{}': {}", rule.pattern, e);
                    None
                }
            })
            .collect();

        Ok(Self {
            function_trim_prefixes: settings.function_trim_prefixes.clone(),
            file_trim_prefixes: settings.file_trim_prefixes.clone(),
            name_extraction,
            archive_entry_pattern: Regex::new(&settings.archive_entry_pattern)?,
        })
    }

    /// Build a frame, stripping the first matching trim prefix from its
    /// function and file
    pub fn frame(&self, function: &str, file: &str, line: u32) -> Frame {
        Frame::new(
            strip_first_prefix(function, &self.function_trim_prefixes),
            strip_first_prefix(file, &self.file_trim_prefixes),
            line,
        )
    }

    /// Re-apply trim prefixes to an already built frame
    pub fn trim(&self, frame: Frame) -> Frame {
        if self.function_trim_prefixes.is_empty() && self.file_trim_prefixes.is_empty() {
            return frame;
        }
        self.frame(&frame.function, &frame.file, frame.line)
    }

    /// Try each extraction rule in order against `lines`; the first rule
    /// producing a non-empty substitution wins
    pub fn extract_name<'a, I>(&self, lines: I) -> Option<String>
    where
        I: IntoIterator<Item = &'a str>,
        I::IntoIter: Clone,
    {
        let lines = lines.into_iter();
        for (pattern, template) in &self.name_extraction {
            for line in lines.clone() {
                let Some(caps) = pattern.captures(line) else {
                    continue;
                };
                let mut name = String::new();
                caps.expand(template, &mut name);
                let name = name.trim();
                if !name.is_empty() {
                    return Some(name.to_string());
                }
            }
        }
        None
    }
}

fn strip_first_prefix<'a>(value: &'a str, prefixes: &[String]) -> &'a str {
    prefixes
        .iter()
        .find_map(|prefix| value.strip_prefix(prefix.as_str()))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::settings::NameExtractionRule;

    #[test]
    fn test_trim_prefixes() {
        let options = DecodeOptions {
            function_trim_prefixes: vec!["github.com/acme/".to_string()],
            file_trim_prefixes: vec!["/home/build/".to_string()],
            ..Default::default()
        };

        let frame = options.frame("github.com/acme/server.Run", "/home/build/server.go", 7);
        assert_eq!(frame.function, "server.Run");
        assert_eq!(frame.file, "server.go");
        assert_eq!(frame.line, 7);
    }

    #[test]
    fn test_extract_name_first_non_empty_rule_wins() {
        let settings = Settings {
            name_extraction: vec![
                NameExtractionRule {
                    pattern: r"^node: ()$".to_string(),
                    replacement: "$1".to_string(),
                },
                NameExtractionRule {
                    pattern: r"^host=(\S+)".to_string(),
                    replacement: "host $1".to_string(),
                },
            ],
            ..Default::default()
        };
        let options = DecodeOptions::from_settings(&settings).unwrap();

        let lines = ["node: ", "host=db-1 pid=4"];
        assert_eq!(options.extract_name(lines), Some("host db-1".to_string()));
    }

    #[test]
    fn test_invalid_extraction_pattern_is_dropped() {
        let settings = Settings {
            name_extraction: vec![NameExtractionRule {
                pattern: "(".to_string(),
                replacement: "$1".to_string(),
            }],
            ..Default::default()
        };
        let options = DecodeOptions::from_settings(&settings).unwrap();
        assert!(options.name_extraction.is_empty());
    }
}
