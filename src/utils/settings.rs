//! User settings: trim prefixes, title/category rules and name extraction.
//!
//! Settings are plain data loaded from TOML. Decoders and the collection never
//! read them directly; they consume the compiled snapshots
//! [`DecodeOptions`](crate::parser::DecodeOptions) and
//! [`RuleSet`](crate::rules::RuleSet) derived from them.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::config::{DEFAULT_APP_PACKAGE, DEFAULT_ARCHIVE_ENTRY_PATTERN};
use super::error::SettingsError;

/// Complete settings surface
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Top-level application package; functions in it are never stdlib
    pub app_package: String,

    /// Prefixes stripped from every function name at import time
    pub function_trim_prefixes: Vec<String>,

    /// Prefixes stripped from every file path at import time
    pub file_trim_prefixes: Vec<String>,

    /// Ordered title rules (`skip:`, `trim:`, `fold:`, `find:`, `foldstdlib:`)
    pub title_rules: Vec<String>,

    /// Ordered category rules (`skip:`, `match:`)
    pub category_rules: Vec<String>,

    /// Patterns that derive a display name from file headers or profile comments
    pub name_extraction: Vec<NameExtractionRule>,

    /// Regex selecting which archive entries are decoded
    pub archive_entry_pattern: String,
}

/// One `(pattern, replacement-template)` name extraction rule
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NameExtractionRule {
    pub pattern: String,
    pub replacement: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_package: DEFAULT_APP_PACKAGE.to_string(),
            function_trim_prefixes: Vec::new(),
            file_trim_prefixes: Vec::new(),
            title_rules: default_title_rules(),
            category_rules: default_category_rules(),
            name_extraction: vec![NameExtractionRule {
                pattern: r"^# name: (.+)$".to_string(),
                replacement: "$1".to_string(),
            }],
            archive_entry_pattern: DEFAULT_ARCHIVE_ENTRY_PATTERN.to_string(),
        }
    }
}

fn default_title_rules() -> Vec<String> {
    [
        "skip:runtime.gopark",
        "skip:runtime.goparkunlock",
        "skip:runtime.chanrecv",
        "skip:runtime.chansend",
        "skip:runtime.selectgo",
        "skip:runtime.semacquire",
        "skip:runtime.notetsleepg",
        "skip:sync.runtime_",
        "skip:internal/poll.runtime_pollWait",
        "foldstdlib:sync.(*Mutex).Lock->mutex",
        "foldstdlib:sync.(*RWMutex).Lock->rwmutex",
        "foldstdlib:sync.(*RWMutex).RLock->rwmutex",
        "foldstdlib:sync.(*WaitGroup).Wait->waitgroup",
        "foldstdlib:sync.(*Cond).Wait->cond",
        "foldstdlib:internal/poll.->io",
        "foldstdlib:net.->net",
        "foldstdlib:time.Sleep->sleep",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_category_rules() -> Vec<String> {
    ["skip:runtime.", "skip:sync.", "skip:internal/"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Settings {
    /// Render the settings as TOML (used by the `settings` command)
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Load settings from a TOML file
///
/// Missing keys fall back to [`Settings::default`].
///
/// # Errors
/// * `SettingsError::Io` - If file cannot be read
/// * `SettingsError::Parse` - If TOML is invalid
///
/// # Example
/// ```ignore
/// let settings = load_settings("goroutine-trace.toml")?;
/// ```
pub fn load_settings(path: impl AsRef<Path>) -> Result<Settings, SettingsError> {
    let contents = fs::read_to_string(path)?;
    let settings: Settings = toml::from_str(&contents)?;
    Ok(settings)
}
