use std::path::PathBuf;

/// Arguments for the analyze command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct AnalyzeArgs {
    /// Dumps, profiles or archives to load, in order
    pub files: Vec<PathBuf>,

    /// Settings TOML (defaults apply when absent)
    pub settings: Option<PathBuf>,

    /// Filter query applied after loading
    pub filter: Option<String>,

    /// Number of stacks listed in the summary and per report category
    pub top: usize,

    /// Output path for the JSON report (optional)
    pub output: Option<PathBuf>,

    /// Print text summary to stdout
    pub print_summary: bool,
}

impl Default for AnalyzeArgs {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            settings: None,
            filter: None,
            top: 20,
            output: None,
            print_summary: false,
        }
    }
}

/// Load outcome of one decoded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    /// Name the file was uploaded under (archive entries: `archive/entry`)
    pub upload_name: String,

    /// Name registered in the collection, if the file loaded
    pub file_name: Option<String>,
    pub units: usize,
    pub error: Option<String>,
}

impl FileStatus {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
