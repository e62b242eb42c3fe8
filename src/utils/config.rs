//! Configuration constants shared by decoders, rules and the collection.

/// Current JSON report schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Name given to a stack whose trace has no frames
pub const EMPTY_STACK_NAME: &str = "empty";

/// Category given to a stack whose trace has no frames
pub const FRAMELESS_CATEGORY: &str = "<frameless stack>";

/// Separator placed between a stack name and its fold/find suffixes
pub const SUFFIX_SEPARATOR: &str = " → ";

/// State used when a format carries no state information
pub const UNKNOWN_STATE: &str = "unknown";

/// Placeholder file for frames (or creator lines) without a location line
pub const UNKNOWN_FILE: &str = "unknown";

/// Default top-level application package used by the stdlib classifier
pub const DEFAULT_APP_PACKAGE: &str = "main";

/// Default archive entry pattern: a `stacks.txt` at any depth
pub const DEFAULT_ARCHIVE_ENTRY_PATTERN: &str = r"(^|/)stacks\.txt$";

// Synthetic sample labels carried by binary goroutine profiles
pub const GOROUTINE_ID_LABEL: &str = "goroutine";
pub const CREATOR_ID_LABEL: &str = "created_by";
pub const STATE_LABEL: &str = "state";
pub const WAIT_MINUTES_LABEL: &str = "wait_minutes";

/// Raw dump state spellings and the state they normalize to
pub const STATE_ALIASES: &[(&str, &str)] = &[
    ("sync.Mutex.Lock", "semacquire"),
    ("sync.RWMutex.Lock", "semacquire"),
    ("sync.RWMutex.RLock", "semacquire"),
    ("sync.WaitGroup.Wait", "wait"),
    ("sync.Cond.Wait", "wait"),
];

/// Largest goroutine count a single legacy block or profile sample may claim
pub const MAX_UNITS_PER_SAMPLE: u64 = 1_000_000;

/// Header flags that are kept verbatim as group labels
pub const STATE_FLAGS: &[&str] = &["locked to thread", "bubble", "durable", "leaked", "scan"];

/// Blocking runtime primitives and the state they imply when they are the
/// top frame of a profile sample without an explicit state label
pub const BLOCKING_FRAME_STATES: &[(&str, &str)] = &[
    ("runtime.gopark", "parked"),
    ("runtime.goparkunlock", "parked"),
    ("runtime.chanrecv1", "chan receive"),
    ("runtime.chanrecv2", "chan receive"),
    ("runtime.chansend1", "chan send"),
    ("runtime.selectgo", "select"),
    ("runtime.block", "select (no cases)"),
    ("runtime.semacquire1", "semacquire"),
    ("sync.runtime_Semacquire", "semacquire"),
    ("sync.runtime_SemacquireMutex", "semacquire"),
    ("sync.runtime_SemacquireRWMutex", "semacquire"),
    ("sync.runtime_SemacquireRWMutexR", "semacquire"),
    ("sync.runtime_SemacquireWaitGroup", "semacquire"),
];
