//! Nodes of the Category → Stack → FileSection → Group → Unit hierarchy.
//!
//! The tree is owned by [`Collection`](super::Collection). Nodes are read
//! freely but only mutated through the collection, because every container's
//! [`Counts`] is a cached fold over its children.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::parser::Frame;

/// Aggregated counts cached on every container
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Counts {
    /// Units below this node
    pub total: usize,

    /// Visible units (filter, forced unit or pins)
    pub matches: usize,

    /// Units satisfying the filter constraints alone
    pub filter_matches: usize,

    /// Units kept visible by a pin on themselves or an ancestor
    pub pinned: usize,

    /// `matches` as of the previous recompute
    pub prior_matches: usize,

    pub min_wait: f64,
    pub max_wait: f64,
    pub min_matching_wait: f64,
    pub max_matching_wait: f64,

    /// The set of visible descendants differs from the previous recompute
    pub visibility_changed: bool,
}

impl Default for Counts {
    fn default() -> Self {
        Self {
            total: 0,
            matches: 0,
            filter_matches: 0,
            pinned: 0,
            prior_matches: 0,
            min_wait: f64::INFINITY,
            max_wait: f64::NEG_INFINITY,
            min_matching_wait: f64::INFINITY,
            max_matching_wait: f64::NEG_INFINITY,
            visibility_changed: false,
        }
    }
}

impl Counts {
    /// Fresh counts for a recompute, remembering the previous match count
    pub(crate) fn reset(&mut self) {
        let prior_matches = self.matches;
        *self = Self {
            prior_matches,
            ..Self::default()
        };
    }

    pub(crate) fn add_unit(&mut self, unit: &Unit) {
        self.total += 1;
        if unit.matched {
            self.matches += 1;
        }
        if unit.filter_matched {
            self.filter_matches += 1;
        }
        if unit.pin_visible {
            self.pinned += 1;
        }
        if unit.matched != unit.prior_matched {
            self.visibility_changed = true;
        }
        if let Some(wait) = unit.wait_minutes {
            let wait = f64::from(wait);
            self.min_wait = self.min_wait.min(wait);
            self.max_wait = self.max_wait.max(wait);
            if unit.matched {
                self.min_matching_wait = self.min_matching_wait.min(wait);
                self.max_matching_wait = self.max_matching_wait.max(wait);
            }
        }
    }

    pub(crate) fn merge(&mut self, child: &Counts) {
        self.total += child.total;
        self.matches += child.matches;
        self.filter_matches += child.filter_matches;
        self.pinned += child.pinned;
        self.min_wait = self.min_wait.min(child.min_wait);
        self.max_wait = self.max_wait.max(child.max_wait);
        self.min_matching_wait = self.min_matching_wait.min(child.min_matching_wait);
        self.max_matching_wait = self.max_matching_wait.max(child.max_matching_wait);
        self.visibility_changed |= child.visibility_changed;
    }

    /// Whether any unit below carries wait data
    pub fn has_wait(&self) -> bool {
        self.min_wait.is_finite()
    }
}

/// A single goroutine
#[derive(Debug, Clone, Serialize)]
pub struct Unit {
    /// Id as found in the dump; the display id is derived from it on read
    pub original_id: String,
    pub file_name: String,
    pub state: String,
    pub wait_minutes: Option<u32>,
    pub creator_id: Option<String>,

    /// The creator is present among the loaded units of the same file
    pub creator_exists: bool,
    pub pinned: bool,

    pub matched: bool,
    pub filter_matched: bool,
    #[serde(skip)]
    pub(crate) prior_matched: bool,
    #[serde(skip)]
    pub(crate) pin_visible: bool,
}

impl Unit {
    pub(crate) fn new(
        original_id: String,
        file_name: &str,
        state: &str,
        wait_minutes: Option<u32>,
        creator_id: Option<String>,
    ) -> Self {
        Self {
            original_id,
            file_name: file_name.to_string(),
            state: state.to_string(),
            wait_minutes,
            creator_id,
            creator_exists: false,
            pinned: false,
            matched: false,
            filter_matched: false,
            prior_matched: false,
            pin_visible: false,
        }
    }

    /// Id shown to users: `file#id` while several files are loaded
    pub fn display_id(&self, namespaced: bool) -> String {
        display_id(&self.file_name, &self.original_id, namespaced)
    }
}

pub(crate) fn display_id(file_name: &str, original_id: &str, namespaced: bool) -> String {
    if namespaced {
        format!("{}#{}", file_name, original_id)
    } else {
        original_id.to_string()
    }
}

/// Units of one file sharing trace, state and labels
#[derive(Debug, Clone, Serialize)]
pub struct Group {
    pub id: u64,
    pub state: String,
    pub labels: BTreeSet<String>,
    pub goroutines: Vec<Unit>,
    pub pinned: bool,
    pub counts: Counts,
    #[serde(skip)]
    pub(crate) pending_change: bool,
}

impl Group {
    pub(crate) fn new(id: u64, state: &str, labels: BTreeSet<String>) -> Self {
        Self {
            id,
            state: state.to_string(),
            labels,
            goroutines: Vec::new(),
            pinned: false,
            counts: Counts::default(),
            pending_change: true,
        }
    }
}

/// The groups one file contributes to a stack
#[derive(Debug, Clone, Serialize)]
pub struct FileSection {
    pub file_name: String,
    pub groups: Vec<Group>,
    pub counts: Counts,
    #[serde(skip)]
    pub(crate) pending_change: bool,
}

impl FileSection {
    pub(crate) fn new(file_name: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            groups: Vec::new(),
            counts: Counts::default(),
            pending_change: true,
        }
    }

    pub(crate) fn group_mut(&mut self, id: u64) -> Option<&mut Group> {
        self.groups.iter_mut().find(|g| g.id == id)
    }
}

/// A unique call sequence across every loaded file
#[derive(Debug, Clone, Serialize)]
pub struct Stack {
    /// Fingerprint of the trace
    pub id: String,
    pub trace: Vec<Frame>,
    pub name: String,
    pub category: String,

    /// Lower-cased `function file:line` of every frame
    pub searchable_text: String,
    pub files: Vec<FileSection>,
    pub pinned: bool,
    pub counts: Counts,
    #[serde(skip)]
    pub(crate) pending_change: bool,
}

impl Stack {
    pub(crate) fn new(id: String, trace: Vec<Frame>) -> Self {
        let searchable_text = searchable_text(&trace);
        Self {
            id,
            trace,
            name: String::new(),
            category: String::new(),
            searchable_text,
            files: Vec::new(),
            pinned: false,
            counts: Counts::default(),
            pending_change: true,
        }
    }

    pub fn file(&self, file_name: &str) -> Option<&FileSection> {
        self.files.iter().find(|f| f.file_name == file_name)
    }

    pub(crate) fn file_mut(&mut self, file_name: &str) -> &mut FileSection {
        let slot = match self.files.iter().position(|f| f.file_name == file_name) {
            Some(slot) => slot,
            None => {
                self.files.push(FileSection::new(file_name));
                self.files.len() - 1
            }
        };
        &mut self.files[slot]
    }
}

/// Stacks sharing a derived category
#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub name: String,
    pub stacks: Vec<Stack>,
    pub pinned: bool,
    pub counts: Counts,
    #[serde(skip)]
    pub(crate) pending_change: bool,
}

impl Category {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            stacks: Vec::new(),
            pinned: false,
            counts: Counts::default(),
            pending_change: true,
        }
    }
}

/// Fingerprint of a trace: FNV-1a over every `(function, file, line)`
pub fn fingerprint(trace: &[Frame]) -> String {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;

    let mut hash = OFFSET;
    let mut feed = |bytes: &[u8]| {
        for b in bytes {
            hash ^= u64::from(*b);
            hash = hash.wrapping_mul(PRIME);
        }
    };
    for frame in trace {
        feed(frame.function.as_bytes());
        feed(&[0]);
        feed(frame.file.as_bytes());
        feed(&[0]);
        feed(&frame.line.to_le_bytes());
    }
    format!("{:016x}", hash)
}

pub(crate) fn searchable_text(trace: &[Frame]) -> String {
    trace
        .iter()
        .map(|f| format!("{} {}:{}", f.function, f.file, f.line).to_lowercase())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Node addressed by a pin toggle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinTarget {
    Unit(String),
    Group(u64),
    Stack(String),
    Category(String),
}

/// Depth-first visit of a node's own pin flag and every descendant's
pub(crate) trait PinFlags {
    fn for_each_pin(&mut self, f: &mut dyn FnMut(&mut bool));
}

impl PinFlags for Unit {
    fn for_each_pin(&mut self, f: &mut dyn FnMut(&mut bool)) {
        f(&mut self.pinned);
    }
}

impl PinFlags for Group {
    fn for_each_pin(&mut self, f: &mut dyn FnMut(&mut bool)) {
        f(&mut self.pinned);
        for unit in &mut self.goroutines {
            unit.for_each_pin(f);
        }
    }
}

impl PinFlags for Stack {
    fn for_each_pin(&mut self, f: &mut dyn FnMut(&mut bool)) {
        f(&mut self.pinned);
        for group in self.files.iter_mut().flat_map(|s| s.groups.iter_mut()) {
            group.for_each_pin(f);
        }
    }
}

impl PinFlags for Category {
    fn for_each_pin(&mut self, f: &mut dyn FnMut(&mut bool)) {
        f(&mut self.pinned);
        for stack in &mut self.stacks {
            stack.for_each_pin(f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_depends_on_every_field() {
        let a = vec![Frame::new("main.a", "a.go", 1)];
        let b = vec![Frame::new("main.a", "a.go", 2)];
        let c = vec![Frame::new("main.a", "b.go", 1)];
        assert_eq!(fingerprint(&a), fingerprint(&a.clone()));
        assert_ne!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&c));
    }

    #[test]
    fn test_counts_fold() {
        let mut unit = Unit::new("1".into(), "f", "select", Some(5), None);
        unit.matched = true;
        let mut group = Counts::default();
        group.add_unit(&unit);
        unit.matched = false;
        unit.wait_minutes = Some(9);
        group.add_unit(&unit);

        let mut parent = Counts::default();
        parent.merge(&group);
        assert_eq!(parent.total, 2);
        assert_eq!(parent.matches, 1);
        assert_eq!(parent.min_wait, 5.0);
        assert_eq!(parent.max_wait, 9.0);
        assert_eq!(parent.max_matching_wait, 5.0);
        assert!(parent.visibility_changed);
    }

    #[test]
    fn test_empty_counts_use_sentinels() {
        let counts = Counts::default();
        assert!(!counts.has_wait());
        assert_eq!(counts.max_wait, f64::NEG_INFINITY);
    }
}
