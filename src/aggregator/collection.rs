//! The hierarchical collection: merge, pin, filter and count.
//!
//! Decoded groups from every loaded file are merged into a tree of
//! Category → Stack → FileSection → Group → Unit. Stacks merge purely on the
//! trace fingerprint, groups on (state, labels) within one file.
//!
//! Every mutating call finishes with one recompute pass:
//! 1. each unit's match flag is re-evaluated against the filter and pins
//! 2. counts are folded bottom-up once, flagging every container whose set of
//!    visible units changed
//!
//! Positions of nodes are cached in indexes that are rebuilt after every
//! structural change (add, remove, rename, rule update).

use log::{debug, info};
use std::collections::{HashMap, HashSet};

use super::filter::{FilterQuery, UnitContext};
use super::metrics::{self, Statistics};
use super::model::{
    display_id, fingerprint, Category, FileSection, Group, PinFlags, PinTarget, Stack, Unit,
};
use crate::parser::{DecodedFile, DecodedGroup, Frame};
use crate::rules::RuleSet;
use crate::utils::error::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UnitPath {
    category: usize,
    stack: usize,
    file: usize,
    group: usize,
    unit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GroupPath {
    category: usize,
    stack: usize,
    file: usize,
    group: usize,
}

/// A unit together with its ancestors
#[derive(Debug, Clone, Copy)]
pub struct UnitRef<'a> {
    pub category: &'a Category,
    pub stack: &'a Stack,
    pub section: &'a FileSection,
    pub group: &'a Group,
    pub unit: &'a Unit,
}

/// Outcome of [`Collection::add_file`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedFile {
    /// Unique name the file was registered under
    pub file_name: String,

    /// Stacks that received a section from this file
    pub stack_ids: Vec<String>,
    pub units: usize,
}

/// Pin flags saved by a cascading toggle, restored by an immediate repeat
#[derive(Debug)]
struct CascadeSnapshot {
    target: PinTarget,
    generation: u64,
    flags: Vec<bool>,
}

/// Loaded goroutines of every file, grouped and filtered
#[derive(Debug)]
pub struct Collection {
    categories: Vec<Category>,
    rules: RuleSet,
    filter: FilterQuery,
    files: Vec<String>,
    next_group_id: u64,

    /// Bumped by every pin or structural change
    pin_generation: u64,
    cascade: Option<CascadeSnapshot>,

    unit_index: HashMap<String, UnitPath>,
    group_index: HashMap<u64, GroupPath>,
    stack_index: HashMap<String, (usize, usize)>,
    category_index: HashMap<String, usize>,
}

impl Default for Collection {
    fn default() -> Self {
        Self::new(RuleSet::default())
    }
}

impl Collection {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            categories: Vec::new(),
            rules,
            filter: FilterQuery::default(),
            files: Vec::new(),
            next_group_id: 0,
            pin_generation: 0,
            cascade: None,
            unit_index: HashMap::new(),
            group_index: HashMap::new(),
            stack_index: HashMap::new(),
            category_index: HashMap::new(),
        }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn filter(&self) -> &FilterQuery {
        &self.filter
    }

    /// Loaded file names, in load order
    pub fn file_names(&self) -> &[String] {
        &self.files
    }

    /// Unit ids carry a `file#` prefix while more than one file is loaded
    pub fn is_namespaced(&self) -> bool {
        self.files.len() > 1
    }

    pub fn display_id(&self, unit: &Unit) -> String {
        unit.display_id(self.is_namespaced())
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.category_index.get(name).map(|&c| &self.categories[c])
    }

    pub fn stack(&self, id: &str) -> Option<&Stack> {
        self.stack_index
            .get(id)
            .map(|&(c, s)| &self.categories[c].stacks[s])
    }

    pub fn group(&self, id: u64) -> Option<&Group> {
        self.group_index
            .get(&id)
            .map(|p| &self.categories[p.category].stacks[p.stack].files[p.file].groups[p.group])
    }

    /// Every stack, in category order
    pub fn stacks(&self) -> impl Iterator<Item = &Stack> + '_ {
        self.categories.iter().flat_map(|c| c.stacks.iter())
    }

    /// Every unit with its ancestors
    pub fn units(&self) -> impl Iterator<Item = UnitRef<'_>> + '_ {
        self.categories.iter().flat_map(|category| {
            category.stacks.iter().flat_map(move |stack| {
                stack.files.iter().flat_map(move |section| {
                    section.groups.iter().flat_map(move |group| {
                        group.goroutines.iter().map(move |unit| UnitRef {
                            category,
                            stack,
                            section,
                            group,
                            unit,
                        })
                    })
                })
            })
        })
    }

    /// Sections one file contributes, with their stacks
    pub fn file_sections(&self, file_name: &str) -> Vec<(&Stack, &FileSection)> {
        self.stacks()
            .filter_map(|stack| stack.file(file_name).map(|section| (stack, section)))
            .collect()
    }

    pub fn lookup_unit(&self, id: &str) -> Option<UnitRef<'_>> {
        let p = self.unit_index.get(id)?;
        let category = &self.categories[p.category];
        let stack = &category.stacks[p.stack];
        let section = &stack.files[p.file];
        let group = &section.groups[p.group];
        Some(UnitRef {
            category,
            stack,
            section,
            group,
            unit: &group.goroutines[p.unit],
        })
    }

    pub fn get_category_for_unit(&self, id: &str) -> Option<&str> {
        self.unit_index
            .get(id)
            .map(|p| self.categories[p.category].name.as_str())
    }

    /// Total and matching units per loaded file
    pub fn file_statistics(&self) -> Statistics {
        metrics::file_statistics(self)
    }

    /// Total and matching units per state
    pub fn state_statistics(&self) -> Statistics {
        metrics::state_statistics(self)
    }

    /// Merge a decoded file into the collection
    ///
    /// **Public** - main entry point of the load pipeline
    ///
    /// # Arguments
    /// * `file` - Decoder output
    /// * `upload_name` - Name the file was uploaded under
    /// * `custom_name` - Name chosen by the user, preferred over the name
    ///   extracted from the dump and the upload name
    ///
    /// # Returns
    /// The unique name the file was registered under and the stacks it touched
    pub fn add_file(
        &mut self,
        file: DecodedFile,
        upload_name: &str,
        custom_name: Option<&str>,
    ) -> AddedFile {
        let base = custom_name
            .filter(|name| !name.is_empty())
            .or(file.extracted_name.as_deref())
            .unwrap_or(upload_name);
        let file_name = self.unique_file_name(base);

        info!(
            "Adding {} ({} goroutines in {} groups)",
            file_name, file.stats.units, file.stats.groups
        );

        let was_namespaced = self.is_namespaced();
        let forced = self.forced_unit_key();
        self.files.push(file_name.clone());

        let mut stack_ids: Vec<String> = Vec::new();
        let mut units = 0;
        for group in file.groups {
            units += group.count();
            let stack_id = self.merge_group(&file_name, group);
            if !stack_ids.contains(&stack_id) {
                stack_ids.push(stack_id);
            }
        }

        self.structure_changed(was_namespaced, forced);
        AddedFile {
            file_name,
            stack_ids,
            units,
        }
    }

    fn unique_file_name(&self, base: &str) -> String {
        if !self.files.iter().any(|f| f == base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{} ({})", base, n))
            .find(|candidate| !self.files.contains(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    fn merge_group(&mut self, file_name: &str, group: DecodedGroup) -> String {
        let DecodedGroup {
            trace,
            state,
            labels,
            units,
        } = group;

        let stack_id = self.stack_key(&trace);
        let (c, s) = match self.stack_index.get(&stack_id) {
            Some(&position) => position,
            None => self.insert_stack(stack_id.clone(), trace),
        };

        let category = &mut self.categories[c];
        category.pending_change = true;
        let stack = &mut category.stacks[s];
        stack.pending_change = true;
        let section = stack.file_mut(file_name);
        section.pending_change = true;

        let slot = match section
            .groups
            .iter()
            .position(|g| g.state == state && g.labels == labels)
        {
            Some(slot) => slot,
            None => {
                self.next_group_id += 1;
                section
                    .groups
                    .push(Group::new(self.next_group_id, &state, labels));
                section.groups.len() - 1
            }
        };

        let target = &mut section.groups[slot];
        target.pending_change = true;
        target.goroutines.extend(units.into_iter().map(|u| {
            Unit::new(u.id, file_name, &state, u.wait_minutes, u.creator_id)
        }));

        stack_id
    }

    /// Fingerprint of a trace, disambiguated if it collides with a
    /// different trace
    fn stack_key(&self, trace: &[Frame]) -> String {
        let fp = fingerprint(trace);
        let mut key = fp.clone();
        let mut n = 1;
        while let Some(&(c, s)) = self.stack_index.get(&key) {
            if self.categories[c].stacks[s].trace == trace {
                break;
            }
            n += 1;
            key = format!("{}-{}", fp, n);
        }
        key
    }

    fn insert_stack(&mut self, id: String, trace: Vec<Frame>) -> (usize, usize) {
        let mut stack = Stack::new(id.clone(), trace);
        stack.name = self.rules.name(&stack.trace);
        stack.category = self.rules.category(&stack.trace);
        debug!("New stack {} '{}' in '{}'", id, stack.name, stack.category);

        let c = match self.category_index.get(&stack.category) {
            Some(&c) => c,
            None => {
                self.categories.push(Category::new(&stack.category));
                let c = self.categories.len() - 1;
                self.category_index.insert(stack.category.clone(), c);
                c
            }
        };

        self.categories[c].stacks.push(stack);
        let s = self.categories[c].stacks.len() - 1;
        self.stack_index.insert(id, (c, s));
        (c, s)
    }

    /// Remove every unit of a file
    ///
    /// Stacks and categories left empty are removed.
    ///
    /// # Returns
    /// `false` if no such file is loaded
    pub fn remove_file(&mut self, file_name: &str) -> bool {
        let Some(position) = self.files.iter().position(|f| f == file_name) else {
            return false;
        };

        let was_namespaced = self.is_namespaced();
        let forced = self.forced_unit_key();
        self.files.remove(position);

        for category in &mut self.categories {
            let mut touched = false;
            for stack in &mut category.stacks {
                let before = stack.files.len();
                stack.files.retain(|f| f.file_name != file_name);
                if stack.files.len() != before {
                    stack.pending_change = true;
                    touched = true;
                }
            }
            category.stacks.retain(|s| !s.files.is_empty());
            category.pending_change |= touched;
        }
        self.categories.retain(|c| !c.stacks.is_empty());

        info!("Removed {}", file_name);
        self.structure_changed(was_namespaced, forced);
        true
    }

    /// Rename a loaded file
    ///
    /// # Arguments
    /// * `merge_if_target` - When `new_name` is already loaded, merge the
    ///   renamed file into it instead of failing. Goroutine ids of the renamed
    ///   file that already exist in the target become `id@old_name`, and
    ///   creator ids pointing at them follow.
    ///
    /// # Returns
    /// `false` if `old_name` is not loaded, or `new_name` is loaded and
    /// merging was not requested
    pub fn rename_file(&mut self, old_name: &str, new_name: &str, merge_if_target: bool) -> bool {
        let Some(position) = self.files.iter().position(|f| f == old_name) else {
            return false;
        };
        if old_name == new_name {
            return true;
        }
        let target_exists = self.files.iter().any(|f| f == new_name);
        if target_exists && !merge_if_target {
            return false;
        }

        let was_namespaced = self.is_namespaced();
        let collided = if target_exists {
            self.colliding_ids(old_name, new_name)
        } else {
            HashSet::new()
        };
        let forced = self.forced_unit_key().map(|(file, id)| {
            if file == old_name {
                (new_name.to_string(), merged_id(&id, old_name, &collided))
            } else {
                (file, id)
            }
        });

        if target_exists {
            self.files.remove(position);
        } else {
            self.files[position] = new_name.to_string();
        }

        for category in &mut self.categories {
            let mut touched = false;
            for stack in &mut category.stacks {
                if rename_section(stack, old_name, new_name, &collided) {
                    stack.pending_change = true;
                    touched = true;
                }
            }
            category.pending_change |= touched;
        }

        for files in [&mut self.filter.excluded_files, &mut self.filter.solo_files] {
            if files.remove(old_name) {
                files.insert(new_name.to_string());
            }
        }

        info!(
            "Renamed {} to {}{}",
            old_name,
            new_name,
            if target_exists { " (merged)" } else { "" }
        );
        self.structure_changed(was_namespaced, forced);
        true
    }

    /// Original ids present in both files
    fn colliding_ids(&self, old_name: &str, new_name: &str) -> HashSet<String> {
        let mut old_ids = HashSet::new();
        let mut new_ids = HashSet::new();
        for unit in self
            .stacks()
            .flat_map(|s| s.files.iter())
            .flat_map(|f| f.groups.iter())
            .flat_map(|g| g.goroutines.iter())
        {
            if unit.file_name == old_name {
                old_ids.insert(unit.original_id.clone());
            } else if unit.file_name == new_name {
                new_ids.insert(unit.original_id.clone());
            }
        }
        old_ids.retain(|id| new_ids.contains(id));
        if !old_ids.is_empty() {
            debug!(
                "{} goroutine ids of {} collide with {}",
                old_ids.len(),
                old_name,
                new_name
            );
        }
        old_ids
    }

    /// Adopt a new rule snapshot
    ///
    /// Names and categories of every stack are re-derived and stacks move
    /// between categories as needed; decoded data is untouched. Pins of
    /// categories that survive the update are kept.
    pub fn update_rules(&mut self, mut rules: RuleSet) {
        rules.version = self.rules.version + 1;
        self.rules = rules;

        let pinned: HashSet<String> = self
            .categories
            .iter()
            .filter(|c| c.pinned)
            .map(|c| c.name.clone())
            .collect();

        let mut categories: Vec<Category> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for category in std::mem::take(&mut self.categories) {
            for mut stack in category.stacks {
                stack.name = self.rules.name(&stack.trace);
                stack.category = self.rules.category(&stack.trace);
                stack.pending_change = true;

                let c = match positions.get(&stack.category) {
                    Some(&c) => c,
                    None => {
                        let mut fresh = Category::new(&stack.category);
                        fresh.pinned = pinned.contains(&stack.category);
                        categories.push(fresh);
                        positions.insert(stack.category.clone(), categories.len() - 1);
                        categories.len() - 1
                    }
                };
                categories[c].stacks.push(stack);
            }
        }
        self.categories = categories;

        info!(
            "Applied rules v{}: {} categories",
            self.rules.version,
            self.categories.len()
        );
        let namespaced = self.is_namespaced();
        self.structure_changed(namespaced, None);
    }

    /// Replace the active filter
    ///
    /// # Errors
    /// A self-contradictory query is rejected and the current filter is kept
    pub fn set_filter(&mut self, query: FilterQuery) -> Result<(), QueryError> {
        query.validate()?;
        debug!("Filter set to {:?}", query);
        self.filter = query;
        self.recompute();
        Ok(())
    }

    /// Parse and apply a query string
    ///
    /// The current forced unit is kept unless the query names one.
    pub fn set_filter_text(&mut self, text: &str) -> Result<(), QueryError> {
        let mut query = FilterQuery::parse(text)?;
        if query.forced_unit.is_none() {
            query.forced_unit = self.filter.forced_unit.clone();
        }
        self.set_filter(query)
    }

    pub fn clear_filter(&mut self) {
        self.filter = FilterQuery::default();
        self.recompute();
    }

    /// Keep one unit visible regardless of constraints, replacing the
    /// previously forced unit
    ///
    /// # Returns
    /// `false` if no unit has this id
    pub fn show_unit(&mut self, id: &str) -> bool {
        if !self.unit_index.contains_key(id) {
            return false;
        }
        self.filter.forced_unit = Some(id.to_string());
        self.recompute();
        true
    }

    pub fn toggle_unit_pin(&mut self, id: &str) -> Option<bool> {
        self.toggle_pin(PinTarget::Unit(id.to_string()))
    }

    pub fn toggle_group_pin(&mut self, id: u64) -> Option<bool> {
        self.toggle_pin(PinTarget::Group(id))
    }

    pub fn toggle_stack_pin(&mut self, id: &str) -> Option<bool> {
        self.toggle_pin(PinTarget::Stack(id.to_string()))
    }

    pub fn toggle_category_pin(&mut self, name: &str) -> Option<bool> {
        self.toggle_pin(PinTarget::Category(name.to_string()))
    }

    pub fn toggle_unit_pin_with_children(&mut self, id: &str) -> Option<bool> {
        self.toggle_pin_cascade(PinTarget::Unit(id.to_string()))
    }

    pub fn toggle_group_pin_with_children(&mut self, id: u64) -> Option<bool> {
        self.toggle_pin_cascade(PinTarget::Group(id))
    }

    pub fn toggle_stack_pin_with_children(&mut self, id: &str) -> Option<bool> {
        self.toggle_pin_cascade(PinTarget::Stack(id.to_string()))
    }

    pub fn toggle_category_pin_with_children(&mut self, name: &str) -> Option<bool> {
        self.toggle_pin_cascade(PinTarget::Category(name.to_string()))
    }

    fn toggle_pin(&mut self, target: PinTarget) -> Option<bool> {
        let pinned = {
            let node = self.pin_node_mut(&target)?;
            let mut own = None;
            node.for_each_pin(&mut |flag| {
                if own.is_none() {
                    *flag = !*flag;
                    own = Some(*flag);
                }
            });
            own?
        };
        debug!("Pin {:?} -> {}", target, pinned);
        self.pin_generation += 1;
        self.recompute();
        Some(pinned)
    }

    /// Toggle a node and set every descendant to the node's new state; an
    /// immediate repeat on the same node restores the flags saved by the
    /// first call
    fn toggle_pin_cascade(&mut self, target: PinTarget) -> Option<bool> {
        let generation = self.pin_generation;
        let restore = self
            .cascade
            .take()
            .filter(|snapshot| snapshot.target == target && snapshot.generation == generation);

        let (pinned, saved) = {
            let node = self.pin_node_mut(&target)?;
            match restore {
                Some(snapshot) => {
                    let mut flags = snapshot.flags.into_iter();
                    node.for_each_pin(&mut |flag| {
                        if let Some(previous) = flags.next() {
                            *flag = previous;
                        }
                    });
                    (own_pin(node), None)
                }
                None => {
                    let mut saved = Vec::new();
                    node.for_each_pin(&mut |flag| saved.push(*flag));
                    let pinned = !saved.first().copied().unwrap_or(false);
                    node.for_each_pin(&mut |flag| *flag = pinned);
                    (pinned, Some(saved))
                }
            }
        };

        debug!("Cascade pin {:?} -> {}", target, pinned);
        self.pin_generation += 1;
        if let Some(flags) = saved {
            self.cascade = Some(CascadeSnapshot {
                target,
                generation: self.pin_generation,
                flags,
            });
        }
        self.recompute();
        Some(pinned)
    }

    fn pin_node_mut(&mut self, target: &PinTarget) -> Option<&mut dyn PinFlags> {
        match target {
            PinTarget::Unit(id) => {
                let p = *self.unit_index.get(id)?;
                Some(
                    &mut self.categories[p.category].stacks[p.stack].files[p.file].groups
                        [p.group]
                        .goroutines[p.unit],
                )
            }
            PinTarget::Group(id) => {
                let p = *self.group_index.get(id)?;
                Some(&mut self.categories[p.category].stacks[p.stack].files[p.file].groups[p.group])
            }
            PinTarget::Stack(id) => {
                let (c, s) = *self.stack_index.get(id)?;
                Some(&mut self.categories[c].stacks[s])
            }
            PinTarget::Category(name) => {
                let c = *self.category_index.get(name)?;
                Some(&mut self.categories[c])
            }
        }
    }

    /// Display id and file of the forced unit, to carry it across changes
    /// of the namespacing
    fn forced_unit_key(&self) -> Option<(String, String)> {
        let id = self.filter.forced_unit.as_deref()?;
        let found = self.lookup_unit(id)?;
        Some((found.unit.file_name.clone(), found.unit.original_id.clone()))
    }

    fn structure_changed(&mut self, was_namespaced: bool, forced: Option<(String, String)>) {
        self.pin_generation += 1;
        self.cascade = None;

        if was_namespaced != self.is_namespaced() {
            debug!("Unit id namespacing is now {}", self.is_namespaced());
            self.mark_all_changed();
        }

        self.reindex();

        if let Some((file, original)) = forced {
            let id = display_id(&file, &original, self.is_namespaced());
            self.filter.forced_unit = self.unit_index.contains_key(&id).then_some(id);
        }

        self.recompute();
    }

    fn mark_all_changed(&mut self) {
        for category in &mut self.categories {
            category.pending_change = true;
            for stack in &mut category.stacks {
                stack.pending_change = true;
                for section in &mut stack.files {
                    section.pending_change = true;
                    for group in &mut section.groups {
                        group.pending_change = true;
                    }
                }
            }
        }
    }

    /// Rebuild the position indexes and creator links
    fn reindex(&mut self) {
        let namespaced = self.is_namespaced();
        self.unit_index.clear();
        self.group_index.clear();
        self.stack_index.clear();
        self.category_index.clear();

        let mut present: HashSet<(String, String)> = HashSet::new();

        for (c, category) in self.categories.iter().enumerate() {
            self.category_index.insert(category.name.clone(), c);
            for (s, stack) in category.stacks.iter().enumerate() {
                self.stack_index.insert(stack.id.clone(), (c, s));
                for (f, section) in stack.files.iter().enumerate() {
                    for (g, group) in section.groups.iter().enumerate() {
                        self.group_index.insert(
                            group.id,
                            GroupPath {
                                category: c,
                                stack: s,
                                file: f,
                                group: g,
                            },
                        );
                        for (u, unit) in group.goroutines.iter().enumerate() {
                            present.insert((unit.file_name.clone(), unit.original_id.clone()));
                            let path = UnitPath {
                                category: c,
                                stack: s,
                                file: f,
                                group: g,
                                unit: u,
                            };
                            let id = unit.display_id(namespaced);
                            if self.unit_index.insert(id.clone(), path).is_some() {
                                debug!("Duplicate goroutine id {}", id);
                            }
                        }
                    }
                }
            }
        }

        for unit in self
            .categories
            .iter_mut()
            .flat_map(|c| c.stacks.iter_mut())
            .flat_map(|s| s.files.iter_mut())
            .flat_map(|f| f.groups.iter_mut())
            .flat_map(|g| g.goroutines.iter_mut())
        {
            unit.creator_exists = unit.creator_id.as_ref().is_some_and(|creator| {
                present.contains(&(unit.file_name.clone(), creator.clone()))
            });
        }
    }

    /// Re-evaluate every unit, then fold counts bottom-up
    fn recompute(&mut self) {
        let namespaced = self.is_namespaced();
        let matcher = self.filter.matcher();

        for category in &mut self.categories {
            let category_pinned = category.pinned;
            for stack in &mut category.stacks {
                let stack_pinned = category_pinned || stack.pinned;
                let searchable_text = stack.searchable_text.as_str();
                for section in &mut stack.files {
                    let excluded = matcher.excludes_file(&section.file_name);
                    for group in &mut section.groups {
                        let group_pinned = stack_pinned || group.pinned;
                        let labels = &group.labels;
                        for unit in &mut group.goroutines {
                            let id = unit.display_id(namespaced);
                            let context = UnitContext {
                                display_id: &id,
                                state: &unit.state,
                                wait_minutes: unit.wait_minutes,
                                labels,
                                searchable_text,
                            };
                            let filter_matched = !excluded && matcher.constraints_match(&context);
                            let forced = !excluded && matcher.is_forced(&id);

                            unit.prior_matched = unit.matched;
                            unit.filter_matched = filter_matched;
                            unit.pin_visible = group_pinned || unit.pinned;
                            unit.matched = unit.pin_visible || filter_matched || forced;
                        }
                    }
                }
            }
        }

        let mut total = 0;
        let mut matches = 0;
        for category in &mut self.categories {
            category.counts.reset();
            for stack in &mut category.stacks {
                stack.counts.reset();
                for section in &mut stack.files {
                    section.counts.reset();
                    for group in &mut section.groups {
                        group.counts.reset();
                        for unit in &group.goroutines {
                            group.counts.add_unit(unit);
                        }
                        group.counts.visibility_changed |= std::mem::take(&mut group.pending_change);
                        section.counts.merge(&group.counts);
                    }
                    section.counts.visibility_changed |=
                        std::mem::take(&mut section.pending_change);
                    stack.counts.merge(&section.counts);
                }
                stack.counts.visibility_changed |= std::mem::take(&mut stack.pending_change);
                category.counts.merge(&stack.counts);
            }
            category.counts.visibility_changed |= std::mem::take(&mut category.pending_change);
            total += category.counts.total;
            matches += category.counts.matches;
        }

        debug!("Recomputed: {} of {} goroutines visible", matches, total);
    }
}

/// Move a stack's section from one file name to another, merging groups
/// with the target section when it already exists
fn rename_section(
    stack: &mut Stack,
    old_name: &str,
    new_name: &str,
    collided: &HashSet<String>,
) -> bool {
    let Some(source) = stack.files.iter().position(|f| f.file_name == old_name) else {
        return false;
    };

    let mut section = stack.files.remove(source);
    for unit in section
        .groups
        .iter_mut()
        .flat_map(|g| g.goroutines.iter_mut())
    {
        unit.file_name = new_name.to_string();
        unit.original_id = merged_id(&unit.original_id, old_name, collided);
        if let Some(creator) = unit.creator_id.take() {
            unit.creator_id = Some(merged_id(&creator, old_name, collided));
        }
    }

    match stack.files.iter().position(|f| f.file_name == new_name) {
        Some(target) => {
            let target = &mut stack.files[target];
            target.pending_change = true;
            for group in section.groups {
                let existing = target
                    .groups
                    .iter()
                    .position(|g| g.state == group.state && g.labels == group.labels);
                match existing {
                    Some(slot) => {
                        let merged = &mut target.groups[slot];
                        merged.goroutines.extend(group.goroutines);
                        merged.pinned |= group.pinned;
                        merged.pending_change = true;
                    }
                    None => target.groups.push(group),
                }
            }
        }
        None => {
            section.file_name = new_name.to_string();
            section.pending_change = true;
            stack.files.insert(source, section);
        }
    }
    true
}

/// Id of a unit moved by a merging rename
fn merged_id(id: &str, old_name: &str, collided: &HashSet<String>) -> String {
    if collided.contains(id) {
        format!("{}@{}", id, old_name)
    } else {
        id.to_string()
    }
}

/// Own pin flag of a node: the first flag it visits
fn own_pin(node: &mut dyn PinFlags) -> bool {
    let mut own = None;
    node.for_each_pin(&mut |flag| {
        if own.is_none() {
            own = Some(*flag);
        }
    });
    own.unwrap_or(false)
}
