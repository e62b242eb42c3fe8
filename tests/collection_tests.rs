use goroutine_trace_studio::aggregator::{AddedFile, Collection, FilterQuery, StatCounts};
use goroutine_trace_studio::parser::{
    decode_goroutine_dump, DecodeOptions, DecodeStats, DecodedFile, DecodedGroup, DecodedUnit,
    DumpFormat, Frame,
};
use goroutine_trace_studio::rules::RuleSet;
use goroutine_trace_studio::utils::error::QueryError;
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;

const DUMP: &str = "\
goroutine 1 [running]:
main.function1()
\t/app/main.go:10 +0x1d
main.main()
\t/app/main.go:5 +0x25

goroutine 2 [select, 5 minutes]:
main.waiter(0xc000010000)
\t/app/wait.go:20 +0x3a
created by main.function1 in goroutine 1
\t/app/main.go:11 +0x2f

goroutine 3 [running]:
main.function1()
\t/app/main.go:10 +0x1d
main.main()
\t/app/main.go:5 +0x25

goroutine 4 [chan receive]:
main.consumer()
\t/app/consume.go:7 +0x11
created by main.waiter in goroutine 2
\t/app/wait.go:22 +0x40
";

fn load(collection: &mut Collection, text: &str, name: &str) -> AddedFile {
    let file = decode_goroutine_dump(text, &DecodeOptions::default()).unwrap();
    collection.add_file(file, name, None)
}

fn loaded() -> Collection {
    let mut collection = Collection::default();
    load(&mut collection, DUMP, "stacks.txt");
    collection
}

fn visible(collection: &Collection) -> Vec<String> {
    let mut ids: Vec<String> = collection
        .units()
        .filter(|found| found.unit.matched)
        .map(|found| collection.display_id(found.unit))
        .collect();
    ids.sort();
    ids
}

fn stack_of(collection: &Collection, unit_id: &str) -> String {
    collection.lookup_unit(unit_id).unwrap().stack.id.clone()
}

/// Totals add up at every level, matches never exceed totals, and pinned
/// nodes are fully visible
fn assert_counts_consistent(collection: &Collection) {
    for category in collection.categories() {
        let stacks_total: usize = category.stacks.iter().map(|s| s.counts.total).sum();
        assert_eq!(category.counts.total, stacks_total);
        assert!(category.counts.matches <= category.counts.total);
        if category.pinned {
            assert_eq!(category.counts.matches, category.counts.total);
        }

        for stack in &category.stacks {
            let files_total: usize = stack.files.iter().map(|f| f.counts.total).sum();
            assert_eq!(stack.counts.total, files_total);
            assert!(stack.counts.matches <= stack.counts.total);
            if stack.pinned {
                assert_eq!(stack.counts.matches, stack.counts.total);
            }

            for section in &stack.files {
                let groups_total: usize = section.groups.iter().map(|g| g.counts.total).sum();
                assert_eq!(section.counts.total, groups_total);

                for group in &section.groups {
                    assert_eq!(group.counts.total, group.goroutines.len());
                    assert!(group.counts.matches <= group.counts.total);
                    if group.pinned {
                        assert_eq!(group.counts.matches, group.counts.total);
                    }
                }
            }
        }
    }
}

#[test]
fn test_end_to_end_filter_scenario() {
    let mut collection = loaded();

    assert_eq!(collection.stacks().count(), 3);
    assert_eq!(stack_of(&collection, "1"), stack_of(&collection, "3"));
    assert_ne!(stack_of(&collection, "1"), stack_of(&collection, "2"));

    collection.set_filter_text("function1").unwrap();

    assert_eq!(visible(&collection), vec!["1", "2", "3"]);
    assert!(!collection.lookup_unit("4").unwrap().unit.matched);
    assert_counts_consistent(&collection);
}

#[test]
fn test_identical_traces_merge_across_files_and_creators() {
    let mut collection = Collection::default();
    load(&mut collection, DUMP, "a");
    let other = "goroutine 70 [running]:\nmain.function1()\n\t/app/main.go:10\nmain.main()\n\t/app/main.go:5\n";
    load(&mut collection, other, "b");

    let stack = collection.lookup_unit("b#70").unwrap().stack;
    assert_eq!(stack.id, stack_of(&collection, "a#1"));
    assert_eq!(stack.files.len(), 2);
    assert_eq!(stack.counts.total, 3);
    assert_counts_consistent(&collection);
}

#[test]
fn test_identical_traces_with_different_creator_ids_merge() {
    let mut collection = Collection::default();
    let dump = "\
goroutine 10 [select]:
main.waiter()
\t/app/wait.go:20 +0x3a
created by main.start in goroutine 1
\t/app/main.go:30 +0x2f

goroutine 11 [select]:
main.waiter()
\t/app/wait.go:20 +0x3a
created by main.start in goroutine 5
\t/app/main.go:30 +0x2f
";
    load(&mut collection, dump, "stacks.txt");

    assert_eq!(collection.stacks().count(), 1);
    let first = collection.lookup_unit("10").unwrap();
    let second = collection.lookup_unit("11").unwrap();
    assert_eq!(first.stack.id, second.stack.id);
    assert_eq!(first.group.id, second.group.id);
    assert_eq!(first.unit.creator_id.as_deref(), Some("1"));
    assert_eq!(second.unit.creator_id.as_deref(), Some("5"));
}

#[test]
fn test_wait_and_state_filters() {
    let mut collection = loaded();

    collection.set_filter_text("wait:5+").unwrap();
    assert_eq!(visible(&collection), vec!["2"]);

    collection.set_filter_text("wait:>5").unwrap();
    assert!(visible(&collection).is_empty());

    collection.set_filter_text("state:running,select").unwrap();
    assert_eq!(visible(&collection), vec!["1", "2", "3"]);

    collection.clear_filter();
    assert_eq!(visible(&collection), vec!["1", "2", "3", "4"]);
}

#[test]
fn test_wait_bounds() {
    let collection = loaded();
    let select = collection.lookup_unit("2").unwrap().stack;
    assert_eq!(select.counts.min_wait, 5.0);
    assert_eq!(select.counts.max_wait, 5.0);

    let running = collection.lookup_unit("1").unwrap().stack;
    assert_eq!(running.counts.min_wait, f64::INFINITY);
    assert_eq!(running.counts.max_wait, f64::NEG_INFINITY);

    let category = collection.category("main").unwrap();
    assert_eq!(category.counts.min_matching_wait, 5.0);
}

#[test]
fn test_contradictory_filter_keeps_previous() {
    let mut collection = loaded();
    collection.set_filter_text("state:select").unwrap();

    let err = collection.set_filter_text("wait:5-3").unwrap_err();
    assert!(matches!(err, QueryError::ConflictingWait(_)));
    assert_eq!(visible(&collection), vec!["2"]);

    let err = collection.set_filter_text("lock wait").unwrap_err();
    assert!(matches!(err, QueryError::MultipleTerms(_, _)));
    assert!(collection.filter().states.contains("select"));
}

#[test]
fn test_forced_unit_replaces_previous() {
    let mut collection = loaded();
    collection.set_filter_text("state:select").unwrap();

    assert!(collection.show_unit("4"));
    assert_eq!(visible(&collection), vec!["2", "4"]);

    assert!(collection.show_unit("1"));
    assert_eq!(visible(&collection), vec!["1", "2"]);

    // New query text keeps the forced unit
    collection.set_filter_text("consumer").unwrap();
    assert_eq!(visible(&collection), vec!["1", "4"]);
}

#[test]
fn test_pinned_node_is_fully_visible() {
    let mut collection = loaded();
    collection.set_filter_text("nothing-matches-this").unwrap();
    assert!(visible(&collection).is_empty());

    let stack = stack_of(&collection, "1");
    assert_eq!(collection.toggle_stack_pin(&stack), Some(true));
    assert_eq!(visible(&collection), vec!["1", "3"]);
    assert_eq!(collection.stack(&stack).unwrap().counts.pinned, 2);

    assert_eq!(collection.toggle_unit_pin("4"), Some(true));
    assert_eq!(visible(&collection), vec!["1", "3", "4"]);

    assert_eq!(collection.toggle_category_pin("main"), Some(true));
    assert_eq!(visible(&collection), vec!["1", "2", "3", "4"]);
    assert_counts_consistent(&collection);

    let group = collection.lookup_unit("2").unwrap().group.id;
    assert_eq!(collection.toggle_group_pin(group), Some(true));
    assert_eq!(collection.toggle_category_pin("main"), Some(false));
    assert_eq!(visible(&collection), vec!["1", "2", "3", "4"]);
}

#[test]
fn test_cascade_pin_round_trip_restores_flags() {
    let mut collection = loaded();
    let stack = stack_of(&collection, "1");
    collection.toggle_unit_pin("1");

    assert_eq!(collection.toggle_stack_pin_with_children(&stack), Some(true));
    assert!(collection.lookup_unit("1").unwrap().unit.pinned);
    assert!(collection.lookup_unit("3").unwrap().unit.pinned);
    assert!(collection.lookup_unit("3").unwrap().group.pinned);

    assert_eq!(collection.toggle_stack_pin_with_children(&stack), Some(false));
    assert!(collection.lookup_unit("1").unwrap().unit.pinned);
    assert!(!collection.lookup_unit("3").unwrap().unit.pinned);
    assert!(!collection.lookup_unit("3").unwrap().group.pinned);
    assert!(!collection.stack(&stack).unwrap().pinned);
}

#[test]
fn test_category_cascade_then_unpin() {
    let mut collection = loaded();

    assert_eq!(collection.toggle_category_pin_with_children("main"), Some(true));
    assert!(collection.units().all(|found| found.unit.pinned));

    // Any other pin mutation makes the next cascade a plain toggle
    collection.toggle_unit_pin("2");
    assert_eq!(collection.toggle_category_pin_with_children("main"), Some(false));
    assert!(collection.units().all(|found| !found.unit.pinned));
    assert_counts_consistent(&collection);
}

#[test]
fn test_ids_namespaced_with_several_files() {
    let mut collection = loaded();
    assert!(collection.lookup_unit("1").is_some());

    let second = load(&mut collection, DUMP, "other.txt");
    assert_eq!(second.units, 4);
    assert!(collection.is_namespaced());
    assert!(collection.lookup_unit("1").is_none());
    assert!(collection.lookup_unit("stacks.txt#1").is_some());
    assert!(collection.lookup_unit("other.txt#4").is_some());

    assert!(collection.remove_file("other.txt"));
    assert!(!collection.is_namespaced());
    assert!(collection.lookup_unit("1").is_some());
    assert!(collection.lookup_unit("stacks.txt#1").is_none());
}

#[test]
fn test_forced_unit_survives_namespacing() {
    let mut collection = loaded();
    collection.set_filter_text("state:select").unwrap();
    collection.show_unit("4");

    load(&mut collection, DUMP, "other.txt");
    assert_eq!(collection.filter().forced_unit.as_deref(), Some("stacks.txt#4"));
    assert!(collection.lookup_unit("stacks.txt#4").unwrap().unit.matched);
    assert!(!collection.lookup_unit("other.txt#4").unwrap().unit.matched);

    collection.remove_file("other.txt");
    assert_eq!(collection.filter().forced_unit.as_deref(), Some("4"));
}

#[test]
fn test_remove_file_drops_empty_nodes() {
    let mut collection = Collection::default();
    load(&mut collection, DUMP, "a");
    let extra = "goroutine 9 [IO wait]:\nnet.(*conn).Read()\n\t/go/net/net.go:1\n";
    load(&mut collection, extra, "b");
    assert!(collection.category("net").is_some());

    assert!(collection.remove_file("b"));
    assert!(!collection.remove_file("b"));
    assert!(collection.category("net").is_none());
    assert_eq!(collection.stacks().count(), 3);
    assert_eq!(collection.file_names(), ["a".to_string()]);
    assert_counts_consistent(&collection);
}

#[test]
fn test_rename_and_merge_files() {
    let mut collection = Collection::default();
    load(&mut collection, DUMP, "a");
    load(&mut collection, DUMP, "b");

    assert!(!collection.rename_file("missing", "c", false));
    assert!(!collection.rename_file("a", "b", false));

    assert!(collection.rename_file("a", "c", false));
    assert!(collection.lookup_unit("c#1").is_some());

    assert!(collection.rename_file("c", "b", true));
    assert_eq!(collection.file_names(), ["b".to_string()]);
    assert!(!collection.is_namespaced());

    let section = collection.lookup_unit("1").unwrap().section;
    assert_eq!(section.file_name, "b");
    let running = collection.lookup_unit("1").unwrap().group;
    assert_eq!(running.goroutines.len(), 4);
    assert_counts_consistent(&collection);
}

#[test]
fn test_merged_files_keep_colliding_ids_reachable() {
    let mut collection = Collection::default();
    load(&mut collection, DUMP, "a");
    load(&mut collection, DUMP, "b");
    collection.set_filter_text("state:select").unwrap();
    collection.show_unit("a#4");

    assert!(collection.rename_file("a", "b", true));

    assert_eq!(collection.units().count(), 8);
    for id in ["1", "2", "3", "4", "1@a", "2@a", "3@a", "4@a"] {
        assert!(collection.lookup_unit(id).is_some(), "missing {}", id);
    }

    let moved = collection.lookup_unit("4@a").unwrap().unit;
    assert_eq!(moved.file_name, "b");
    assert_eq!(moved.creator_id.as_deref(), Some("2@a"));
    assert!(moved.creator_exists);
    assert!(moved.matched);
    assert_eq!(collection.filter().forced_unit.as_deref(), Some("4@a"));

    assert_eq!(collection.toggle_unit_pin("1@a"), Some(true));
    assert!(!collection.lookup_unit("1").unwrap().unit.pinned);
}

#[test]
fn test_unique_and_custom_file_names() {
    let mut collection = Collection::default();
    let file = decode_goroutine_dump(DUMP, &DecodeOptions::default()).unwrap();
    let custom = collection.add_file(file.clone(), "upload.txt", Some("prod node"));
    let again = collection.add_file(file.clone(), "upload.txt", Some("prod node"));
    let plain = collection.add_file(file, "upload.txt", None);

    assert_eq!(custom.file_name, "prod node");
    assert_eq!(again.file_name, "prod node (2)");
    assert_eq!(plain.file_name, "upload.txt");
}

#[test]
fn test_extracted_name_overrides_upload_name() {
    let mut collection = Collection::default();
    let mut file = decode_goroutine_dump(DUMP, &DecodeOptions::default()).unwrap();
    file.extracted_name = Some("node-3".to_string());

    let added = collection.add_file(file, "stacks.txt", None);
    assert_eq!(added.file_name, "node-3");
    assert_eq!(added.stack_ids.len(), 3);
    assert_eq!(collection.file_sections("node-3").len(), 3);
}

#[test]
fn test_creator_exists() {
    let mut collection = loaded();
    assert!(collection.lookup_unit("2").unwrap().unit.creator_exists);
    assert!(collection.lookup_unit("4").unwrap().unit.creator_exists);
    assert!(!collection.lookup_unit("1").unwrap().unit.creator_exists);

    let orphan = "goroutine 5 [select]:\nmain.waiter()\n\t/app/wait.go:20\ncreated by main.start in goroutine 99\n\t/app/main.go:30\n";
    load(&mut collection, orphan, "orphan.txt");
    assert!(!collection.lookup_unit("orphan.txt#5").unwrap().unit.creator_exists);
    assert!(collection.lookup_unit("stacks.txt#2").unwrap().unit.creator_exists);
}

#[test]
fn test_exclude_and_solo_files() {
    let mut collection = Collection::default();
    load(&mut collection, DUMP, "a");
    load(&mut collection, DUMP, "b");

    collection.set_filter_text("exclude:a").unwrap();
    assert_eq!(visible(&collection), vec!["b#1", "b#2", "b#3", "b#4"]);

    collection.toggle_unit_pin("a#2");
    assert_eq!(visible(&collection), vec!["a#2", "b#1", "b#2", "b#3", "b#4"]);

    collection.set_filter_text("solo:a state:running").unwrap();
    assert_eq!(visible(&collection), vec!["a#1", "a#2", "a#3"]);

    let stats = collection.file_statistics();
    assert_eq!(stats["a"], StatCounts { total: 4, matches: 3 });
    assert_eq!(stats["b"], StatCounts { total: 4, matches: 0 });
}

#[test]
fn test_state_statistics() {
    let mut collection = loaded();
    collection.set_filter_text("function1").unwrap();

    let stats = collection.state_statistics();
    assert_eq!(stats["running"], StatCounts { total: 2, matches: 2 });
    assert_eq!(stats["select"], StatCounts { total: 1, matches: 1 });
    assert_eq!(stats["chan receive"], StatCounts { total: 1, matches: 0 });
}

fn synthetic(ids: &[&str]) -> DecodedFile {
    DecodedFile {
        format: DumpFormat::GoroutineDump,
        groups: vec![DecodedGroup {
            trace: vec![Frame::new("main.x", "x.go", 1)],
            state: "running".to_string(),
            labels: BTreeSet::new(),
            units: ids
                .iter()
                .map(|id| DecodedUnit {
                    id: id.to_string(),
                    wait_minutes: None,
                    creator_id: None,
                })
                .collect(),
        }],
        extracted_name: None,
        stats: DecodeStats::default(),
    }
}

#[test]
fn test_visibility_change_detects_same_size_subsets() {
    let mut collection = Collection::default();
    collection.add_file(synthetic(&["100", "200"]), "f", None);

    collection.set_filter_text("100").unwrap();
    collection.set_filter_text("200").unwrap();
    let stack = collection.stacks().next().unwrap();
    assert_eq!(stack.counts.matches, 1);
    assert_eq!(stack.counts.prior_matches, 1);
    assert!(stack.counts.visibility_changed);

    collection.set_filter_text("200").unwrap();
    let stack = collection.stacks().next().unwrap();
    assert!(!stack.counts.visibility_changed);
    assert!(!collection.categories()[0].counts.visibility_changed);
}

#[test]
fn test_update_rules_rebuckets_stacks() {
    let mut collection = loaded();
    collection.toggle_category_pin("main");
    assert_eq!(collection.categories().len(), 1);

    let title = ["skip:main.function1"];
    let category = [r"match:main\.(waiter|consumer)"];
    collection.update_rules(RuleSet::parse(&title, &category, "main"));

    assert_eq!(collection.rules().version, 1);
    assert_eq!(collection.get_category_for_unit("2"), Some("waiter"));
    assert_eq!(collection.get_category_for_unit("4"), Some("consumer"));
    assert_eq!(collection.get_category_for_unit("1"), Some("main"));
    assert!(collection.category("main").unwrap().pinned);
    assert!(!collection.category("waiter").unwrap().pinned);
    assert_eq!(collection.lookup_unit("1").unwrap().stack.name, "main.main");
    assert_counts_consistent(&collection);
}

#[test]
fn test_set_filter_validates_structured_query() {
    let mut collection = loaded();
    let query = FilterQuery {
        wait: Some(goroutine_trace_studio::aggregator::WaitConstraint::Range { min: 9, max: 2 }),
        ..FilterQuery::default()
    };

    assert!(collection.set_filter(query).is_err());
    assert!(collection.filter().is_empty());
}
