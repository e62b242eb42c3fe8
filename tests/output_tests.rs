use goroutine_trace_studio::aggregator::Collection;
use goroutine_trace_studio::output::{
    build_report, read_report, render_summary, report_to_string, write_report,
};
use goroutine_trace_studio::parser::{decode_goroutine_dump, DecodeOptions};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

const DUMP: &str = "\
goroutine 1 [running]:
main.main()
\t/app/main.go:5 +0x25

goroutine 7 [select, 12 minutes]:
main.(*pool).worker()
\t/app/pool.go:40 +0x88

goroutine 8 [select, 3 minutes]:
main.(*pool).worker()
\t/app/pool.go:40 +0x88
";

fn collection() -> Collection {
    let file = decode_goroutine_dump(DUMP, &DecodeOptions::default()).unwrap();
    let mut collection = Collection::default();
    collection.add_file(file, "stacks.txt", None);
    collection
}

#[test]
fn test_report_orders_stacks_by_visible_units() {
    let report = build_report(&collection(), None, None);

    assert_eq!(report.total, 3);
    assert_eq!(report.matches, 3);
    assert_eq!(report.categories.len(), 1);

    let stacks = &report.categories[0].stacks;
    assert_eq!(stacks[0].name, "main.(*pool).worker");
    assert_eq!(stacks[0].total, 2);
    assert_eq!(stacks[0].min_wait, Some(3));
    assert_eq!(stacks[0].max_wait, Some(12));
    assert_eq!(stacks[0].trace, vec!["main.(*pool).worker /app/pool.go:40"]);
    assert_eq!(stacks[1].min_wait, None);
}

#[test]
fn test_report_reflects_filter() {
    let mut collection = collection();
    collection.set_filter_text("wait:10+").unwrap();
    let report = build_report(&collection, Some("wait:10+"), Some(5));

    assert_eq!(report.filter.as_deref(), Some("wait:10+"));
    assert_eq!(report.matches, 1);
    assert_eq!(report.categories[0].stacks.len(), 1);
    assert_eq!(report.categories[0].stacks[0].min_wait, Some(12));

    let select = report.states.iter().find(|s| s.state == "select").unwrap();
    assert_eq!((select.total, select.matches), (2, 1));
    assert_eq!(report.states[0].state, "select");
}

#[test]
fn test_report_top_n_truncates_stacks() {
    let report = build_report(&collection(), None, Some(1));
    assert_eq!(report.categories[0].stacks.len(), 1);
}

#[test]
fn test_write_and_read_report() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("report.json");
    let report = build_report(&collection(), None, None);

    write_report(&report, &path).unwrap();
    let loaded = read_report(&path).unwrap();

    assert_eq!(loaded.total, report.total);
    assert_eq!(loaded.files[0].name, "stacks.txt");
    assert_eq!(loaded.categories.len(), report.categories.len());

    let text = report_to_string(&report).unwrap();
    assert!(text.contains("\"generated_at\""));
}

#[test]
fn test_write_report_rejects_directory() {
    let dir = tempdir().unwrap();
    let report = build_report(&collection(), None, None);
    assert!(write_report(&report, dir.path()).is_err());
}

#[test]
fn test_summary_lists_top_stacks() {
    colored::control::set_override(false);
    let summary = render_summary(&collection(), 10);

    assert!(summary.contains("main.(*pool).worker"));
    assert!(summary.contains("select"));
}
