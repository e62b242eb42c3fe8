use goroutine_trace_studio::commands::{
    execute_analyze, validate_args, validate_report_file, AnalyzeArgs,
};
use pretty_assertions::assert_eq;
use std::fs;
use tempfile::tempdir;

const DUMP: &str = "\
goroutine 1 [running]:
main.main()
\t/app/main.go:5 +0x25

goroutine 2 [select, 5 minutes]:
github.com/acme/jobs.(*Queue).poll()
\t/src/github.com/acme/jobs/queue.go:31 +0x40
created by main.main in goroutine 1
\t/app/main.go:9 +0x2f
";

#[test]
fn test_analyze_writes_report() {
    let dir = tempdir().unwrap();
    let dump = dir.path().join("stacks.txt");
    let output = dir.path().join("out").join("report.json");
    fs::write(&dump, DUMP).unwrap();

    let args = AnalyzeArgs {
        files: vec![dump],
        filter: Some("wait:1+".to_string()),
        output: Some(output.clone()),
        ..AnalyzeArgs::default()
    };
    validate_args(&args).unwrap();
    let report = execute_analyze(args).unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.matches, 1);
    assert_eq!(report.categories[0].name, "github.com/acme");
    assert!(output.exists());
    validate_report_file(output).unwrap();
}

#[test]
fn test_analyze_applies_settings() {
    let dir = tempdir().unwrap();
    let dump = dir.path().join("stacks.txt");
    let settings = dir.path().join("settings.toml");
    fs::write(&dump, DUMP).unwrap();
    fs::write(
        &settings,
        r#"
file_trim_prefixes = ["/src/"]
category_rules = ['match:github\.com/acme/(\w+)']
"#,
    )
    .unwrap();

    let args = AnalyzeArgs {
        files: vec![dump],
        settings: Some(settings),
        ..AnalyzeArgs::default()
    };
    let report = execute_analyze(args).unwrap();

    let names: Vec<&str> = report.categories.iter().map(|c| c.name.as_str()).collect();
    assert!(names.contains(&"jobs"));
    assert!(names.contains(&"main"));

    let jobs = report.categories.iter().find(|c| c.name == "jobs").unwrap();
    assert_eq!(
        jobs.stacks[0].trace[0],
        "github.com/acme/jobs.(*Queue).poll github.com/acme/jobs/queue.go:31"
    );
}

#[test]
fn test_analyze_skips_undecodable_file() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("stacks.txt");
    let bad = dir.path().join("bad.txt");
    fs::write(&good, DUMP).unwrap();
    fs::write(&bad, "1 @ 0x1\n# labels: {not json}\n").unwrap();

    let report = execute_analyze(AnalyzeArgs {
        files: vec![bad, good],
        ..AnalyzeArgs::default()
    })
    .unwrap();

    assert_eq!(report.files.len(), 1);
    assert_eq!(report.total, 2);
}

#[test]
fn test_analyze_rejects_bad_filter() {
    let dir = tempdir().unwrap();
    let dump = dir.path().join("stacks.txt");
    fs::write(&dump, DUMP).unwrap();

    let args = AnalyzeArgs {
        files: vec![dump],
        filter: Some("one two".to_string()),
        ..AnalyzeArgs::default()
    };
    assert!(validate_args(&args).is_err());
    assert!(execute_analyze(args).is_err());
}

#[test]
fn test_validate_args_missing_input() {
    let dir = tempdir().unwrap();
    let args = AnalyzeArgs {
        files: vec![dir.path().join("absent.txt")],
        ..AnalyzeArgs::default()
    };
    assert!(validate_args(&args).is_err());
}
