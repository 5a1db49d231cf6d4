//! Integration tests over the shipped fixture suite.

use nullfix::finding::{DefectCategory, EventTag, Finding};
use nullfix::fixture::DefectFixture;
use nullfix::harness::{run_suite, validate_suite, FindingSource, ProblemKind, SuiteOptions};
use nullfix::parser::parse_c;
use nullfix::report::{render_suite, ReportFormat};
use nullfix::{check_source, CheckerOptions, Metrics, NullfixConfig};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};

const MAX_SIZE: u64 = 1024 * 1024;

fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

fn load(file: &str) -> DefectFixture {
    DefectFixture::load(&fixtures_dir().join(file), file, None, MAX_SIZE).unwrap()
}

fn oracle(fixture: &DefectFixture) -> Vec<Finding> {
    let parsed = fixture.parse().unwrap();
    check_source(&parsed, &fixture.file, &CheckerOptions::default())
}

fn suite_options() -> SuiteOptions {
    let config = NullfixConfig {
        suite_dir: fixtures_dir(),
        ..Default::default()
    };
    SuiteOptions::from(&config)
}

/// Copy the shipped fixtures into a scratch suite directory
fn scratch_suite() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for file in ["forward-null.c", "reverse-null.c", "expected.toml"] {
        std::fs::copy(fixtures_dir().join(file), dir.path().join(file)).unwrap();
    }
    dir
}

fn scratch_options(dir: &Path) -> SuiteOptions {
    let config = NullfixConfig {
        suite_dir: dir.to_path_buf(),
        ..Default::default()
    };
    SuiteOptions::from(&config)
}

#[test]
fn forward_null_deref_after_null_branch() {
    let fixture = load("forward-null.c");
    assert_eq!(fixture.category, DefectCategory::ForwardNull);

    let findings = oracle(&fixture);
    let example1 = findings
        .iter()
        .find(|f| f.function == "forward_null_example1")
        .expect("example 1 finding");

    assert_eq!(example1.line, 13);
    assert_eq!(example1.category, DefectCategory::ForwardNull);
    assert_eq!(example1.events[0].tag, EventTag::NullCheck);
    assert_eq!(example1.events[0].line, 7);
    assert_eq!(example1.main_event().map(|e| e.tag), Some(EventTag::VarDerefOp));
}

#[test]
fn forward_null_discarded_check_reaches_callee() {
    let findings = oracle(&load("forward-null.c"));
    let example2 = findings
        .iter()
        .find(|f| f.function == "forward_null_example2")
        .expect("example 2 finding");

    assert_eq!(example2.line, 32);
    assert_eq!(example2.events[0].line, 28);
    assert_eq!(example2.main_event().map(|e| e.tag), Some(EventTag::VarDerefModel));
    assert!(example2.message.contains("\"fn2\""));
}

#[test]
fn forward_null_fixture_has_no_other_findings() {
    let findings = oracle(&load("forward-null.c"));
    let summary: Vec<_> = findings
        .iter()
        .map(|f| (f.function.as_str(), f.line, f.category))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("forward_null_example1", 13, DefectCategory::ForwardNull),
            ("forward_null_example2", 32, DefectCategory::ForwardNull),
        ]
    );
}

#[test]
fn reverse_null_check_after_deref() {
    let findings = oracle(&load("reverse-null.c"));
    assert_eq!(findings.len(), 1);

    let finding = &findings[0];
    assert_eq!(finding.function, "basic_reverse_null");
    assert_eq!(finding.category, DefectCategory::ReverseNull);
    assert_eq!(finding.line, 10);
    assert_eq!(finding.events[0].tag, EventTag::DerefBeforeCheck);
    assert_eq!(finding.events[0].line, 8);
    assert!(finding.events[0].line < finding.line);
}

#[test]
fn fixtures_round_trip_as_c() {
    for file in ["forward-null.c", "reverse-null.c"] {
        let fixture = load(file);
        let parsed = parse_c(&fixture.source).unwrap();
        assert!(parsed.is_well_formed(), "{} has syntax issues: {:?}", file, parsed.issues);
    }
}

#[test]
fn fixture_reads_are_idempotent() {
    for file in ["forward-null.c", "reverse-null.c"] {
        let first = load(file);
        let second = load(file);
        assert_eq!(first.digest, second.digest);
        assert_eq!(first.source, second.source);
    }
}

#[test]
fn annotations_line_up_with_findings() {
    let fixture = load("forward-null.c");
    assert_eq!(fixture.annotations.len(), 1);
    assert_eq!(fixture.annotations[0].line, 13);
    assert_eq!(fixture.annotations[0].message, "p is potentially NULL");
}

#[test]
fn guarded_dereference_is_not_reported() {
    let source = "void f(int *p) {\n    if (!p) return;\n    *p = 1;\n}\n";
    let parsed = parse_c(source).unwrap();
    assert!(check_source(&parsed, "guarded.c", &CheckerOptions::default()).is_empty());
}

#[test]
fn check_before_deref_is_not_reverse_null() {
    let source = "int f(int *p) {\n    if (p == 0)\n        return -1;\n    *p = 1;\n    return 0;\n}\n";
    let parsed = parse_c(source).unwrap();
    let findings = check_source(&parsed, "ordered.c", &CheckerOptions::default());
    assert!(findings
        .iter()
        .all(|f| f.category != DefectCategory::ReverseNull));
}

#[test]
fn shipped_suite_passes() {
    let report = run_suite(&suite_options(), &Metrics::new()).unwrap();
    assert!(report.passed(), "{}", render_suite(&report, ReportFormat::Text).unwrap());
    assert_eq!(report.matched_count(), 3);
    assert_eq!(report.source, FindingSource::Oracle);
    assert!(report.orphaned.is_empty());
}

#[test]
fn shipped_suite_validates() {
    let report = validate_suite(&suite_options(), &Metrics::new()).unwrap();
    assert_eq!(report.fixtures_checked, 2);
    assert_eq!(report.problems, Vec::new());
}

#[test]
fn shipped_suite_in_xml() {
    let report = run_suite(&suite_options(), &Metrics::new()).unwrap();
    let xml = render_suite(&report, ReportFormat::Xml).unwrap();
    assert_eq!(xml.matches("<error>").count(), 3);
    assert!(xml.contains("<checker>REVERSE_INULL</checker><file>reverse-null.c</file>"));
    assert!(xml.contains("<main>true</main><tag>var_deref_model</tag>"));
}

#[test]
fn sequential_run_matches_parallel() {
    let parallel = run_suite(&suite_options(), &Metrics::new()).unwrap();
    let mut options = suite_options();
    options.parallel = false;
    let sequential = run_suite(&options, &Metrics::new()).unwrap();
    assert_eq!(parallel.all_findings(), sequential.all_findings());
}

#[test]
fn manifest_mismatch_fails_the_suite() {
    let dir = scratch_suite();
    let manifest = std::fs::read_to_string(dir.path().join("expected.toml")).unwrap();
    std::fs::write(
        dir.path().join("expected.toml"),
        manifest.replace("line = 10", "line = 11"),
    )
    .unwrap();

    let report = run_suite(&scratch_options(dir.path()), &Metrics::new()).unwrap();
    assert!(!report.passed());
    let reverse = report
        .fixtures
        .iter()
        .find(|f| f.file == "reverse-null.c")
        .unwrap();
    assert_eq!(reverse.missing.len(), 1);
    assert_eq!(reverse.missing[0].line, 11);
    assert_eq!(reverse.unexpected.len(), 1);
    assert_eq!(reverse.unexpected[0].line, 10);
}

#[test]
fn imported_findings_are_diffed() {
    let dir = scratch_suite();
    let options = scratch_options(dir.path());

    // Export the oracle's findings with absolute paths, then diff them back
    let report = run_suite(&options, &Metrics::new()).unwrap();
    let exported: Vec<Finding> = report
        .all_findings()
        .into_iter()
        .filter(|f| f.category == DefectCategory::ForwardNull)
        .map(|mut f| {
            f.file = format!("/build/src/{}", f.file);
            f
        })
        .collect();
    let findings_path = dir.path().join("findings.json");
    std::fs::write(&findings_path, serde_json::to_string(&exported).unwrap()).unwrap();

    let mut imported = options.clone();
    imported.findings = Some(findings_path.clone());
    let report = run_suite(&imported, &Metrics::new()).unwrap();

    assert_eq!(report.source, FindingSource::Imported(findings_path));
    assert_eq!(report.matched_count(), 2);
    assert_eq!(report.missing_count(), 1);
    assert!(!report.passed());
}

#[test]
fn invalid_findings_file_is_error() {
    let dir = scratch_suite();
    let findings_path = dir.path().join("findings.json");
    std::fs::write(&findings_path, "{ not json").unwrap();

    let mut options = scratch_options(dir.path());
    options.findings = Some(findings_path);
    assert!(run_suite(&options, &Metrics::new()).is_err());
}

#[test]
fn validation_reports_authoring_mistakes() {
    let dir = scratch_suite();

    // Edited fixture: digest changes and the dereference no longer happens first
    let reverse = std::fs::read_to_string(dir.path().join("reverse-null.c")).unwrap();
    std::fs::write(
        dir.path().join("reverse-null.c"),
        reverse.replace(
            "    *request_buf = some_function();",
            "    if (!request_buf) return -2;",
        ),
    )
    .unwrap();
    // Unlisted fixture that is not valid C
    std::fs::write(dir.path().join("forward-null-broken.c"), "int f( {\n").unwrap();
    // Listed fixture that does not exist
    let manifest = std::fs::read_to_string(dir.path().join("expected.toml")).unwrap();
    std::fs::write(
        dir.path().join("expected.toml"),
        manifest + "\n[[fixture]]\nfile = \"gone.c\"\ncategory = \"forward-null\"\n",
    )
    .unwrap();

    let report = validate_suite(&scratch_options(dir.path()), &Metrics::new()).unwrap();
    let kinds: Vec<(&str, &ProblemKind)> = report
        .problems
        .iter()
        .map(|p| (p.file.as_str(), &p.kind))
        .collect();

    assert!(kinds
        .iter()
        .any(|(f, k)| *f == "reverse-null.c" && matches!(k, ProblemKind::DigestMismatch { .. })));
    assert!(kinds.iter().any(|(f, k)| *f == "reverse-null.c"
        && matches!(k, ProblemKind::NoDefect { category: DefectCategory::ReverseNull })));
    assert!(kinds
        .iter()
        .any(|(f, k)| *f == "forward-null-broken.c" && matches!(k, ProblemKind::SyntaxError { .. })));
    assert!(kinds
        .iter()
        .any(|(f, k)| *f == "forward-null-broken.c" && matches!(k, ProblemKind::NotInManifest)));
    assert!(kinds
        .iter()
        .any(|(f, k)| *f == "gone.c" && matches!(k, ProblemKind::MissingFile)));
    assert!(!kinds.iter().any(|(f, _)| *f == "forward-null.c"));
}

#[test]
fn oversized_fixture_is_reported() {
    let dir = scratch_suite();
    let mut options = scratch_options(dir.path());
    options.max_file_size = 64;

    let report = run_suite(&options, &Metrics::new()).unwrap();
    assert!(!report.passed());
    assert!(report.fixtures.iter().all(|f| f.error.is_some()));
}
