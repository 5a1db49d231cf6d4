//! End-to-end tests of the `nullfix` binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

/// Run the binary from an empty directory with an explicit config file so no
/// project or user configuration leaks in.
fn nullfix(args: &[&str]) -> Output {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(
        &config,
        format!("version: \"1.0\"\nsuite_dir: {:?}\n", fixtures_dir()),
    )
    .unwrap();

    Command::new(env!("CARGO_BIN_EXE_nullfix"))
        .current_dir(dir.path())
        .env_remove("RUST_LOG")
        .env_remove("NULLFIX_SUITE_DIR")
        .env_remove("NULLFIX_MANIFEST")
        .env_remove("NULLFIX_FORMAT")
        .arg("--config")
        .arg(&config)
        .args(args)
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn harness_passes_on_shipped_suite() {
    let output = nullfix(&["harness"]);
    assert!(output.status.success(), "{}", stdout(&output));
    let text = stdout(&output);
    assert!(text.contains("PASS forward-null.c (2 matched, 0 missing, 0 unexpected)"));
    assert!(text.contains("PASS reverse-null.c (1 matched, 0 missing, 0 unexpected)"));
}

#[test]
fn harness_exits_nonzero_on_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("expected.toml");
    std::fs::write(
        &manifest,
        "[[fixture]]\nfile = \"reverse-null.c\"\ncategory = \"reverse-null\"\n\n[[fixture.expect]]\nfunction = \"basic_reverse_null\"\nline = 8\n",
    )
    .unwrap();

    let output = nullfix(&["harness", "--manifest", manifest.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let text = stdout(&output);
    assert!(text.contains("FAIL forward-null.c"));
    assert!(text.contains("missing: reverse-null.c:8: REVERSE_INULL in basic_reverse_null"));
}

#[test]
fn validate_is_clean_on_shipped_suite() {
    let output = nullfix(&["validate"]);
    assert!(output.status.success(), "{}", stdout(&output));
    assert!(stdout(&output).contains("2 fixture(s) checked, 0 problem(s)"));
}

#[test]
fn check_emits_coverity_xml() {
    let file = fixtures_dir().join("reverse-null.c");
    let output = nullfix(&["check", file.to_str().unwrap(), "--format", "xml"]);
    assert!(output.status.success());
    let xml = stdout(&output);
    assert_eq!(xml.matches("<error>").count(), 1);
    assert!(xml.contains("<checker>REVERSE_INULL</checker>"));
    assert!(xml.contains("<function>basic_reverse_null</function>"));
    assert!(xml.contains("<main>true</main><tag>null_check</tag>"));
}

#[test]
fn check_category_filter() {
    let output = nullfix(&[
        "check",
        fixtures_dir().to_str().unwrap(),
        "--category",
        "reverse-null",
        "--format",
        "json",
    ]);
    assert!(output.status.success());
    let findings: Vec<serde_json::Value> = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0]["category"], "reverse-null");
    assert_eq!(findings[0]["line"], 10);
}

#[test]
fn cfg_dot_output() {
    let file = fixtures_dir().join("forward-null.c");
    let output = nullfix(&[
        "cfg",
        file.to_str().unwrap(),
        "--function",
        "forward_null_example1",
        "--dot",
    ]);
    assert!(output.status.success());
    let dot = stdout(&output);
    assert!(dot.starts_with("digraph \"forward_null_example1\""));
    assert_eq!(dot.matches("digraph").count(), 1);
}

#[test]
fn cfg_unknown_function_fails() {
    let file = fixtures_dir().join("forward-null.c");
    let output = nullfix(&["cfg", file.to_str().unwrap(), "--function", "nope"]);
    assert!(!output.status.success());
}

#[test]
fn invalid_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("bad.yaml");
    std::fs::write(&config, "version: \"9.9\"\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_nullfix"))
        .current_dir(dir.path())
        .args(["--config", config.to_str().unwrap(), "validate"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unsupported configuration version"));
}

#[test]
fn validate_rejects_xml_format() {
    let output = nullfix(&["validate", "--format", "xml"]);
    assert!(!output.status.success());
    assert!(stdout(&output).is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no XML output"));
}

#[test]
fn metrics_json_goes_to_stderr() {
    let output = nullfix(&["validate", "--metrics=json"]);
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    let start = stderr.find("{\n  \"").unwrap();
    let metrics: serde_json::Value = serde_json::from_str(&stderr[start..]).unwrap();
    assert!(metrics["phases"].is_object());
}

#[test]
fn metrics_flag_defaults_to_markdown() {
    let output = nullfix(&["validate", "--metrics"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("# Analysis Metrics"));
}

#[test]
fn check_models_exit_as_noreturn() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("guarded.c");
    std::fs::write(
        &file,
        "#include <stdlib.h>\nvoid f(int *p) {\n    if (!p)\n        exit(1);\n    *p = 1;\n}\n",
    )
    .unwrap();
    let output = nullfix(&["check", file.to_str().unwrap(), "--format", "json"]);
    assert!(output.status.success());
    let findings: Vec<serde_json::Value> = serde_json::from_str(&stdout(&output)).unwrap();
    assert!(findings.is_empty());
}
