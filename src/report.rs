//! Rendering of findings, suite runs and validation results.
//!
//! Findings rendered as JSON are a plain array of [`Finding`] and can be fed
//! back to `nullfix harness --findings`.

use crate::finding::Finding;
use crate::harness::{SuiteReport, ValidationReport};
use anyhow::{bail, Result};
use serde_json::json;
use std::fmt::{self, Write};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
    Markdown,
    /// Coverity errors XML
    Xml,
}

impl ReportFormat {
    pub const NAMES: [&'static str; 4] = ["text", "json", "markdown", "xml"];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Text => "text",
            ReportFormat::Json => "json",
            ReportFormat::Markdown => "markdown",
            ReportFormat::Xml => "xml",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" | "txt" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            "xml" | "coverity" => Ok(ReportFormat::Xml),
            other => bail!("unknown report format '{}'", other),
        }
    }
}

/// Escape text for inclusion in XML element content
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Coverity third-party errors XML: one `<error>` element per finding.
///
/// Lines below 1 are written as 1. Findings without events get a single
/// main event built from the finding itself.
pub fn coverity_errors_xml(findings: &[Finding]) -> String {
    let mut out = String::new();
    for finding in findings {
        let file = escape_xml(&finding.file);
        let function = if finding.function == "unknown" {
            String::new()
        } else {
            escape_xml(&finding.function)
        };

        out.push_str("<error><checker>");
        out.push_str(finding.category.checker());
        out.push_str("</checker><file>");
        out.push_str(&file);
        out.push_str("</file><function>");
        out.push_str(&function);
        out.push_str("</function>");

        if finding.events.is_empty() {
            let _ = write!(
                out,
                "<event><main>true</main><tag>{}</tag><description>{}</description><line>{}</line><file>{}</file></event>",
                finding.category.checker().to_lowercase(),
                escape_xml(&finding.message),
                finding.line.max(1),
                file
            );
        }
        for event in &finding.events {
            out.push_str("<event>");
            if event.main {
                out.push_str("<main>true</main>");
            }
            let _ = write!(
                out,
                "<tag>{}</tag><description>{}</description><line>{}</line><file>{}</file></event>",
                event.tag.as_str(),
                escape_xml(&event.description),
                event.line.max(1),
                file
            );
        }

        out.push_str("<extra></extra><subcategory>none</subcategory></error>\n");
    }
    out
}

pub fn render_findings(findings: &[Finding], format: ReportFormat) -> Result<String> {
    Ok(match format {
        ReportFormat::Text => {
            let mut out = String::new();
            for finding in findings {
                let _ = writeln!(out, "{}", finding);
                for event in finding.events.iter().filter(|e| !e.main) {
                    let _ = writeln!(
                        out,
                        "    {}:{}: {}: {}",
                        finding.file,
                        event.line,
                        event.tag.as_str(),
                        event.description
                    );
                }
            }
            let _ = writeln!(out, "{} finding(s)", findings.len());
            out
        }
        ReportFormat::Json => serde_json::to_string_pretty(findings)? + "\n",
        ReportFormat::Markdown => {
            let mut out = String::from("# Findings\n\n");
            if findings.is_empty() {
                out.push_str("*No findings.*\n");
            } else {
                out.push_str("| File | Line | Checker | Function | Message |\n");
                out.push_str("|------|------|---------|----------|---------|\n");
                for f in findings {
                    let _ = writeln!(
                        out,
                        "| {} | {} | {} | {} | {} |",
                        f.file,
                        f.line,
                        f.category.checker(),
                        f.function,
                        f.message.replace('|', "\\|")
                    );
                }
            }
            out
        }
        ReportFormat::Xml => coverity_errors_xml(findings),
    })
}

pub fn render_suite(report: &SuiteReport, format: ReportFormat) -> Result<String> {
    Ok(match format {
        ReportFormat::Text => suite_text(report),
        ReportFormat::Json => {
            let value = json!({
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "passed": report.passed(),
                "matched": report.matched_count(),
                "missing": report.missing_count(),
                "unexpected": report.unexpected_count(),
                "report": report,
            });
            serde_json::to_string_pretty(&value)? + "\n"
        }
        ReportFormat::Markdown => suite_markdown(report),
        ReportFormat::Xml => coverity_errors_xml(&report.all_findings()),
    })
}

fn suite_text(report: &SuiteReport) -> String {
    let mut out = String::new();
    for fixture in &report.fixtures {
        let status = if fixture.passed() { "PASS" } else { "FAIL" };
        let _ = writeln!(
            out,
            "{} {} ({} matched, {} missing, {} unexpected)",
            status,
            fixture.file,
            fixture.matched.len(),
            fixture.missing.len(),
            fixture.unexpected.len()
        );
        if let Some(error) = &fixture.error {
            let _ = writeln!(out, "    error: {}", error);
        }
        for missing in &fixture.missing {
            let _ = writeln!(out, "    missing: {}", missing);
        }
        for unexpected in &fixture.unexpected {
            let _ = writeln!(out, "    unexpected: {}", unexpected);
        }
    }
    for file in &report.orphaned {
        let _ = writeln!(out, "FAIL {} (listed in manifest, file not found)", file);
    }
    let _ = writeln!(
        out,
        "\n{}: {} fixture(s), {} matched, {} missing, {} unexpected",
        if report.passed() { "passed" } else { "FAILED" },
        report.fixtures.len(),
        report.matched_count(),
        report.missing_count(),
        report.unexpected_count()
    );
    out
}

fn suite_markdown(report: &SuiteReport) -> String {
    let mut out = String::from("# Fixture Suite\n\n");
    let _ = writeln!(
        out,
        "**Result**: {}\n",
        if report.passed() { "passed" } else { "failed" }
    );
    out.push_str("| Fixture | Status | Matched | Missing | Unexpected |\n");
    out.push_str("|---------|--------|---------|---------|------------|\n");
    for f in &report.fixtures {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            f.file,
            if f.passed() { "pass" } else { "fail" },
            f.matched.len(),
            f.missing.len(),
            f.unexpected.len()
        );
    }

    let mismatches: Vec<String> = report
        .fixtures
        .iter()
        .flat_map(|f| {
            f.missing
                .iter()
                .map(|m| format!("- missing: `{}`", m))
                .chain(f.unexpected.iter().map(|u| format!("- unexpected: `{}`", u)))
        })
        .chain(
            report
                .orphaned
                .iter()
                .map(|o| format!("- not found: `{}`", o)),
        )
        .collect();
    if !mismatches.is_empty() {
        out.push_str("\n## Mismatches\n\n");
        for line in mismatches {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

pub fn render_validation(report: &ValidationReport, format: ReportFormat) -> Result<String> {
    Ok(match format {
        ReportFormat::Json => serde_json::to_string_pretty(report)? + "\n",
        ReportFormat::Markdown => {
            let mut out = String::from("# Fixture Validation\n\n");
            let _ = writeln!(out, "Checked {} fixture(s).\n", report.fixtures_checked);
            for problem in &report.problems {
                let _ = writeln!(out, "- {}", problem);
            }
            if report.is_clean() {
                out.push_str("*No problems found.*\n");
            }
            out
        }
        ReportFormat::Xml => bail!("validation results have no XML form"),
        ReportFormat::Text => {
            let mut out = String::new();
            for problem in &report.problems {
                let _ = writeln!(out, "{}", problem);
            }
            let _ = writeln!(
                out,
                "{} fixture(s) checked, {} problem(s)",
                report.fixtures_checked,
                report.problems.len()
            );
            out
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{DefectCategory, Event, EventTag};
    use crate::harness::{FindingSource, FixtureResult};
    use crate::manifest::ExpectedFinding;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use test_case::test_case;

    fn reverse_finding() -> Finding {
        Finding {
            file: "reverse-null.c".to_string(),
            function: "basic_reverse_null".to_string(),
            line: 10,
            category: DefectCategory::ReverseNull,
            message: "check <after> deref".to_string(),
            events: vec![
                Event {
                    tag: EventTag::DerefBeforeCheck,
                    line: 8,
                    description: "deref \"request_buf\"".to_string(),
                    main: false,
                },
                Event {
                    tag: EventTag::NullCheck,
                    line: 10,
                    description: "check & fail".to_string(),
                    main: true,
                },
            ],
        }
    }

    #[test_case("text", ReportFormat::Text)]
    #[test_case("JSON", ReportFormat::Json)]
    #[test_case("md", ReportFormat::Markdown)]
    #[test_case("coverity", ReportFormat::Xml)]
    fn test_format_from_str(input: &str, expected: ReportFormat) {
        assert_eq!(input.parse::<ReportFormat>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_format() {
        assert!("sarif".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(
            escape_xml(r#"a < b && "c" > 'd'"#),
            "a &lt; b &amp;&amp; &quot;c&quot; &gt; &apos;d&apos;"
        );
    }

    #[test]
    fn test_coverity_xml() {
        let xml = coverity_errors_xml(&[reverse_finding()]);
        assert_eq!(
            xml,
            "<error><checker>REVERSE_INULL</checker><file>reverse-null.c</file><function>basic_reverse_null</function>\
<event><tag>deref_before_check</tag><description>deref &quot;request_buf&quot;</description><line>8</line><file>reverse-null.c</file></event>\
<event><main>true</main><tag>null_check</tag><description>check &amp; fail</description><line>10</line><file>reverse-null.c</file></event>\
<extra></extra><subcategory>none</subcategory></error>\n"
        );
    }

    #[test]
    fn test_coverity_xml_clamps_lines_and_unknown_function() {
        let finding = Finding {
            file: "x.c".to_string(),
            function: "unknown".to_string(),
            line: 0,
            category: DefectCategory::ForwardNull,
            message: "m".to_string(),
            events: Vec::new(),
        };
        let xml = coverity_errors_xml(&[finding]);
        assert!(xml.contains("<function></function>"));
        assert!(xml.contains("<main>true</main><tag>forward_null</tag>"));
        assert!(xml.contains("<line>1</line>"));
    }

    #[test]
    fn test_json_findings_reimport() {
        let findings = vec![reverse_finding()];
        let json = render_findings(&findings, ReportFormat::Json).unwrap();
        let back: Vec<Finding> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, findings);
    }

    #[test]
    fn test_text_findings() {
        let text = render_findings(&[reverse_finding()], ReportFormat::Text).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("reverse-null.c:10: REVERSE_INULL in basic_reverse_null"));
        assert!(lines[1].contains("reverse-null.c:8: deref_before_check"));
        assert_eq!(lines.last(), Some(&"1 finding(s)"));
    }

    fn failing_suite() -> SuiteReport {
        SuiteReport {
            suite_dir: PathBuf::from("fixtures"),
            manifest: PathBuf::from("fixtures/expected.toml"),
            source: FindingSource::Oracle,
            fixtures: vec![FixtureResult {
                file: "reverse-null.c".to_string(),
                category: Some(DefectCategory::ReverseNull),
                findings: vec![reverse_finding()],
                matched: Vec::new(),
                missing: vec![ExpectedFinding {
                    file: "reverse-null.c".to_string(),
                    function: "basic_reverse_null".to_string(),
                    line: 11,
                    category: DefectCategory::ReverseNull,
                }],
                unexpected: vec![reverse_finding()],
                error: None,
            }],
            orphaned: vec!["gone.c".to_string()],
        }
    }

    #[test]
    fn test_suite_text() {
        let text = render_suite(&failing_suite(), ReportFormat::Text).unwrap();
        assert!(text.starts_with("FAIL reverse-null.c (0 matched, 1 missing, 1 unexpected)"));
        assert!(text.contains("    missing: reverse-null.c:11: REVERSE_INULL in basic_reverse_null"));
        assert!(text.contains("FAIL gone.c"));
        assert!(text.contains("FAILED: 1 fixture(s)"));
    }

    #[test]
    fn test_suite_json() {
        let json = render_suite(&failing_suite(), ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["passed"], json!(false));
        assert_eq!(value["missing"], json!(1));
        assert_eq!(value["report"]["source"]["kind"], json!("oracle"));
        assert!(value["generated_at"].as_str().is_some());
    }

    #[test]
    fn test_suite_markdown_lists_mismatches() {
        let md = render_suite(&failing_suite(), ReportFormat::Markdown).unwrap();
        assert!(md.contains("| reverse-null.c | fail | 0 | 1 | 1 |"));
        assert!(md.contains("- not found: `gone.c`"));
    }

    #[test]
    fn test_validation_text_and_xml() {
        let report = ValidationReport {
            fixtures_checked: 2,
            problems: Vec::new(),
        };
        let text = render_validation(&report, ReportFormat::Text).unwrap();
        assert_eq!(text, "2 fixture(s) checked, 0 problem(s)\n");
        assert!(render_validation(&report, ReportFormat::Xml).is_err());
    }
}
