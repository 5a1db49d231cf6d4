//! Golden harness: analyze every fixture in a suite and diff the findings
//! against the manifest.
//!
//! Findings come from the built-in checkers or, for an external analyzer,
//! from a JSON file of [`Finding`]s. Each rayon worker owns its own
//! tree-sitter parser.

use crate::cfg::build_cfgs;
use crate::checkers::{check_cfgs, check_source, CheckerOptions};
use crate::config::NullfixConfig;
use crate::error::NullfixError;
use crate::finding::{sort_findings, DefectCategory, Finding};
use crate::fixture::{read_limited, DefectFixture};
use crate::manifest::{ExpectedFinding, Manifest};
use crate::metrics::Metrics;
use crate::parser::{new_parser, parse_with, SyntaxIssue};
use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use tree_sitter::Parser;
use walkdir::WalkDir;

/// Everything a suite run needs
#[derive(Debug, Clone)]
pub struct SuiteOptions {
    pub suite_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub max_file_size: u64,
    pub checker: CheckerOptions,
    pub parallel: bool,
    /// Diff these findings instead of running the built-in checkers
    pub findings: Option<PathBuf>,
}

impl From<&NullfixConfig> for SuiteOptions {
    fn from(config: &NullfixConfig) -> Self {
        Self {
            suite_dir: config.suite_dir.clone(),
            manifest_path: config.manifest_path(),
            max_file_size: config.max_file_size,
            checker: config.checker_options(),
            parallel: config.parallel,
            findings: None,
        }
    }
}

/// A loaded fixture together with what the checkers found in it
#[derive(Debug, Clone)]
pub struct FixtureAnalysis {
    pub fixture: DefectFixture,
    pub syntax_issues: Vec<SyntaxIssue>,
    pub function_count: usize,
    pub findings: Vec<Finding>,
}

/// Golden diff for one fixture
#[derive(Debug, Clone, Serialize)]
pub struct FixtureResult {
    pub file: String,
    pub category: Option<DefectCategory>,
    /// Every finding reported against the fixture
    pub findings: Vec<Finding>,
    pub matched: Vec<ExpectedFinding>,
    pub missing: Vec<ExpectedFinding>,
    pub unexpected: Vec<Finding>,
    /// Set when the fixture could not be loaded
    pub error: Option<String>,
}

impl FixtureResult {
    pub fn passed(&self) -> bool {
        self.error.is_none() && self.missing.is_empty() && self.unexpected.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum FindingSource {
    Oracle,
    Imported(PathBuf),
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub suite_dir: PathBuf,
    pub manifest: PathBuf,
    pub source: FindingSource,
    pub fixtures: Vec<FixtureResult>,
    /// Manifest entries whose file was not found in the suite
    pub orphaned: Vec<String>,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.orphaned.is_empty() && self.fixtures.iter().all(FixtureResult::passed)
    }

    pub fn matched_count(&self) -> usize {
        self.fixtures.iter().map(|f| f.matched.len()).sum()
    }

    pub fn missing_count(&self) -> usize {
        self.fixtures.iter().map(|f| f.missing.len()).sum()
    }

    pub fn unexpected_count(&self) -> usize {
        self.fixtures.iter().map(|f| f.unexpected.len()).sum()
    }

    /// Every finding the run produced, matched or not
    pub fn all_findings(&self) -> Vec<Finding> {
        self.fixtures
            .iter()
            .flat_map(|f| f.findings.iter().cloned())
            .collect()
    }
}

/// A fixture authoring mistake found by [`validate_suite`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationProblem {
    pub file: String,
    pub kind: ProblemKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProblemKind {
    LoadFailed { message: String },
    SyntaxError { line: usize, column: usize, detail: String },
    /// The fixture does not exhibit the defect it is labelled with
    NoDefect { category: DefectCategory },
    UnmatchedAnnotation { line: usize, message: String },
    DigestMismatch { expected: String, actual: String },
    NotInManifest,
    MissingFile,
}

impl fmt::Display for ValidationProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ProblemKind::LoadFailed { message } => write!(f, "{}: cannot load: {}", self.file, message),
            ProblemKind::SyntaxError {
                line,
                column,
                detail,
            } => write!(f, "{}:{}:{}: syntax error: {}", self.file, line, column, detail),
            ProblemKind::NoDefect { category } => write!(
                f,
                "{}: no {} finding; the fixture does not exhibit its defect",
                self.file,
                category.checker()
            ),
            ProblemKind::UnmatchedAnnotation { line, message } => write!(
                f,
                "{}:{}: annotated defect not found: {}",
                self.file, line, message
            ),
            ProblemKind::DigestMismatch { expected, actual } => write!(
                f,
                "{}: sha256 {} does not match manifest {}",
                self.file, actual, expected
            ),
            ProblemKind::NotInManifest => write!(f, "{}: not listed in the manifest", self.file),
            ProblemKind::MissingFile => {
                write!(f, "{}: listed in the manifest but not found", self.file)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub fixtures_checked: usize,
    pub problems: Vec<ValidationProblem>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

/// All `*.c` files under `dir`, sorted by path
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(anyhow!("Suite directory {} does not exist", dir.display()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|e| e == "c") {
            files.push(entry.into_path());
        }
    }
    files.sort();
    debug!("Discovered {} fixture(s) in {}", files.len(), dir.display());
    Ok(files)
}

/// Path relative to the suite directory, with `/` separators
pub fn relative_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Findings exported by another analyzer
pub fn load_findings(path: &Path) -> crate::error::Result<Vec<Finding>> {
    let content = std::fs::read_to_string(path).map_err(|e| NullfixError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| NullfixError::Findings {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn analyze_fixture(
    parser: &mut Parser,
    suite_dir: &Path,
    path: &Path,
    manifest: &Manifest,
    options: &SuiteOptions,
    metrics: &Metrics,
) -> Result<FixtureAnalysis> {
    let start = Instant::now();
    let file = relative_name(suite_dir, path);
    let category = manifest.get(&file).map(|entry| entry.category);

    let (fixture, parsed) = metrics.time("load", || {
        DefectFixture::load_with(parser, path, &file, category, options.max_file_size)
    })?;

    let (function_count, findings) = if options.findings.is_some() {
        (0, Vec::new())
    } else {
        let cfgs = metrics.time("cfg", || {
            build_cfgs(&parsed, &file, &options.checker.null_names)
        });
        let findings = metrics.time("check", || check_cfgs(&cfgs, &options.checker));
        (cfgs.len(), findings)
    };

    metrics.record_fixture(&file, start.elapsed(), function_count, findings.len());
    debug!("{}: {} finding(s)", file, findings.len());

    Ok(FixtureAnalysis {
        fixture,
        syntax_issues: parsed.issues,
        function_count,
        findings,
    })
}

/// Analyze every path, in parallel when enabled. Results keep input order.
fn analyze_all(
    paths: &[PathBuf],
    manifest: &Manifest,
    options: &SuiteOptions,
    metrics: &Metrics,
) -> Vec<(String, Result<FixtureAnalysis>)> {
    let work = |parser: &mut crate::error::Result<Parser>, path: &PathBuf| {
        let file = relative_name(&options.suite_dir, path);
        let analysis = parser
            .as_mut()
            .map_err(|e| anyhow!("{}", e))
            .and_then(|parser| {
                analyze_fixture(parser, &options.suite_dir, path, manifest, options, metrics)
            });
        (file, analysis)
    };

    if options.parallel {
        paths.par_iter().map_init(new_parser, work).collect()
    } else {
        let mut parser = new_parser();
        paths.iter().map(|path| work(&mut parser, path)).collect()
    }
}

fn load_manifest(path: &Path) -> Result<Manifest> {
    Manifest::load(path).with_context(|| format!("Failed to load manifest {}", path.display()))
}

/// Diff findings against expectations; each finding satisfies at most one
fn diff(
    expected: &[ExpectedFinding],
    findings: Vec<Finding>,
) -> (Vec<ExpectedFinding>, Vec<ExpectedFinding>, Vec<Finding>) {
    let mut remaining = findings;
    let mut matched = Vec::new();
    let mut missing = Vec::new();

    for exp in expected {
        match remaining.iter().position(|f| exp.matches(f)) {
            Some(index) => {
                remaining.remove(index);
                matched.push(exp.clone());
            }
            None => missing.push(exp.clone()),
        }
    }
    (matched, missing, remaining)
}

/// Whether an imported finding's file refers to `fixture_file`
fn same_file(finding_file: &str, fixture_file: &str) -> bool {
    let normalized = finding_file.replace('\\', "/");
    normalized == fixture_file || normalized.ends_with(&format!("/{}", fixture_file))
}

/// Run the golden diff over a whole suite
pub fn run_suite(options: &SuiteOptions, metrics: &Metrics) -> Result<SuiteReport> {
    let manifest = load_manifest(&options.manifest_path)?;
    let paths = discover(&options.suite_dir)?;

    let imported = match &options.findings {
        Some(path) => {
            let findings = load_findings(path)?;
            info!("Imported {} finding(s) from {}", findings.len(), path.display());
            Some(findings)
        }
        None => None,
    };

    let analyses = analyze_all(&paths, &manifest, options, metrics);
    let mut seen = BTreeSet::new();
    let mut fixtures = Vec::with_capacity(analyses.len());

    for (file, analysis) in analyses {
        seen.insert(file.clone());
        let expected = manifest
            .get(&file)
            .map(|entry| entry.expected.clone())
            .unwrap_or_default();

        let analysis = match analysis {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("{}: {:#}", file, e);
                fixtures.push(FixtureResult {
                    file,
                    category: None,
                    findings: Vec::new(),
                    matched: Vec::new(),
                    missing: expected,
                    unexpected: Vec::new(),
                    error: Some(format!("{:#}", e)),
                });
                continue;
            }
        };

        let mut findings = match &imported {
            Some(imported) => imported
                .iter()
                .filter(|f| same_file(&f.file, &file))
                .cloned()
                .map(|mut f| {
                    f.file = file.clone();
                    f
                })
                .collect(),
            None => analysis.findings,
        };
        sort_findings(&mut findings);

        let (matched, missing, unexpected) = diff(&expected, findings.clone());
        fixtures.push(FixtureResult {
            file,
            category: Some(analysis.fixture.category),
            findings,
            matched,
            missing,
            unexpected,
            error: None,
        });
    }

    let orphaned: Vec<String> = manifest
        .entries()
        .filter(|entry| !seen.contains(&entry.file))
        .map(|entry| entry.file.clone())
        .collect();

    let report = SuiteReport {
        suite_dir: options.suite_dir.clone(),
        manifest: options.manifest_path.clone(),
        source: match &options.findings {
            Some(path) => FindingSource::Imported(path.clone()),
            None => FindingSource::Oracle,
        },
        fixtures,
        orphaned,
    };

    info!(
        "Suite {}: {} matched, {} missing, {} unexpected",
        if report.passed() { "passed" } else { "failed" },
        report.matched_count(),
        report.missing_count(),
        report.unexpected_count()
    );
    Ok(report)
}

/// Check that every fixture is valid C, exhibits its defect, and agrees
/// with the manifest.
pub fn validate_suite(options: &SuiteOptions, metrics: &Metrics) -> Result<ValidationReport> {
    let manifest = load_manifest(&options.manifest_path)?;
    let paths = discover(&options.suite_dir)?;

    // Validation always uses the built-in checkers
    let options = SuiteOptions {
        findings: None,
        ..options.clone()
    };
    let analyses = analyze_all(&paths, &manifest, &options, metrics);

    let mut problems = Vec::new();
    let mut seen = BTreeSet::new();
    for (file, analysis) in &analyses {
        seen.insert(file.clone());
        let problem = |kind| ValidationProblem {
            file: file.clone(),
            kind,
        };

        let analysis = match analysis {
            Ok(analysis) => analysis,
            Err(e) => {
                problems.push(problem(ProblemKind::LoadFailed {
                    message: format!("{:#}", e),
                }));
                continue;
            }
        };
        let fixture = &analysis.fixture;

        for issue in &analysis.syntax_issues {
            problems.push(problem(ProblemKind::SyntaxError {
                line: issue.line,
                column: issue.column,
                detail: issue.detail.clone(),
            }));
        }

        if !analysis
            .findings
            .iter()
            .any(|f| f.category == fixture.category)
        {
            problems.push(problem(ProblemKind::NoDefect {
                category: fixture.category,
            }));
        }

        for annotation in &fixture.annotations {
            if !analysis.findings.iter().any(|f| f.line == annotation.line) {
                problems.push(problem(ProblemKind::UnmatchedAnnotation {
                    line: annotation.line,
                    message: annotation.message.clone(),
                }));
            }
        }

        match manifest.get(file) {
            None => problems.push(problem(ProblemKind::NotInManifest)),
            Some(entry) => {
                if let Some(expected) = &entry.sha256 {
                    if *expected != fixture.digest {
                        problems.push(problem(ProblemKind::DigestMismatch {
                            expected: expected.clone(),
                            actual: fixture.digest.clone(),
                        }));
                    }
                }
            }
        }
    }

    for entry in manifest.entries() {
        if !seen.contains(&entry.file) {
            problems.push(ValidationProblem {
                file: entry.file.clone(),
                kind: ProblemKind::MissingFile,
            });
        }
    }

    info!(
        "Validated {} fixture(s): {} problem(s)",
        analyses.len(),
        problems.len()
    );
    Ok(ValidationReport {
        fixtures_checked: analyses.len(),
        problems,
    })
}

/// Analyze arbitrary C files or directories, returning sorted findings
pub fn check_paths(
    paths: &[PathBuf],
    options: &SuiteOptions,
    metrics: &Metrics,
) -> Result<Vec<Finding>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(discover(path)?);
        } else {
            files.push(path.clone());
        }
    }

    let work = |parser: &mut crate::error::Result<Parser>, path: &PathBuf| -> Result<Vec<Finding>> {
        let parser = parser.as_mut().map_err(|e| anyhow!("{}", e))?;
        let bytes = read_limited(path, options.max_file_size)?;
        let source = String::from_utf8_lossy(&bytes);
        let parsed = metrics.time("parse", || parse_with(parser, &source))?;
        let file = path.to_string_lossy().replace('\\', "/");
        Ok(metrics.time("check", || check_source(&parsed, &file, &options.checker)))
    };

    let per_file: Vec<Vec<Finding>> = if options.parallel {
        files
            .par_iter()
            .map_init(new_parser, work)
            .collect::<Result<_>>()?
    } else {
        let mut parser = new_parser();
        files
            .iter()
            .map(|path| work(&mut parser, path))
            .collect::<Result<_>>()?
    };

    let mut findings: Vec<Finding> = per_file.into_iter().flatten().collect();
    sort_findings(&mut findings);
    Ok(findings)
}
