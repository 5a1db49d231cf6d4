//! Null-dereference checkers used as the fixture oracle.
//!
//! Two intraprocedural dataflow checkers run over each function's CFG:
//! - forward-null: null on some path, then dereferenced
//! - reverse-null: dereferenced on all paths, then null-checked
//!
//! Calls to functions defined in the same translation unit are resolved
//! through [`DerefSummaries`] when interprocedural checking is enabled.

mod dataflow;
mod forward_null;
mod reverse_null;
mod summary;

pub use summary::DerefSummaries;

use crate::cfg::{build_cfgs, ControlFlowGraph};
use crate::finding::{sort_findings, DefectCategory, Finding};
use crate::parser::ParsedSource;
use dataflow::collect_reports;
use forward_null::ForwardNull;
use reverse_null::MustDeref;

/// Options shared by all checkers
#[derive(Debug, Clone)]
pub struct CheckerOptions {
    /// Resolve calls through callee dereference summaries
    pub interprocedural: bool,
    /// Identifiers treated as null in addition to `NULL` and `0`
    pub null_names: Vec<String>,
    /// Categories to report; empty means all
    pub categories: Vec<DefectCategory>,
}

impl Default for CheckerOptions {
    fn default() -> Self {
        Self {
            interprocedural: true,
            null_names: Vec::new(),
            categories: Vec::new(),
        }
    }
}

impl CheckerOptions {
    fn enabled(&self, category: DefectCategory) -> bool {
        self.categories.is_empty() || self.categories.contains(&category)
    }
}

/// Run the enabled checkers over already built CFGs
pub fn check_cfgs(cfgs: &[ControlFlowGraph], options: &CheckerOptions) -> Vec<Finding> {
    let summaries = if options.interprocedural {
        Some(DerefSummaries::compute(cfgs))
    } else {
        None
    };

    let mut findings = Vec::new();
    for cfg in cfgs {
        if options.enabled(DefectCategory::ForwardNull) {
            let analysis = ForwardNull::new(summaries.as_ref());
            findings.extend(collect_reports(&analysis, cfg));
        }
        if options.enabled(DefectCategory::ReverseNull) {
            let analysis = MustDeref::new(summaries.as_ref());
            findings.extend(collect_reports(&analysis, cfg));
        }
    }

    sort_findings(&mut findings);
    findings.dedup_by(|a, b| {
        a.file == b.file
            && a.function == b.function
            && a.line == b.line
            && a.category == b.category
            && a.message == b.message
    });
    findings
}

/// Build CFGs for a parsed translation unit and check them
pub fn check_source(parsed: &ParsedSource, file: &str, options: &CheckerOptions) -> Vec<Finding> {
    let cfgs = build_cfgs(parsed, file, &options.null_names);
    tracing::debug!("{}: {} function(s)", file, cfgs.len());
    check_cfgs(&cfgs, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_c;

    const MIXED: &str = "struct S { int x; };\n\
void use_s(struct S *s) { s->x = 1; }\n\
void fwd(struct S *s) {\n\
    if (s == NULL) { }\n\
    use_s(s);\n\
}\n\
void rev(struct S *s) {\n\
    s->x = 2;\n\
    if (!s) return;\n\
}\n";

    fn run(options: &CheckerOptions) -> Vec<Finding> {
        let parsed = parse_c(MIXED).unwrap();
        check_source(&parsed, "mixed.c", options)
    }

    #[test]
    fn test_both_categories_reported() {
        let findings = run(&CheckerOptions::default());
        let summary: Vec<_> = findings
            .iter()
            .map(|f| (f.function.as_str(), f.line, f.category))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("fwd", 5, DefectCategory::ForwardNull),
                ("rev", 9, DefectCategory::ReverseNull),
            ]
        );
        assert!(findings.iter().all(|f| f.file == "mixed.c"));
    }

    #[test]
    fn test_category_filter() {
        let options = CheckerOptions {
            categories: vec![DefectCategory::ReverseNull],
            ..Default::default()
        };
        let findings = run(&options);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, DefectCategory::ReverseNull);
    }

    #[test]
    fn test_intraprocedural_misses_callee_deref() {
        let options = CheckerOptions {
            interprocedural: false,
            ..Default::default()
        };
        let findings = run(&options);
        assert!(findings
            .iter()
            .all(|f| f.category != DefectCategory::ForwardNull));
    }
}
