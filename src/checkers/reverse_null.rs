//! Reverse-null checker: a null check on a pointer that every path has
//! already dereferenced.

use super::dataflow::Analysis;
use super::summary::DerefSummaries;
use crate::cfg::{BasicBlock, ControlFlowGraph, Terminator};
use crate::facts::Fact;
use crate::finding::{DefectCategory, Event, EventTag, Finding};
use std::collections::BTreeMap;

/// Where a variable was first dereferenced
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DerefSite {
    pub line: usize,
    /// Callee that dereferenced it, for dereferences through a call
    pub via: Option<String>,
}

/// Variables dereferenced on every path to this point
pub(crate) type MustDerefState = BTreeMap<String, DerefSite>;

/// Must-dereference analysis; reports reverse-null findings at branch
/// conditions that test an already dereferenced pointer.
pub(crate) struct MustDeref<'a> {
    summaries: Option<&'a DerefSummaries>,
}

impl<'a> MustDeref<'a> {
    pub fn new(summaries: Option<&'a DerefSummaries>) -> Self {
        Self { summaries }
    }

    fn record(state: &mut MustDerefState, var: &str, site: DerefSite) {
        state.entry(var.to_string()).or_insert(site);
    }
}

impl Analysis for MustDeref<'_> {
    type State = MustDerefState;
    type Report = Finding;

    fn entry_state(&self, _cfg: &ControlFlowGraph) -> Self::State {
        MustDerefState::new()
    }

    fn join(&self, a: &Self::State, b: &Self::State) -> Self::State {
        a.iter()
            .filter_map(|(var, site_a)| {
                let site_b = b.get(var)?;
                let site = if site_a.line <= site_b.line {
                    site_a.clone()
                } else {
                    site_b.clone()
                };
                Some((var.clone(), site))
            })
            .collect()
    }

    fn transfer(
        &self,
        cfg: &ControlFlowGraph,
        block: &BasicBlock,
        state: &mut Self::State,
        sink: &mut Vec<Finding>,
    ) {
        for fact in block.statements.iter().flat_map(|s| &s.facts) {
            match fact {
                Fact::Deref { var, line, .. } => {
                    Self::record(state, var, DerefSite { line: *line, via: None });
                }
                Fact::Call {
                    function,
                    args,
                    line,
                } => {
                    if let Some(summaries) = self.summaries {
                        for var in summaries.derefed_arguments(function, args) {
                            Self::record(
                                state,
                                var,
                                DerefSite {
                                    line: *line,
                                    via: Some(function.clone()),
                                },
                            );
                        }
                    }
                }
                Fact::Assign { var, .. } => {
                    state.remove(var);
                }
            }
        }

        if let Terminator::Branch { line, test, .. } = &block.terminator {
            for var in test.tested_vars() {
                if let Some(site) = state.get(&var) {
                    sink.push(reverse_null_finding(cfg, &var, site, *line));
                }
            }
        }
    }
}

fn reverse_null_finding(
    cfg: &ControlFlowGraph,
    var: &str,
    site: &DerefSite,
    check_line: usize,
) -> Finding {
    let deref_description = match &site.via {
        Some(callee) => format!(
            "Passing \"{}\" to \"{}\", which dereferences it.",
            var, callee
        ),
        None => format!("Directly dereferencing pointer \"{}\".", var),
    };
    let message = format!(
        "Null-checking \"{}\" suggests that it may be null, but it has already been dereferenced on all paths leading to the check.",
        var
    );

    Finding {
        file: cfg.file_path.clone(),
        function: cfg.function_name.clone(),
        line: check_line,
        category: DefectCategory::ReverseNull,
        message: message.clone(),
        events: vec![
            Event {
                tag: EventTag::DerefBeforeCheck,
                line: site.line,
                description: deref_description,
                main: false,
            },
            Event {
                tag: EventTag::NullCheck,
                line: check_line,
                description: message,
                main: true,
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_cfgs;
    use crate::checkers::dataflow::collect_reports;
    use crate::parser::parse_c;

    fn reverse_findings(source: &str) -> Vec<Finding> {
        let parsed = parse_c(source).unwrap();
        let cfgs = build_cfgs(&parsed, "test.c", &[]);
        let summaries = DerefSummaries::compute(&cfgs);
        let analysis = MustDeref::new(Some(&summaries));
        cfgs.iter()
            .flat_map(|cfg| collect_reports(&analysis, cfg))
            .collect()
    }

    #[test]
    fn test_deref_then_check() {
        let findings = reverse_findings(
            "int f(int *p) {\n    *p = 1;\n    if (p == 0)\n        return -1;\n    return 0;\n}\n",
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, 3);
        assert_eq!(findings[0].events[0].tag, EventTag::DerefBeforeCheck);
        assert_eq!(findings[0].events[0].line, 2);
        assert_eq!(findings[0].main_event().map(|e| e.line), Some(3));
    }

    #[test]
    fn test_check_before_deref_is_clean() {
        let findings = reverse_findings(
            "int f(int *p) {\n    if (p == 0)\n        return -1;\n    *p = 1;\n    return 0;\n}\n",
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_deref_on_one_branch_only_is_clean() {
        let findings = reverse_findings(
            "void f(int *p, int c) {\n    if (c)\n        *p = 1;\n    if (!p)\n        return;\n}\n",
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_reassignment_clears_deref() {
        let findings = reverse_findings(
            "void f(int *p, int *q) {\n    *p = 1;\n    p = q;\n    if (p) *p = 2;\n}\n",
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_unreachable_deref_then_check_is_ignored() {
        let findings = reverse_findings(
            "int f(int *p) {\n    return 0;\n    *p = 1;\n    if (p == 0)\n        return -1;\n    return 1;\n}\n",
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_deref_through_callee() {
        let findings = reverse_findings(
            "void set(int *p) { *p = 0; }\nvoid f(int *q) {\n    set(q);\n    if (q == NULL)\n        return;\n}\n",
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].function, "f");
        assert_eq!(findings[0].line, 4);
        assert!(findings[0].events[0].description.contains("\"set\""));
    }
}
