//! Callee dereference summaries.
//!
//! A parameter is summarized as dereferenced when every path from the
//! function's entry to one of its exits dereferences it, and the function
//! never assigns to it. Passing a null pointer in that position is then as
//! good as dereferencing it at the call site.

use super::dataflow::exit_states;
use super::reverse_null::MustDeref;
use crate::cfg::ControlFlowGraph;
use crate::facts::Fact;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerefSummaries {
    functions: HashMap<String, Vec<bool>>,
}

impl DerefSummaries {
    /// Summaries for every function in `cfgs`, iterated until callee
    /// summaries stop changing (summaries only grow, so this terminates).
    pub fn compute(cfgs: &[ControlFlowGraph]) -> Self {
        let mut summaries = DerefSummaries::default();
        for round in 0..=cfgs.len() {
            let next = Self::compute_round(cfgs, &summaries);
            if next == summaries {
                tracing::debug!("Deref summaries converged after {} round(s)", round + 1);
                break;
            }
            summaries = next;
        }
        summaries
    }

    fn compute_round(cfgs: &[ControlFlowGraph], callees: &DerefSummaries) -> Self {
        let mut functions = HashMap::new();
        for cfg in cfgs {
            let analysis = MustDeref::new(Some(callees));
            let exits = exit_states(&analysis, cfg);

            let derefed: BTreeSet<&String> = match exits.split_first() {
                None => BTreeSet::new(),
                Some((first, rest)) => first
                    .keys()
                    .filter(|var| rest.iter().all(|state| state.contains_key(*var)))
                    .collect(),
            };
            let assigned = assigned_variables(cfg);

            let params = cfg
                .parameters
                .iter()
                .map(|p| p.is_pointer && derefed.contains(&p.name) && !assigned.contains(&p.name))
                .collect();
            functions.insert(cfg.function_name.clone(), params);
        }
        DerefSummaries { functions }
    }

    /// Whether `function` dereferences its parameter at `index`
    pub fn derefs_param(&self, function: &str, index: usize) -> bool {
        self.functions
            .get(function)
            .and_then(|params| params.get(index))
            .copied()
            .unwrap_or(false)
    }

    /// Identifier arguments a call dereferences through its callee
    pub fn derefed_arguments<'f>(
        &self,
        function: &str,
        args: &'f [Option<String>],
    ) -> Vec<&'f String> {
        args.iter()
            .enumerate()
            .filter(|(i, _)| self.derefs_param(function, *i))
            .filter_map(|(_, arg)| arg.as_ref())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.values().all(|params| !params.contains(&true))
    }
}

fn assigned_variables(cfg: &ControlFlowGraph) -> BTreeSet<String> {
    cfg.blocks
        .values()
        .flat_map(|b| &b.statements)
        .flat_map(|s| &s.facts)
        .filter_map(|f| match f {
            Fact::Assign { var, .. } => Some(var.clone()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_cfgs;
    use crate::parser::parse_c;

    fn summaries_for(source: &str) -> DerefSummaries {
        let parsed = parse_c(source).unwrap();
        let cfgs = build_cfgs(&parsed, "test.c", &[]);
        DerefSummaries::compute(&cfgs)
    }

    #[test]
    fn test_unconditional_deref_is_summarized() {
        let s = summaries_for("struct S { int x; };\nvoid fn2(struct S *s) {\n    s->x = 0;\n}\n");
        assert!(s.derefs_param("fn2", 0));
        assert!(!s.is_empty());
    }

    #[test]
    fn test_guarded_deref_is_not_summarized() {
        let s = summaries_for("void g(int *p) {\n    if (!p)\n        return;\n    *p = 1;\n}\n");
        assert!(!s.derefs_param("g", 0));
    }

    #[test]
    fn test_paths_ending_in_abort_do_not_weaken_summary() {
        let s = summaries_for("void use(int *p) {\n    if (!p)\n        abort();\n    *p = 1;\n}\n");
        assert!(s.derefs_param("use", 0));
    }

    #[test]
    fn test_non_pointer_parameter_is_not_summarized() {
        let s = summaries_for("int h(int n, int *p) {\n    return p[n];\n}\n");
        assert!(!s.derefs_param("h", 0));
        assert!(s.derefs_param("h", 1));
    }

    #[test]
    fn test_reassigned_parameter_is_not_summarized() {
        let s = summaries_for("void k(int *p, int *q) {\n    p = q;\n    *p = 0;\n}\n");
        assert!(!s.derefs_param("k", 0));
    }

    #[test]
    fn test_summaries_propagate_through_callers() {
        let s = summaries_for(
            "void leaf(int *p) { *p = 0; }\nvoid mid(int *q) { leaf(q); }\nvoid top(int *r) { mid(r); }\n",
        );
        assert!(s.derefs_param("leaf", 0));
        assert!(s.derefs_param("mid", 0));
        assert!(s.derefs_param("top", 0));
    }

    #[test]
    fn test_derefed_arguments() {
        let s = summaries_for("void two(int a, int *p) { *p = a; }\n");
        let args = vec![Some("n".to_string()), Some("ptr".to_string())];
        assert_eq!(s.derefed_arguments("two", &args), vec![&"ptr".to_string()]);
        assert!(s.derefed_arguments("unknown", &args).is_empty());
    }
}
