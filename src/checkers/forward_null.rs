//! Forward-null checker: a pointer compared against null (or assigned null)
//! that is later dereferenced on a path where it may still be null.

use super::dataflow::Analysis;
use super::summary::DerefSummaries;
use crate::cfg::{BasicBlock, CfgEdge, ControlFlowGraph, EdgeKind, Terminator};
use crate::facts::{AssignedValue, Fact};
use crate::finding::{DefectCategory, Event, EventTag, Finding};
use std::collections::{BTreeMap, BTreeSet};

/// Where a variable became possibly null
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Origin {
    pub line: usize,
    pub tag: EventTag,
}

impl Origin {
    fn earliest(a: Origin, b: Origin) -> Origin {
        if a.line <= b.line {
            a
        } else {
            b
        }
    }
}

/// Nullness of a tracked pointer. Untracked variables are unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Nullness {
    NonNull,
    /// Null on every path reaching this point
    Null(Origin),
    /// Null on at least one path reaching this point
    MaybeNull(Origin),
}

impl Nullness {
    fn origin(&self) -> Option<Origin> {
        match self {
            Nullness::NonNull => None,
            Nullness::Null(o) | Nullness::MaybeNull(o) => Some(*o),
        }
    }

    /// Join with another value; `None` stands for unknown on either side
    fn join(a: Option<Nullness>, b: Option<Nullness>) -> Option<Nullness> {
        match (a, b) {
            (None, None) => None,
            (Some(Nullness::NonNull), None) | (None, Some(Nullness::NonNull)) => None,
            (Some(x), None) | (None, Some(x)) => x.origin().map(Nullness::MaybeNull),
            (Some(Nullness::NonNull), Some(Nullness::NonNull)) => Some(Nullness::NonNull),
            (Some(Nullness::Null(a)), Some(Nullness::Null(b))) => {
                Some(Nullness::Null(Origin::earliest(a, b)))
            }
            (Some(x), Some(y)) => match (x.origin(), y.origin()) {
                (Some(a), Some(b)) => Some(Nullness::MaybeNull(Origin::earliest(a, b))),
                (Some(o), None) | (None, Some(o)) => Some(Nullness::MaybeNull(o)),
                (None, None) => Some(Nullness::NonNull),
            },
        }
    }
}

pub(crate) type NullState = BTreeMap<String, Nullness>;

pub(crate) struct ForwardNull<'a> {
    summaries: Option<&'a DerefSummaries>,
}

impl<'a> ForwardNull<'a> {
    pub fn new(summaries: Option<&'a DerefSummaries>) -> Self {
        Self { summaries }
    }

    fn dereference(
        cfg: &ControlFlowGraph,
        state: &mut NullState,
        var: &str,
        line: usize,
        callee: Option<&str>,
        sink: &mut Vec<Finding>,
    ) {
        if let Some(origin) = state.get(var).and_then(|n| n.origin()) {
            sink.push(forward_null_finding(cfg, var, origin, line, callee));
        }
        // Past a dereference the pointer is assumed valid; one report per path
        state.insert(var.to_string(), Nullness::NonNull);
    }
}

impl Analysis for ForwardNull<'_> {
    type State = NullState;
    type Report = Finding;

    fn entry_state(&self, _cfg: &ControlFlowGraph) -> Self::State {
        NullState::new()
    }

    fn join(&self, a: &Self::State, b: &Self::State) -> Self::State {
        let vars: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
        vars.into_iter()
            .filter_map(|var| {
                Nullness::join(a.get(var).copied(), b.get(var).copied())
                    .map(|n| (var.clone(), n))
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
                    Self::dereference(cfg, state, var, *line, None, sink);
                }
                Fact::Call {
                    function,
                    args,
                    line,
                } => {
                    if let Some(summaries) = self.summaries {
                        for var in summaries.derefed_arguments(function, args) {
                            Self::dereference(cfg, state, var, *line, Some(function.as_str()), sink);
                        }
                    }
                }
                Fact::Assign { var, value, line } => match value {
                    AssignedValue::Null => {
                        state.insert(
                            var.clone(),
                            Nullness::Null(Origin {
                                line: *line,
                                tag: EventTag::AssignZero,
                            }),
                        );
                    }
                    AssignedValue::NonNull => {
                        state.insert(var.clone(), Nullness::NonNull);
                    }
                    AssignedValue::Unknown => {
                        state.remove(var);
                    }
                },
            }
        }
    }

    fn refine(&self, block: &BasicBlock, edge: &CfgEdge, mut state: Self::State) -> Option<Self::State> {
        let Terminator::Branch { line, test, .. } = &block.terminator else {
            return Some(state);
        };
        let (nulls, nonnulls) = match edge.kind {
            EdgeKind::TrueBranch => (&test.null_when_true, &test.nonnull_when_true),
            EdgeKind::FalseBranch => (&test.null_when_false, &test.nonnull_when_false),
            _ => return Some(state),
        };

        for var in nulls {
            if state.get(var) == Some(&Nullness::NonNull) {
                return None;
            }
            state.insert(
                var.clone(),
                Nullness::Null(Origin {
                    line: *line,
                    tag: EventTag::NullCheck,
                }),
            );
        }
        for var in nonnulls {
            if matches!(state.get(var), Some(Nullness::Null(_))) {
                return None;
            }
            state.insert(var.clone(), Nullness::NonNull);
        }
        Some(state)
    }
}

fn forward_null_finding(
    cfg: &ControlFlowGraph,
    var: &str,
    origin: Origin,
    line: usize,
    callee: Option<&str>,
) -> Finding {
    let origin_description = match origin.tag {
        EventTag::AssignZero => format!("Assigning: \"{}\" = NULL.", var),
        _ => format!(
            "Comparing \"{}\" to null implies that \"{}\" might be null.",
            var, var
        ),
    };
    let (tag, message) = match callee {
        Some(callee) => (
            EventTag::VarDerefModel,
            format!(
                "Passing null pointer \"{}\" to \"{}\", which dereferences it.",
                var, callee
            ),
        ),
        None => (
            EventTag::VarDerefOp,
            format!("Dereferencing null pointer \"{}\".", var),
        ),
    };

    Finding {
        file: cfg.file_path.clone(),
        function: cfg.function_name.clone(),
        line,
        category: DefectCategory::ForwardNull,
        message: message.clone(),
        events: vec![
            Event {
                tag: origin.tag,
                line: origin.line,
                description: origin_description,
                main: false,
            },
            Event {
                tag,
                line,
                description: message,
                main: true,
            },
        ],
    }
}
