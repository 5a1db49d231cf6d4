//! Null-relevant facts extracted from C expressions.
//!
//! Statements are reduced to an ordered list of [`Fact`]s (dereferences,
//! assignments, calls) in evaluation order, and branch conditions to a
//! [`NullTest`] describing which variables are known null or non-null on
//! each outgoing edge. Only plain identifiers are tracked; `s->next->x`
//! records a dereference of `s` and nothing for the inner member access.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tree_sitter::Node;

/// How a pointer is dereferenced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DerefKind {
    /// `*p`
    Star,
    /// `p->field`
    Arrow,
    /// `p[i]`
    Subscript,
}

/// What a variable holds after an assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignedValue {
    Null,
    NonNull,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fact {
    Deref {
        var: String,
        kind: DerefKind,
        line: usize,
    },
    Assign {
        var: String,
        value: AssignedValue,
        line: usize,
    },
    /// A direct call; `args[i]` is the identifier passed in position `i`, if any
    Call {
        function: String,
        args: Vec<Option<String>>,
        line: usize,
    },
}

/// Nullness knowledge implied by a branch condition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullTest {
    pub null_when_true: BTreeSet<String>,
    pub nonnull_when_true: BTreeSet<String>,
    pub null_when_false: BTreeSet<String>,
    pub nonnull_when_false: BTreeSet<String>,
}

impl NullTest {
    pub fn is_empty(&self) -> bool {
        self.null_when_true.is_empty()
            && self.nonnull_when_true.is_empty()
            && self.null_when_false.is_empty()
            && self.nonnull_when_false.is_empty()
    }

    /// Every variable the condition compares against null
    pub fn tested_vars(&self) -> BTreeSet<String> {
        self.null_when_true
            .iter()
            .chain(&self.nonnull_when_true)
            .chain(&self.null_when_false)
            .chain(&self.nonnull_when_false)
            .cloned()
            .collect()
    }

    fn negate(self) -> Self {
        NullTest {
            null_when_true: self.null_when_false,
            nonnull_when_true: self.nonnull_when_false,
            null_when_false: self.null_when_true,
            nonnull_when_false: self.nonnull_when_true,
        }
    }

    fn is_null(var: String) -> Self {
        NullTest {
            null_when_true: BTreeSet::from([var.clone()]),
            nonnull_when_false: BTreeSet::from([var]),
            ..Default::default()
        }
    }

    fn and(self, rhs: Self) -> Self {
        NullTest {
            null_when_true: union(self.null_when_true, rhs.null_when_true),
            nonnull_when_true: union(self.nonnull_when_true, rhs.nonnull_when_true),
            null_when_false: intersect(&self.null_when_false, &rhs.null_when_false),
            nonnull_when_false: intersect(&self.nonnull_when_false, &rhs.nonnull_when_false),
        }
    }

    fn or(self, rhs: Self) -> Self {
        self.negate().and(rhs.negate()).negate()
    }
}

fn union(mut a: BTreeSet<String>, b: BTreeSet<String>) -> BTreeSet<String> {
    a.extend(b);
    a
}

fn intersect(a: &BTreeSet<String>, b: &BTreeSet<String>) -> BTreeSet<String> {
    a.intersection(b).cloned().collect()
}

/// Extracts facts from tree-sitter C nodes
pub struct FactExtractor<'a> {
    source: &'a [u8],
    null_names: &'a [String],
}

impl<'a> FactExtractor<'a> {
    /// `null_names` are identifiers treated as null in addition to `NULL`
    pub fn new(source: &'a [u8], null_names: &'a [String]) -> Self {
        Self { source, null_names }
    }

    fn text(&self, node: Node) -> &'a str {
        node.utf8_text(self.source).unwrap_or("")
    }

    /// Facts of a statement or expression, in evaluation order
    pub fn facts(&self, node: Node) -> Vec<Fact> {
        let mut facts = Vec::new();
        self.walk(node, &BTreeSet::new(), &mut facts);
        facts
    }

    fn walk(&self, node: Node, guarded: &BTreeSet<String>, facts: &mut Vec<Fact>) {
        let line = node.start_position().row + 1;
        match node.kind() {
            "comment" | "sizeof_expression" | "alignof_expression" | "offsetof_expression" => {}
            "pointer_expression" => {
                let Some(argument) = node.child_by_field_name("argument") else {
                    return;
                };
                let is_deref = node
                    .child_by_field_name("operator")
                    .map(|op| op.kind() == "*")
                    .unwrap_or(false);
                self.walk(argument, guarded, facts);
                if is_deref {
                    self.push_deref(argument, DerefKind::Star, line, guarded, facts);
                }
            }
            "field_expression" => {
                let Some(argument) = node.child_by_field_name("argument") else {
                    return;
                };
                let is_arrow = node
                    .child_by_field_name("operator")
                    .map(|op| op.kind() == "->")
                    .unwrap_or(false);
                self.walk(argument, guarded, facts);
                if is_arrow {
                    self.push_deref(argument, DerefKind::Arrow, line, guarded, facts);
                }
            }
            "subscript_expression" => {
                if let Some(index) = node.child_by_field_name("index") {
                    self.walk(index, guarded, facts);
                }
                if let Some(argument) = node.child_by_field_name("argument") {
                    self.walk(argument, guarded, facts);
                    self.push_deref(argument, DerefKind::Subscript, line, guarded, facts);
                }
            }
            "call_expression" => {
                let mut args = Vec::new();
                if let Some(arguments) = node.child_by_field_name("arguments") {
                    let mut cursor = arguments.walk();
                    for arg in arguments.named_children(&mut cursor) {
                        if arg.kind() == "comment" {
                            continue;
                        }
                        self.walk(arg, guarded, facts);
                        args.push(self.plain_identifier(arg));
                    }
                }
                if let Some(function) = node.child_by_field_name("function") {
                    if function.kind() == "identifier" {
                        facts.push(Fact::Call {
                            function: self.text(function).to_string(),
                            args,
                            line,
                        });
                    } else {
                        self.walk(function, guarded, facts);
                    }
                }
            }
            "assignment_expression" => {
                let left = node.child_by_field_name("left");
                let right = node.child_by_field_name("right");
                let simple = node
                    .child_by_field_name("operator")
                    .map(|op| op.kind() == "=")
                    .unwrap_or(false);
                if let Some(right) = right {
                    self.walk(right, guarded, facts);
                }
                if let Some(left) = left {
                    if let Some(var) = self.plain_identifier(left) {
                        let value = match (simple, right) {
                            (true, Some(right)) => self.classify_value(right),
                            _ => AssignedValue::Unknown,
                        };
                        facts.push(Fact::Assign { var, value, line });
                    } else {
                        self.walk(left, guarded, facts);
                    }
                }
            }
            "update_expression" => {
                if let Some(argument) = node.child_by_field_name("argument") {
                    if let Some(var) = self.plain_identifier(argument) {
                        facts.push(Fact::Assign {
                            var,
                            value: AssignedValue::Unknown,
                            line,
                        });
                    } else {
                        self.walk(argument, guarded, facts);
                    }
                }
            }
            "init_declarator" => {
                let value = node.child_by_field_name("value");
                if let Some(value) = value {
                    self.walk(value, guarded, facts);
                }
                if let Some(var) = node
                    .child_by_field_name("declarator")
                    .and_then(|d| declarator_name(d, self.source))
                {
                    let value = value
                        .map(|v| self.classify_value(v))
                        .unwrap_or(AssignedValue::Unknown);
                    facts.push(Fact::Assign { var, value, line });
                }
            }
            "declaration" => {
                let mut cursor = node.walk();
                for declarator in node.children_by_field_name("declarator", &mut cursor) {
                    if declarator.kind() == "init_declarator" {
                        self.walk(declarator, guarded, facts);
                    } else if let Some(var) = declarator_name(declarator, self.source) {
                        facts.push(Fact::Assign {
                            var,
                            value: AssignedValue::Unknown,
                            line,
                        });
                    }
                }
            }
            "binary_expression" => {
                let op = node
                    .child_by_field_name("operator")
                    .map(|op| op.kind())
                    .unwrap_or("");
                let (Some(left), Some(right)) = (
                    node.child_by_field_name("left"),
                    node.child_by_field_name("right"),
                ) else {
                    return;
                };
                self.walk(left, guarded, facts);
                // The right operand of a short-circuit only runs when the left
                // operand decided it should.
                let test = self.null_test(left);
                let right_guard = match op {
                    "&&" => union(guarded.clone(), test.nonnull_when_true),
                    "||" => union(guarded.clone(), test.nonnull_when_false),
                    _ => guarded.clone(),
                };
                self.walk(right, &right_guard, facts);
            }
            "conditional_expression" => {
                let Some(condition) = node.child_by_field_name("condition") else {
                    return;
                };
                self.walk(condition, guarded, facts);
                let test = self.null_test(condition);
                if let Some(consequence) = node.child_by_field_name("consequence") {
                    let guard = union(guarded.clone(), test.nonnull_when_true.clone());
                    self.walk(consequence, &guard, facts);
                }
                if let Some(alternative) = node.child_by_field_name("alternative") {
                    let guard = union(guarded.clone(), test.nonnull_when_false);
                    self.walk(alternative, &guard, facts);
                }
            }
            _ => {
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    self.walk(child, guarded, facts);
                }
            }
        }
    }

    fn push_deref(
        &self,
        argument: Node,
        kind: DerefKind,
        line: usize,
        guarded: &BTreeSet<String>,
        facts: &mut Vec<Fact>,
    ) {
        if let Some(var) = self.plain_identifier(argument) {
            if !guarded.contains(&var) {
                facts.push(Fact::Deref { var, kind, line });
            }
        }
    }

    /// The identifier an expression names, looking through parentheses
    pub fn plain_identifier(&self, node: Node) -> Option<String> {
        match node.kind() {
            "identifier" => {
                let name = self.text(node);
                if self.is_null_name(name) {
                    None
                } else {
                    Some(name.to_string())
                }
            }
            "parenthesized_expression" => node
                .named_child(0)
                .and_then(|inner| self.plain_identifier(inner)),
            _ => None,
        }
    }

    fn is_null_name(&self, name: &str) -> bool {
        name == "NULL" || name == "nullptr" || self.null_names.iter().any(|n| n == name)
    }

    /// Whether an expression is a null pointer constant
    pub fn is_null_constant(&self, node: Node) -> bool {
        match node.kind() {
            "null" => true,
            "number_literal" => {
                let text = self.text(node).trim_end_matches(['l', 'L', 'u', 'U']);
                !text.is_empty() && text.trim_start_matches("0x").chars().all(|c| c == '0')
            }
            "identifier" => self.is_null_name(self.text(node)),
            "parenthesized_expression" => node
                .named_child(0)
                .map(|inner| self.is_null_constant(inner))
                .unwrap_or(false),
            "cast_expression" => node
                .child_by_field_name("value")
                .map(|value| self.is_null_constant(value))
                .unwrap_or(false),
            _ => false,
        }
    }

    fn classify_value(&self, node: Node) -> AssignedValue {
        if self.is_null_constant(node) {
            return AssignedValue::Null;
        }
        match node.kind() {
            "string_literal" | "concatenated_string" => AssignedValue::NonNull,
            "pointer_expression" => {
                let is_address = node
                    .child_by_field_name("operator")
                    .map(|op| op.kind() == "&")
                    .unwrap_or(false);
                if is_address {
                    AssignedValue::NonNull
                } else {
                    AssignedValue::Unknown
                }
            }
            "parenthesized_expression" | "cast_expression" => {
                let inner = node
                    .child_by_field_name("value")
                    .or_else(|| node.named_child(0));
                inner
                    .map(|inner| self.classify_value(inner))
                    .unwrap_or(AssignedValue::Unknown)
            }
            _ => AssignedValue::Unknown,
        }
    }

    /// Interpret a branch condition as a null test
    pub fn null_test(&self, node: Node) -> NullTest {
        match node.kind() {
            "parenthesized_expression" | "condition_clause" => node
                .named_child(0)
                .map(|inner| self.null_test(inner))
                .unwrap_or_default(),
            "identifier" => match self.plain_identifier(node) {
                Some(var) => NullTest::is_null(var).negate(),
                None => NullTest::default(),
            },
            "assignment_expression" => node
                .child_by_field_name("left")
                .and_then(|left| self.plain_identifier(left))
                .map(|var| NullTest::is_null(var).negate())
                .unwrap_or_default(),
            "unary_expression" => {
                let is_not = node
                    .child_by_field_name("operator")
                    .map(|op| op.kind() == "!")
                    .unwrap_or(false);
                match node.child_by_field_name("argument") {
                    Some(argument) if is_not => self.null_test(argument).negate(),
                    _ => NullTest::default(),
                }
            }
            "binary_expression" => {
                let op = node
                    .child_by_field_name("operator")
                    .map(|op| op.kind())
                    .unwrap_or("");
                let (Some(left), Some(right)) = (
                    node.child_by_field_name("left"),
                    node.child_by_field_name("right"),
                ) else {
                    return NullTest::default();
                };
                match op {
                    "&&" => self.null_test(left).and(self.null_test(right)),
                    "||" => self.null_test(left).or(self.null_test(right)),
                    "==" | "!=" => {
                        let var = if self.is_null_constant(right) {
                            self.compared_var(left)
                        } else if self.is_null_constant(left) {
                            self.compared_var(right)
                        } else {
                            None
                        };
                        match (var, op) {
                            (Some(var), "==") => NullTest::is_null(var),
                            (Some(var), _) => NullTest::is_null(var).negate(),
                            (None, _) => NullTest::default(),
                        }
                    }
                    _ => NullTest::default(),
                }
            }
            _ => NullTest::default(),
        }
    }

    fn compared_var(&self, node: Node) -> Option<String> {
        match node.kind() {
            "parenthesized_expression" => node
                .named_child(0)
                .and_then(|inner| self.compared_var(inner)),
            "assignment_expression" => node
                .child_by_field_name("left")
                .and_then(|left| self.plain_identifier(left)),
            _ => self.plain_identifier(node),
        }
    }
}

/// Name declared by a (possibly pointer or array) declarator
pub fn declarator_name(node: Node, source: &[u8]) -> Option<String> {
    match node.kind() {
        "identifier" => node.utf8_text(source).ok().map(|s| s.to_string()),
        "pointer_declarator"
        | "array_declarator"
        | "init_declarator"
        | "parenthesized_declarator"
        | "attributed_declarator" => node
            .child_by_field_name("declarator")
            .or_else(|| node.named_child(0))
            .and_then(|inner| declarator_name(inner, source)),
        _ => None,
    }
}

/// Whether a declarator declares a pointer (`*p`, `**p`)
pub fn is_pointer_declarator(node: Node) -> bool {
    match node.kind() {
        "pointer_declarator" => true,
        "init_declarator" | "parenthesized_declarator" | "attributed_declarator" => node
            .child_by_field_name("declarator")
            .or_else(|| node.named_child(0))
            .map(is_pointer_declarator)
            .unwrap_or(false),
        _ => false,
    }
}
