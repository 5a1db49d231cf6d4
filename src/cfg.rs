//! Control Flow Graph (CFG) construction for C functions.
//!
//! Each `function_definition` in a translation unit becomes one
//! [`ControlFlowGraph`]. Statements keep the null-relevant [`Fact`]s of the
//! code they cover and branch terminators keep the condition's [`NullTest`],
//! which is all the null checkers need.
//!
//! # Features
//! - Basic blocks for `if`/`else`, `while`, `do`, `for`, `switch`, `goto`
//! - Edge kinds distinguishing the true and false side of a branch
//! - Dominator tree, unreachable blocks, loop detection
//! - Markdown and Graphviz DOT rendering

use crate::facts::{declarator_name, is_pointer_declarator, Fact, FactExtractor, NullTest};
use crate::parser::ParsedSource;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use tree_sitter::Node;

/// Standard library calls that terminate the process or unwind past the caller
const NORETURN_FUNCTIONS: &[&str] = &[
    "exit",
    "_exit",
    "_Exit",
    "abort",
    "quick_exit",
    "longjmp",
    "siglongjmp",
    "__builtin_unreachable",
];

fn is_noreturn(function: &str) -> bool {
    NORETURN_FUNCTIONS.contains(&function)
}

/// Unique identifier for a basic block
pub type BlockId = usize;

/// A basic block in the control flow graph.
///
/// A basic block is a sequence of statements with:
/// - One entry point (no jumps into the middle)
/// - One exit point (no jumps out of the middle)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicBlock {
    /// Unique identifier for this block
    pub id: BlockId,
    /// Human-readable label for this block
    pub label: String,
    /// Starting line number in source
    pub start_line: usize,
    /// Ending line number in source
    pub end_line: usize,
    /// The type of terminator for this block
    pub terminator: Terminator,
    /// Statements in this block
    pub statements: Vec<Statement>,
    /// Is this an entry block?
    pub is_entry: bool,
    /// Is this an exit block?
    pub is_exit: bool,
}

/// How a basic block terminates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Terminator {
    /// Unconditional jump to another block
    Jump,
    /// Conditional branch (if, while, for, do)
    Branch {
        /// Condition source text
        condition: String,
        /// Line of the condition
        line: usize,
        /// What the condition says about null pointers
        test: NullTest,
    },
    /// Multi-way branch (switch)
    Switch {
        condition: String,
    },
    /// Return from function
    Return,
    /// Call to a function that never returns (`exit`, `abort`)
    NoReturn {
        function: String,
    },
    /// Fall through to next block
    FallThrough,
    /// Unconditional loop header (`for (;;)`)
    Loop,
    /// Break out of loop or switch
    Break,
    /// Continue to next iteration
    Continue,
    /// `goto label`
    Goto {
        label: String,
    },
}

/// A simplified statement representation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    /// Line number
    pub line: usize,
    /// Statement kind
    pub kind: StatementKind,
    /// Raw text (first 100 chars)
    pub text: String,
    /// Dereferences, assignments and calls in evaluation order
    pub facts: Vec<Fact>,
}

/// Types of statements we track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    /// Local variable declaration
    Declaration { variables: Vec<String> },
    /// Assignment to a named variable
    Assignment { variable: String },
    /// Expression statement
    Expression,
    /// Function call
    Call { function: String },
    /// Return statement
    Return,
    /// Branch condition evaluated at the end of a block
    Condition,
    /// Control flow (break, continue, goto)
    ControlFlow,
    /// Other
    Other,
}

/// An edge in the control flow graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfgEdge {
    /// Source block
    pub from: BlockId,
    /// Target block
    pub to: BlockId,
    /// Edge type
    pub kind: EdgeKind,
}

/// Types of CFG edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Fall-through to next block
    FallThrough,
    /// Conditional branch (true path)
    TrueBranch,
    /// Conditional branch (false path)
    FalseBranch,
    /// Unconditional jump (switch case, goto)
    Jump,
    /// Loop back edge
    LoopBack,
    /// Loop or switch exit via break
    LoopExit,
}

/// A function parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub is_pointer: bool,
}

/// The control flow graph for a function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlFlowGraph {
    /// Function name
    pub function_name: String,
    /// File path
    pub file_path: String,
    /// Line of the function definition
    pub start_line: usize,
    /// Basic blocks indexed by ID
    pub blocks: HashMap<BlockId, BasicBlock>,
    /// Edges between blocks
    pub edges: Vec<CfgEdge>,
    /// Entry block ID
    pub entry_block: BlockId,
    /// Exit block IDs (may be multiple for early returns)
    pub exit_blocks: Vec<BlockId>,
    /// Dominator tree (block -> immediate dominator)
    pub dominators: HashMap<BlockId, BlockId>,
    /// Blocks that are unreachable from entry
    pub unreachable_blocks: Vec<BlockId>,
    /// Function parameters, in declaration order
    pub parameters: Vec<Parameter>,
}

impl ControlFlowGraph {
    /// Create an empty CFG
    pub fn new(function_name: &str, file_path: &str) -> Self {
        Self {
            function_name: function_name.to_string(),
            file_path: file_path.to_string(),
            start_line: 0,
            blocks: HashMap::new(),
            edges: Vec::new(),
            entry_block: 0,
            exit_blocks: Vec::new(),
            dominators: HashMap::new(),
            unreachable_blocks: Vec::new(),
            parameters: Vec::new(),
        }
    }

    /// Add a basic block to the CFG
    pub fn add_block(&mut self, block: BasicBlock) {
        let id = block.id;
        if block.is_entry {
            self.entry_block = id;
        }
        if block.is_exit {
            self.exit_blocks.push(id);
        }
        self.blocks.insert(id, block);
    }

    /// Add an edge between blocks
    pub fn add_edge(&mut self, from: BlockId, to: BlockId, kind: EdgeKind) {
        self.edges.push(CfgEdge { from, to, kind });
    }

    /// Get successors of a block
    pub fn successors(&self, block_id: BlockId) -> Vec<BlockId> {
        self.edges
            .iter()
            .filter(|e| e.from == block_id)
            .map(|e| e.to)
            .collect()
    }

    /// Outgoing edges of a block
    pub fn out_edges(&self, block_id: BlockId) -> impl Iterator<Item = &CfgEdge> {
        self.edges.iter().filter(move |e| e.from == block_id)
    }

    /// Get predecessors of a block
    pub fn predecessors(&self, block_id: BlockId) -> Vec<BlockId> {
        self.edges
            .iter()
            .filter(|e| e.to == block_id)
            .map(|e| e.from)
            .collect()
    }

    /// Block IDs in ascending order
    pub fn sorted_block_ids(&self) -> Vec<BlockId> {
        let mut ids: Vec<BlockId> = self.blocks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Blocks reachable from the entry block
    pub fn reachable_blocks(&self) -> HashSet<BlockId> {
        let mut reachable = HashSet::new();
        let mut queue = VecDeque::new();

        queue.push_back(self.entry_block);
        reachable.insert(self.entry_block);

        while let Some(block_id) = queue.pop_front() {
            for succ in self.successors(block_id) {
                if reachable.insert(succ) {
                    queue.push_back(succ);
                }
            }
        }

        reachable
    }

    /// Compute the dominator tree over reachable blocks.
    ///
    /// Uses the iterative set formulation: `dom(n) = {n} ∪ ⋂ dom(p)` over
    /// predecessors `p`. Function CFGs are small enough that the quadratic
    /// worst case does not matter.
    pub fn compute_dominators(&mut self) {
        self.dominators.clear();
        if self.blocks.is_empty() {
            return;
        }

        let reachable = self.reachable_blocks();
        let mut order: Vec<BlockId> = reachable.iter().copied().collect();
        order.sort_unstable();

        let all: BTreeSet<BlockId> = order.iter().copied().collect();
        let mut dom: HashMap<BlockId, BTreeSet<BlockId>> = order
            .iter()
            .map(|&id| {
                if id == self.entry_block {
                    (id, BTreeSet::from([id]))
                } else {
                    (id, all.clone())
                }
            })
            .collect();

        let mut changed = true;
        while changed {
            changed = false;
            for &block_id in &order {
                if block_id == self.entry_block {
                    continue;
                }
                let mut new_dom: Option<BTreeSet<BlockId>> = None;
                for pred in self.predecessors(block_id) {
                    let Some(pred_dom) = dom.get(&pred) else {
                        continue;
                    };
                    new_dom = Some(match new_dom {
                        None => pred_dom.clone(),
                        Some(acc) => acc.intersection(pred_dom).copied().collect(),
                    });
                }
                let mut new_dom = new_dom.unwrap_or_default();
                new_dom.insert(block_id);
                if dom.get(&block_id) != Some(&new_dom) {
                    dom.insert(block_id, new_dom);
                    changed = true;
                }
            }
        }

        self.dominators.insert(self.entry_block, self.entry_block);
        for (&block_id, doms) in &dom {
            if block_id == self.entry_block {
                continue;
            }
            // The immediate dominator is the strict dominator dominated by all
            // the others, i.e. the one with the largest dominator set.
            let idom = doms
                .iter()
                .filter(|&&d| d != block_id)
                .max_by_key(|d| dom.get(*d).map(|s| s.len()).unwrap_or(0));
            if let Some(&idom) = idom {
                self.dominators.insert(block_id, idom);
            }
        }
    }

    /// Find unreachable blocks (not reachable from entry)
    pub fn find_unreachable_blocks(&mut self) {
        let reachable = self.reachable_blocks();
        let mut unreachable: Vec<BlockId> = self
            .blocks
            .keys()
            .filter(|id| !reachable.contains(id))
            .copied()
            .collect();
        unreachable.sort_unstable();
        self.unreachable_blocks = unreachable;
    }

    /// Detect loops in the CFG (back edges)
    pub fn find_loops(&self) -> Vec<(BlockId, BlockId)> {
        let mut back_edges = Vec::new();

        for edge in &self.edges {
            // A back edge goes from a block to one of its dominators
            if self.dominators.contains_key(&edge.from) && self.dominates(edge.to, edge.from) {
                back_edges.push((edge.from, edge.to));
            }
        }

        back_edges
    }

    /// Check if block A dominates block B
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return true;
        }

        let mut current = b;
        while let Some(&dom) = self.dominators.get(&current) {
            if dom == a {
                return true;
            }
            if dom == current {
                break; // Entry node
            }
            current = dom;
        }

        false
    }

    /// Format CFG as markdown
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "# Control Flow Graph: `{}`\n\n",
            self.function_name
        ));
        md.push_str(&format!("**File**: `{}`\n\n", self.file_path));
        if !self.parameters.is_empty() {
            let params: Vec<String> = self
                .parameters
                .iter()
                .map(|p| {
                    if p.is_pointer {
                        format!("*{}", p.name)
                    } else {
                        p.name.clone()
                    }
                })
                .collect();
            md.push_str(&format!("**Parameters**: {}\n", params.join(", ")));
        }
        md.push_str(&format!("**Blocks**: {}\n", self.blocks.len()));
        md.push_str(&format!("**Edges**: {}\n\n", self.edges.len()));

        md.push_str("## Basic Blocks\n\n");
        for id in self.sorted_block_ids() {
            let block = &self.blocks[&id];
            let marker = if block.is_entry {
                " (ENTRY)"
            } else if block.is_exit {
                " (EXIT)"
            } else {
                ""
            };

            md.push_str(&format!(
                "### Block {}: {}{}\n\n",
                block.id, block.label, marker
            ));
            md.push_str(&format!(
                "Lines: {}-{}\n\n",
                block.start_line, block.end_line
            ));

            if !block.statements.is_empty() {
                md.push_str("```\n");
                for stmt in &block.statements {
                    md.push_str(&format!("{:4}: {:?} - {}\n", stmt.line, stmt.kind, stmt.text));
                }
                md.push_str("```\n\n");
            }

            let terminator = match &block.terminator {
                Terminator::Branch { condition, .. } => format!("Branch `{}`", condition),
                other => format!("{:?}", other),
            };
            md.push_str(&format!("Terminator: {}\n\n", terminator));
        }

        md.push_str("## Edges\n\n");
        for edge in &self.edges {
            md.push_str(&format!(
                "- Block {} -> Block {} ({:?})\n",
                edge.from, edge.to, edge.kind
            ));
        }
        md.push('\n');

        if !self.unreachable_blocks.is_empty() {
            md.push_str("## Unreachable Blocks\n\n");
            for &block_id in &self.unreachable_blocks {
                if let Some(block) = self.blocks.get(&block_id) {
                    md.push_str(&format!(
                        "- Block {}: lines {}-{}\n",
                        block_id, block.start_line, block.end_line
                    ));
                }
            }
            md.push('\n');
        }

        let loops = self.find_loops();
        if !loops.is_empty() {
            md.push_str("## Loops Detected\n\n");
            for (back_source, header) in loops {
                md.push_str(&format!(
                    "- Loop at Block {} (back edge from Block {})\n",
                    header, back_source
                ));
            }
        }

        md
    }

    /// Export to DOT format for visualization
    pub fn to_dot(&self) -> String {
        let mut dot = format!("digraph \"{}\" {{\n", self.function_name);
        dot.push_str("  rankdir=TB;\n");
        dot.push_str("  node [shape=box, fontname=\"monospace\"];\n\n");

        for id in self.sorted_block_ids() {
            let block = &self.blocks[&id];
            let shape = if block.is_entry || block.is_exit {
                "ellipse"
            } else {
                "box"
            };
            let color = if self.unreachable_blocks.contains(&block.id) {
                "red"
            } else if block.is_entry {
                "green"
            } else if block.is_exit {
                "blue"
            } else {
                "black"
            };

            dot.push_str(&format!(
                "  {} [label=\"{}\\n({}-{})\", shape={}, color={}];\n",
                block.id, block.label, block.start_line, block.end_line, shape, color
            ));
        }

        for edge in &self.edges {
            let style = match edge.kind {
                EdgeKind::LoopBack => "dashed",
                EdgeKind::Jump => "dotted",
                _ => "solid",
            };
            let color = match edge.kind {
                EdgeKind::TrueBranch => "green",
                EdgeKind::FalseBranch => "red",
                EdgeKind::LoopBack => "blue",
                _ => "black",
            };

            dot.push_str(&format!(
                "  {} -> {} [style={}, color={}];\n",
                edge.from, edge.to, style, color
            ));
        }

        dot.push_str("}\n");
        dot
    }
}

/// CFG builder for constructing CFGs from tree-sitter C syntax trees
pub struct CfgBuilder<'a> {
    /// Current block ID counter
    next_block_id: BlockId,
    /// Current CFG being built
    cfg: ControlFlowGraph,
    /// Targets for `break` (loops and switches)
    break_stack: Vec<BlockId>,
    /// Targets for `continue` (loops only)
    continue_stack: Vec<BlockId>,
    /// Blocks for `goto` labels, created on first mention
    labels: HashMap<String, BlockId>,
    extractor: FactExtractor<'a>,
    source: &'a [u8],
}

impl<'a> CfgBuilder<'a> {
    /// Create a new CFG builder
    pub fn new(
        function_name: &str,
        file_path: &str,
        source: &'a [u8],
        null_names: &'a [String],
    ) -> Self {
        Self {
            next_block_id: 0,
            cfg: ControlFlowGraph::new(function_name, file_path),
            break_stack: Vec::new(),
            continue_stack: Vec::new(),
            labels: HashMap::new(),
            extractor: FactExtractor::new(source, null_names),
            source,
        }
    }

    /// Create a new basic block
    pub fn create_block(&mut self, label: &str) -> BlockId {
        let id = self.next_block_id;
        self.next_block_id += 1;

        let block = BasicBlock {
            id,
            label: label.to_string(),
            start_line: 0,
            end_line: 0,
            terminator: Terminator::FallThrough,
            statements: Vec::new(),
            is_entry: false,
            is_exit: false,
        };

        self.cfg.add_block(block);
        id
    }

    /// Set a block as entry
    pub fn set_entry(&mut self, block_id: BlockId) {
        if let Some(block) = self.cfg.blocks.get_mut(&block_id) {
            block.is_entry = true;
            self.cfg.entry_block = block_id;
        }
    }

    /// Set a block as exit
    pub fn set_exit(&mut self, block_id: BlockId) {
        if let Some(block) = self.cfg.blocks.get_mut(&block_id) {
            block.is_exit = true;
            if !self.cfg.exit_blocks.contains(&block_id) {
                self.cfg.exit_blocks.push(block_id);
            }
        }
    }

    /// Add a statement to a block
    pub fn add_statement(&mut self, block_id: BlockId, stmt: Statement) {
        if let Some(block) = self.cfg.blocks.get_mut(&block_id) {
            if block.statements.is_empty() {
                block.start_line = stmt.line;
                block.end_line = stmt.line;
            } else {
                block.start_line = block.start_line.min(stmt.line);
                block.end_line = block.end_line.max(stmt.line);
            }
            block.statements.push(stmt);
        }
    }

    /// Set terminator for a block
    pub fn set_terminator(&mut self, block_id: BlockId, terminator: Terminator) {
        if let Some(block) = self.cfg.blocks.get_mut(&block_id) {
            block.terminator = terminator;
        }
    }

    /// Add an edge
    pub fn add_edge(&mut self, from: BlockId, to: BlockId, kind: EdgeKind) {
        self.cfg.add_edge(from, to, kind);
    }

    /// Build and finalize the CFG
    pub fn build(mut self) -> ControlFlowGraph {
        self.cfg.compute_dominators();
        self.cfg.find_unreachable_blocks();
        self.cfg
    }

    fn text(&self, node: Node) -> String {
        node.utf8_text(self.source)
            .unwrap_or("")
            .chars()
            .take(100)
            .collect()
    }

    fn label_block(&mut self, label: &str) -> BlockId {
        if let Some(&id) = self.labels.get(label) {
            return id;
        }
        let id = self.create_block(&format!("label_{}", label));
        self.labels.insert(label.to_string(), id);
        id
    }

    /// Build CFG from a `function_definition` node
    pub fn build_from_function(mut self, node: Node) -> Result<ControlFlowGraph> {
        self.cfg.start_line = node.start_position().row + 1;
        self.cfg.parameters = extract_function_parameters(node, self.source);

        let entry = self.create_block("entry");
        self.set_entry(entry);

        let body = node
            .child_by_field_name("body")
            .ok_or_else(|| anyhow!("No function body found"))?;

        let exit = self.process_statement(entry, body)?;

        self.set_exit(exit);
        self.set_terminator(exit, Terminator::Return);

        Ok(self.build())
    }

    fn process_block_node(&mut self, current: BlockId, node: Node) -> Result<BlockId> {
        let mut cursor = node.walk();
        let mut active_block = current;

        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            active_block = self.process_statement(active_block, child)?;
        }

        Ok(active_block)
    }

    fn process_statement(&mut self, current: BlockId, node: Node) -> Result<BlockId> {
        let kind = node.kind();
        let line = node.start_position().row + 1;

        match kind {
            "compound_statement" => self.process_block_node(current, node),
            "if_statement" => self.process_if(current, node),
            "while_statement" => self.process_while(current, node),
            "do_statement" => self.process_do(current, node),
            "for_statement" => self.process_for(current, node),
            "switch_statement" => self.process_switch(current, node),
            "labeled_statement" => self.process_labeled(current, node),
            "comment" => Ok(current),
            "return_statement" => {
                let text = self.text(node);
                self.add_statement(
                    current,
                    Statement {
                        line,
                        kind: StatementKind::Return,
                        text,
                        facts: self.extractor.facts(node),
                    },
                );
                self.set_terminator(current, Terminator::Return);
                self.set_exit(current);

                // Code after return is unreachable
                Ok(self.create_block("after_return"))
            }
            "break_statement" => {
                self.add_control_statement(current, node);
                self.set_terminator(current, Terminator::Break);
                if let Some(&exit) = self.break_stack.last() {
                    self.add_edge(current, exit, EdgeKind::LoopExit);
                }
                Ok(self.create_block("after_break"))
            }
            "continue_statement" => {
                self.add_control_statement(current, node);
                self.set_terminator(current, Terminator::Continue);
                if let Some(&header) = self.continue_stack.last() {
                    self.add_edge(current, header, EdgeKind::LoopBack);
                }
                Ok(self.create_block("after_continue"))
            }
            "goto_statement" => {
                self.add_control_statement(current, node);
                let label = node
                    .child_by_field_name("label")
                    .map(|l| self.text(l))
                    .unwrap_or_default();
                let target = self.label_block(&label);
                self.set_terminator(current, Terminator::Goto { label });
                self.add_edge(current, target, EdgeKind::Jump);
                Ok(self.create_block("after_goto"))
            }
            "declaration" => {
                let mut cursor = node.walk();
                let variables: Vec<String> = node
                    .children_by_field_name("declarator", &mut cursor)
                    .filter_map(|d| declarator_name(d, self.source))
                    .collect();
                let text = self.text(node);
                self.add_statement(
                    current,
                    Statement {
                        line,
                        kind: StatementKind::Declaration { variables },
                        text,
                        facts: self.extractor.facts(node),
                    },
                );
                Ok(current)
            }
            "expression_statement" => {
                let facts = self.extractor.facts(node);
                let stmt_kind = match node.named_child(0) {
                    Some(expr) if expr.kind() == "assignment_expression" => {
                        StatementKind::Assignment {
                            variable: expr
                                .child_by_field_name("left")
                                .map(|l| self.text(l))
                                .unwrap_or_default(),
                        }
                    }
                    Some(expr) if expr.kind() == "call_expression" => StatementKind::Call {
                        function: expr
                            .child_by_field_name("function")
                            .map(|f| self.text(f))
                            .unwrap_or_default(),
                    },
                    Some(_) => StatementKind::Expression,
                    None => return Ok(current), // empty statement `;`
                };
                let noreturn = match &stmt_kind {
                    StatementKind::Call { function } if is_noreturn(function) => {
                        Some(function.clone())
                    }
                    _ => None,
                };
                let text = self.text(node);
                self.add_statement(
                    current,
                    Statement {
                        line,
                        kind: stmt_kind,
                        text,
                        facts,
                    },
                );
                match noreturn {
                    // Not an exit: paths through here never reach the caller
                    Some(function) => {
                        self.set_terminator(current, Terminator::NoReturn { function });
                        Ok(self.create_block("after_noreturn"))
                    }
                    None => Ok(current),
                }
            }
            // Local type and function declarations carry no control flow
            "type_definition" | "struct_specifier" | "enum_specifier" | "union_specifier" => {
                Ok(current)
            }
            _ => {
                let text = self.text(node);
                if text.len() > 1 {
                    self.add_statement(
                        current,
                        Statement {
                            line,
                            kind: StatementKind::Other,
                            text,
                            facts: self.extractor.facts(node),
                        },
                    );
                }
                Ok(current)
            }
        }
    }

    fn add_control_statement(&mut self, block: BlockId, node: Node) {
        let text = self.text(node);
        self.add_statement(
            block,
            Statement {
                line: node.start_position().row + 1,
                kind: StatementKind::ControlFlow,
                text,
                facts: Vec::new(),
            },
        );
    }

    /// Record a condition in `block` and make it a two-way branch
    fn add_condition(&mut self, block: BlockId, condition: Node) {
        let text = self.text(condition);
        let test = self.extractor.null_test(condition);
        let line = condition.start_position().row + 1;
        self.add_statement(
            block,
            Statement {
                line,
                kind: StatementKind::Condition,
                text: text.clone(),
                facts: self.extractor.facts(condition),
            },
        );
        self.set_terminator(
            block,
            Terminator::Branch {
                condition: text,
                line,
                test,
            },
        );
    }

    fn process_if(&mut self, current: BlockId, node: Node) -> Result<BlockId> {
        let condition = node
            .child_by_field_name("condition")
            .ok_or_else(|| anyhow!("if statement without condition"))?;
        self.add_condition(current, condition);

        let then_block = self.create_block("then");
        let merge_block = self.create_block("endif");

        self.add_edge(current, then_block, EdgeKind::TrueBranch);

        if let Some(consequence) = node.child_by_field_name("consequence") {
            let then_exit = self.process_statement(then_block, consequence)?;
            self.add_edge(then_exit, merge_block, EdgeKind::FallThrough);
        } else {
            self.add_edge(then_block, merge_block, EdgeKind::FallThrough);
        }

        if let Some(alternative) = node.child_by_field_name("alternative") {
            let else_block = self.create_block("else");
            self.add_edge(current, else_block, EdgeKind::FalseBranch);

            // `else_clause` wraps the statement in newer grammars
            let else_exit = if alternative.kind() == "else_clause" {
                self.process_block_node(else_block, alternative)?
            } else {
                self.process_statement(else_block, alternative)?
            };
            self.add_edge(else_exit, merge_block, EdgeKind::FallThrough);
        } else {
            self.add_edge(current, merge_block, EdgeKind::FalseBranch);
        }

        Ok(merge_block)
    }

    fn process_while(&mut self, current: BlockId, node: Node) -> Result<BlockId> {
        let header = self.create_block("while_header");
        self.add_edge(current, header, EdgeKind::FallThrough);

        if let Some(condition) = node.child_by_field_name("condition") {
            self.add_condition(header, condition);
        }

        let body_block = self.create_block("while_body");
        let exit_block = self.create_block("while_exit");

        self.add_edge(header, body_block, EdgeKind::TrueBranch);
        self.add_edge(header, exit_block, EdgeKind::FalseBranch);

        self.break_stack.push(exit_block);
        self.continue_stack.push(header);

        let body_exit = match node.child_by_field_name("body") {
            Some(body) => self.process_statement(body_block, body)?,
            None => body_block,
        };
        self.add_edge(body_exit, header, EdgeKind::LoopBack);

        self.break_stack.pop();
        self.continue_stack.pop();

        Ok(exit_block)
    }

    fn process_do(&mut self, current: BlockId, node: Node) -> Result<BlockId> {
        let body_block = self.create_block("do_body");
        let cond_block = self.create_block("do_condition");
        let exit_block = self.create_block("do_exit");

        self.add_edge(current, body_block, EdgeKind::FallThrough);

        self.break_stack.push(exit_block);
        self.continue_stack.push(cond_block);

        let body_exit = match node.child_by_field_name("body") {
            Some(body) => self.process_statement(body_block, body)?,
            None => body_block,
        };
        self.add_edge(body_exit, cond_block, EdgeKind::FallThrough);

        self.break_stack.pop();
        self.continue_stack.pop();

        if let Some(condition) = node.child_by_field_name("condition") {
            self.add_condition(cond_block, condition);
        }
        self.add_edge(cond_block, body_block, EdgeKind::TrueBranch);
        self.add_edge(cond_block, exit_block, EdgeKind::FalseBranch);

        Ok(exit_block)
    }

    fn process_for(&mut self, current: BlockId, node: Node) -> Result<BlockId> {
        if let Some(initializer) = node.child_by_field_name("initializer") {
            let text = self.text(initializer);
            self.add_statement(
                current,
                Statement {
                    line: initializer.start_position().row + 1,
                    kind: StatementKind::Expression,
                    text,
                    facts: self.extractor.facts(initializer),
                },
            );
        }

        let header = self.create_block("for_header");
        self.add_edge(current, header, EdgeKind::FallThrough);

        let body_block = self.create_block("for_body");
        let latch = self.create_block("for_update");
        let exit_block = self.create_block("for_exit");

        match node.child_by_field_name("condition") {
            Some(condition) => {
                self.add_condition(header, condition);
                self.add_edge(header, body_block, EdgeKind::TrueBranch);
                self.add_edge(header, exit_block, EdgeKind::FalseBranch);
            }
            None => {
                self.set_terminator(header, Terminator::Loop);
                self.add_edge(header, body_block, EdgeKind::FallThrough);
            }
        }

        self.break_stack.push(exit_block);
        self.continue_stack.push(latch);

        let body_exit = match node.child_by_field_name("body") {
            Some(body) => self.process_statement(body_block, body)?,
            None => body_block,
        };
        self.add_edge(body_exit, latch, EdgeKind::FallThrough);

        self.break_stack.pop();
        self.continue_stack.pop();

        if let Some(update) = node.child_by_field_name("update") {
            let text = self.text(update);
            self.add_statement(
                latch,
                Statement {
                    line: update.start_position().row + 1,
                    kind: StatementKind::Expression,
                    text,
                    facts: self.extractor.facts(update),
                },
            );
        }
        self.add_edge(latch, header, EdgeKind::LoopBack);

        Ok(exit_block)
    }

    fn process_switch(&mut self, current: BlockId, node: Node) -> Result<BlockId> {
        let condition_text = match node.child_by_field_name("condition") {
            Some(condition) => {
                let text = self.text(condition);
                self.add_statement(
                    current,
                    Statement {
                        line: condition.start_position().row + 1,
                        kind: StatementKind::Condition,
                        text: text.clone(),
                        facts: self.extractor.facts(condition),
                    },
                );
                text
            }
            None => String::new(),
        };
        self.set_terminator(
            current,
            Terminator::Switch {
                condition: condition_text,
            },
        );

        let exit_block = self.create_block("switch_exit");
        self.break_stack.push(exit_block);

        let mut has_default = false;
        let mut fallthrough: Option<BlockId> = None;
        let mut case_count = 0;

        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            let cases: Vec<Node> = body
                .named_children(&mut cursor)
                .filter(|c| c.kind() == "case_statement")
                .collect();

            for case in cases {
                case_count += 1;
                let value = case.child_by_field_name("value");
                if value.is_none() {
                    has_default = true;
                }
                let case_block = self.create_block(&format!("case_{}", case_count));
                self.add_edge(current, case_block, EdgeKind::Jump);
                if let Some(prev) = fallthrough.take() {
                    self.add_edge(prev, case_block, EdgeKind::FallThrough);
                }

                let mut active = case_block;
                let mut case_cursor = case.walk();
                let statements: Vec<Node> = case
                    .named_children(&mut case_cursor)
                    .filter(|s| Some(s.id()) != value.map(|v| v.id()))
                    .collect();
                for stmt in statements {
                    active = self.process_statement(active, stmt)?;
                }
                fallthrough = Some(active);
            }
        }

        if let Some(last) = fallthrough {
            self.add_edge(last, exit_block, EdgeKind::FallThrough);
        }
        if !has_default {
            self.add_edge(current, exit_block, EdgeKind::Jump);
        }

        self.break_stack.pop();
        Ok(exit_block)
    }

    fn process_labeled(&mut self, current: BlockId, node: Node) -> Result<BlockId> {
        let label = node
            .child_by_field_name("label")
            .map(|l| self.text(l))
            .unwrap_or_default();
        let target = self.label_block(&label);
        self.add_edge(current, target, EdgeKind::FallThrough);

        let mut cursor = node.walk();
        let inner: Vec<Node> = node
            .named_children(&mut cursor)
            .filter(|c| c.kind() != "statement_identifier")
            .collect();
        let mut active = target;
        for stmt in inner {
            active = self.process_statement(active, stmt)?;
        }
        Ok(active)
    }
}

/// Find the `function_declarator` under a definition's declarator chain
fn find_function_declarator(node: Node) -> Option<Node> {
    if node.kind() == "function_declarator" {
        return Some(node);
    }
    node.child_by_field_name("declarator")
        .and_then(find_function_declarator)
}

/// Name of the function a `function_definition` defines
pub fn function_name(node: Node, source: &[u8]) -> Option<String> {
    let declarator = node
        .child_by_field_name("declarator")
        .and_then(find_function_declarator)?;
    declarator
        .child_by_field_name("declarator")
        .and_then(|d| declarator_name(d, source))
}

/// Extract parameters from a function definition node
fn extract_function_parameters(node: Node, source: &[u8]) -> Vec<Parameter> {
    let Some(parameters) = node
        .child_by_field_name("declarator")
        .and_then(find_function_declarator)
        .and_then(|d| d.child_by_field_name("parameters"))
    else {
        return Vec::new();
    };

    let mut params = Vec::new();
    let mut cursor = parameters.walk();
    for param in parameters.named_children(&mut cursor) {
        if param.kind() != "parameter_declaration" {
            continue;
        }
        let Some(declarator) = param.child_by_field_name("declarator") else {
            continue; // `void` or unnamed parameter
        };
        if let Some(name) = declarator_name(declarator, source) {
            params.push(Parameter {
                name,
                is_pointer: is_pointer_declarator(declarator),
            });
        }
    }
    params
}

/// Build CFGs for every function defined in a translation unit
pub fn build_cfgs(
    parsed: &ParsedSource,
    file_path: &str,
    null_names: &[String],
) -> Vec<ControlFlowGraph> {
    let source = parsed.source.as_bytes();
    let mut cfgs = Vec::new();
    walk_for_functions(parsed.root(), source, file_path, null_names, &mut cfgs);
    cfgs
}

fn walk_for_functions(
    node: Node,
    source: &[u8],
    file_path: &str,
    null_names: &[String],
    cfgs: &mut Vec<ControlFlowGraph>,
) {
    if node.kind() == "function_definition" {
        if let Some(name) = function_name(node, source) {
            let builder = CfgBuilder::new(&name, file_path, source, null_names);
            match builder.build_from_function(node) {
                Ok(cfg) => cfgs.push(cfg),
                Err(e) => {
                    tracing::warn!("Failed to build CFG for {}: {}", name, e);
                }
            }
        }
        return;
    }

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        walk_for_functions(child, source, file_path, null_names, cfgs);
    }
}
