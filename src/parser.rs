//! C parsing on top of tree-sitter.
//!
//! Parsing never fails on malformed input: tree-sitter recovers and marks the
//! damage with `ERROR` and `MISSING` nodes, which are collected here as
//! [`SyntaxIssue`]s so fixture validation can report them.

use crate::error::{NullfixError, Result};
use serde::{Deserialize, Serialize};
use streaming_iterator::StreamingIterator;
use tree_sitter::{Language, Node, Parser, Query, QueryCursor, Tree};

const COMMENT_QUERY: &str = "(comment) @comment";

/// The tree-sitter C grammar
pub fn c_language() -> Language {
    tree_sitter_c::LANGUAGE.into()
}

/// Create a parser configured for C
pub fn new_parser() -> Result<Parser> {
    let mut parser = Parser::new();
    parser
        .set_language(&c_language())
        .map_err(|e| NullfixError::Language(e.to_string()))?;
    Ok(parser)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyntaxIssueKind {
    /// Text the grammar could not place
    Error,
    /// A token the parser had to invent to recover
    Missing,
}

/// A syntax problem located in the source (1-based line and column)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxIssue {
    pub line: usize,
    pub column: usize,
    pub kind: SyntaxIssueKind,
    /// Node kind for missing tokens, offending text for errors
    pub detail: String,
}

/// A source comment with its starting line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub line: usize,
    pub text: String,
}

/// A parsed C translation unit
pub struct ParsedSource {
    pub source: String,
    pub tree: Tree,
    pub issues: Vec<SyntaxIssue>,
}

impl ParsedSource {
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn is_well_formed(&self) -> bool {
        self.issues.is_empty()
    }

    /// All comments in source order
    pub fn comments(&self) -> Result<Vec<Comment>> {
        let query = Query::new(&c_language(), COMMENT_QUERY)
            .map_err(|e| NullfixError::Language(e.to_string()))?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, self.root(), self.source.as_bytes());

        let mut comments = Vec::new();
        while let Some(m) = matches.next() {
            for capture in m.captures {
                let node = capture.node;
                let text = node.utf8_text(self.source.as_bytes()).unwrap_or("");
                comments.push(Comment {
                    line: node.start_position().row + 1,
                    text: text.to_string(),
                });
            }
        }
        comments.sort_by_key(|c| c.line);
        Ok(comments)
    }
}

/// Parse C source, collecting syntax issues instead of failing on them
pub fn parse_c(source: &str) -> Result<ParsedSource> {
    let mut parser = new_parser()?;
    parse_with(&mut parser, source)
}

/// Parse with an existing parser (parsers are not `Sync`; reuse one per thread)
pub fn parse_with(parser: &mut Parser, source: &str) -> Result<ParsedSource> {
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| NullfixError::ParseFailed("C source".to_string()))?;

    let mut issues = Vec::new();
    collect_issues(tree.root_node(), source.as_bytes(), &mut issues);

    Ok(ParsedSource {
        source: source.to_string(),
        tree,
        issues,
    })
}

fn collect_issues(node: Node, source: &[u8], issues: &mut Vec<SyntaxIssue>) {
    if node.is_missing() {
        issues.push(SyntaxIssue {
            line: node.start_position().row + 1,
            column: node.start_position().column + 1,
            kind: SyntaxIssueKind::Missing,
            detail: node.kind().to_string(),
        });
        return;
    }
    if node.is_error() {
        let text = node
            .utf8_text(source)
            .unwrap_or("")
            .chars()
            .take(40)
            .collect::<String>();
        issues.push(SyntaxIssue {
            line: node.start_position().row + 1,
            column: node.start_position().column + 1,
            kind: SyntaxIssueKind::Error,
            detail: text,
        });
        return;
    }
    if !node.has_error() {
        return;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_issues(child, source, issues);
    }
}
