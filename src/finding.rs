//! Findings and defect categories.
//!
//! A finding identifies a file, a function, a line and a defect category,
//! together with the supporting events (null check, dereference) that explain
//! the path. The event model mirrors the one used by Coverity's third-party
//! defect import so findings can be exported unchanged.

use crate::error::{NullfixError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The defect pattern a fixture demonstrates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefectCategory {
    /// A pointer checked against null is dereferenced on the null path
    ForwardNull,
    /// A pointer is dereferenced before it is checked against null
    ReverseNull,
}

impl DefectCategory {
    pub const ALL: [DefectCategory; 2] = [DefectCategory::ForwardNull, DefectCategory::ReverseNull];

    /// Stable kebab-case label used in manifests and reports
    pub fn label(&self) -> &'static str {
        match self {
            DefectCategory::ForwardNull => "forward-null",
            DefectCategory::ReverseNull => "reverse-null",
        }
    }

    /// Checker name as it appears in Coverity output
    pub fn checker(&self) -> &'static str {
        match self {
            DefectCategory::ForwardNull => "FORWARD_NULL",
            DefectCategory::ReverseNull => "REVERSE_INULL",
        }
    }

    /// Infer a category from a fixture file stem such as `forward-null` or
    /// `reverse_null_loop`.
    pub fn from_file_stem(stem: &str) -> Option<Self> {
        let normalized = stem.to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|c| normalized.starts_with(c.label()))
    }
}

impl fmt::Display for DefectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DefectCategory {
    type Err = NullfixError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "forward-null" => Ok(DefectCategory::ForwardNull),
            "reverse-null" | "reverse-inull" => Ok(DefectCategory::ReverseNull),
            _ => Err(NullfixError::UnknownCategory(s.to_string())),
        }
    }
}

/// Kind of a supporting event on a finding's path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTag {
    /// The pointer is compared against null
    NullCheck,
    /// The pointer is assigned a null constant
    AssignZero,
    /// The pointer is dereferenced directly
    VarDerefOp,
    /// The pointer is passed to a callee that dereferences it
    VarDerefModel,
    /// The pointer was dereferenced before a later null check
    DerefBeforeCheck,
}

impl EventTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventTag::NullCheck => "null_check",
            EventTag::AssignZero => "assign_zero",
            EventTag::VarDerefOp => "var_deref_op",
            EventTag::VarDerefModel => "var_deref_model",
            EventTag::DerefBeforeCheck => "deref_before_check",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub tag: EventTag,
    pub line: usize,
    pub description: String,
    /// The main event is where the defect is reported
    #[serde(default)]
    pub main: bool,
}

/// A single reported defect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub file: String,
    pub function: String,
    pub line: usize,
    pub category: DefectCategory,
    pub message: String,
    #[serde(default)]
    pub events: Vec<Event>,
}

impl Finding {
    /// Sort key used everywhere findings are listed
    pub fn sort_key(&self) -> (String, usize, String, DefectCategory) {
        (self.file.clone(), self.line, self.function.clone(), self.category)
    }

    /// The event marked as main, if any
    pub fn main_event(&self) -> Option<&Event> {
        self.events.iter().find(|e| e.main)
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} in {}: {}",
            self.file,
            self.line,
            self.category.checker(),
            self.function,
            self.message
        )
    }
}

/// Sort findings in place by file, line, function and category
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by_key(|f| f.sort_key());
}
