//! Defect fixtures: small C translation units that each demonstrate one
//! null-dereference pattern.
//!
//! Fixtures are authored once and never modified by this crate. Loading
//! reads the bytes, records their SHA-256 digest, and extracts the inline
//! `ERROR:` annotations that mark where a defect is expected.

use crate::error::{NullfixError, Result};
use crate::finding::DefectCategory;
use crate::parser::{new_parser, parse_c, parse_with, ParsedSource};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tree_sitter::Parser;

/// Marker that turns a comment into an expected-defect annotation
static ANNOTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bERROR:\s*(.*?)\s*(?:\*/)?\s*$").unwrap());

/// An inline comment marking the statement where a defect is expected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DefectFixture {
    /// File stem, e.g. `forward-null`
    pub name: String,
    /// Path the fixture was loaded from
    pub path: PathBuf,
    /// File name as reported in findings, relative to the suite directory
    pub file: String,
    pub category: DefectCategory,
    pub source: String,
    pub annotations: Vec<Annotation>,
    /// Lowercase hex SHA-256 of the raw bytes
    pub digest: String,
}

impl DefectFixture {
    /// Load a fixture from disk.
    ///
    /// `category` overrides inference from the file name. Files larger than
    /// `max_file_size` bytes are refused.
    pub fn load(
        path: &Path,
        file: &str,
        category: Option<DefectCategory>,
        max_file_size: u64,
    ) -> Result<Self> {
        let mut parser = new_parser()?;
        Self::load_with(&mut parser, path, file, category, max_file_size).map(|(f, _)| f)
    }

    /// Load a fixture using an existing parser, returning the parse as well
    pub fn load_with(
        parser: &mut Parser,
        path: &Path,
        file: &str,
        category: Option<DefectCategory>,
        max_file_size: u64,
    ) -> Result<(Self, ParsedSource)> {
        let bytes = read_limited(path, max_file_size)?;
        let source = String::from_utf8_lossy(&bytes).into_owned();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.to_string());

        let category = match category {
            Some(c) => c,
            None => DefectCategory::from_file_stem(&name)
                .ok_or_else(|| NullfixError::UnknownCategory(file.to_string()))?,
        };

        let parsed = parse_with(parser, &source)?;
        let annotations = extract_annotations(&parsed)?;

        let fixture = Self {
            name,
            path: path.to_path_buf(),
            file: file.to_string(),
            category,
            source,
            annotations,
            digest: digest(&bytes),
        };
        Ok((fixture, parsed))
    }

    /// Build a fixture from in-memory source
    pub fn from_source(
        name: &str,
        file: &str,
        category: DefectCategory,
        source: String,
    ) -> Result<Self> {
        let parsed = parse_c(&source)?;
        let annotations = extract_annotations(&parsed)?;
        let digest = digest(source.as_bytes());

        Ok(Self {
            name: name.to_string(),
            path: PathBuf::from(file),
            file: file.to_string(),
            category,
            source,
            annotations,
            digest,
        })
    }

    pub fn parse(&self) -> Result<ParsedSource> {
        parse_c(&self.source)
    }

    /// Number of source lines
    pub fn line_count(&self) -> usize {
        self.source.lines().count()
    }
}

/// Annotations found in a parsed source, in line order
pub fn extract_annotations(parsed: &ParsedSource) -> Result<Vec<Annotation>> {
    Ok(parsed
        .comments()?
        .into_iter()
        .filter_map(|comment| {
            ANNOTATION.captures(&comment.text).map(|caps| Annotation {
                line: comment.line,
                message: caps
                    .get(1)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
            })
        })
        .collect())
}

/// Lowercase hex SHA-256 digest
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Read a file, refusing anything above `limit` bytes
pub fn read_limited(path: &Path, limit: u64) -> Result<Vec<u8>> {
    let metadata = std::fs::metadata(path).map_err(|e| NullfixError::io(path, e))?;
    if metadata.len() > limit {
        return Err(NullfixError::FileTooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            limit,
        });
    }
    std::fs::read(path).map_err(|e| NullfixError::io(path, e))
}
