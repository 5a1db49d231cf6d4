//! Golden manifest: the expected findings for every fixture in a suite.
//!
//! ```toml
//! [[fixture]]
//! file = "forward-null.c"
//! category = "forward-null"
//! sha256 = "6db3..."
//!
//! [[fixture.expect]]
//! function = "forward_null_example1"
//! line = 13
//! ```

use crate::error::{NullfixError, Result};
use crate::finding::{DefectCategory, Finding};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    fixture: Vec<RawFixture>,
}

#[derive(Debug, Deserialize)]
struct RawFixture {
    file: String,
    category: String,
    sha256: Option<String>,
    #[serde(default)]
    expect: Vec<RawExpectation>,
}

#[derive(Debug, Deserialize)]
struct RawExpectation {
    function: String,
    line: usize,
    category: Option<String>,
}

/// A finding the oracle (or an imported analyzer) must produce
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExpectedFinding {
    pub file: String,
    pub function: String,
    pub line: usize,
    pub category: DefectCategory,
}

impl ExpectedFinding {
    pub fn matches(&self, finding: &Finding) -> bool {
        self.file == finding.file
            && self.function == finding.function
            && self.line == finding.line
            && self.category == finding.category
    }
}

impl std::fmt::Display for ExpectedFinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}: {} in {}",
            self.file,
            self.line,
            self.category.checker(),
            self.function
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub file: String,
    pub category: DefectCategory,
    pub sha256: Option<String>,
    pub expected: Vec<ExpectedFinding>,
}

#[derive(Debug, Clone, Default)]
pub struct Manifest {
    /// Where the manifest was read from, if anywhere
    pub path: Option<PathBuf>,
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| NullfixError::io(path, e))?;
        let mut manifest = Self::parse(&content, path)?;
        manifest.path = Some(path.to_path_buf());
        tracing::debug!(
            "Loaded manifest {} with {} fixture(s)",
            path.display(),
            manifest.len()
        );
        Ok(manifest)
    }

    /// Parse manifest text; `origin` is only used in error messages
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        let invalid = |message: String| NullfixError::Manifest {
            path: origin.to_path_buf(),
            message,
        };

        let raw: RawManifest = toml::from_str(content).map_err(|e| invalid(e.to_string()))?;

        let mut seen = HashSet::new();
        let mut entries = BTreeMap::new();
        for fixture in raw.fixture {
            if !seen.insert(fixture.file.clone()) {
                return Err(invalid(format!("duplicate entry for '{}'", fixture.file)));
            }

            let category: DefectCategory = fixture
                .category
                .parse()
                .map_err(|_| invalid(format!("unknown category '{}'", fixture.category)))?;

            let mut expected = Vec::with_capacity(fixture.expect.len());
            for exp in fixture.expect {
                let exp_category = match exp.category {
                    Some(c) => c
                        .parse()
                        .map_err(|_| invalid(format!("unknown category '{}'", c)))?,
                    None => category,
                };
                if exp.line == 0 {
                    return Err(invalid(format!(
                        "{}: expectation for '{}' has line 0",
                        fixture.file, exp.function
                    )));
                }
                expected.push(ExpectedFinding {
                    file: fixture.file.clone(),
                    function: exp.function,
                    line: exp.line,
                    category: exp_category,
                });
            }
            expected.sort();

            entries.insert(
                fixture.file.clone(),
                ManifestEntry {
                    file: fixture.file,
                    category,
                    sha256: fixture.sha256.map(|d| d.to_ascii_lowercase()),
                    expected,
                },
            );
        }

        Ok(Self {
            path: None,
            entries,
        })
    }

    pub fn get(&self, file: &str) -> Option<&ManifestEntry> {
        self.entries.get(file)
    }

    /// Entries in file-name order
    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
