use crate::checkers::CheckerOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default manifest file name inside the suite directory
pub const MANIFEST_FILE: &str = "expected.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NullfixConfig {
    pub version: String,
    /// Directory holding the fixture `.c` files
    pub suite_dir: PathBuf,
    /// Golden manifest; defaults to `<suite_dir>/expected.toml`
    pub manifest: Option<PathBuf>,
    /// Largest fixture accepted, in bytes
    pub max_file_size: u64,
    /// Resolve calls through callee dereference summaries
    pub interprocedural: bool,
    /// Extra identifiers treated as null constants (e.g. `NIL`)
    pub null_macros: Vec<String>,
    /// Default output format: text, json, markdown or xml
    pub format: String,
    /// Analyze fixtures on the rayon thread pool
    pub parallel: bool,
}

impl Default for NullfixConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            suite_dir: PathBuf::from("fixtures"),
            manifest: None,
            max_file_size: 1024 * 1024,
            interprocedural: true,
            null_macros: Vec::new(),
            format: "text".to_string(),
            parallel: true,
        }
    }
}

impl NullfixConfig {
    pub fn manifest_path(&self) -> PathBuf {
        self.manifest
            .clone()
            .unwrap_or_else(|| self.suite_dir.join(MANIFEST_FILE))
    }

    pub fn checker_options(&self) -> CheckerOptions {
        CheckerOptions {
            interprocedural: self.interprocedural,
            null_names: self.null_macros.clone(),
            categories: Vec::new(),
        }
    }
}
