use super::schema::NullfixConfig;
use super::validation::validate_config;
use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Project config file name, looked up in the working directory
pub const PROJECT_CONFIG: &str = ".nullfix.yaml";

/// Locates, reads and validates the configuration
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    explicit: Option<PathBuf>,
    project_dir: PathBuf,
    user_config: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            explicit: None,
            project_dir: PathBuf::from("."),
            user_config: default_user_config(),
        }
    }

    /// Use this file instead of searching; it must exist
    pub fn with_config_file(mut self, path: Option<PathBuf>) -> Self {
        self.explicit = path;
        self
    }

    pub fn with_project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = dir.into();
        self
    }

    pub fn with_user_config(mut self, path: Option<PathBuf>) -> Self {
        self.user_config = path;
        self
    }

    /// Config files considered, in priority order
    pub fn candidates(&self) -> Vec<PathBuf> {
        if let Some(path) = &self.explicit {
            return vec![path.clone()];
        }
        let mut candidates = vec![self.project_dir.join(PROJECT_CONFIG)];
        candidates.extend(self.user_config.clone());
        candidates
    }

    /// Load the first config file found, apply `NULLFIX_*` environment
    /// overrides, and validate the result.
    pub fn load(&self) -> Result<NullfixConfig> {
        self.load_with_env(|key| std::env::var(key).ok())
    }

    /// Like [`load`](Self::load) with a custom environment lookup
    pub fn load_with_env(&self, env: impl Fn(&str) -> Option<String>) -> Result<NullfixConfig> {
        if let Some(path) = &self.explicit {
            if !path.exists() {
                bail!("Config file {} does not exist", path.display());
            }
        }

        let mut config = match self.candidates().into_iter().find(|p| p.is_file()) {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                read_config(&path)?
            }
            None => {
                debug!("No config file found, using defaults");
                NullfixConfig::default()
            }
        };

        apply_env_overrides(&mut config, env)?;
        validate_config(&config)?;
        Ok(config)
    }
}

fn default_user_config() -> Option<PathBuf> {
    ProjectDirs::from("", "", "nullfix").map(|dirs| dirs.config_dir().join("config.yaml"))
}

fn read_config(path: &Path) -> Result<NullfixConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

/// Apply `NULLFIX_*` overrides on top of a loaded configuration
pub fn apply_env_overrides(
    config: &mut NullfixConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(dir) = env("NULLFIX_SUITE_DIR") {
        config.suite_dir = PathBuf::from(dir);
    }
    if let Some(manifest) = env("NULLFIX_MANIFEST") {
        config.manifest = Some(PathBuf::from(manifest));
    }
    if let Some(size) = env("NULLFIX_MAX_FILE_SIZE") {
        config.max_file_size = size
            .trim()
            .parse()
            .with_context(|| format!("NULLFIX_MAX_FILE_SIZE is not a number: '{}'", size))?;
    }
    if let Some(flag) = env("NULLFIX_INTERPROCEDURAL") {
        config.interprocedural = parse_bool(&flag)
            .with_context(|| format!("NULLFIX_INTERPROCEDURAL is not a boolean: '{}'", flag))?;
    }
    if let Some(format) = env("NULLFIX_FORMAT") {
        config.format = format.trim().to_lowercase();
    }
    Ok(())
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("expected true or false"),
    }
}
