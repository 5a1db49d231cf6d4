/// Configuration validation
///
/// Catches bad configuration before a run starts.
use super::schema::NullfixConfig;
use crate::report::ReportFormat;
use anyhow::{bail, Result};
use tracing::warn;

/// Supported configuration versions
const SUPPORTED_VERSIONS: &[&str] = &["1.0"];

/// Fixtures above this size are almost certainly not fixtures
const LARGE_FILE_WARNING: u64 = 16 * 1024 * 1024;

/// Validate a configuration
pub fn validate_config(config: &NullfixConfig) -> Result<()> {
    validate_version(config)?;
    validate_limits(config)?;
    validate_format(config)?;
    validate_null_macros(config)?;
    Ok(())
}

fn validate_version(config: &NullfixConfig) -> Result<()> {
    if !SUPPORTED_VERSIONS.contains(&config.version.as_str()) {
        bail!(
            "Unsupported configuration version '{}'. Supported versions: {}",
            config.version,
            SUPPORTED_VERSIONS.join(", ")
        );
    }
    Ok(())
}

fn validate_limits(config: &NullfixConfig) -> Result<()> {
    if config.max_file_size == 0 {
        bail!("'max_file_size' must be greater than 0");
    }

    if config.max_file_size > LARGE_FILE_WARNING {
        warn!(
            "max_file_size of {} bytes is very high for defect fixtures",
            config.max_file_size
        );
    }

    Ok(())
}

fn validate_format(config: &NullfixConfig) -> Result<()> {
    if config.format.parse::<ReportFormat>().is_err() {
        bail!(
            "Unknown output format '{}'. Expected one of: {}",
            config.format,
            ReportFormat::NAMES.join(", ")
        );
    }
    Ok(())
}

fn validate_null_macros(config: &NullfixConfig) -> Result<()> {
    for name in &config.null_macros {
        let valid = name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            bail!("null_macros entry '{}' is not a C identifier", name);
        }
    }
    Ok(())
}
