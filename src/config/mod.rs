/// Configuration system for nullfix
///
/// Configuration priority (highest to lowest):
/// 1. CLI flags (handled in main.rs)
/// 2. Environment variables (NULLFIX_*)
/// 3. Explicit config file (`--config`)
/// 4. Project config (.nullfix.yaml in the working directory)
/// 5. User config (e.g. ~/.config/nullfix/config.yaml)
/// 6. Default config (built-in)
///
/// Only the first config file found is read; files are not merged.
pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::ConfigLoader;
pub use schema::NullfixConfig;
pub use validation::validate_config;
