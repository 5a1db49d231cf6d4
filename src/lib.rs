//! nullfix: null-dereference defect fixtures and the golden harness that
//! keeps them honest.
//!
//! Each fixture is a small C translation unit demonstrating one defect
//! (forward-null or reverse-null). The built-in checkers act as an oracle:
//! they analyze the fixtures and their findings are diffed against a golden
//! manifest. Findings can also be exported as Coverity errors XML or imported
//! from another analyzer as JSON.

pub mod cfg;
pub mod checkers;
pub mod config;
pub mod error;
pub mod facts;
pub mod finding;
pub mod fixture;
pub mod harness;
pub mod manifest;
pub mod metrics;
pub mod parser;
pub mod report;

pub use checkers::{check_source, CheckerOptions};
pub use config::{ConfigLoader, NullfixConfig};
pub use error::{NullfixError, Result};
pub use finding::{DefectCategory, Event, EventTag, Finding};
pub use fixture::DefectFixture;
pub use harness::{run_suite, validate_suite, SuiteOptions, SuiteReport, ValidationReport};
pub use manifest::{ExpectedFinding, Manifest};
pub use metrics::Metrics;
pub use report::ReportFormat;
