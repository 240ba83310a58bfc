//! journal_insight — diary analysis over a hosted assistants API.
//!
//! This library crate re-exports modules so integration tests
//! (under `tests/`) can access them.

pub mod analysis;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logs;
pub mod models;
pub mod prompt;
pub mod run;
pub mod service;
pub mod session;
pub mod utils;

pub use error::AnalysisError;

/// Return the journal-insight home directory.
///
/// Resolution order:
/// 1. `JOURNAL_HOME` environment variable
/// 2. `$HOME/.journal-insight`
pub fn journal_home() -> std::path::PathBuf {
    if let Ok(p) = std::env::var("JOURNAL_HOME") {
        std::path::PathBuf::from(p)
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".journal-insight")
    }
}
