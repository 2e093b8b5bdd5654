//! tempfile wrappers with test-friendly error context.

use anyhow::Context;

pub fn create_temp_dir() -> anyhow::Result<tempfile::TempDir> {
    tempfile::tempdir().context("Failed to create temporary directory for test")
}

pub use tempfile::TempDir;
