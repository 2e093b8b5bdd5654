//! Shared fixtures for integration tests.
//!
//! Each test binary compiles this module separately, so not every helper is
//! used by every binary.

#![allow(dead_code)]

mod fixtures;
mod tempfile_helpers;

pub use fixtures::*;
pub use serial_test::serial;
pub use tempfile_helpers::*;
