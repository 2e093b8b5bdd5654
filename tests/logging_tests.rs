//! Logging initialisation from the environment.
//!
//! Installing a global subscriber is once per process, so everything that
//! depends on it lives in a single test.

mod common;

use circleforge::logging::{init_logging_from_env, is_initialized};
use circleforge::Importer;
use common::*;

#[test]
#[serial]
fn test_log_file_receives_json_events() -> anyhow::Result<()> {
    let dir = create_temp_dir()?;
    let path = dir.path().join("logs").join("forge.json");

    std::env::remove_var("RUST_LOG");
    std::env::set_var("CIRCLEFORGE_LOG_LEVEL", "debug");
    std::env::set_var("CIRCLEFORGE_LOG_FORMAT", "json");
    std::env::set_var("CIRCLEFORGE_LOG_FILE", &path);
    let result = init_logging_from_env();
    std::env::remove_var("CIRCLEFORGE_LOG_LEVEL");
    std::env::remove_var("CIRCLEFORGE_LOG_FORMAT");
    std::env::remove_var("CIRCLEFORGE_LOG_FILE");
    result?;
    assert!(is_initialized());

    let payload = argmax_payload(1, (2, 2), (2, 2), circleforge::DType::Int64)?;
    Importer::import(&argmax_model(payload, circleforge::DType::Int64))?;

    let contents = std::fs::read_to_string(&path)?;
    let imported = contents
        .lines()
        .find(|line| line.contains("model imported"))
        .ok_or_else(|| anyhow::anyhow!("no import event in {}", contents))?;
    assert!(imported.starts_with('{'));
    assert!(imported.contains("\"operators\":2"));

    // a second initialisation is a no-op
    init_logging_from_env()?;
    Ok(())
}
