//! Crate-level configuration
//!
//! [`ForgeConfig`] bundles the knobs of the pass pipeline and the
//! interpreter. It can be built programmatically, read from the environment,
//! or embedded (via serde) in a host application's configuration file.
//!
//! # Environment Variables
//!
//! - `CIRCLEFORGE_PASS_MAX_ITERATIONS`: fixed-point cap, at least 1 (default 8)
//! - `CIRCLEFORGE_VALIDATE_PASSES`: validate the graph after every pass (default true)
//! - `CIRCLEFORGE_PARALLEL`: level-parallel interpretation (default false)

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ForgeError, ForgeResult};
use crate::interpreter::InterpreterConfig;
use crate::pass::PipelineConfig;

const MAX_ITERATIONS_ENV: &str = "CIRCLEFORGE_PASS_MAX_ITERATIONS";
const VALIDATE_PASSES_ENV: &str = "CIRCLEFORGE_VALIDATE_PASSES";
const PARALLEL_ENV: &str = "CIRCLEFORGE_PARALLEL";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    pub pipeline: PipelineConfig,
    pub interpreter: InterpreterConfig,
}

impl ForgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_interpreter(mut self, interpreter: InterpreterConfig) -> Self {
        self.interpreter = interpreter;
        self
    }

    /// Defaults overridden by whichever variables are set.
    pub fn from_env() -> ForgeResult<Self> {
        let mut config = Self::default();
        if let Some(max_iterations) = env_value::<usize>(MAX_ITERATIONS_ENV)? {
            config.pipeline.max_iterations = max_iterations;
        }
        if let Some(validate) = env_flag(VALIDATE_PASSES_ENV)? {
            config.pipeline.validate_each_pass = validate;
        }
        if let Some(parallel) = env_flag(PARALLEL_ENV)? {
            config.interpreter.parallel = parallel;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ForgeResult<()> {
        self.pipeline.validate()
    }
}

fn env_value<T: FromStr>(name: &str) -> ForgeResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|e| {
            ForgeError::InvalidConfiguration(format!("{}={:?}: {}", name, raw, e))
        }),
        Err(_) => Ok(None),
    }
}

fn env_flag(name: &str) -> ForgeResult<Option<bool>> {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ForgeError::InvalidConfiguration(format!(
                "{}={:?} is not a boolean",
                name, raw
            ))),
        },
        Err(_) => Ok(None),
    }
}
