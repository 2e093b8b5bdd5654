//! circleforge - NN model compiler middle end and reference interpreter
//!
//! Imports decoded Circle-style model records into an arena IR graph,
//! rewrites the graph with passes, evaluates it with reference kernels
//! (float and u8 quantized), and exports it back to model records.

#![allow(clippy::too_many_arguments)] // Kernel constructors mirror operator signatures
#![allow(clippy::needless_range_loop)] // Index loops read closer to the NHWC math

#[macro_use]
pub mod error;

pub mod config;
pub mod export;
pub mod import;
pub mod interpreter;
pub mod ir;
pub mod kernels;
pub mod logging;
pub mod pass;

pub use config::ForgeConfig;
pub use error::{ErrorCategory, ForgeError, ForgeResult};
pub use export::export;
pub use import::{Importer, ModelRecord};
pub use interpreter::{Interpreter, InterpreterConfig, NodeState};
pub use ir::{DType, Graph, NodeId, Op, Tensor, ValueRef};
pub use pass::{Pass, PassPipeline, PipelineConfig, PipelineStats};
