//! Graph rewrite passes.
//!
//! A pass is a stateless rewrite over `&mut Graph` that reports whether it
//! changed anything. Passes only add nodes and rewire edges; replaced nodes
//! simply become unreachable from the graph outputs.
//!
//! # Passes
//!
//! - **ResolveCustomOpMaxPoolWithArgMax**: turn `Custom("MaxPoolWithArgMax")`
//!   nodes into typed `MaxPoolWithArgMax` nodes

pub mod custom_options;
pub mod pipeline;
pub mod resolve_custom_op_max_pool_with_argmax;

pub use custom_options::MaxPoolWithArgMaxOptions;
pub use pipeline::{PassCounters, PassPipeline, PipelineConfig, PipelineStats, Step};
pub use resolve_custom_op_max_pool_with_argmax::ResolveCustomOpMaxPoolWithArgMaxPass;

use crate::error::ForgeResult;
use crate::ir::Graph;

/// A structural rewrite over the IR.
pub trait Pass: Send + Sync {
    fn name(&self) -> &'static str;

    /// Rewrite `graph` in place; `Ok(true)` iff the graph changed.
    fn run(&self, graph: &mut Graph) -> ForgeResult<bool>;
}
