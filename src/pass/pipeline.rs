//! Ordered pass execution with bounded fixed points.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ForgeError, ForgeResult};
use crate::ir::Graph;
use crate::pass::{Pass, ResolveCustomOpMaxPoolWithArgMaxPass};

/// Default cap on fixed-point iterations.
pub const DEFAULT_MAX_ITERATIONS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cap for `FixedPoint` groups that do not set their own.
    pub max_iterations: usize,
    /// Run `Graph::validate` after every pass and fail on the first
    /// broken invariant.
    pub validate_each_pass: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            validate_each_pass: true,
        }
    }
}

impl PipelineConfig {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_validation(mut self, validate_each_pass: bool) -> Self {
        self.validate_each_pass = validate_each_pass;
        self
    }

    pub fn validate(&self) -> ForgeResult<()> {
        if self.max_iterations == 0 {
            return Err(ForgeError::InvalidConfiguration(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

pub enum Step {
    Pass(Box<dyn Pass>),
    FixedPoint {
        max_iterations: usize,
        steps: Vec<Step>,
    },
}

impl Step {
    pub fn pass<P: Pass + 'static>(pass: P) -> Self {
        Step::Pass(Box::new(pass))
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Pass(pass) => write!(f, "Pass({})", pass.name()),
            Step::FixedPoint {
                max_iterations,
                steps,
            } => f
                .debug_struct("FixedPoint")
                .field("max_iterations", max_iterations)
                .field("steps", steps)
                .finish(),
        }
    }
}

/// Per-pass counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassCounters {
    pub runs: usize,
    pub changes: usize,
}

/// What a pipeline run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineStats {
    pub passes: BTreeMap<&'static str, PassCounters>,
    /// Iterations executed across all fixed-point groups.
    pub fixed_point_iterations: usize,
    pub changed: bool,
}

impl PipelineStats {
    pub fn total_runs(&self) -> usize {
        self.passes.values().map(|c| c.runs).sum()
    }

    pub fn total_changes(&self) -> usize {
        self.passes.values().map(|c| c.changes).sum()
    }

    fn record(&mut self, name: &'static str, changed: bool) {
        let counters = self.passes.entry(name).or_default();
        counters.runs += 1;
        if changed {
            counters.changes += 1;
            self.changed = true;
        }
    }
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.changed {
            return write!(
                f,
                "PipelineStats: no changes ({} pass runs)",
                self.total_runs()
            );
        }
        write!(
            f,
            "PipelineStats: {} changes in {} pass runs, {} fixed-point iterations",
            self.total_changes(),
            self.total_runs(),
            self.fixed_point_iterations
        )?;
        for (name, counters) in &self.passes {
            write!(f, "\n  {}: {}/{} changed", name, counters.changes, counters.runs)?;
        }
        Ok(())
    }
}

/// Ordered list of steps applied to a graph, strictly sequentially.
#[derive(Debug)]
pub struct PassPipeline {
    steps: Vec<Step>,
    config: PipelineConfig,
}

impl Default for PassPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl PassPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            steps: Vec::new(),
            config,
        }
    }

    /// The stock pipeline: custom-op resolution iterated to a fixed point.
    pub fn standard(config: PipelineConfig) -> Self {
        Self::new(config).fixed_point(vec![Step::pass(ResolveCustomOpMaxPoolWithArgMaxPass)])
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn pass<P: Pass + 'static>(mut self, pass: P) -> Self {
        self.steps.push(Step::pass(pass));
        self
    }

    /// Group `steps`, repeated until no pass reports a change or the
    /// configured cap is reached.
    pub fn fixed_point(self, steps: Vec<Step>) -> Self {
        let cap = self.config.max_iterations;
        self.fixed_point_with(cap, steps)
    }

    pub fn fixed_point_with(mut self, max_iterations: usize, steps: Vec<Step>) -> Self {
        self.steps.push(Step::FixedPoint {
            max_iterations: max_iterations.max(1),
            steps,
        });
        self
    }

    pub fn run(&self, graph: &mut Graph) -> ForgeResult<PipelineStats> {
        self.config.validate()?;
        let mut stats = PipelineStats::default();
        self.run_steps(&self.steps, graph, &mut stats)?;
        info!(
            runs = stats.total_runs(),
            changes = stats.total_changes(),
            iterations = stats.fixed_point_iterations,
            "pass pipeline finished"
        );
        Ok(stats)
    }

    fn run_steps(
        &self,
        steps: &[Step],
        graph: &mut Graph,
        stats: &mut PipelineStats,
    ) -> ForgeResult<bool> {
        let mut changed_any = false;
        for step in steps {
            match step {
                Step::Pass(pass) => {
                    let changed = pass.run(graph)?;
                    stats.record(pass.name(), changed);
                    debug!(
                        pass = pass.name(),
                        changed,
                        nodes = graph.len(),
                        "pass run"
                    );
                    if self.config.validate_each_pass {
                        graph.validate().map_err(|e| ForgeError::PassInconsistency {
                            pass: pass.name(),
                            reason: format!("graph invalid after pass: {}", e),
                        })?;
                    }
                    changed_any |= changed;
                }
                Step::FixedPoint {
                    max_iterations,
                    steps,
                } => {
                    for _ in 0..*max_iterations {
                        stats.fixed_point_iterations += 1;
                        let changed = self.run_steps(steps, graph, stats)?;
                        changed_any |= changed;
                        if !changed {
                            break;
                        }
                    }
                }
            }
        }
        Ok(changed_any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{DType, NodeId, Op, ValueInfo, ValueRef};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Reports a change for the first `budget` runs.
    struct CountdownPass {
        budget: usize,
        runs: Arc<AtomicUsize>,
    }

    impl Pass for CountdownPass {
        fn name(&self) -> &'static str {
            "Countdown"
        }

        fn run(&self, _graph: &mut Graph) -> ForgeResult<bool> {
            let previous = self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(previous < self.budget)
        }
    }

    /// Leaves a dangling edge behind.
    struct BreakingPass;

    impl Pass for BreakingPass {
        fn name(&self) -> &'static str {
            "Breaking"
        }

        fn run(&self, graph: &mut Graph) -> ForgeResult<bool> {
            graph.add_node(
                Op::Elu,
                vec![ValueRef::first(NodeId(99))],
                vec![ValueInfo::new("bad", DType::Float32)],
            );
            Ok(true)
        }
    }

    #[test]
    fn test_fixed_point_stops_when_stable() {
        let runs = Arc::new(AtomicUsize::new(0));
        let pipeline = PassPipeline::default().fixed_point(vec![Step::pass(CountdownPass {
            budget: 2,
            runs: runs.clone(),
        })]);
        let stats = pipeline.run(&mut Graph::new()).unwrap();

        // two changing iterations plus the one that confirms stability
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(stats.fixed_point_iterations, 3);
        assert_eq!(stats.passes["Countdown"], PassCounters { runs: 3, changes: 2 });
        assert!(stats.changed);
    }

    #[test]
    fn test_fixed_point_respects_cap() {
        let runs = Arc::new(AtomicUsize::new(0));
        let pipeline = PassPipeline::default().fixed_point_with(
            4,
            vec![Step::pass(CountdownPass {
                budget: usize::MAX,
                runs: runs.clone(),
            })],
        );
        pipeline.run(&mut Graph::new()).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_validation_after_each_pass() {
        let pipeline = PassPipeline::default().pass(BreakingPass);
        let err = pipeline.run(&mut Graph::new()).unwrap_err();
        assert!(matches!(err, ForgeError::PassInconsistency { pass: "Breaking", .. }));

        let lenient = PassPipeline::new(PipelineConfig::default().with_validation(false)).pass(BreakingPass);
        assert!(lenient.run(&mut Graph::new()).is_ok());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let pipeline = PassPipeline::new(PipelineConfig::default().with_max_iterations(0));
        assert!(matches!(
            pipeline.run(&mut Graph::new()),
            Err(ForgeError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_stats_display() {
        let mut stats = PipelineStats::default();
        assert_eq!(stats.to_string(), "PipelineStats: no changes (0 pass runs)");

        stats.record("A", true);
        stats.record("A", false);
        stats.fixed_point_iterations = 2;
        let text = stats.to_string();
        assert!(text.contains("1 changes in 2 pass runs"));
        assert!(text.contains("A: 1/2 changed"));
    }
}
