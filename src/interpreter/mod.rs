//! Reference interpreter over the IR.
//!
//! Evaluates the active nodes of a graph in dependency order. Every node
//! writes into fresh output tensors owned by the interpreter, so a node's
//! inputs are never aliased by its outputs.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ForgeError, ForgeResult};
use crate::ir::{Graph, NodeId, Op, Tensor, ValueRef};
use crate::kernels::build_kernel;

/// Configuration for graph evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Evaluate nodes of the same dependency level concurrently.
    pub parallel: bool,
}

impl InterpreterConfig {
    pub fn sequential() -> Self {
        Self { parallel: false }
    }

    pub fn parallel() -> Self {
        Self { parallel: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Unvisited,
    Evaluated,
}

pub struct Interpreter<'g> {
    graph: &'g Graph,
    config: InterpreterConfig,
    /// Active nodes, producers first.
    order: Vec<NodeId>,
    /// Tensors bound to graph inputs, by input position.
    inputs: Vec<Option<Tensor>>,
    /// Output tensors per node id.
    values: Vec<Option<Vec<Tensor>>>,
    states: Vec<NodeState>,
}

impl<'g> Interpreter<'g> {
    pub fn new(graph: &'g Graph, config: InterpreterConfig) -> Self {
        Self {
            graph,
            config,
            order: graph.active_nodes(),
            inputs: vec![None; graph.inputs().len()],
            values: vec![None; graph.len()],
            states: vec![NodeState::Unvisited; graph.len()],
        }
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Bind `tensor` to graph input `index`.
    ///
    /// The element kind must match the declared one; the shape is checked
    /// when the input declares one.
    pub fn write_input(&mut self, index: usize, tensor: Tensor) -> ForgeResult<()> {
        let id = *self.graph.inputs().get(index).ok_or_else(|| {
            ForgeError::InvalidGraph(format!(
                "graph has {} inputs, cannot write input {}",
                self.graph.inputs().len(),
                index
            ))
        })?;
        let declared = &self.graph.node(id).outputs[0];
        if tensor.dtype() != declared.dtype {
            return Err(ForgeError::TypeMismatch {
                expected: declared.dtype,
                got: tensor.dtype(),
            });
        }
        if !declared.shape.is_empty() && tensor.shape() != declared.shape.as_slice() {
            return Err(shape_error!(
                "input '{}' declared {:?}, got {:?}",
                declared.name,
                declared.shape,
                tensor.shape()
            ));
        }
        self.inputs[index] = Some(tensor);
        Ok(())
    }

    /// Evaluate every active node once.
    pub fn interpret(&mut self) -> ForgeResult<()> {
        self.states.fill(NodeState::Unvisited);
        self.values.fill(None);

        if self.config.parallel {
            self.interpret_levels()?;
        } else {
            for i in 0..self.order.len() {
                let id = self.order[i];
                let outputs = self.evaluate(id)?;
                self.commit(id, outputs);
            }
        }

        info!(
            nodes = self.order.len(),
            parallel = self.config.parallel,
            "graph interpreted"
        );
        Ok(())
    }

    /// Output `index` of the graph, as produced by the last `interpret`.
    pub fn read_output(&self, index: usize) -> ForgeResult<&Tensor> {
        let value = *self.graph.outputs().get(index).ok_or_else(|| {
            ForgeError::InvalidGraph(format!(
                "graph has {} outputs, cannot read output {}",
                self.graph.outputs().len(),
                index
            ))
        })?;
        self.value(value)
    }

    pub fn node_state(&self, id: NodeId) -> NodeState {
        self.states
            .get(id.0)
            .copied()
            .unwrap_or(NodeState::Unvisited)
    }

    fn value(&self, value: ValueRef) -> ForgeResult<&Tensor> {
        self.values
            .get(value.node.0)
            .and_then(|slot| slot.as_ref())
            .and_then(|outputs| outputs.get(value.index))
            .ok_or_else(|| {
                ForgeError::InvalidGraph(format!(
                    "value {}:{} has not been evaluated",
                    value.node, value.index
                ))
            })
    }

    fn commit(&mut self, id: NodeId, outputs: Vec<Tensor>) {
        self.values[id.0] = Some(outputs);
        self.states[id.0] = NodeState::Evaluated;
    }

    /// Compute the outputs of one node from already committed inputs.
    fn evaluate(&self, id: NodeId) -> ForgeResult<Vec<Tensor>> {
        let node = self.graph.node(id);
        match &node.op {
            Op::Const(tensor) => Ok(vec![tensor.clone()]),
            Op::Input => {
                let position = self
                    .graph
                    .inputs()
                    .iter()
                    .position(|&input| input == id)
                    .ok_or_else(|| {
                        ForgeError::InvalidGraph(format!("node {} is not a graph input", id))
                    })?;
                let tensor = self.inputs[position].clone().ok_or_else(|| {
                    ForgeError::InvalidGraph(format!(
                        "graph input {} ('{}') was never written",
                        position,
                        node.outputs[0].name
                    ))
                })?;
                Ok(vec![tensor])
            }
            op => {
                let inputs = node
                    .inputs
                    .iter()
                    .map(|v| self.value(*v))
                    .collect::<ForgeResult<Vec<_>>>()?;
                let mut outputs: Vec<Tensor> = node
                    .outputs
                    .iter()
                    .map(|info| Tensor::empty(info.dtype, info.quant))
                    .collect();
                run_kernel(op, &inputs, &mut outputs).map_err(|source| {
                    ForgeError::NodeEvaluation {
                        node: id,
                        op: op.to_string(),
                        source: Box::new(source),
                    }
                })?;
                Ok(outputs)
            }
        }
    }

    /// Evaluate level by level; a level is committed before the next starts.
    fn interpret_levels(&mut self) -> ForgeResult<()> {
        for level in dependency_levels(self.graph, &self.order) {
            let results: Vec<ForgeResult<Vec<Tensor>>> =
                level.par_iter().map(|&id| self.evaluate(id)).collect();
            debug!(width = level.len(), "evaluated level");
            for (&id, result) in level.iter().zip(results) {
                self.commit(id, result?);
            }
        }
        Ok(())
    }
}

fn run_kernel(op: &Op, inputs: &[&Tensor], outputs: &mut [Tensor]) -> ForgeResult<()> {
    let mut kernel = build_kernel(op, inputs, outputs)?;
    kernel.configure()?;
    debug!(kernel = kernel.name(), "configured");
    kernel.execute()?;
    debug!(kernel = kernel.name(), "executed");
    Ok(())
}

/// Group `order` (producers first) into levels: a node's level is one past
/// the deepest of its producers.
fn dependency_levels(graph: &Graph, order: &[NodeId]) -> Vec<Vec<NodeId>> {
    let mut depth = vec![0usize; graph.len()];
    let mut levels: Vec<Vec<NodeId>> = Vec::new();
    for &id in order {
        let d = graph
            .node(id)
            .inputs
            .iter()
            .filter(|v| v.node.0 < depth.len())
            .map(|v| depth[v.node.0] + 1)
            .max()
            .unwrap_or(0);
        depth[id.0] = d;
        if levels.len() <= d {
            levels.resize_with(d + 1, Vec::new);
        }
        levels[d].push(id);
    }
    levels
}
