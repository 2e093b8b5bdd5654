//! Structural validation of IR graphs.

use std::collections::HashSet;

use crate::error::{ForgeError, ForgeResult};
use crate::ir::{Graph, NodeId, Op, ValueRef};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unseen,
    OnStack,
    Done,
}

impl Graph {
    /// Check the arena invariants: every edge and output resolves to an
    /// existing output slot, arities match their operator kind, inputs are
    /// `Input` nodes, and the graph is acyclic.
    pub fn validate(&self) -> ForgeResult<()> {
        for (id, node) in self.iter() {
            if let Some(arity) = node.op.fixed_output_arity() {
                if node.arity() != arity {
                    return Err(invalid(format!(
                        "node {} ({}) has {} outputs, expected {}",
                        id,
                        node.op,
                        node.arity(),
                        arity
                    )));
                }
            }
            if matches!(node.op, Op::Input | Op::Const(_)) && !node.inputs.is_empty() {
                return Err(invalid(format!("node {} ({}) must not have inputs", id, node.op)));
            }
            for (pos, input) in node.inputs.iter().enumerate() {
                self.check_value(*input)
                    .map_err(|e| invalid(format!("node {} input {}: {}", id, pos, e)))?;
            }
        }

        for (i, output) in self.outputs().iter().enumerate() {
            self.check_value(*output)
                .map_err(|e| invalid(format!("graph output {}: {}", i, e)))?;
        }

        let mut seen_inputs = HashSet::new();
        for &id in self.inputs() {
            match self.get(id) {
                Some(node) if node.op == Op::Input => {}
                _ => return Err(invalid(format!("graph input {} is not an Input node", id))),
            }
            if !seen_inputs.insert(id) {
                return Err(invalid(format!("graph input {} listed twice", id)));
            }
        }

        self.check_acyclic()
    }

    fn check_value(&self, value: ValueRef) -> Result<(), String> {
        let node = self
            .get(value.node)
            .ok_or_else(|| format!("references missing node {}", value.node))?;
        if value.index >= node.arity() {
            return Err(format!(
                "references slot {} of node {} with {} outputs",
                value.index,
                value.node,
                node.arity()
            ));
        }
        Ok(())
    }

    fn check_acyclic(&self) -> ForgeResult<()> {
        let mut marks = vec![Mark::Unseen; self.len()];
        for start in 0..self.len() {
            if marks[start] != Mark::Unseen {
                continue;
            }
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            marks[start] = Mark::OnStack;
            while let Some(top) = stack.last_mut() {
                let id = top.0;
                let inputs = &self.node(NodeId(id)).inputs;
                if top.1 < inputs.len() {
                    let dep = inputs[top.1].node.0;
                    top.1 += 1;
                    match marks[dep] {
                        Mark::OnStack => {
                            return Err(invalid(format!("cycle through node {}", dep)));
                        }
                        Mark::Unseen => {
                            marks[dep] = Mark::OnStack;
                            stack.push((dep, 0));
                        }
                        Mark::Done => {}
                    }
                } else {
                    marks[id] = Mark::Done;
                    stack.pop();
                }
            }
        }
        Ok(())
    }
}

fn invalid(msg: String) -> ForgeError {
    ForgeError::InvalidGraph(msg)
}
