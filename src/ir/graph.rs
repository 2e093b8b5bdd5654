//! Graph structures for the IR.
//!
//! The graph is an arena: nodes are appended and never freed. Edges are
//! `ValueRef` handles (producer node + output slot), so rewiring a consumer
//! can never leave a dangling reference. A node that nothing reachable from
//! the graph outputs depends on is simply dead.

use std::collections::HashSet;
use std::fmt;

use crate::ir::{DType, Op, QuantParams, Tensor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One output slot of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueRef {
    pub node: NodeId,
    pub index: usize,
}

impl ValueRef {
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }

    pub fn first(node: NodeId) -> Self {
        Self { node, index: 0 }
    }
}

/// Declared type of a node output.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueInfo {
    pub name: String,
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub quant: Option<QuantParams>,
    /// Slot in the tensor table this value was imported from, if any.
    pub record_index: Option<usize>,
}

impl ValueInfo {
    pub fn new(name: impl Into<String>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            dtype,
            shape: Vec::new(),
            quant: None,
            record_index: None,
        }
    }

    pub fn with_shape(mut self, shape: Vec<usize>) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_quant(mut self, quant: QuantParams) -> Self {
        self.quant = Some(quant);
        self
    }

    pub fn with_record_index(mut self, index: usize) -> Self {
        self.record_index = Some(index);
        self
    }

    pub fn of_tensor(name: impl Into<String>, tensor: &Tensor) -> Self {
        Self {
            name: name.into(),
            dtype: tensor.dtype(),
            shape: tensor.shape().to_vec(),
            quant: tensor.quant().copied(),
            record_index: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub op: Op,
    pub inputs: Vec<ValueRef>,
    pub outputs: Vec<ValueInfo>,
}

impl Node {
    pub fn arity(&self) -> usize {
        self.outputs.len()
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Graph {
    nodes: Vec<Node>,
    inputs: Vec<NodeId>,
    outputs: Vec<ValueRef>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, op: Op, inputs: Vec<ValueRef>, outputs: Vec<ValueInfo>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            op,
            inputs,
            outputs,
        });
        id
    }

    /// Append a graph input placeholder.
    pub fn add_input(&mut self, info: ValueInfo) -> NodeId {
        let id = self.add_node(Op::Input, Vec::new(), vec![info]);
        self.inputs.push(id);
        id
    }

    pub fn add_const(&mut self, name: impl Into<String>, tensor: Tensor) -> NodeId {
        let info = ValueInfo::of_tensor(name, &tensor);
        self.add_node(Op::Const(tensor), Vec::new(), vec![info])
    }

    pub fn mark_output(&mut self, value: ValueRef) {
        self.outputs.push(value);
    }

    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ValueRef] {
        &self.outputs
    }

    /// Total nodes ever allocated, dead ones included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn value_info(&self, value: ValueRef) -> Option<&ValueInfo> {
        self.get(value.node)?.outputs.get(value.index)
    }

    /// Total number of input edges over all nodes.
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.inputs.len()).sum()
    }

    /// Every `(consumer, input position)` reading `value`, dead consumers
    /// included.
    pub fn consumers(&self, value: ValueRef) -> Vec<(NodeId, usize)> {
        let mut users = Vec::new();
        for (id, node) in self.iter() {
            for (pos, input) in node.inputs.iter().enumerate() {
                if *input == value {
                    users.push((id, pos));
                }
            }
        }
        users
    }

    /// Point every consumer edge and graph output reading `from` at `to`.
    ///
    /// Returns the number of rewired references.
    pub fn replace_all_uses(&mut self, from: ValueRef, to: ValueRef) -> usize {
        if from == to {
            return 0;
        }
        let mut rewired = 0;
        for node in &mut self.nodes {
            for input in &mut node.inputs {
                if *input == from {
                    *input = to;
                    rewired += 1;
                }
            }
        }
        for output in &mut self.outputs {
            if *output == from {
                *output = to;
                rewired += 1;
            }
        }
        tracing::trace!(?from, ?to, rewired, "replaced uses");
        rewired
    }

    /// Nodes reachable from the graph outputs, producers before consumers.
    ///
    /// The order is a depth-first post-order seeded by the outputs in
    /// declaration order, so it is deterministic. Nodes on a cycle are
    /// emitted once; `validate` is what reports cycles.
    pub fn active_nodes(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut visited: HashSet<NodeId> = HashSet::new();

        for root in &self.outputs {
            if root.node.0 >= self.nodes.len() || !visited.insert(root.node) {
                continue;
            }
            // (node, next input position to explore)
            let mut stack: Vec<(NodeId, usize)> = vec![(root.node, 0)];
            while let Some(top) = stack.last_mut() {
                let id = top.0;
                let inputs = &self.nodes[id.0].inputs;
                if top.1 < inputs.len() {
                    let dep = inputs[top.1].node;
                    top.1 += 1;
                    if dep.0 < self.nodes.len() && visited.insert(dep) {
                        stack.push((dep, 0));
                    }
                } else {
                    order.push(id);
                    stack.pop();
                }
            }
        }

        order
    }

    pub fn is_active(&self, id: NodeId) -> bool {
        self.active_nodes().contains(&id)
    }
}
