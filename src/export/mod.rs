//! IR graph → model records.
//!
//! Values that came from the importer keep their relative tensor table
//! order; values created later (by passes or by hand) follow in active
//! order. Operators are written in arena order, except that a node always
//! follows its producers. Dead nodes are not exported. `MaxPoolWithArgMax`
//! has no builtin code, so it is written back as the custom operator it was
//! resolved from.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::info;

use crate::error::{ForgeError, ForgeResult};
use crate::import::{BuiltinOperator, BuiltinOptions, ModelRecord, OperatorRecord, TensorRecord};
use crate::ir::{Graph, NodeId, Op, ValueInfo, ValueRef};
use crate::pass::resolve_custom_op_max_pool_with_argmax::MAX_POOL_WITH_ARGMAX_CODE;
use crate::pass::MaxPoolWithArgMaxOptions;

/// Serialize the live part of `graph`.
pub fn export(graph: &Graph) -> ForgeResult<ModelRecord> {
    Exporter::default().run(graph)
}

#[derive(Default)]
struct Exporter {
    model: ModelRecord,
    indices: HashMap<ValueRef, i32>,
}

impl Exporter {
    fn run(mut self, graph: &Graph) -> ForgeResult<ModelRecord> {
        let active = graph.active_nodes();
        let graph_inputs: HashSet<NodeId> = graph.inputs().iter().copied().collect();

        // (value, record, imported slot) in discovery order
        let mut values: Vec<(ValueRef, TensorRecord, Option<usize>)> = Vec::new();
        for &id in graph.inputs() {
            let info = &graph.node(id).outputs[0];
            values.push((ValueRef::first(id), tensor_record(info), info.record_index));
        }
        for &id in &active {
            let node = graph.node(id);
            match &node.op {
                Op::Input => {
                    if !graph_inputs.contains(&id) {
                        return Err(ForgeError::InvalidGraph(format!(
                            "input node {} is not a graph input",
                            id
                        )));
                    }
                }
                Op::Const(tensor) => {
                    let info = &node.outputs[0];
                    let record = tensor_record(info).with_data(tensor.data_bytes().to_vec());
                    values.push((ValueRef::first(id), record, info.record_index));
                }
                _ => {
                    for (slot, info) in node.outputs.iter().enumerate() {
                        let value = ValueRef::new(id, slot);
                        values.push((value, tensor_record(info), info.record_index));
                    }
                }
            }
        }
        // imported values first by slot, the rest keep discovery order
        values.sort_by_key(|(_, _, slot)| (slot.is_none(), *slot));
        for (value, record, _) in values {
            self.push_tensor(value, record)?;
        }

        self.model.inputs = graph
            .inputs()
            .iter()
            .map(|&id| self.index_of(ValueRef::first(id)))
            .collect::<ForgeResult<Vec<_>>>()?;

        let order = operator_order(graph, &active);
        if order.len() != active.len() {
            return Err(ForgeError::InvalidGraph(
                "graph has a cycle, no operator order exists".to_string(),
            ));
        }
        for id in order {
            let node = graph.node(id);
            if matches!(node.op, Op::Input | Op::Const(_)) {
                continue;
            }
            let inputs = node
                .inputs
                .iter()
                .map(|v| self.index_of(*v))
                .collect::<ForgeResult<Vec<_>>>()?;
            let outputs = (0..node.arity())
                .map(|slot| self.index_of(ValueRef::new(id, slot)))
                .collect::<ForgeResult<Vec<_>>>()?;
            self.model.operators.push(operator_record(id, &node.op, inputs, outputs)?);
        }

        for &output in graph.outputs() {
            let index = self.index_of(output)?;
            self.model.outputs.push(index);
        }

        info!(
            tensors = self.model.tensors.len(),
            operators = self.model.operators.len(),
            "graph exported"
        );
        Ok(self.model)
    }

    fn push_tensor(&mut self, value: ValueRef, record: TensorRecord) -> ForgeResult<i32> {
        let index = i32::try_from(self.model.tensors.len())
            .map_err(|_| ForgeError::InvalidGraph("tensor table overflow".to_string()))?;
        self.model.tensors.push(record);
        self.indices.insert(value, index);
        Ok(index)
    }

    fn index_of(&self, value: ValueRef) -> ForgeResult<i32> {
        self.indices.get(&value).copied().ok_or_else(|| {
            ForgeError::InvalidGraph(format!(
                "value {}:{} has no producer in the graph",
                value.node, value.index
            ))
        })
    }
}

/// Topological order of `active` that always picks the lowest ready id.
///
/// Imported graphs are already topological in arena order, so this gives
/// back the operator order of the source model.
fn operator_order(graph: &Graph, active: &[NodeId]) -> Vec<NodeId> {
    let live: HashSet<NodeId> = active.iter().copied().collect();
    let mut pending: HashMap<NodeId, usize> = HashMap::new();
    let mut consumers: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for &id in active {
        let producers: HashSet<NodeId> = graph
            .node(id)
            .inputs
            .iter()
            .map(|v| v.node)
            .filter(|p| live.contains(p))
            .collect();
        pending.insert(id, producers.len());
        for producer in producers {
            consumers.entry(producer).or_default().push(id);
        }
    }

    let mut ready: BinaryHeap<Reverse<NodeId>> = pending
        .iter()
        .filter(|(_, &count)| count == 0)
        .map(|(&id, _)| Reverse(id))
        .collect();
    let mut order = Vec::with_capacity(active.len());
    while let Some(Reverse(id)) = ready.pop() {
        order.push(id);
        for consumer in consumers.get(&id).into_iter().flatten() {
            if let Some(count) = pending.get_mut(consumer) {
                *count -= 1;
                if *count == 0 {
                    ready.push(Reverse(*consumer));
                }
            }
        }
    }
    order
}

fn tensor_record(info: &ValueInfo) -> TensorRecord {
    let record = TensorRecord::new(info.name.clone(), info.dtype, info.shape.clone());
    match info.quant {
        Some(q) => record.with_quant(q),
        None => record,
    }
}

fn operator_record(
    id: NodeId,
    op: &Op,
    inputs: Vec<i32>,
    outputs: Vec<i32>,
) -> ForgeResult<OperatorRecord> {
    if let Some((code, options)) = builtin_of(op) {
        return Ok(OperatorRecord::builtin(code, inputs, outputs, options));
    }
    match op {
        Op::MaxPoolWithArgMax(attrs) => Ok(OperatorRecord::custom(
            MAX_POOL_WITH_ARGMAX_CODE,
            inputs,
            outputs,
            MaxPoolWithArgMaxOptions::from_attrs(attrs).encode()?,
        )),
        Op::Custom { code, options } => Ok(OperatorRecord::custom(
            code.clone(),
            inputs,
            outputs,
            options.clone(),
        )),
        _ => Err(internal_error!("node {} ({}) is not an operator", id, op)),
    }
}

/// Builtin code and options block, wire integers restored.
fn builtin_of(op: &Op) -> Option<(BuiltinOperator, BuiltinOptions)> {
    let pair = match op {
        Op::Add { activation } => (
            BuiltinOperator::Add,
            BuiltinOptions::Add {
                activation: activation.wire_code(),
            },
        ),
        Op::Sub { activation } => (
            BuiltinOperator::Sub,
            BuiltinOptions::Sub {
                activation: activation.wire_code(),
            },
        ),
        Op::Mul { activation } => (
            BuiltinOperator::Mul,
            BuiltinOptions::Mul {
                activation: activation.wire_code(),
            },
        ),
        Op::Div { activation } => (
            BuiltinOperator::Div,
            BuiltinOptions::Div {
                activation: activation.wire_code(),
            },
        ),
        Op::Pow => (BuiltinOperator::Pow, BuiltinOptions::None),
        Op::Elu => (BuiltinOperator::Elu, BuiltinOptions::None),
        Op::Where => (BuiltinOperator::Where, BuiltinOptions::None),
        Op::MaxPool2D(attrs) => (
            BuiltinOperator::MaxPool2D,
            BuiltinOptions::Pool2D {
                padding: attrs.padding.wire_code(),
                stride_w: attrs.stride.w,
                stride_h: attrs.stride.h,
                filter_width: attrs.filter.w,
                filter_height: attrs.filter.h,
                activation: attrs.activation.wire_code(),
            },
        ),
        Op::ReverseSequence { seq_dim, batch_dim } => (
            BuiltinOperator::ReverseSequence,
            BuiltinOptions::ReverseSequence {
                seq_dim: *seq_dim,
                batch_dim: *batch_dim,
            },
        ),
        Op::BatchMatMul { adj_x, adj_y } => (
            BuiltinOperator::BatchMatMul,
            BuiltinOptions::BatchMatMul {
                adj_x: *adj_x,
                adj_y: *adj_y,
            },
        ),
        Op::Input | Op::Const(_) | Op::MaxPoolWithArgMax(_) | Op::Custom { .. } => return None,
    };
    Some(pair)
}
