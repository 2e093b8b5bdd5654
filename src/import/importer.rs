//! Model records → IR graph.

use tracing::{debug, info};

use crate::error::{ForgeError, ForgeResult};
use crate::import::builder::{builder_for, ValidateArgs};
use crate::import::record::{ModelRecord, TensorRecord, OMITTED_INPUT};
use crate::ir::{Graph, Tensor, ValueInfo, ValueRef};

/// Builds an IR graph from a decoded model.
#[derive(Debug, Default)]
pub struct Importer {
    /// Producer of every tensor index seen so far.
    values: Vec<Option<ValueRef>>,
}

impl Importer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Import `model`. Fails as a whole: no partially built graph escapes.
    pub fn import(model: &ModelRecord) -> ForgeResult<Graph> {
        Self::new().run(model)
    }

    fn run(&mut self, model: &ModelRecord) -> ForgeResult<Graph> {
        let mut graph = Graph::new();
        self.values = vec![None; model.tensors.len()];

        for &index in &model.inputs {
            let i = tensor_index(model, index)?;
            let id = graph.add_input(value_info(&model.tensors[i], i));
            self.values[i] = Some(ValueRef::first(id));
        }

        for (i, record) in model.tensors.iter().enumerate() {
            let Some(data) = &record.data else {
                continue;
            };
            if self.values[i].is_some() {
                continue;
            }
            let tensor = Tensor::from_bytes(
                record.dtype,
                record.shape.clone(),
                record.quant,
                data.clone(),
            )
            .map_err(|e| ForgeError::InvalidModel(format!("constant '{}': {}", record.name, e)))?;
            let id = graph.add_const(record.name.clone(), tensor);
            graph.node_mut(id).outputs[0].record_index = Some(i);
            self.values[i] = Some(ValueRef::first(id));
        }

        for (op_index, record) in model.operators.iter().enumerate() {
            let rejected = || ForgeError::ImportValidation {
                op_index,
                op: record.code.to_string(),
            };

            let builder = builder_for(&record.code);
            if !builder.validate(&ValidateArgs::new(record, &model.tensors)) {
                return Err(rejected());
            }

            let inputs = record
                .inputs
                .iter()
                .map(|&index| {
                    if index == OMITTED_INPUT {
                        debug!(op_index, op = %record.code, "omitted optional input");
                        return Err(rejected());
                    }
                    usize::try_from(index)
                        .ok()
                        .and_then(|i| self.values.get(i).copied().flatten())
                        .ok_or_else(rejected)
                })
                .collect::<ForgeResult<Vec<_>>>()?;

            let mut outputs = Vec::with_capacity(record.outputs.len());
            for &index in &record.outputs {
                let i = tensor_index(model, index)?;
                outputs.push(value_info(&model.tensors[i], i));
            }

            let id = builder.build_node(record, inputs, outputs, &mut graph)?;
            for (slot, &index) in record.outputs.iter().enumerate() {
                let i = tensor_index(model, index)?;
                self.values[i] = Some(ValueRef::new(id, slot));
            }
            debug!(op_index, op = %record.code, node = %id, "imported operator");
        }

        for &index in &model.outputs {
            let i = tensor_index(model, index)?;
            let value = self.values[i].ok_or_else(|| {
                ForgeError::InvalidModel(format!(
                    "graph output '{}' is never produced",
                    model.tensors[i].name
                ))
            })?;
            graph.mark_output(value);
        }

        graph.validate()?;
        info!(
            nodes = graph.len(),
            edges = graph.edge_count(),
            operators = model.operators.len(),
            "model imported"
        );
        Ok(graph)
    }
}

fn tensor_index(model: &ModelRecord, index: i32) -> ForgeResult<usize> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < model.tensors.len())
        .ok_or_else(|| {
            ForgeError::InvalidModel(format!(
                "tensor index {} outside table of {}",
                index,
                model.tensors.len()
            ))
        })
}

fn value_info(record: &TensorRecord, index: usize) -> ValueInfo {
    let info = ValueInfo::new(record.name.clone(), record.dtype)
        .with_shape(record.shape.clone())
        .with_record_index(index);
    match record.quant {
        Some(q) => info.with_quant(q),
        None => info,
    }
}
