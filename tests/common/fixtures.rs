//! Model, payload and tensor builders.

use std::collections::BTreeMap;

use circleforge::import::{BuiltinOperator, BuiltinOptions, OperatorRecord, TensorRecord};
use circleforge::ir::QuantParams;
use circleforge::{DType, Graph, Interpreter, InterpreterConfig, ModelRecord, Tensor};

pub const MAX_POOL_WITH_ARGMAX: &str = "MaxPoolWithArgMax";

pub fn f32_tensor(shape: Vec<usize>, values: &[f32]) -> anyhow::Result<Tensor> {
    Ok(Tensor::from_data(shape, values)?)
}

pub fn i32_tensor(shape: Vec<usize>, values: &[i32]) -> anyhow::Result<Tensor> {
    Ok(Tensor::from_data(shape, values)?)
}

pub fn u8_tensor(shape: Vec<usize>, values: &[u8], quant: QuantParams) -> anyhow::Result<Tensor> {
    Ok(Tensor::from_data(shape, values)?.with_quant(quant)?)
}

pub fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// `out = a <op> b` with both operands as graph inputs.
pub fn binary_model(
    op: BuiltinOperator,
    options: BuiltinOptions,
    dtype: DType,
    a_shape: Vec<usize>,
    b_shape: Vec<usize>,
    out_shape: Vec<usize>,
) -> ModelRecord {
    ModelRecord {
        tensors: vec![
            TensorRecord::new("a", dtype, a_shape),
            TensorRecord::new("b", dtype, b_shape),
            TensorRecord::new("out", dtype, out_shape),
        ],
        operators: vec![OperatorRecord::builtin(op, vec![0, 1], vec![2], options)],
        inputs: vec![0, 1],
        outputs: vec![2],
    }
}

/// Flexbuffer map understood by the MaxPoolWithArgMax resolution pass.
pub fn argmax_payload(
    padding: i32,
    stride: (i32, i32),
    filter: (i32, i32),
    output_type: DType,
) -> anyhow::Result<Vec<u8>> {
    let map = BTreeMap::from([
        ("padding", padding),
        ("stride_w", stride.0),
        ("stride_h", stride.1),
        ("filter_width", filter.0),
        ("filter_height", filter.1),
        ("activation", 0),
        ("output_type", output_type.wire_code()),
    ]);
    Ok(flexbuffers::to_vec(map)?)
}

/// `x [1,4,4,1] -> Custom(MaxPoolWithArgMax) -> (values, indices) -> Elu(values)`.
///
/// Graph outputs are the Elu result and the indices.
pub fn argmax_model(payload: Vec<u8>, index_type: DType) -> ModelRecord {
    ModelRecord {
        tensors: vec![
            TensorRecord::new("x", DType::Float32, vec![1, 4, 4, 1]),
            TensorRecord::new("values", DType::Float32, vec![1, 2, 2, 1]),
            TensorRecord::new("indices", index_type, vec![1, 2, 2, 1]),
            TensorRecord::new("activated", DType::Float32, vec![1, 2, 2, 1]),
        ],
        operators: vec![
            OperatorRecord::custom(MAX_POOL_WITH_ARGMAX, vec![0], vec![1, 2], payload),
            OperatorRecord::builtin(BuiltinOperator::Elu, vec![1], vec![3], BuiltinOptions::None),
        ],
        inputs: vec![0],
        outputs: vec![3, 2],
    }
}

/// Bind `inputs` in order, interpret, and return every graph output.
pub fn run_graph(
    graph: &Graph,
    config: InterpreterConfig,
    inputs: Vec<Tensor>,
) -> anyhow::Result<Vec<Tensor>> {
    let mut interp = Interpreter::new(graph, config);
    for (i, tensor) in inputs.into_iter().enumerate() {
        interp.write_input(i, tensor)?;
    }
    interp.interpret()?;
    (0..graph.outputs().len())
        .map(|i| Ok(interp.read_output(i)?.clone()))
        .collect()
}
