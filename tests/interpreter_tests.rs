//! End-to-end evaluation of imported graphs.

mod common;

use circleforge::import::{BuiltinOperator, BuiltinOptions, OperatorRecord, TensorRecord};
use circleforge::ir::QuantParams;
use circleforge::{
    DType, ForgeError, Importer, Interpreter, InterpreterConfig, ModelRecord, NodeState,
};
use common::*;

/// Two independent branches joined by a Mul:
/// `out = (a + b) * (a - b)`.
fn diamond(dtype: DType, quant: Option<QuantParams>) -> ModelRecord {
    let tensor = |name: &str| {
        let record = TensorRecord::new(name, dtype, vec![4]);
        match quant {
            Some(q) => record.with_quant(q),
            None => record,
        }
    };
    ModelRecord {
        tensors: vec![
            tensor("a"),
            tensor("b"),
            tensor("sum"),
            tensor("diff"),
            tensor("out"),
        ],
        operators: vec![
            OperatorRecord::builtin(
                BuiltinOperator::Add,
                vec![0, 1],
                vec![2],
                BuiltinOptions::Add { activation: 0 },
            ),
            OperatorRecord::builtin(
                BuiltinOperator::Sub,
                vec![0, 1],
                vec![3],
                BuiltinOptions::Sub { activation: 0 },
            ),
            OperatorRecord::builtin(
                BuiltinOperator::Mul,
                vec![2, 3],
                vec![4],
                BuiltinOptions::Mul { activation: 0 },
            ),
        ],
        inputs: vec![0, 1],
        outputs: vec![4],
    }
}

#[test]
fn test_float_diamond() -> anyhow::Result<()> {
    let graph = Importer::import(&diamond(DType::Float32, None))?;
    let inputs = vec![
        f32_tensor(vec![4], &[3.0, 5.0, -1.0, 0.5])?,
        f32_tensor(vec![4], &[1.0, 5.0, 2.0, 0.5])?,
    ];
    let outputs = run_graph(&graph, InterpreterConfig::sequential(), inputs)?;
    assert_eq!(outputs[0].to_vec::<f32>()?, vec![8.0, 0.0, -3.0, 0.0]);
    Ok(())
}

#[test]
fn test_int32_diamond_wraps() -> anyhow::Result<()> {
    let graph = Importer::import(&diamond(DType::Int32, None))?;
    let inputs = vec![
        i32_tensor(vec![4], &[3, i32::MAX, 0, 7])?,
        i32_tensor(vec![4], &[1, 1, 0, -7])?,
    ];
    let outputs = run_graph(&graph, InterpreterConfig::sequential(), inputs)?;
    let sum = 3i32 + 1;
    let wrapped = i32::MAX.wrapping_add(1).wrapping_mul(i32::MAX - 1);
    assert_eq!(outputs[0].to_vec::<i32>()?, vec![sum * 2, wrapped, 0, 0]);
    Ok(())
}

#[test]
fn test_quantized_diamond() -> anyhow::Result<()> {
    let quant = QuantParams::new(0.5, 128);
    let graph = Importer::import(&diamond(DType::UInt8, Some(quant)))?;
    // a = [2, 4, 1, 0], b = [1, 2, 1, 0] in real terms
    let inputs = vec![
        u8_tensor(vec![4], &[132, 136, 130, 128], quant)?,
        u8_tensor(vec![4], &[130, 132, 130, 128], quant)?,
    ];
    let outputs = run_graph(&graph, InterpreterConfig::sequential(), inputs)?;
    // (a+b)(a-b) = [3, 12, 0, 0] -> q = 128 + 2x
    assert_eq!(outputs[0].to_vec::<u8>()?, vec![134, 152, 128, 128]);
    assert_eq!(outputs[0].quant(), Some(&quant));
    Ok(())
}

#[test]
fn test_parallel_matches_sequential() -> anyhow::Result<()> {
    let graph = Importer::import(&diamond(DType::Float32, None))?;
    let inputs = || -> anyhow::Result<Vec<circleforge::Tensor>> {
        Ok(vec![
            f32_tensor(vec![4], &[0.25, -8.0, 3.5, 1e6])?,
            f32_tensor(vec![4], &[4.0, 0.5, -3.5, 1e-3])?,
        ])
    };
    let sequential = run_graph(&graph, InterpreterConfig::sequential(), inputs()?)?;
    let parallel = run_graph(&graph, InterpreterConfig::parallel(), inputs()?)?;
    assert_eq!(sequential, parallel);
    Ok(())
}

#[test]
fn test_reinterpret_resets_state() -> anyhow::Result<()> {
    let graph = Importer::import(&diamond(DType::Float32, None))?;
    let mut interp = Interpreter::new(&graph, InterpreterConfig::default());
    interp.write_input(0, f32_tensor(vec![4], &[1.0; 4])?)?;
    interp.write_input(1, f32_tensor(vec![4], &[1.0; 4])?)?;
    interp.interpret()?;
    assert_eq!(interp.read_output(0)?.to_vec::<f32>()?, vec![0.0; 4]);

    interp.write_input(1, f32_tensor(vec![4], &[0.0; 4])?)?;
    interp.interpret()?;
    assert_eq!(interp.read_output(0)?.to_vec::<f32>()?, vec![1.0; 4]);
    for id in graph.active_nodes() {
        assert_eq!(interp.node_state(id), NodeState::Evaluated);
    }
    Ok(())
}

#[test]
fn test_quantized_div_by_zero_names_node() -> anyhow::Result<()> {
    let quant = QuantParams::new(0.5, 128);
    let mut model = binary_model(
        BuiltinOperator::Div,
        BuiltinOptions::Div { activation: 0 },
        DType::UInt8,
        vec![2],
        vec![2],
        vec![2],
    );
    for tensor in &mut model.tensors {
        tensor.quant = Some(quant);
    }
    let graph = Importer::import(&model)?;
    let err = run_graph(
        &graph,
        InterpreterConfig::default(),
        vec![
            u8_tensor(vec![2], &[130, 132], quant)?,
            u8_tensor(vec![2], &[130, 128], quant)?,
        ],
    )
    .unwrap_err()
    .downcast::<ForgeError>()?;

    match &err {
        ForgeError::NodeEvaluation { node, op, source } => {
            assert_eq!(*node, graph.outputs()[0].node);
            assert_eq!(op, "Div");
            assert!(matches!(**source, ForgeError::ArithmeticDomain(_)));
        }
        other => anyhow::bail!("unexpected error {}", other),
    }
    Ok(())
}
