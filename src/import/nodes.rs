//! Graph builders for each supported operator.

use tracing::debug;

use crate::error::{ForgeError, ForgeResult};
use crate::import::builder::{GraphBuilder, ValidateArgs};
use crate::import::record::{BuiltinOptions, OperatorCode, OperatorRecord};
use crate::ir::{
    DType, Filter, FusedActivation, Graph, NodeId, Op, Padding, Pool2DAttrs, Stride, ValueInfo,
    ValueRef,
};
use crate::kernels::{ArithmeticOp, WHERE_INPUT_ARITIES};

/// Fixed input/output counts plus resolvable inputs.
fn check_arity(args: &ValidateArgs<'_>, inputs: &[usize], outputs: usize) -> bool {
    if !inputs.contains(&args.input_count()) {
        debug!(
            op = %args.op.code,
            got = args.input_count(),
            expected = ?inputs,
            "rejecting operator: input count"
        );
        return false;
    }
    if args.output_count() != outputs {
        debug!(op = %args.op.code, got = args.output_count(), "rejecting operator: output count");
        return false;
    }
    if !args.inputs_resolve() {
        debug!(op = %args.op.code, "rejecting operator: unresolvable input index");
        return false;
    }
    true
}

/// All inputs share one element kind.
fn same_input_dtype(args: &ValidateArgs<'_>) -> bool {
    let mut kinds = (0..args.input_count()).filter_map(|pos| args.input_tensor(pos).map(|t| t.dtype));
    match kinds.next() {
        Some(first) => kinds.all(|k| k == first),
        None => true,
    }
}

fn activation(code: i32) -> ForgeResult<FusedActivation> {
    FusedActivation::from_wire_code(code)
        .ok_or_else(|| ForgeError::InvalidModel(format!("unknown fused activation {}", code)))
}

fn padding(code: i32) -> ForgeResult<Padding> {
    Padding::from_wire_code(code)
        .ok_or_else(|| ForgeError::InvalidModel(format!("unknown padding {}", code)))
}

fn unexpected_options(op: &OperatorRecord) -> ForgeError {
    ForgeError::InvalidModel(format!("{} carries {:?}", op.code, op.options))
}

pub struct BinaryArithmeticBuilder {
    op: ArithmeticOp,
}

impl BinaryArithmeticBuilder {
    pub const fn new(op: ArithmeticOp) -> Self {
        Self { op }
    }

    fn decode(&self, record: &OperatorRecord) -> ForgeResult<Op> {
        let code = match (&record.options, self.op) {
            (BuiltinOptions::Add { activation }, ArithmeticOp::Add)
            | (BuiltinOptions::Sub { activation }, ArithmeticOp::Sub)
            | (BuiltinOptions::Mul { activation }, ArithmeticOp::Mul)
            | (BuiltinOptions::Div { activation }, ArithmeticOp::Div) => *activation,
            _ => return Err(unexpected_options(record)),
        };
        let activation = activation(code)?;
        Ok(match self.op {
            ArithmeticOp::Add => Op::Add { activation },
            ArithmeticOp::Sub => Op::Sub { activation },
            ArithmeticOp::Mul => Op::Mul { activation },
            ArithmeticOp::Div => Op::Div { activation },
        })
    }
}

impl GraphBuilder for BinaryArithmeticBuilder {
    fn validate(&self, args: &ValidateArgs<'_>) -> bool {
        check_arity(args, &[2], 1) && self.decode(args.op).is_ok()
    }

    fn build_node(
        &self,
        op: &OperatorRecord,
        inputs: Vec<ValueRef>,
        outputs: Vec<ValueInfo>,
        graph: &mut Graph,
    ) -> ForgeResult<NodeId> {
        Ok(graph.add_node(self.decode(op)?, inputs, outputs))
    }
}

pub struct PowBuilder;

impl GraphBuilder for PowBuilder {
    fn validate(&self, args: &ValidateArgs<'_>) -> bool {
        check_arity(args, &[2], 1) && same_input_dtype(args)
    }

    fn build_node(
        &self,
        _op: &OperatorRecord,
        inputs: Vec<ValueRef>,
        outputs: Vec<ValueInfo>,
        graph: &mut Graph,
    ) -> ForgeResult<NodeId> {
        Ok(graph.add_node(Op::Pow, inputs, outputs))
    }
}

pub struct EluBuilder;

impl GraphBuilder for EluBuilder {
    fn validate(&self, args: &ValidateArgs<'_>) -> bool {
        check_arity(args, &[1], 1)
    }

    fn build_node(
        &self,
        _op: &OperatorRecord,
        inputs: Vec<ValueRef>,
        outputs: Vec<ValueInfo>,
        graph: &mut Graph,
    ) -> ForgeResult<NodeId> {
        Ok(graph.add_node(Op::Elu, inputs, outputs))
    }
}

/// `Where` takes either the condition alone or `(condition, x, y)`; the
/// condition must be boolean in both forms.
pub struct WhereBuilder;

impl GraphBuilder for WhereBuilder {
    fn validate(&self, args: &ValidateArgs<'_>) -> bool {
        if !check_arity(args, &WHERE_INPUT_ARITIES, 1) {
            return false;
        }
        match args.input_tensor(0) {
            Some(cond) if cond.dtype == DType::Bool => true,
            _ => {
                debug!(op = %args.op.code, "rejecting operator: condition is not Bool");
                false
            }
        }
    }

    fn build_node(
        &self,
        _op: &OperatorRecord,
        inputs: Vec<ValueRef>,
        outputs: Vec<ValueInfo>,
        graph: &mut Graph,
    ) -> ForgeResult<NodeId> {
        Ok(graph.add_node(Op::Where, inputs, outputs))
    }
}

pub struct MaxPool2DBuilder;

impl MaxPool2DBuilder {
    fn decode(record: &OperatorRecord) -> ForgeResult<Pool2DAttrs> {
        match record.options {
            BuiltinOptions::Pool2D {
                padding: pad,
                stride_w,
                stride_h,
                filter_width,
                filter_height,
                activation: act,
            } => Ok(Pool2DAttrs {
                padding: padding(pad)?,
                stride: Stride {
                    w: stride_w,
                    h: stride_h,
                },
                filter: Filter {
                    w: filter_width,
                    h: filter_height,
                },
                activation: activation(act)?,
            }),
            _ => Err(unexpected_options(record)),
        }
    }
}

impl GraphBuilder for MaxPool2DBuilder {
    fn validate(&self, args: &ValidateArgs<'_>) -> bool {
        check_arity(args, &[1], 1) && Self::decode(args.op).is_ok()
    }

    fn build_node(
        &self,
        op: &OperatorRecord,
        inputs: Vec<ValueRef>,
        outputs: Vec<ValueInfo>,
        graph: &mut Graph,
    ) -> ForgeResult<NodeId> {
        let attrs = Self::decode(op)?;
        Ok(graph.add_node(Op::MaxPool2D(attrs), inputs, outputs))
    }
}

pub struct ReverseSequenceBuilder;

impl GraphBuilder for ReverseSequenceBuilder {
    fn validate(&self, args: &ValidateArgs<'_>) -> bool {
        check_arity(args, &[2], 1)
            && matches!(args.op.options, BuiltinOptions::ReverseSequence { .. })
    }

    fn build_node(
        &self,
        op: &OperatorRecord,
        inputs: Vec<ValueRef>,
        outputs: Vec<ValueInfo>,
        graph: &mut Graph,
    ) -> ForgeResult<NodeId> {
        let BuiltinOptions::ReverseSequence { seq_dim, batch_dim } = op.options else {
            return Err(unexpected_options(op));
        };
        Ok(graph.add_node(Op::ReverseSequence { seq_dim, batch_dim }, inputs, outputs))
    }
}

pub struct BatchMatMulBuilder;

impl GraphBuilder for BatchMatMulBuilder {
    fn validate(&self, args: &ValidateArgs<'_>) -> bool {
        check_arity(args, &[2], 1)
            && same_input_dtype(args)
            && matches!(args.op.options, BuiltinOptions::BatchMatMul { .. })
    }

    fn build_node(
        &self,
        op: &OperatorRecord,
        inputs: Vec<ValueRef>,
        outputs: Vec<ValueInfo>,
        graph: &mut Graph,
    ) -> ForgeResult<NodeId> {
        let BuiltinOptions::BatchMatMul { adj_x, adj_y } = op.options else {
            return Err(unexpected_options(op));
        };
        Ok(graph.add_node(Op::BatchMatMul { adj_x, adj_y }, inputs, outputs))
    }
}

/// Keeps any custom operator as an opaque node; passes may resolve it later.
pub struct CustomBuilder;

impl GraphBuilder for CustomBuilder {
    fn validate(&self, args: &ValidateArgs<'_>) -> bool {
        args.output_count() >= 1 && args.inputs_resolve()
    }

    fn build_node(
        &self,
        op: &OperatorRecord,
        inputs: Vec<ValueRef>,
        outputs: Vec<ValueInfo>,
        graph: &mut Graph,
    ) -> ForgeResult<NodeId> {
        let OperatorCode::Custom(code) = &op.code else {
            return Err(ForgeError::Internal(format!(
                "custom builder given {}",
                op.code
            )));
        };
        let node = Op::Custom {
            code: code.clone(),
            options: op.custom_options.clone(),
        };
        Ok(graph.add_node(node, inputs, outputs))
    }
}
