//! Per-operator graph builders and their lookup table.

use crate::error::ForgeResult;
use crate::import::nodes::{
    BatchMatMulBuilder, BinaryArithmeticBuilder, CustomBuilder, EluBuilder, MaxPool2DBuilder,
    PowBuilder, ReverseSequenceBuilder, WhereBuilder,
};
use crate::import::record::{BuiltinOperator, OperatorCode, OperatorRecord, TensorRecord};
use crate::ir::{Graph, NodeId, ValueInfo, ValueRef};
use crate::kernels::ArithmeticOp;

/// What a builder may inspect when validating one operator record.
#[derive(Debug, Clone, Copy)]
pub struct ValidateArgs<'a> {
    pub op: &'a OperatorRecord,
    pub tensors: &'a [TensorRecord],
}

impl<'a> ValidateArgs<'a> {
    pub fn new(op: &'a OperatorRecord, tensors: &'a [TensorRecord]) -> Self {
        Self { op, tensors }
    }

    /// Tensor record feeding input `pos`; `None` when the position is
    /// missing, omitted or refers past the tensor table.
    pub fn input_tensor(&self, pos: usize) -> Option<&'a TensorRecord> {
        let index = *self.op.inputs.get(pos)?;
        usize::try_from(index).ok().and_then(|i| self.tensors.get(i))
    }

    pub fn input_count(&self) -> usize {
        self.op.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.op.outputs.len()
    }

    /// Every input position resolves to a tensor record.
    pub fn inputs_resolve(&self) -> bool {
        (0..self.input_count()).all(|pos| self.input_tensor(pos).is_some())
    }
}

/// Turns one operator record into one IR node.
pub trait GraphBuilder: Send + Sync {
    /// Arity, element-kind and options checks. A `false` aborts the import.
    fn validate(&self, args: &ValidateArgs<'_>) -> bool;

    /// Allocate the node for an already validated record. `inputs` are the
    /// resolved producers in positional order, `outputs` the declared output
    /// slots. Previously built nodes are never touched.
    fn build_node(
        &self,
        op: &OperatorRecord,
        inputs: Vec<ValueRef>,
        outputs: Vec<ValueInfo>,
        graph: &mut Graph,
    ) -> ForgeResult<NodeId>;
}

static ADD: BinaryArithmeticBuilder = BinaryArithmeticBuilder::new(ArithmeticOp::Add);
static SUB: BinaryArithmeticBuilder = BinaryArithmeticBuilder::new(ArithmeticOp::Sub);
static MUL: BinaryArithmeticBuilder = BinaryArithmeticBuilder::new(ArithmeticOp::Mul);
static DIV: BinaryArithmeticBuilder = BinaryArithmeticBuilder::new(ArithmeticOp::Div);

/// Builder responsible for `code`.
pub fn builder_for(code: &OperatorCode) -> &'static dyn GraphBuilder {
    match code {
        OperatorCode::Custom(_) => &CustomBuilder,
        OperatorCode::Builtin(op) => match op {
            BuiltinOperator::Add => &ADD,
            BuiltinOperator::Sub => &SUB,
            BuiltinOperator::Mul => &MUL,
            BuiltinOperator::Div => &DIV,
            BuiltinOperator::Pow => &PowBuilder,
            BuiltinOperator::Elu => &EluBuilder,
            BuiltinOperator::Where => &WhereBuilder,
            BuiltinOperator::MaxPool2D => &MaxPool2DBuilder,
            BuiltinOperator::ReverseSequence => &ReverseSequenceBuilder,
            BuiltinOperator::BatchMatMul => &BatchMatMulBuilder,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::record::BuiltinOptions;
    use crate::ir::DType;

    #[test]
    fn test_input_tensor_resolution() {
        let tensors = vec![TensorRecord::new("a", DType::Float32, vec![1])];
        let op = OperatorRecord::builtin(
            BuiltinOperator::Elu,
            vec![0, -1, 7],
            vec![0],
            BuiltinOptions::None,
        );
        let args = ValidateArgs::new(&op, &tensors);
        assert_eq!(args.input_tensor(0).map(|t| t.name.as_str()), Some("a"));
        assert!(args.input_tensor(1).is_none());
        assert!(args.input_tensor(2).is_none());
        assert!(args.input_tensor(3).is_none());
        assert!(!args.inputs_resolve());
    }

    #[test]
    fn test_every_builtin_has_a_builder() {
        let tensors = vec![];
        for op in BuiltinOperator::ALL {
            let record = OperatorRecord::builtin(op, vec![], vec![], BuiltinOptions::None);
            // Nothing validates without inputs or outputs
            assert!(!builder_for(&record.code).validate(&ValidateArgs::new(&record, &tensors)));
        }
    }
}
