//! Reference kernels for the interpreter
//!
//! Every kernel borrows its input tensors, owns a mutable borrow of its
//! output tensor(s), and runs in two phases:
//! - `configure`: check element kinds and attributes, size the outputs
//! - `execute`: compute output data from input data
//!
//! Kernel modules by operation type:
//! - `arithmetic`: Add, Sub, Mul, Div (float, int32, quantized u8)
//! - `pow`, `elu`: elementwise math
//! - `select`: Where
//! - `pooling`: MaxPool2D, MaxPoolWithArgMax
//! - `reverse_sequence`, `batch_matmul`

pub mod arithmetic;
pub mod batch_matmul;
pub mod broadcast;
pub mod elu;
pub mod pooling;
pub mod pow;
pub mod reverse_sequence;
pub mod select;
pub mod utils;

pub use arithmetic::{ArithmeticOp, ArithmeticParams, BinaryArithmetic};
pub use batch_matmul::BatchMatMul;
pub use elu::Elu;
pub use pooling::{MaxPool2D, MaxPoolWithArgMax};
pub use pow::Pow;
pub use reverse_sequence::ReverseSequence;
pub use select::{Where, WHERE_INPUT_ARITIES};

use crate::error::{ForgeError, ForgeResult};
use crate::ir::{Op, Tensor};

/// A configured computation bound to its tensors.
pub trait Kernel {
    fn name(&self) -> &'static str;

    /// Validate inputs and attributes and resize the outputs.
    fn configure(&mut self) -> ForgeResult<()>;

    /// Fill the outputs. Only valid after a successful `configure`.
    fn execute(&mut self) -> ForgeResult<()>;
}

/// Instantiate the kernel for `op` over the given tensors.
///
/// `Input` and `Const` are materialized by the interpreter and never reach a
/// kernel; custom operators have no kernel and are reported as unsupported.
pub fn build_kernel<'a>(
    op: &Op,
    inputs: &[&'a Tensor],
    outputs: &'a mut [Tensor],
) -> ForgeResult<Box<dyn Kernel + 'a>> {
    let kernel: Box<dyn Kernel + 'a> = match op {
        Op::Input | Op::Const(_) => {
            return Err(ForgeError::Internal(format!(
                "{} nodes have no kernel",
                op
            )));
        }
        Op::Custom { code, .. } => {
            return Err(ForgeError::UnsupportedOperation(format!(
                "custom operator '{}' has no kernel",
                code
            )));
        }
        Op::Add { activation }
        | Op::Sub { activation }
        | Op::Mul { activation }
        | Op::Div { activation } => {
            let arith = match op {
                Op::Add { .. } => ArithmeticOp::Add,
                Op::Sub { .. } => ArithmeticOp::Sub,
                Op::Mul { .. } => ArithmeticOp::Mul,
                _ => ArithmeticOp::Div,
            };
            let [a, b] = expect_inputs::<2>(op, inputs)?;
            let output = single_output(op, outputs)?;
            Box::new(BinaryArithmetic::new(
                arith,
                a,
                b,
                output,
                ArithmeticParams {
                    activation: *activation,
                },
            ))
        }
        Op::Pow => {
            let [base, exponent] = expect_inputs::<2>(op, inputs)?;
            Box::new(Pow::new(base, exponent, single_output(op, outputs)?))
        }
        Op::Elu => {
            let [input] = expect_inputs::<1>(op, inputs)?;
            Box::new(Elu::new(input, single_output(op, outputs)?))
        }
        Op::Where => {
            if !WHERE_INPUT_ARITIES.contains(&inputs.len()) {
                return Err(arity_error(op, "inputs", inputs.len()));
            }
            Box::new(Where::new(inputs.to_vec(), single_output(op, outputs)?))
        }
        Op::MaxPool2D(attrs) => {
            let [input] = expect_inputs::<1>(op, inputs)?;
            Box::new(MaxPool2D::new(input, single_output(op, outputs)?, *attrs))
        }
        Op::MaxPoolWithArgMax(attrs) => {
            let [input] = expect_inputs::<1>(op, inputs)?;
            let len = outputs.len();
            let [values, indices] = outputs else {
                return Err(arity_error(op, "outputs", len));
            };
            Box::new(MaxPoolWithArgMax::new(input, values, indices, *attrs))
        }
        Op::ReverseSequence { seq_dim, batch_dim } => {
            let [input, lengths] = expect_inputs::<2>(op, inputs)?;
            Box::new(ReverseSequence::new(
                input,
                lengths,
                single_output(op, outputs)?,
                *seq_dim,
                *batch_dim,
            ))
        }
        Op::BatchMatMul { adj_x, adj_y } => {
            let [x, y] = expect_inputs::<2>(op, inputs)?;
            Box::new(BatchMatMul::new(
                x,
                y,
                single_output(op, outputs)?,
                *adj_x,
                *adj_y,
            ))
        }
    };
    Ok(kernel)
}

fn expect_inputs<'a, const N: usize>(
    op: &Op,
    inputs: &[&'a Tensor],
) -> ForgeResult<[&'a Tensor; N]> {
    <[&'a Tensor; N]>::try_from(inputs).map_err(|_| arity_error(op, "inputs", inputs.len()))
}

fn single_output<'a>(op: &Op, outputs: &'a mut [Tensor]) -> ForgeResult<&'a mut Tensor> {
    let len = outputs.len();
    match outputs {
        [output] => Ok(output),
        _ => Err(arity_error(op, "outputs", len)),
    }
}

fn arity_error(op: &Op, what: &str, got: usize) -> ForgeError {
    ForgeError::InvalidGraph(format!("{} node has {} {}", op, got, what))
}
