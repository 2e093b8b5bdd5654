//! Binary elementwise arithmetic: Add, Sub, Mul, Div.
//!
//! All four share the same configure phase (identical element kinds,
//! broadcast output shape) and differ only in the combining function and in
//! how the quantized path derives its fixed-point multipliers.

use crate::error::{ensure_same_dtype, ForgeError, ForgeResult};
use crate::ir::{broadcast_shape, DType, FusedActivation, Tensor};
use crate::kernels::broadcast::broadcast_binary;
use crate::kernels::utils::{
    activation_range_f32, activation_range_quantized, ensure_quantized, rounding_div,
    QuantizedMultiplier,
};
use crate::kernels::Kernel;

/// Left shift applied to both operands of quantized Add/Sub before rescaling.
const ADD_SUB_LEFT_SHIFT: i32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArithmeticParams {
    pub activation: FusedActivation,
}

pub struct BinaryArithmetic<'a> {
    op: ArithmeticOp,
    input1: &'a Tensor,
    input2: &'a Tensor,
    output: &'a mut Tensor,
    params: ArithmeticParams,
}

impl<'a> BinaryArithmetic<'a> {
    pub fn new(
        op: ArithmeticOp,
        input1: &'a Tensor,
        input2: &'a Tensor,
        output: &'a mut Tensor,
        params: ArithmeticParams,
    ) -> Self {
        Self {
            op,
            input1,
            input2,
            output,
            params,
        }
    }

    fn eval_float(&mut self) -> ForgeResult<()> {
        let (lo, hi) = activation_range_f32(self.params.activation)?;
        let a = self.input1.to_vec::<f32>()?;
        let b = self.input2.to_vec::<f32>()?;
        let op = self.op;

        // Division follows IEEE-754: x/0 is +-inf and 0/0 is NaN
        let result = broadcast_binary(
            self.output.shape(),
            self.input1.shape(),
            &a,
            self.input2.shape(),
            &b,
            |x, y| {
                let v = match op {
                    ArithmeticOp::Add => x + y,
                    ArithmeticOp::Sub => x - y,
                    ArithmeticOp::Mul => x * y,
                    ArithmeticOp::Div => x / y,
                };
                Ok(v.clamp(lo, hi))
            },
        )?;
        self.output.write_data(&result)
    }

    fn eval_int32(&mut self) -> ForgeResult<()> {
        let (lo, hi) = activation_range_i32(self.params.activation)?;
        let a = self.input1.to_vec::<i32>()?;
        let b = self.input2.to_vec::<i32>()?;
        let op = self.op;

        let result = broadcast_binary(
            self.output.shape(),
            self.input1.shape(),
            &a,
            self.input2.shape(),
            &b,
            |x, y| {
                let v = match op {
                    ArithmeticOp::Add => x.wrapping_add(y),
                    ArithmeticOp::Sub => x.wrapping_sub(y),
                    ArithmeticOp::Mul => x.wrapping_mul(y),
                    ArithmeticOp::Div => x.checked_div(y).ok_or_else(|| {
                        ForgeError::ArithmeticDomain(format!("integer division {} / {}", x, y))
                    })?,
                };
                Ok(v.clamp(lo, hi))
            },
        )?;
        self.output.write_data(&result)
    }

    fn eval_quantized(&mut self) -> ForgeResult<()> {
        let (act_min, act_max) = activation_range_quantized(self.params.activation, self.output)?;

        let q1 = self.input1.quant_params()?;
        let q2 = self.input2.quant_params()?;
        let q_out = self.output.quant_params()?;
        let (s1, s2, s_out) = (q1.scale, q2.scale, q_out.scale);

        // Input zero-points are negated into offsets, the output one is added
        let offset1 = -q1.zero_point;
        let offset2 = -q2.zero_point;
        let output_offset = q_out.zero_point;

        let a = self.input1.to_vec::<u8>()?;
        let b = self.input2.to_vec::<u8>()?;

        let combine: Box<dyn Fn(i32, i32) -> ForgeResult<i64>> = match self.op {
            ArithmeticOp::Add | ArithmeticOp::Sub => {
                let twice_max = 2.0 * s1.max(s2);
                let m1 = QuantizedMultiplier::from_real(s1 / twice_max)?;
                let m2 = QuantizedMultiplier::from_real(s2 / twice_max)?;
                let m_out = QuantizedMultiplier::from_real(
                    twice_max / ((1i64 << ADD_SUB_LEFT_SHIFT) as f64 * s_out),
                )?;
                let negate = self.op == ArithmeticOp::Sub;
                Box::new(move |v1, v2| {
                    let x1 = m1.apply(v1 << ADD_SUB_LEFT_SHIFT);
                    let x2 = m2.apply(v2 << ADD_SUB_LEFT_SHIFT);
                    let raw = if negate { x1 - x2 } else { x1 + x2 };
                    Ok(m_out.apply(raw) as i64)
                })
            }
            ArithmeticOp::Mul => {
                let m = QuantizedMultiplier::from_real(s1 * s2 / s_out)?;
                Box::new(move |v1, v2| Ok(m.apply(v1 * v2) as i64))
            }
            ArithmeticOp::Div => {
                let m = QuantizedMultiplier::from_real(s1 / (s2 * s_out))?;
                Box::new(move |v1, v2| {
                    if v2 == 0 {
                        return Err(ForgeError::ArithmeticDomain(
                            "quantized division by zero".to_string(),
                        ));
                    }
                    // v1 / v2 as a Q31 fixed-point value, then rescaled
                    let quotient = rounding_div((v1 as i64) << 31, v2 as i64);
                    Ok(m.apply_wide(quotient, 31))
                })
            }
        };

        let result = broadcast_binary(
            self.output.shape(),
            self.input1.shape(),
            &a,
            self.input2.shape(),
            &b,
            |x, y| {
                let v1 = x as i32 + offset1;
                let v2 = y as i32 + offset2;
                let raw = combine(v1, v2)? + output_offset as i64;
                Ok(raw.clamp(act_min as i64, act_max as i64) as u8)
            },
        )?;
        self.output.write_data(&result)
    }
}

fn activation_range_i32(activation: FusedActivation) -> ForgeResult<(i32, i32)> {
    match activation {
        FusedActivation::None => Ok((i32::MIN, i32::MAX)),
        FusedActivation::Relu => Ok((0, i32::MAX)),
        FusedActivation::ReluN1To1 => Ok((-1, 1)),
        FusedActivation::Relu6 => Ok((0, 6)),
        other => Err(ForgeError::UnsupportedOperation(format!(
            "fused activation {:?} cannot be applied as a clamp",
            other
        ))),
    }
}

impl Kernel for BinaryArithmetic<'_> {
    fn name(&self) -> &'static str {
        match self.op {
            ArithmeticOp::Add => "Add",
            ArithmeticOp::Sub => "Sub",
            ArithmeticOp::Mul => "Mul",
            ArithmeticOp::Div => "Div",
        }
    }

    fn configure(&mut self) -> ForgeResult<()> {
        ensure_same_dtype(self.input1.dtype(), self.input2.dtype())?;
        ensure_same_dtype(self.input1.dtype(), self.output.dtype())?;
        ensure_quantized(self.name(), &[self.input1, self.input2, &*self.output])?;

        let shape = broadcast_shape(self.input1.shape(), self.input2.shape())?;
        self.output.resize(shape);
        Ok(())
    }

    fn execute(&mut self) -> ForgeResult<()> {
        match self.input1.dtype() {
            DType::Float32 => self.eval_float(),
            DType::Int32 => self.eval_int32(),
            DType::UInt8 => self.eval_quantized(),
            other => Err(ForgeError::UnsupportedOperation(format!(
                "{} does not support {:?}",
                self.name(),
                other
            ))),
        }
    }
}
