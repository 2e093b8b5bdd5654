//! `Where` in both of its forms.
//!
//! With a single boolean input it lists the coordinates of every true
//! element as an `[n_true, rank]` tensor of 64-bit (or 32-bit) indices. With
//! three inputs `(condition, x, y)` it selects elementwise from `x` where the
//! condition holds and from `y` elsewhere, broadcasting all three.

use crate::error::{ensure_same_dtype, ForgeError, ForgeResult};
use crate::ir::shape::contiguous_strides;
use crate::ir::{broadcast_shape, DType, Tensor};
use crate::kernels::broadcast::broadcast_offsets;
use crate::kernels::Kernel;

/// Input counts `Where` accepts: coordinates form or select form.
pub const WHERE_INPUT_ARITIES: [usize; 2] = [1, 3];

pub struct Where<'a> {
    inputs: Vec<&'a Tensor>,
    output: &'a mut Tensor,
}

impl<'a> Where<'a> {
    pub fn new(inputs: Vec<&'a Tensor>, output: &'a mut Tensor) -> Self {
        Self { inputs, output }
    }

    fn condition(&self) -> ForgeResult<&'a Tensor> {
        let cond = self
            .inputs
            .first()
            .copied()
            .ok_or_else(|| ForgeError::Internal("Where without inputs".to_string()))?;
        if cond.dtype() != DType::Bool {
            return Err(ForgeError::TypeMismatch {
                expected: DType::Bool,
                got: cond.dtype(),
            });
        }
        Ok(cond)
    }

    fn eval_coordinates(&mut self) -> ForgeResult<()> {
        let cond = self.condition()?;
        let strides = contiguous_strides(cond.shape());

        let mut coords: Vec<i64> = Vec::new();
        for (flat, value) in cond.to_bools()?.into_iter().enumerate() {
            if !value {
                continue;
            }
            let mut rem = flat;
            for &stride in &strides {
                coords.push((rem / stride) as i64);
                rem %= stride;
            }
        }
        debug_assert_eq!(coords.len(), self.output.element_count());

        match self.output.dtype() {
            DType::Int64 => self.output.write_data(&coords),
            DType::Int32 => {
                let narrowed: Vec<i32> = coords.into_iter().map(|c| c as i32).collect();
                self.output.write_data(&narrowed)
            }
            other => Err(ForgeError::UnsupportedOperation(format!(
                "Where coordinates cannot be written as {:?}",
                other
            ))),
        }
    }

    fn eval_select(&mut self) -> ForgeResult<()> {
        let cond = self.condition()?;
        let (x, y) = (self.inputs[1], self.inputs[2]);
        let size = x.dtype().size();
        let out_shape = self.output.shape().to_vec();

        let flags = cond.to_bools()?;
        let cond_offsets = broadcast_offsets(cond.shape(), &out_shape);
        let x_offsets = broadcast_offsets(x.shape(), &out_shape);
        let y_offsets = broadcast_offsets(y.shape(), &out_shape);

        let (x_bytes, y_bytes) = (x.data_bytes(), y.data_bytes());
        let out = self.output.data_bytes_mut();
        for (i, dst) in out.chunks_exact_mut(size).enumerate() {
            let src = if flags[cond_offsets[i]] {
                &x_bytes[x_offsets[i] * size..][..size]
            } else {
                &y_bytes[y_offsets[i] * size..][..size]
            };
            dst.copy_from_slice(src);
        }
        Ok(())
    }
}

impl Kernel for Where<'_> {
    fn name(&self) -> &'static str {
        "Where"
    }

    fn configure(&mut self) -> ForgeResult<()> {
        let cond = self.condition()?;
        match self.inputs.len() {
            1 => {
                if !matches!(self.output.dtype(), DType::Int64 | DType::Int32) {
                    return Err(ForgeError::TypeMismatch {
                        expected: DType::Int64,
                        got: self.output.dtype(),
                    });
                }
                // Data-dependent shape: count the true elements now
                let n_true = cond.to_bools()?.into_iter().filter(|&b| b).count();
                self.output.resize(vec![n_true, cond.rank()]);
                Ok(())
            }
            3 => {
                let (x, y) = (self.inputs[1], self.inputs[2]);
                ensure_same_dtype(x.dtype(), y.dtype())?;
                ensure_same_dtype(x.dtype(), self.output.dtype())?;
                let shape = broadcast_shape(cond.shape(), x.shape())?;
                let shape = broadcast_shape(&shape, y.shape())?;
                self.output.resize(shape);
                Ok(())
            }
            n => Err(ForgeError::Internal(format!(
                "Where expects {:?} inputs, got {}",
                WHERE_INPUT_ARITIES, n
            ))),
        }
    }

    fn execute(&mut self) -> ForgeResult<()> {
        if self.inputs.len() == 1 {
            self.eval_coordinates()
        } else {
            self.eval_select()
        }
    }
}
