//! Batched matrix multiplication with optional operand transposition.
//!
//! `x` is `[..., m, k]` (or `[..., k, m]` with `adj_x`), `y` is `[..., k, n]`
//! (or `[..., n, k]` with `adj_y`). Leading batch dimensions broadcast.

use crate::error::{ensure_same_dtype, ForgeError, ForgeResult};
use crate::ir::shape::element_count;
use crate::ir::{broadcast_shape, DType, Tensor};
use crate::kernels::broadcast::broadcast_offsets;
use crate::kernels::Kernel;

/// Matrix dimensions after applying the adjoint flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MatMulDims {
    m: usize,
    k: usize,
    n: usize,
}

/// Split a shape into its batch prefix and trailing `(rows, cols)`.
fn split_matrix<'s>(shape: &'s [usize], what: &str) -> ForgeResult<(&'s [usize], usize, usize)> {
    if shape.len() < 2 {
        return Err(shape_error!(
            "BatchMatMul {} needs rank >= 2, got {:?}",
            what,
            shape
        ));
    }
    let (batch, matrix) = shape.split_at(shape.len() - 2);
    Ok((batch, matrix[0], matrix[1]))
}

pub struct BatchMatMul<'a> {
    x: &'a Tensor,
    y: &'a Tensor,
    output: &'a mut Tensor,
    adj_x: bool,
    adj_y: bool,
}

impl<'a> BatchMatMul<'a> {
    pub fn new(
        x: &'a Tensor,
        y: &'a Tensor,
        output: &'a mut Tensor,
        adj_x: bool,
        adj_y: bool,
    ) -> Self {
        Self {
            x,
            y,
            output,
            adj_x,
            adj_y,
        }
    }

    fn dims(&self) -> ForgeResult<(Vec<usize>, MatMulDims)> {
        let (x_batch, x_rows, x_cols) = split_matrix(self.x.shape(), "x")?;
        let (y_batch, y_rows, y_cols) = split_matrix(self.y.shape(), "y")?;

        let (m, kx) = if self.adj_x { (x_cols, x_rows) } else { (x_rows, x_cols) };
        let (ky, n) = if self.adj_y { (y_cols, y_rows) } else { (y_rows, y_cols) };
        if kx != ky {
            return Err(ForgeError::ShapeIncompatible(format!(
                "BatchMatMul contraction mismatch: {:?} x {:?} (adj_x={}, adj_y={})",
                self.x.shape(),
                self.y.shape(),
                self.adj_x,
                self.adj_y
            )));
        }
        let batch = broadcast_shape(x_batch, y_batch)?;
        Ok((batch, MatMulDims { m, k: kx, n }))
    }
}

impl Kernel for BatchMatMul<'_> {
    fn name(&self) -> &'static str {
        "BatchMatMul"
    }

    fn configure(&mut self) -> ForgeResult<()> {
        ensure_same_dtype(self.x.dtype(), self.y.dtype())?;
        ensure_same_dtype(self.x.dtype(), self.output.dtype())?;
        let (mut shape, dims) = self.dims()?;
        shape.extend([dims.m, dims.n]);
        self.output.resize(shape);
        Ok(())
    }

    fn execute(&mut self) -> ForgeResult<()> {
        if self.x.dtype() != DType::Float32 {
            return Err(unsupported_op!(
                "BatchMatMul does not support {:?}",
                self.x.dtype()
            ));
        }
        let (batch, MatMulDims { m, k, n }) = self.dims()?;
        let x_batch = &self.x.shape()[..self.x.rank() - 2];
        let y_batch = &self.y.shape()[..self.y.rank() - 2];
        let x_offsets = broadcast_offsets(x_batch, &batch);
        let y_offsets = broadcast_offsets(y_batch, &batch);

        let x = self.x.to_vec::<f32>()?;
        let y = self.y.to_vec::<f32>()?;
        let (adj_x, adj_y) = (self.adj_x, self.adj_y);

        let mut out = vec![0.0f32; element_count(&batch) * m * n];
        for b in 0..x_offsets.len() {
            let xs = &x[x_offsets[b] * m * k..][..m * k];
            let ys = &y[y_offsets[b] * k * n..][..k * n];
            let block = &mut out[b * m * n..][..m * n];
            for i in 0..m {
                for j in 0..n {
                    let mut acc = 0.0f32;
                    for p in 0..k {
                        let a = if adj_x { xs[p * m + i] } else { xs[i * k + p] };
                        let c = if adj_y { ys[j * k + p] } else { ys[p * n + j] };
                        acc += a * c;
                    }
                    block[i * n + j] = acc;
                }
            }
        }
        self.output.write_data(&out)
    }
}
