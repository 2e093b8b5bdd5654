//! Reverse variable-length prefixes along one axis.
//!
//! For every index `b` along `batch_dim`, the first `seq_lengths[b]`
//! elements along `seq_dim` are reversed; the remainder is copied through.
//! Elements are moved as raw bytes so every element kind is supported.

use crate::error::{ensure_same_dtype, ForgeError, ForgeResult};
use crate::ir::shape::contiguous_strides;
use crate::ir::{DType, Tensor};
use crate::kernels::Kernel;

pub struct ReverseSequence<'a> {
    input: &'a Tensor,
    seq_lengths: &'a Tensor,
    output: &'a mut Tensor,
    seq_dim: i32,
    batch_dim: i32,
}

impl<'a> ReverseSequence<'a> {
    pub fn new(
        input: &'a Tensor,
        seq_lengths: &'a Tensor,
        output: &'a mut Tensor,
        seq_dim: i32,
        batch_dim: i32,
    ) -> Self {
        Self {
            input,
            seq_lengths,
            output,
            seq_dim,
            batch_dim,
        }
    }

    /// Both axes normalized against the input rank.
    fn axes(&self) -> ForgeResult<(usize, usize)> {
        let rank = self.input.rank() as i32;
        let normalize = |dim: i32, what: &str| -> ForgeResult<usize> {
            let d = if dim < 0 { dim + rank } else { dim };
            if d < 0 || d >= rank {
                return Err(ForgeError::ShapeIncompatible(format!(
                    "{} {} out of range for rank {}",
                    what, dim, rank
                )));
            }
            Ok(d as usize)
        };
        let seq = normalize(self.seq_dim, "seq_dim")?;
        let batch = normalize(self.batch_dim, "batch_dim")?;
        if seq == batch {
            return Err(ForgeError::ShapeIncompatible(format!(
                "seq_dim and batch_dim both resolve to axis {}",
                seq
            )));
        }
        Ok((seq, batch))
    }

    fn lengths(&self) -> ForgeResult<Vec<i64>> {
        match self.seq_lengths.dtype() {
            DType::Int32 => Ok(self
                .seq_lengths
                .to_vec::<i32>()?
                .into_iter()
                .map(i64::from)
                .collect()),
            DType::Int64 => self.seq_lengths.to_vec::<i64>(),
            other => Err(ForgeError::TypeMismatch {
                expected: DType::Int32,
                got: other,
            }),
        }
    }
}

impl Kernel for ReverseSequence<'_> {
    fn name(&self) -> &'static str {
        "ReverseSequence"
    }

    fn configure(&mut self) -> ForgeResult<()> {
        ensure_same_dtype(self.input.dtype(), self.output.dtype())?;
        let (_, batch) = self.axes()?;
        if !matches!(self.seq_lengths.dtype(), DType::Int32 | DType::Int64) {
            return Err(ForgeError::TypeMismatch {
                expected: DType::Int32,
                got: self.seq_lengths.dtype(),
            });
        }
        let batch_size = self.input.shape()[batch];
        if self.seq_lengths.shape() != [batch_size] {
            return Err(ForgeError::ShapeIncompatible(format!(
                "seq_lengths shape {:?} does not match batch size {}",
                self.seq_lengths.shape(),
                batch_size
            )));
        }
        self.output.resize(self.input.shape().to_vec());
        Ok(())
    }

    fn execute(&mut self) -> ForgeResult<()> {
        let (seq, batch) = self.axes()?;
        let shape = self.input.shape().to_vec();
        let seq_extent = shape[seq];

        let lengths = self.lengths()?;
        for &len in &lengths {
            if len < 0 || len as usize > seq_extent {
                return Err(ForgeError::ShapeIncompatible(format!(
                    "sequence length {} outside [0, {}]",
                    len, seq_extent
                )));
            }
        }

        let strides = contiguous_strides(&shape);
        let size = self.input.dtype().size();
        let src = self.input.data_bytes();
        let dst = self.output.data_bytes_mut();

        let mut index = vec![0usize; shape.len()];
        for out_flat in 0..self.input.element_count() {
            let len = lengths[index[batch]] as usize;
            let mut in_flat = out_flat;
            if index[seq] < len {
                let mirrored = len - 1 - index[seq];
                in_flat = out_flat - index[seq] * strides[seq] + mirrored * strides[seq];
            }
            dst[out_flat * size..][..size].copy_from_slice(&src[in_flat * size..][..size]);

            for d in (0..shape.len()).rev() {
                index[d] += 1;
                if index[d] < shape[d] {
                    break;
                }
                index[d] = 0;
            }
        }
        Ok(())
    }
}
