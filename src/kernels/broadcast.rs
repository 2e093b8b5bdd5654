//! Broadcast indexing for elementwise kernels.

use crate::error::ForgeResult;
use crate::ir::shape::{contiguous_strides, element_count};

/// Per-dimension strides of `in_shape` viewed through `out_shape`;
/// broadcast dimensions get stride 0.
fn broadcast_strides(in_shape: &[usize], out_shape: &[usize]) -> Vec<usize> {
    let rank = out_shape.len();
    let offset = rank - in_shape.len();
    let contiguous = contiguous_strides(in_shape);
    (0..rank)
        .map(|d| {
            if d < offset {
                0
            } else {
                let i = d - offset;
                if in_shape[i] == 1 {
                    0
                } else {
                    contiguous[i]
                }
            }
        })
        .collect()
}

/// Flat offset into an `in_shape` buffer for every element of `out_shape`,
/// in row-major output order. `out_shape` must be a broadcast of `in_shape`.
pub fn broadcast_offsets(in_shape: &[usize], out_shape: &[usize]) -> Vec<usize> {
    let strides = broadcast_strides(in_shape, out_shape);
    let total = element_count(out_shape);
    let mut offsets = Vec::with_capacity(total);
    let mut index = vec![0usize; out_shape.len()];
    let mut offset = 0usize;

    for _ in 0..total {
        offsets.push(offset);
        for d in (0..out_shape.len()).rev() {
            index[d] += 1;
            offset += strides[d];
            if index[d] < out_shape[d] {
                break;
            }
            offset -= strides[d] * index[d];
            index[d] = 0;
        }
    }

    offsets
}

/// Apply `f` pairwise over two broadcast operands.
pub fn broadcast_binary<A, B, O, F>(
    out_shape: &[usize],
    lhs_shape: &[usize],
    lhs: &[A],
    rhs_shape: &[usize],
    rhs: &[B],
    mut f: F,
) -> ForgeResult<Vec<O>>
where
    A: Copy,
    B: Copy,
    F: FnMut(A, B) -> ForgeResult<O>,
{
    // Fast path: no broadcasting needed
    if lhs_shape == out_shape && rhs_shape == out_shape {
        return lhs.iter().zip(rhs).map(|(&a, &b)| f(a, b)).collect();
    }

    let lhs_offsets = broadcast_offsets(lhs_shape, out_shape);
    let rhs_offsets = broadcast_offsets(rhs_shape, out_shape);
    lhs_offsets
        .iter()
        .zip(&rhs_offsets)
        .map(|(&i, &j)| f(lhs[i], rhs[j]))
        .collect()
}
