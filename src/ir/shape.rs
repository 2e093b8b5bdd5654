//! Shape helpers for the IR.

use crate::error::{ForgeError, ForgeResult};

/// Number of elements described by `shape`; a scalar (`[]`) holds one.
pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().copied().product()
}

/// Row-major strides (in elements) for `shape`.
pub fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = Vec::with_capacity(shape.len());
    let mut stride: usize = 1;
    for dim in shape.iter().rev() {
        strides.push(stride);
        stride = stride.saturating_mul(*dim);
    }
    strides.reverse();
    strides
}

/// Broadcast two shapes.
///
/// Shapes are aligned from the trailing dimension; missing leading
/// dimensions count as 1. A pair is compatible when equal or when either
/// side is 1, and the result takes the larger one.
///
/// ```text
/// [3, 4]    and [4]     -> [3, 4]
/// [2, 1]    and [1, 3]  -> [2, 3]
/// [5, 3, 1] and [3, 4]  -> [5, 3, 4]
/// [3]       and [4]     -> ShapeIncompatible
/// ```
pub fn broadcast_shape(lhs: &[usize], rhs: &[usize]) -> ForgeResult<Vec<usize>> {
    let rank = lhs.len().max(rhs.len());
    let mut result = vec![0; rank];

    for i in 0..rank {
        let l = if i < lhs.len() { lhs[lhs.len() - 1 - i] } else { 1 };
        let r = if i < rhs.len() { rhs[rhs.len() - 1 - i] } else { 1 };

        result[rank - 1 - i] = if l == r || r == 1 {
            l
        } else if l == 1 {
            r
        } else {
            return Err(ForgeError::ShapeIncompatible(format!(
                "cannot broadcast {:?} with {:?}",
                lhs, rhs
            )));
        };
    }

    Ok(result)
}
