//! Shared kernel helpers: activation ranges and fixed-point requantization.
//!
//! The integer routines follow the gemmlowp conventions used by reference
//! quantized kernels: a real multiplier is stored as a Q31 mantissa plus a
//! power-of-two exponent, and products are rounded with
//! `saturating_rounding_doubling_high_mul` + `rounding_divide_by_pot`.

use crate::error::{ForgeError, ForgeResult};
use crate::ir::{FusedActivation, QuantParams, Tensor};

/// Clamp bounds for a fused activation on the float path.
pub fn activation_range_f32(activation: FusedActivation) -> ForgeResult<(f32, f32)> {
    match activation {
        FusedActivation::None => Ok((f32::NEG_INFINITY, f32::INFINITY)),
        FusedActivation::Relu => Ok((0.0, f32::INFINITY)),
        FusedActivation::ReluN1To1 => Ok((-1.0, 1.0)),
        FusedActivation::Relu6 => Ok((0.0, 6.0)),
        other => Err(ForgeError::UnsupportedOperation(format!(
            "fused activation {:?} cannot be applied as a clamp",
            other
        ))),
    }
}

/// Every quantizable operand must carry its scale and zero-point.
pub fn ensure_quantized(kernel: &str, tensors: &[&Tensor]) -> ForgeResult<()> {
    for tensor in tensors {
        if tensor.dtype().is_quantizable() && tensor.quant().is_none() {
            return Err(ForgeError::UnsupportedOperation(format!(
                "{} on {:?} requires quantization parameters on every operand",
                kernel,
                tensor.dtype()
            )));
        }
    }
    Ok(())
}

/// Clamp bounds for a fused activation in the output's quantized domain.
pub fn activation_range_quantized(
    activation: FusedActivation,
    output: &Tensor,
) -> ForgeResult<(i32, i32)> {
    let (qmin, qmax) = output.dtype().quantized_range().ok_or_else(|| {
        ForgeError::UnsupportedOperation(format!(
            "{:?} output has no quantized range",
            output.dtype()
        ))
    })?;
    let QuantParams { scale, zero_point } = output.quant_params()?;
    let quantize = |x: f64| zero_point.saturating_add((x / scale).round() as i32);

    match activation {
        FusedActivation::None => Ok((qmin, qmax)),
        FusedActivation::Relu => Ok((qmin.max(quantize(0.0)), qmax)),
        FusedActivation::Relu6 => Ok((qmin.max(quantize(0.0)), qmax.min(quantize(6.0)))),
        FusedActivation::ReluN1To1 => Ok((qmin.max(quantize(-1.0)), qmax.min(quantize(1.0)))),
        other => Err(ForgeError::UnsupportedOperation(format!(
            "fused activation {:?} cannot be applied as a clamp",
            other
        ))),
    }
}

/// Real multiplier encoded as `multiplier * 2^(shift - 31)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizedMultiplier {
    pub multiplier: i32,
    pub shift: i32,
}

impl QuantizedMultiplier {
    pub fn from_real(real: f64) -> ForgeResult<Self> {
        if !real.is_finite() || real < 0.0 {
            return Err(ForgeError::UnsupportedOperation(format!(
                "cannot encode multiplier {} in fixed point",
                real
            )));
        }
        if real == 0.0 {
            return Ok(Self {
                multiplier: 0,
                shift: 0,
            });
        }

        let (mantissa, mut shift) = frexp(real);
        let mut q = (mantissa * (1i64 << 31) as f64).round() as i64;
        if q == 1i64 << 31 {
            q /= 2;
            shift += 1;
        }
        if shift < -31 {
            // Too small to represent; flushes to zero like the reference
            return Ok(Self {
                multiplier: 0,
                shift: 0,
            });
        }
        if shift > 30 {
            return Err(ForgeError::UnsupportedOperation(format!(
                "multiplier {} exceeds the fixed-point range",
                real
            )));
        }
        Ok(Self {
            multiplier: q as i32,
            shift,
        })
    }

    /// `round(x * real)` using only integer arithmetic.
    pub fn apply(&self, x: i32) -> i32 {
        let left_shift = self.shift.max(0);
        let right_shift = (-self.shift).max(0);
        let shifted = x.saturating_mul(1i32 << left_shift);
        rounding_divide_by_pot(
            saturating_rounding_doubling_high_mul(shifted, self.multiplier),
            right_shift,
        )
    }

    /// `round(x * real / 2^extra_shift)` on a wide accumulator, rounding half
    /// away from zero.
    pub fn apply_wide(&self, x: i64, extra_shift: i32) -> i64 {
        let product = x as i128 * self.multiplier as i128;
        let total_shift = 31 + extra_shift - self.shift;
        if total_shift <= 0 {
            (product << (-total_shift) as u32) as i64
        } else {
            rounding_shift_right(product, total_shift as u32) as i64
        }
    }
}

/// Split `x` into a mantissa in `[0.5, 1)` and a power-of-two exponent.
fn frexp(x: f64) -> (f64, i32) {
    if x == 0.0 || !x.is_finite() {
        return (x, 0);
    }
    let mut exp = x.abs().log2().floor() as i32 + 1;
    let mut mantissa = x / 2f64.powi(exp);
    // log2 can land one off next to exact powers of two
    if mantissa.abs() >= 1.0 {
        mantissa /= 2.0;
        exp += 1;
    } else if mantissa.abs() < 0.5 {
        mantissa *= 2.0;
        exp -= 1;
    }
    (mantissa, exp)
}

pub fn saturating_rounding_doubling_high_mul(a: i32, b: i32) -> i32 {
    if a == b && a == i32::MIN {
        return i32::MAX;
    }
    let ab = a as i64 * b as i64;
    let nudge: i64 = if ab >= 0 { 1 << 30 } else { 1 - (1 << 30) };
    ((ab + nudge) / (1i64 << 31)) as i32
}

/// Arithmetic right shift rounding to nearest, ties away from zero.
pub fn rounding_divide_by_pot(x: i32, exponent: i32) -> i32 {
    if exponent <= 0 {
        return x;
    }
    let mask: i64 = (1i64 << exponent) - 1;
    let remainder = x as i64 & mask;
    let threshold = (mask >> 1) + if x < 0 { 1 } else { 0 };
    ((x as i64 >> exponent) + if remainder > threshold { 1 } else { 0 }) as i32
}

fn rounding_shift_right(x: i128, shift: u32) -> i128 {
    let half = 1i128 << (shift - 1);
    if x >= 0 {
        (x + half) >> shift
    } else {
        -((-x + half) >> shift)
    }
}

/// Integer division rounded to nearest, ties away from zero. `den != 0`.
pub fn rounding_div(num: i64, den: i64) -> i64 {
    let q = num / den;
    let r = num % den;
    if 2 * r.abs() >= den.abs() {
        if (num < 0) != (den < 0) {
            q - 1
        } else {
            q + 1
        }
    } else {
        q
    }
}
