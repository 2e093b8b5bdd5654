//! Elementwise power with broadcasting.

use crate::error::{ensure_same_dtype, ForgeError, ForgeResult};
use crate::ir::{broadcast_shape, DType, Tensor};
use crate::kernels::broadcast::broadcast_binary;
use crate::kernels::Kernel;

pub struct Pow<'a> {
    base: &'a Tensor,
    exponent: &'a Tensor,
    output: &'a mut Tensor,
}

impl<'a> Pow<'a> {
    pub fn new(base: &'a Tensor, exponent: &'a Tensor, output: &'a mut Tensor) -> Self {
        Self {
            base,
            exponent,
            output,
        }
    }

    fn eval<T, F>(&mut self, f: F) -> ForgeResult<()>
    where
        T: crate::ir::Element,
        F: FnMut(T, T) -> ForgeResult<T>,
    {
        let base = self.base.to_vec::<T>()?;
        let exponent = self.exponent.to_vec::<T>()?;
        let result = broadcast_binary(
            self.output.shape(),
            self.base.shape(),
            &base,
            self.exponent.shape(),
            &exponent,
            f,
        )?;
        self.output.write_data(&result)
    }
}

/// Integer power by repeated multiplication, wrapping on overflow.
fn int_pow(base: i32, exponent: i32) -> ForgeResult<i32> {
    if exponent < 0 {
        return Err(ForgeError::ArithmeticDomain(format!(
            "integer power with negative exponent {}",
            exponent
        )));
    }
    Ok(base.wrapping_pow(exponent as u32))
}

impl Kernel for Pow<'_> {
    fn name(&self) -> &'static str {
        "Pow"
    }

    fn configure(&mut self) -> ForgeResult<()> {
        ensure_same_dtype(self.base.dtype(), self.exponent.dtype())?;
        ensure_same_dtype(self.base.dtype(), self.output.dtype())?;

        let shape = broadcast_shape(self.base.shape(), self.exponent.shape())?;
        self.output.resize(shape);
        Ok(())
    }

    fn execute(&mut self) -> ForgeResult<()> {
        match self.base.dtype() {
            DType::Float32 => self.eval::<f32, _>(|x, y| Ok(x.powf(y))),
            DType::Int32 => self.eval::<i32, _>(int_pow),
            other => Err(unsupported_op!("Pow does not support {:?}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pow(base: &Tensor, exponent: &Tensor, dtype: DType) -> ForgeResult<Tensor> {
        let mut out = Tensor::empty(dtype, None);
        let mut kernel = Pow::new(base, exponent, &mut out);
        kernel.configure()?;
        kernel.execute()?;
        Ok(out)
    }

    fn assert_near(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (v, e) in actual.iter().zip(expected) {
            assert!((v - e).abs() < 1e-4, "{} vs {}", v, e);
        }
    }

    #[test]
    fn test_simple_pow() {
        let x = Tensor::from_data(vec![1, 1, 3, 2], &[0.3f32, 2.3, 0.9, 0.5, 0.8, 1.1]).unwrap();
        let y = Tensor::from_data(vec![1, 1, 3, 2], &[0.2f32, 0.3, -0.4, 0.5, 1.0, 0.9]).unwrap();
        let out = pow(&x, &y, DType::Float32).unwrap();

        assert_eq!(out.shape(), &[1, 1, 3, 2]);
        assert_near(
            &out.to_vec::<f32>().unwrap(),
            &[0.786, 1.2838, 1.043, 0.7071, 0.8, 1.08956],
        );
    }

    #[test]
    fn test_float_broadcast_pow() {
        let x = Tensor::from_data(vec![1, 3], &[0.3f32, 2.3, 0.9]).unwrap();
        let y = Tensor::from_data(vec![3, 1], &[0.2f32, 0.3, 0.4]).unwrap();
        let out = pow(&x, &y, DType::Float32).unwrap();

        assert_eq!(out.shape(), &[3, 3]);
        assert_near(
            &out.to_vec::<f32>().unwrap(),
            &[
                0.786, 1.18126, 0.9791, 0.6968, 1.28386, 0.96888, 0.6178, 1.3953, 0.9587,
            ],
        );
    }

    #[test]
    fn test_int_pow() {
        let x = Tensor::from_data(vec![1, 3], &[2i32, 3, 4]).unwrap();
        let out = pow(&x, &x, DType::Int32).unwrap();
        assert_eq!(out.shape(), &[1, 3]);
        assert_eq!(out.to_vec::<i32>().unwrap(), vec![4, 27, 256]);
    }

    #[test]
    fn test_int_pow_negative_exponent() {
        let x = Tensor::from_data(vec![1], &[2i32]).unwrap();
        let y = Tensor::from_data(vec![1], &[-1i32]).unwrap();
        let err = pow(&x, &y, DType::Int32).unwrap_err();
        assert!(matches!(err, ForgeError::ArithmeticDomain(_)));
    }

    #[test]
    fn test_mixed_types_rejected() {
        let x = Tensor::from_data(vec![1], &[2i32]).unwrap();
        let y = Tensor::from_data(vec![1], &[2.0f32]).unwrap();
        let err = pow(&x, &y, DType::Int32).unwrap_err();
        assert!(matches!(err, ForgeError::TypeMismatch { .. }));
    }
}
