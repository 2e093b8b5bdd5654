//! Exponential linear unit: `x` for `x >= 0`, `exp(x) - 1` otherwise.

use crate::error::{ensure_same_dtype, ForgeResult};
use crate::ir::{DType, Tensor};
use crate::kernels::Kernel;

pub struct Elu<'a> {
    input: &'a Tensor,
    output: &'a mut Tensor,
}

impl<'a> Elu<'a> {
    pub fn new(input: &'a Tensor, output: &'a mut Tensor) -> Self {
        Self { input, output }
    }
}

impl Kernel for Elu<'_> {
    fn name(&self) -> &'static str {
        "Elu"
    }

    fn configure(&mut self) -> ForgeResult<()> {
        ensure_same_dtype(self.input.dtype(), self.output.dtype())?;
        self.output.resize(self.input.shape().to_vec());
        Ok(())
    }

    fn execute(&mut self) -> ForgeResult<()> {
        match self.input.dtype() {
            DType::Float32 => {
                let values: Vec<f32> = self
                    .input
                    .to_vec::<f32>()?
                    .into_iter()
                    .map(|x| if x < 0.0 { x.exp_m1() } else { x })
                    .collect();
                self.output.write_data(&values)
            }
            other => Err(unsupported_op!("Elu does not support {:?}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elu_reference_values() {
        let input = Tensor::from_data(
            vec![1, 2, 4, 1],
            &[0.0f32, -6.0, 2.0, -4.0, 3.0, -2.0, 10.0, -0.1],
        )
        .unwrap();
        let mut out = Tensor::empty(DType::Float32, None);
        let mut kernel = Elu::new(&input, &mut out);
        kernel.configure().unwrap();
        kernel.execute().unwrap();

        assert_eq!(out.shape(), &[1, 2, 4, 1]);
        let expected = [
            0.0f32, -0.997521, 2.0, -0.981684, 3.0, -0.864665, 10.0, -0.0951626,
        ];
        for (v, e) in out.to_vec::<f32>().unwrap().iter().zip(expected) {
            assert!((v - e).abs() < 1e-5, "{} vs {}", v, e);
        }
    }

    #[test]
    fn test_elu_rejects_int() {
        let input = Tensor::from_data(vec![1], &[1i32]).unwrap();
        let mut out = Tensor::empty(DType::Int32, None);
        let mut kernel = Elu::new(&input, &mut out);
        kernel.configure().unwrap();
        assert!(kernel.execute().is_err());
    }

    #[test]
    fn test_elu_output_type_must_match() {
        let input = Tensor::from_data(vec![1], &[1.0f32]).unwrap();
        let mut out = Tensor::empty(DType::Int32, None);
        let mut kernel = Elu::new(&input, &mut out);
        assert!(kernel.configure().is_err());
    }
}
