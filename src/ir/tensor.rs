//! Tensors for IR constants and interpreter buffers.

use serde::{Deserialize, Serialize};

use crate::error::{ForgeError, ForgeResult};
use crate::ir::dtype::{DType, Element};
use crate::ir::shape::element_count;

/// Per-tensor affine quantization: `real = scale * (q - zero_point)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantParams {
    pub scale: f64,
    pub zero_point: i32,
}

impl QuantParams {
    pub fn new(scale: f64, zero_point: i32) -> Self {
        Self { scale, zero_point }
    }

    pub fn dequantize(&self, q: i32) -> f64 {
        self.scale * (q - self.zero_point) as f64
    }

    /// Nearest representable value of `dtype`, ties away from zero.
    pub fn quantize(&self, real: f64, dtype: DType) -> i32 {
        let (qmin, qmax) = dtype.quantized_range().unwrap_or((i32::MIN, i32::MAX));
        let q = (real / self.scale).round() as i64 + self.zero_point as i64;
        q.clamp(qmin as i64, qmax as i64) as i32
    }
}

/// Typed, shaped, optionally quantized byte buffer.
///
/// Invariant: `data.len() == element_count(shape) * dtype.size()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    dtype: DType,
    shape: Vec<usize>,
    quant: Option<QuantParams>,
    data: Vec<u8>,
}

impl Tensor {
    /// Output placeholder: zero elements until a kernel resizes it.
    pub fn empty(dtype: DType, quant: Option<QuantParams>) -> Self {
        Self {
            dtype,
            shape: vec![0],
            quant,
            data: Vec::new(),
        }
    }

    /// Zero-filled tensor.
    pub fn zeros(dtype: DType, shape: Vec<usize>, quant: Option<QuantParams>) -> ForgeResult<Self> {
        check_quant(dtype, quant.as_ref())?;
        let data = vec![0; element_count(&shape) * dtype.size()];
        Ok(Self {
            dtype,
            shape,
            quant,
            data,
        })
    }

    pub fn from_bytes(
        dtype: DType,
        shape: Vec<usize>,
        quant: Option<QuantParams>,
        data: Vec<u8>,
    ) -> ForgeResult<Self> {
        check_quant(dtype, quant.as_ref())?;
        let expected = element_count(&shape) * dtype.size();
        if data.len() != expected {
            return Err(ForgeError::ShapeIncompatible(format!(
                "buffer of {} bytes does not match shape {:?} of {:?} ({} bytes)",
                data.len(),
                shape,
                dtype,
                expected
            )));
        }
        Ok(Self {
            dtype,
            shape,
            quant,
            data,
        })
    }

    pub fn from_data<T: Element>(shape: Vec<usize>, values: &[T]) -> ForgeResult<Self> {
        Self::from_bytes(
            T::DTYPE,
            shape,
            None,
            bytemuck::cast_slice(values).to_vec(),
        )
    }

    pub fn from_bools(shape: Vec<usize>, values: &[bool]) -> ForgeResult<Self> {
        let data = values.iter().map(|&b| b as u8).collect();
        Self::from_bytes(DType::Bool, shape, None, data)
    }

    /// Attach quantization parameters.
    pub fn with_quant(mut self, quant: QuantParams) -> ForgeResult<Self> {
        check_quant(self.dtype, Some(&quant))?;
        self.quant = Some(quant);
        Ok(self)
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn quant(&self) -> Option<&QuantParams> {
        self.quant.as_ref()
    }

    /// Parameters of a quantized tensor. A tensor without them is an error,
    /// never read as scale 1 / zero-point 0.
    pub fn quant_params(&self) -> ForgeResult<QuantParams> {
        self.quant.ok_or_else(|| {
            ForgeError::UnsupportedOperation(format!(
                "{:?} tensor has no quantization parameters",
                self.dtype
            ))
        })
    }

    pub fn element_count(&self) -> usize {
        element_count(&self.shape)
    }

    pub fn byte_size(&self) -> usize {
        self.data.len()
    }

    pub fn data_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn data_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Reallocate for `shape`, zero-filled. Only the owning kernel calls this,
    /// from its configure phase.
    pub fn resize(&mut self, shape: Vec<usize>) {
        self.data = vec![0; element_count(&shape) * self.dtype.size()];
        self.shape = shape;
    }

    /// Copy the elements out as `T`.
    pub fn to_vec<T: Element>(&self) -> ForgeResult<Vec<T>> {
        self.expect_dtype(T::DTYPE)?;
        let mut out = vec![T::zeroed(); self.element_count()];
        bytemuck::cast_slice_mut::<T, u8>(&mut out).copy_from_slice(&self.data);
        Ok(out)
    }

    pub fn to_bools(&self) -> ForgeResult<Vec<bool>> {
        self.expect_dtype(DType::Bool)?;
        Ok(self.data.iter().map(|&b| b != 0).collect())
    }

    /// Overwrite every element; `values` must match the current shape.
    pub fn write_data<T: Element>(&mut self, values: &[T]) -> ForgeResult<()> {
        self.expect_dtype(T::DTYPE)?;
        if values.len() != self.element_count() {
            return Err(ForgeError::ShapeIncompatible(format!(
                "writing {} elements into tensor of shape {:?}",
                values.len(),
                self.shape
            )));
        }
        self.data.copy_from_slice(bytemuck::cast_slice(values));
        Ok(())
    }

    pub fn write_bools(&mut self, values: &[bool]) -> ForgeResult<()> {
        self.expect_dtype(DType::Bool)?;
        if values.len() != self.element_count() {
            return Err(ForgeError::ShapeIncompatible(format!(
                "writing {} elements into tensor of shape {:?}",
                values.len(),
                self.shape
            )));
        }
        for (dst, &src) in self.data.iter_mut().zip(values) {
            *dst = src as u8;
        }
        Ok(())
    }

    /// Real values of a float or quantized tensor.
    pub fn dequantize(&self) -> ForgeResult<Vec<f32>> {
        match self.dtype {
            DType::Float32 => self.to_vec::<f32>(),
            DType::UInt8 => self.map_quantized(self.to_vec::<u8>()?.into_iter().map(i32::from)),
            DType::Int8 => self.map_quantized(self.to_vec::<i8>()?.into_iter().map(i32::from)),
            DType::Int16 => self.map_quantized(self.to_vec::<i16>()?.into_iter().map(i32::from)),
            other => Err(ForgeError::UnsupportedOperation(format!(
                "cannot dequantize {:?} tensor",
                other
            ))),
        }
    }

    fn map_quantized(&self, values: impl Iterator<Item = i32>) -> ForgeResult<Vec<f32>> {
        let QuantParams { scale, zero_point } = self.quant_params()?;
        Ok(values
            .map(|q| (scale * (q - zero_point) as f64) as f32)
            .collect())
    }

    fn expect_dtype(&self, dtype: DType) -> ForgeResult<()> {
        if self.dtype != dtype {
            return Err(ForgeError::TypeMismatch {
                expected: self.dtype,
                got: dtype,
            });
        }
        Ok(())
    }
}

fn check_quant(dtype: DType, quant: Option<&QuantParams>) -> ForgeResult<()> {
    let Some(q) = quant else {
        return Ok(());
    };
    if !dtype.is_quantizable() {
        return Err(ForgeError::UnsupportedOperation(format!(
            "quantization parameters on {:?} tensor",
            dtype
        )));
    }
    if !(q.scale.is_finite() && q.scale > 0.0) {
        return Err(ForgeError::UnsupportedOperation(format!(
            "quantization scale must be positive and finite, got {}",
            q.scale
        )));
    }
    Ok(())
}
