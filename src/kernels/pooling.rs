//! 2D max pooling over NHWC tensors.
//!
//! Window placement follows the usual SAME/VALID rules: VALID keeps every
//! window inside the input, SAME pads so the output covers
//! `ceil(in / stride)` positions and splits the padding evenly with the
//! extra cell going after. Padded cells never win the max.

use crate::error::{ForgeError, ForgeResult};
use crate::ir::{DType, MaxPoolWithArgMaxAttrs, Padding, Pool2DAttrs, Tensor};
use crate::kernels::utils::{activation_range_f32, activation_range_quantized, ensure_quantized};
use crate::kernels::Kernel;

/// Resolved window geometry for one spatial axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AxisGeometry {
    input: usize,
    output: usize,
    filter: usize,
    stride: usize,
    pad_before: usize,
}

impl AxisGeometry {
    fn new(input: usize, filter: i32, stride: i32, padding: Padding) -> ForgeResult<Self> {
        if filter <= 0 || stride <= 0 {
            return Err(ForgeError::ShapeIncompatible(format!(
                "pooling filter {} and stride {} must be positive",
                filter, stride
            )));
        }
        let (filter, stride) = (filter as usize, stride as usize);
        let output = match padding {
            Padding::Same => input.div_ceil(stride),
            Padding::Valid if input >= filter => (input - filter) / stride + 1,
            Padding::Valid => 0,
        };
        let needed = output.saturating_sub(1) * stride + filter;
        let pad_before = needed.saturating_sub(input) / 2;
        Ok(Self {
            input,
            output,
            filter,
            stride,
            pad_before,
        })
    }

    /// Input positions covered by output position `o`, clipped to the input.
    fn window(&self, o: usize) -> std::ops::Range<usize> {
        let start = (o * self.stride) as isize - self.pad_before as isize;
        let end = start + self.filter as isize;
        let lo = start.max(0) as usize;
        let hi = (end.max(0) as usize).min(self.input);
        lo..hi.max(lo)
    }
}

struct PoolGeometry {
    batches: usize,
    channels: usize,
    height: AxisGeometry,
    width: AxisGeometry,
}

impl PoolGeometry {
    fn new(input: &Tensor, attrs: &Pool2DAttrs) -> ForgeResult<Self> {
        let &[batches, in_h, in_w, channels] = input.shape() else {
            return Err(ForgeError::ShapeIncompatible(format!(
                "pooling expects an NHWC input, got shape {:?}",
                input.shape()
            )));
        };
        Ok(Self {
            batches,
            channels,
            height: AxisGeometry::new(in_h, attrs.filter.h, attrs.stride.h, attrs.padding)?,
            width: AxisGeometry::new(in_w, attrs.filter.w, attrs.stride.w, attrs.padding)?,
        })
    }

    fn output_shape(&self) -> Vec<usize> {
        vec![
            self.batches,
            self.height.output,
            self.width.output,
            self.channels,
        ]
    }

    fn input_offset(&self, b: usize, y: usize, x: usize, c: usize) -> usize {
        ((b * self.height.input + y) * self.width.input + x) * self.channels + c
    }

    /// Visit every output cell in NHWC order with the flat input offset and
    /// the in-batch `(y * width + x) * channels + c` index of its maximum.
    fn for_each_max<T, F>(&self, values: &[T], mut visit: F)
    where
        T: Copy + PartialOrd,
        F: FnMut(T, usize),
    {
        for b in 0..self.batches {
            for oy in 0..self.height.output {
                for ox in 0..self.width.output {
                    for c in 0..self.channels {
                        let mut best: Option<(T, usize)> = None;
                        for y in self.height.window(oy) {
                            for x in self.width.window(ox) {
                                let v = values[self.input_offset(b, y, x, c)];
                                // Strictly greater keeps the first maximum on ties
                                if best.map_or(true, |(m, _)| v > m) {
                                    best = Some((v, (y * self.width.input + x) * self.channels + c));
                                }
                            }
                        }
                        if let Some((v, index)) = best {
                            visit(v, index);
                        }
                    }
                }
            }
        }
    }
}

pub struct MaxPool2D<'a> {
    input: &'a Tensor,
    output: &'a mut Tensor,
    attrs: Pool2DAttrs,
}

impl<'a> MaxPool2D<'a> {
    pub fn new(input: &'a Tensor, output: &'a mut Tensor, attrs: Pool2DAttrs) -> Self {
        Self {
            input,
            output,
            attrs,
        }
    }
}

impl Kernel for MaxPool2D<'_> {
    fn name(&self) -> &'static str {
        "MaxPool2D"
    }

    fn configure(&mut self) -> ForgeResult<()> {
        crate::error::ensure_same_dtype(self.input.dtype(), self.output.dtype())?;
        ensure_quantized(self.name(), &[self.input, &*self.output])?;
        if self.input.dtype() == DType::UInt8 && self.input.quant() != self.output.quant() {
            return Err(ForgeError::UnsupportedOperation(
                "quantized MaxPool2D requires identical input and output quantization"
                    .to_string(),
            ));
        }
        let geometry = PoolGeometry::new(self.input, &self.attrs)?;
        self.output.resize(geometry.output_shape());
        Ok(())
    }

    fn execute(&mut self) -> ForgeResult<()> {
        let geometry = PoolGeometry::new(self.input, &self.attrs)?;
        match self.input.dtype() {
            DType::Float32 => {
                let (lo, hi) = activation_range_f32(self.attrs.activation)?;
                let values = self.input.to_vec::<f32>()?;
                let mut out = Vec::with_capacity(self.output.element_count());
                geometry.for_each_max(&values, |v, _| out.push(v.clamp(lo, hi)));
                self.output.write_data(&out)
            }
            DType::UInt8 => {
                let (lo, hi) = activation_range_quantized(self.attrs.activation, self.output)?;
                let values = self.input.to_vec::<u8>()?;
                let mut out = Vec::with_capacity(self.output.element_count());
                geometry.for_each_max(&values, |v, _| out.push((v as i32).clamp(lo, hi) as u8));
                self.output.write_data(&out)
            }
            other => Err(ForgeError::UnsupportedOperation(format!(
                "MaxPool2D does not support {:?}",
                other
            ))),
        }
    }
}

/// Max pooling producing both the maxima and their flattened positions.
pub struct MaxPoolWithArgMax<'a> {
    input: &'a Tensor,
    values: &'a mut Tensor,
    indices: &'a mut Tensor,
    attrs: MaxPoolWithArgMaxAttrs,
}

impl<'a> MaxPoolWithArgMax<'a> {
    pub fn new(
        input: &'a Tensor,
        values: &'a mut Tensor,
        indices: &'a mut Tensor,
        attrs: MaxPoolWithArgMaxAttrs,
    ) -> Self {
        Self {
            input,
            values,
            indices,
            attrs,
        }
    }
}

impl Kernel for MaxPoolWithArgMax<'_> {
    fn name(&self) -> &'static str {
        "MaxPoolWithArgMax"
    }

    fn configure(&mut self) -> ForgeResult<()> {
        crate::error::ensure_same_dtype(self.input.dtype(), self.values.dtype())?;
        crate::error::ensure_same_dtype(self.attrs.output_type(), self.indices.dtype())?;
        if !matches!(self.indices.dtype(), DType::Int32 | DType::Int64) {
            return Err(ForgeError::UnsupportedOperation(format!(
                "argmax indices cannot be {:?}",
                self.indices.dtype()
            )));
        }
        let geometry = PoolGeometry::new(self.input, &self.attrs.pool)?;
        self.values.resize(geometry.output_shape());
        self.indices.resize(geometry.output_shape());
        Ok(())
    }

    fn execute(&mut self) -> ForgeResult<()> {
        if self.input.dtype() != DType::Float32 {
            return Err(ForgeError::UnsupportedOperation(format!(
                "MaxPoolWithArgMax does not support {:?}",
                self.input.dtype()
            )));
        }
        let geometry = PoolGeometry::new(self.input, &self.attrs.pool)?;
        let (lo, hi) = activation_range_f32(self.attrs.fused_activation())?;
        let input = self.input.to_vec::<f32>()?;

        let capacity = self.values.element_count();
        let mut maxima = Vec::with_capacity(capacity);
        let mut positions: Vec<i64> = Vec::with_capacity(capacity);
        geometry.for_each_max(&input, |v, index| {
            maxima.push(v.clamp(lo, hi));
            positions.push(index as i64);
        });

        self.values.write_data(&maxima)?;
        match self.indices.dtype() {
            DType::Int64 => self.indices.write_data(&positions),
            _ => {
                let narrowed: Vec<i32> = positions.into_iter().map(|p| p as i32).collect();
                self.indices.write_data(&narrowed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Filter, FusedActivation, QuantParams, Stride};

    fn attrs(padding: Padding, filter: (i32, i32), stride: (i32, i32)) -> Pool2DAttrs {
        Pool2DAttrs {
            padding,
            stride: Stride {
                w: stride.0,
                h: stride.1,
            },
            filter: Filter {
                w: filter.0,
                h: filter.1,
            },
            activation: FusedActivation::None,
        }
    }

    #[test]
    fn test_axis_geometry() {
        let valid = AxisGeometry::new(5, 2, 2, Padding::Valid).unwrap();
        assert_eq!(valid.output, 2);
        assert_eq!(valid.pad_before, 0);

        let same = AxisGeometry::new(5, 2, 2, Padding::Same).unwrap();
        assert_eq!(same.output, 3);
        assert_eq!(same.pad_before, 0);
        assert_eq!(same.window(2), 4..5);

        let same = AxisGeometry::new(4, 3, 1, Padding::Same).unwrap();
        assert_eq!(same.output, 4);
        assert_eq!(same.pad_before, 1);
        assert_eq!(same.window(0), 0..2);

        assert!(AxisGeometry::new(4, 0, 1, Padding::Same).is_err());
    }

    #[test]
    fn test_max_pool_float_valid() {
        #[rustfmt::skip]
        let input = Tensor::from_data(vec![1, 2, 4, 1], &[
            0.0f32, 6.0, 2.0, 4.0,
            3.0, 2.0, 10.0, 7.0,
        ]).unwrap();
        let mut out = Tensor::empty(DType::Float32, None);
        let mut kernel = MaxPool2D::new(&input, &mut out, attrs(Padding::Valid, (2, 2), (2, 2)));
        kernel.configure().unwrap();
        kernel.execute().unwrap();

        assert_eq!(out.shape(), &[1, 1, 2, 1]);
        assert_eq!(out.to_vec::<f32>().unwrap(), vec![6.0, 10.0]);
    }

    #[test]
    fn test_max_pool_relu6_clamps() {
        let input = Tensor::from_data(vec![1, 1, 2, 1], &[-3.0f32, 9.0]).unwrap();
        let mut pool = attrs(Padding::Valid, (1, 1), (1, 1));
        pool.activation = FusedActivation::Relu6;
        let mut out = Tensor::empty(DType::Float32, None);
        let mut kernel = MaxPool2D::new(&input, &mut out, pool);
        kernel.configure().unwrap();
        kernel.execute().unwrap();
        assert_eq!(out.to_vec::<f32>().unwrap(), vec![0.0, 6.0]);
    }

    #[test]
    fn test_max_pool_quantized() {
        let q = QuantParams::new(0.5, 10);
        let input = Tensor::from_data(vec![1, 2, 2, 1], &[1u8, 40, 7, 12])
            .unwrap()
            .with_quant(q)
            .unwrap();
        let mut out = Tensor::empty(DType::UInt8, Some(q));
        let mut kernel = MaxPool2D::new(&input, &mut out, attrs(Padding::Same, (2, 2), (2, 2)));
        kernel.configure().unwrap();
        kernel.execute().unwrap();
        assert_eq!(out.shape(), &[1, 1, 1, 1]);
        assert_eq!(out.to_vec::<u8>().unwrap(), vec![40]);
    }

    #[test]
    fn test_max_pool_quantized_requires_params() {
        let input = Tensor::from_data(vec![1, 2, 2, 1], &[1u8, 40, 7, 12]).unwrap();
        let mut out = Tensor::empty(DType::UInt8, None);
        let mut kernel = MaxPool2D::new(&input, &mut out, attrs(Padding::Same, (2, 2), (2, 2)));
        assert!(matches!(
            kernel.configure(),
            Err(ForgeError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_max_pool_with_argmax() {
        #[rustfmt::skip]
        let input = Tensor::from_data(vec![1, 2, 2, 2], &[
            1.0f32, 8.0,   5.0, 2.0,
            3.0, 4.0,      5.0, 6.0,
        ]).unwrap();
        let pool_attrs = MaxPoolWithArgMaxAttrs {
            pool: attrs(Padding::Valid, (2, 2), (2, 2)),
            output_type: DType::Int64,
        };
        let mut values = Tensor::empty(DType::Float32, None);
        let mut indices = Tensor::empty(DType::Int64, None);
        let mut kernel = MaxPoolWithArgMax::new(&input, &mut values, &mut indices, pool_attrs);
        kernel.configure().unwrap();
        kernel.execute().unwrap();

        assert_eq!(values.shape(), &[1, 1, 1, 2]);
        assert_eq!(values.to_vec::<f32>().unwrap(), vec![5.0, 8.0]);
        // channel 0: first 5.0 sits at (y=0, x=1); channel 1: 8.0 at (0, 0)
        assert_eq!(indices.to_vec::<i64>().unwrap(), vec![2, 1]);
    }

    #[test]
    fn test_max_pool_with_argmax_index_type_must_match() {
        let input = Tensor::from_data(vec![1, 1, 1, 1], &[1.0f32]).unwrap();
        let pool_attrs = MaxPoolWithArgMaxAttrs {
            pool: attrs(Padding::Valid, (1, 1), (1, 1)),
            output_type: DType::Int32,
        };
        let mut values = Tensor::empty(DType::Float32, None);
        let mut indices = Tensor::empty(DType::Int64, None);
        let mut kernel = MaxPoolWithArgMax::new(&input, &mut values, &mut indices, pool_attrs);
        assert!(matches!(
            kernel.configure(),
            Err(ForgeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_non_nhwc_input_rejected() {
        let input = Tensor::from_data(vec![2, 2], &[1.0f32; 4]).unwrap();
        let mut out = Tensor::empty(DType::Float32, None);
        let mut kernel = MaxPool2D::new(&input, &mut out, attrs(Padding::Valid, (1, 1), (1, 1)));
        assert!(matches!(
            kernel.configure(),
            Err(ForgeError::ShapeIncompatible(_))
        ));
    }
}
