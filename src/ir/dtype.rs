//! Element kinds for IR tensors.

use serde::{Deserialize, Serialize};

/// Closed set of element kinds. Discriminants follow the circle `TensorType`
/// table so they can be copied to and from operator records unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Float32,
    Float16,
    Int32,
    UInt8,
    Int64,
    Bool,
    Int16,
    Int8,
}

impl DType {
    pub fn size(&self) -> usize {
        match self {
            DType::Float32 | DType::Int32 => 4,
            DType::Float16 | DType::Int16 => 2,
            DType::Int64 => 8,
            DType::UInt8 | DType::Int8 | DType::Bool => 1,
        }
    }

    /// Kinds that may carry affine quantization parameters.
    pub fn is_quantizable(&self) -> bool {
        matches!(self, DType::UInt8 | DType::Int8 | DType::Int16)
    }

    pub fn wire_code(&self) -> i32 {
        match self {
            DType::Float32 => 0,
            DType::Float16 => 1,
            DType::Int32 => 2,
            DType::UInt8 => 3,
            DType::Int64 => 4,
            DType::Bool => 6,
            DType::Int16 => 7,
            DType::Int8 => 9,
        }
    }

    pub fn from_wire_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(DType::Float32),
            1 => Some(DType::Float16),
            2 => Some(DType::Int32),
            3 => Some(DType::UInt8),
            4 => Some(DType::Int64),
            6 => Some(DType::Bool),
            7 => Some(DType::Int16),
            9 => Some(DType::Int8),
            _ => None,
        }
    }

    /// Representable integer range of a quantized kind.
    pub fn quantized_range(&self) -> Option<(i32, i32)> {
        match self {
            DType::UInt8 => Some((u8::MIN as i32, u8::MAX as i32)),
            DType::Int8 => Some((i8::MIN as i32, i8::MAX as i32)),
            DType::Int16 => Some((i16::MIN as i32, i16::MAX as i32)),
            _ => None,
        }
    }
}

/// Rust scalar types that can view a tensor's buffer.
pub trait Element: bytemuck::Pod + PartialOrd + Send + Sync + 'static {
    const DTYPE: DType;
}

impl Element for f32 {
    const DTYPE: DType = DType::Float32;
}

impl Element for i32 {
    const DTYPE: DType = DType::Int32;
}

impl Element for u8 {
    const DTYPE: DType = DType::UInt8;
}

impl Element for i64 {
    const DTYPE: DType = DType::Int64;
}

impl Element for i16 {
    const DTYPE: DType = DType::Int16;
}

impl Element for i8 {
    const DTYPE: DType = DType::Int8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes_round_trip() {
        for dtype in [
            DType::Float32,
            DType::Float16,
            DType::Int32,
            DType::UInt8,
            DType::Int64,
            DType::Bool,
            DType::Int16,
            DType::Int8,
        ] {
            assert_eq!(DType::from_wire_code(dtype.wire_code()), Some(dtype));
        }
        assert_eq!(DType::from_wire_code(5), None); // STRING
        assert_eq!(DType::from_wire_code(-1), None);
    }

    #[test]
    fn test_quantized_range() {
        assert_eq!(DType::UInt8.quantized_range(), Some((0, 255)));
        assert_eq!(DType::Int8.quantized_range(), Some((-128, 127)));
        assert_eq!(DType::Float32.quantized_range(), None);
        assert!(!DType::Bool.is_quantizable());
    }
}
