//! Typed views of custom-operator payloads.
//!
//! Custom operators carry their attributes as a flexbuffer map. Decoding
//! goes straight into a serde struct, so a missing key or a value of the
//! wrong type is an error instead of a silently defaulted field.

use serde::{Deserialize, Serialize};

use crate::error::{ForgeError, ForgeResult};
use crate::ir::{
    DType, Filter, FusedActivation, MaxPoolWithArgMaxAttrs, Padding, Pool2DAttrs, Stride,
};

/// Attribute map of the `MaxPoolWithArgMax` custom operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxPoolWithArgMaxOptions {
    pub padding: i32,
    pub stride_w: i32,
    pub stride_h: i32,
    pub filter_width: i32,
    pub filter_height: i32,
    pub activation: i32,
    pub output_type: i32,
}

impl MaxPoolWithArgMaxOptions {
    pub fn decode(payload: &[u8]) -> Result<Self, String> {
        flexbuffers::from_slice(payload).map_err(|e| format!("malformed options payload: {}", e))
    }

    pub fn encode(&self) -> ForgeResult<Vec<u8>> {
        flexbuffers::to_vec(self).map_err(|e| {
            ForgeError::Internal(format!("encoding MaxPoolWithArgMax options: {}", e))
        })
    }

    /// Map the wire integers through the same tables the importer uses.
    pub fn to_attrs(&self) -> Result<MaxPoolWithArgMaxAttrs, String> {
        let padding = Padding::from_wire_code(self.padding)
            .ok_or_else(|| format!("unknown padding {}", self.padding))?;
        let activation = FusedActivation::from_wire_code(self.activation)
            .ok_or_else(|| format!("unknown fused activation {}", self.activation))?;
        let output_type = DType::from_wire_code(self.output_type)
            .filter(|t| matches!(t, DType::Int32 | DType::Int64))
            .ok_or_else(|| format!("output_type {} is not an index type", self.output_type))?;

        Ok(MaxPoolWithArgMaxAttrs {
            pool: Pool2DAttrs {
                padding,
                stride: Stride {
                    w: self.stride_w,
                    h: self.stride_h,
                },
                filter: Filter {
                    w: self.filter_width,
                    h: self.filter_height,
                },
                activation,
            },
            output_type,
        })
    }

    pub fn from_attrs(attrs: &MaxPoolWithArgMaxAttrs) -> Self {
        Self {
            padding: attrs.padding().wire_code(),
            stride_w: attrs.stride().w,
            stride_h: attrs.stride().h,
            filter_width: attrs.filter().w,
            filter_height: attrs.filter().h,
            activation: attrs.fused_activation().wire_code(),
            output_type: attrs.output_type().wire_code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn full_map() -> BTreeMap<&'static str, i32> {
        BTreeMap::from([
            ("padding", 1),
            ("stride_w", 2),
            ("stride_h", 2),
            ("filter_width", 3),
            ("filter_height", 3),
            ("activation", 0),
            ("output_type", 4),
        ])
    }

    #[test]
    fn test_decode_full_map() {
        let payload = flexbuffers::to_vec(full_map()).unwrap();
        let options = MaxPoolWithArgMaxOptions::decode(&payload).unwrap();
        assert_eq!(options.filter_width, 3);

        let attrs = options.to_attrs().unwrap();
        assert_eq!(attrs.padding(), Padding::Valid);
        assert_eq!(attrs.stride(), Stride { w: 2, h: 2 });
        assert_eq!(attrs.output_type(), DType::Int64);
    }

    #[test]
    fn test_missing_key_is_an_error() {
        let mut map = full_map();
        map.remove("stride_h");
        let payload = flexbuffers::to_vec(map).unwrap();
        assert!(MaxPoolWithArgMaxOptions::decode(&payload).is_err());
    }

    #[test]
    fn test_unmapped_enum_values_rejected() {
        let mut options = MaxPoolWithArgMaxOptions::decode(&flexbuffers::to_vec(full_map()).unwrap())
            .unwrap();
        options.padding = 7;
        assert!(options.to_attrs().is_err());

        options.padding = 0;
        options.output_type = 0; // Float32 cannot hold indices
        assert!(options.to_attrs().is_err());
    }

    #[test]
    fn test_encode_matches_attrs() {
        let options = MaxPoolWithArgMaxOptions::decode(&flexbuffers::to_vec(full_map()).unwrap())
            .unwrap();
        let attrs = options.to_attrs().unwrap();
        let encoded = MaxPoolWithArgMaxOptions::from_attrs(&attrs).encode().unwrap();
        assert_eq!(MaxPoolWithArgMaxOptions::decode(&encoded).unwrap(), options);
    }
}
