//! Circle-style IR: tensors, operators and the arena graph.

pub mod dtype;
pub mod graph;
pub mod op;
pub mod shape;
pub mod tensor;
pub mod validate;

pub use dtype::{DType, Element};
pub use graph::{Graph, Node, NodeId, ValueInfo, ValueRef};
pub use op::{
    FusedActivation, Filter, MaxPoolWithArgMaxAttrs, Op, OpKind, Padding, Pool2DAttrs, Stride,
};
pub use shape::{broadcast_shape, element_count};
pub use tensor::{QuantParams, Tensor};
