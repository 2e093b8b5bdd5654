//! Supported IR operations and their attribute records.

use std::fmt;

use crate::ir::{DType, Tensor};

/// Padding scheme for windowed operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Padding {
    Same,
    Valid,
}

impl Padding {
    /// Only the two schema values are accepted; anything else has no meaning.
    pub fn from_wire_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Padding::Same),
            1 => Some(Padding::Valid),
            _ => None,
        }
    }

    pub fn wire_code(&self) -> i32 {
        match self {
            Padding::Same => 0,
            Padding::Valid => 1,
        }
    }
}

/// Activation fused into an operator's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FusedActivation {
    #[default]
    None,
    Relu,
    ReluN1To1,
    Relu6,
    Tanh,
    SignBit,
}

impl FusedActivation {
    pub fn from_wire_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(FusedActivation::None),
            1 => Some(FusedActivation::Relu),
            2 => Some(FusedActivation::ReluN1To1),
            3 => Some(FusedActivation::Relu6),
            4 => Some(FusedActivation::Tanh),
            5 => Some(FusedActivation::SignBit),
            _ => None,
        }
    }

    pub fn wire_code(&self) -> i32 {
        match self {
            FusedActivation::None => 0,
            FusedActivation::Relu => 1,
            FusedActivation::ReluN1To1 => 2,
            FusedActivation::Relu6 => 3,
            FusedActivation::Tanh => 4,
            FusedActivation::SignBit => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Stride {
    pub w: i32,
    pub h: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Filter {
    pub w: i32,
    pub h: i32,
}

/// Attributes shared by 2D pooling operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pool2DAttrs {
    pub padding: Padding,
    pub stride: Stride,
    pub filter: Filter,
    pub activation: FusedActivation,
}

/// Max pooling that also reports where each maximum came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaxPoolWithArgMaxAttrs {
    pub pool: Pool2DAttrs,
    /// Element kind of the argmax output (`Int32` or `Int64`).
    pub output_type: DType,
}

impl MaxPoolWithArgMaxAttrs {
    pub fn padding(&self) -> Padding {
        self.pool.padding
    }

    pub fn stride(&self) -> Stride {
        self.pool.stride
    }

    pub fn filter(&self) -> Filter {
        self.pool.filter
    }

    pub fn fused_activation(&self) -> FusedActivation {
        self.pool.activation
    }

    pub fn output_type(&self) -> DType {
        self.output_type
    }
}

/// Closed set of IR operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Graph input placeholder; its `ValueInfo` declares the expected tensor.
    Input,
    Const(Tensor),
    Add { activation: FusedActivation },
    Sub { activation: FusedActivation },
    Mul { activation: FusedActivation },
    Div { activation: FusedActivation },
    Pow,
    Elu,
    /// One input: coordinates of true elements. Three inputs: select.
    Where,
    MaxPool2D(Pool2DAttrs),
    MaxPoolWithArgMax(MaxPoolWithArgMaxAttrs),
    ReverseSequence { seq_dim: i32, batch_dim: i32 },
    BatchMatMul { adj_x: bool, adj_y: bool },
    /// Operator outside the built-in set, resolved (if at all) by a pass.
    Custom { code: String, options: Vec<u8> },
}

/// Fieldless tag of an [`Op`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Input,
    Const,
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Elu,
    Where,
    MaxPool2D,
    MaxPoolWithArgMax,
    ReverseSequence,
    BatchMatMul,
    Custom,
}

impl Op {
    pub fn kind(&self) -> OpKind {
        match self {
            Op::Input => OpKind::Input,
            Op::Const(_) => OpKind::Const,
            Op::Add { .. } => OpKind::Add,
            Op::Sub { .. } => OpKind::Sub,
            Op::Mul { .. } => OpKind::Mul,
            Op::Div { .. } => OpKind::Div,
            Op::Pow => OpKind::Pow,
            Op::Elu => OpKind::Elu,
            Op::Where => OpKind::Where,
            Op::MaxPool2D(_) => OpKind::MaxPool2D,
            Op::MaxPoolWithArgMax(_) => OpKind::MaxPoolWithArgMax,
            Op::ReverseSequence { .. } => OpKind::ReverseSequence,
            Op::BatchMatMul { .. } => OpKind::BatchMatMul,
            Op::Custom { .. } => OpKind::Custom,
        }
    }

    /// Output arity the operator kind mandates; `None` when it is a property
    /// of the individual node (custom operators).
    pub fn fixed_output_arity(&self) -> Option<usize> {
        match self {
            Op::MaxPoolWithArgMax(_) => Some(2),
            Op::Custom { .. } => None,
            _ => Some(1),
        }
    }

    pub fn fused_activation(&self) -> Option<FusedActivation> {
        match self {
            Op::Add { activation }
            | Op::Sub { activation }
            | Op::Mul { activation }
            | Op::Div { activation } => Some(*activation),
            Op::MaxPool2D(attrs) => Some(attrs.activation),
            Op::MaxPoolWithArgMax(attrs) => Some(attrs.pool.activation),
            _ => None,
        }
    }

    pub fn custom_code(&self) -> Option<&str> {
        match self {
            Op::Custom { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Custom { code, .. } => write!(f, "Custom({})", code),
            other => write!(f, "{}", other.kind()),
        }
    }
}
