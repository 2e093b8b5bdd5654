//! Decoded model records.
//!
//! These mirror the circle flatbuffer tables after decoding: tensors are
//! referenced by index, operators carry their raw builtin options (enum
//! fields still as wire integers) or an opaque custom payload.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ir::{DType, QuantParams};

/// Operator input index marking an omitted optional input.
///
/// None of the supported operators takes an optional input, so the importer
/// rejects any operator record that uses it.
pub const OMITTED_INPUT: i32 = -1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorRecord {
    pub name: String,
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub quant: Option<QuantParams>,
    /// Constant contents; `None` for activations and graph inputs.
    pub data: Option<Vec<u8>>,
}

impl TensorRecord {
    pub fn new(name: impl Into<String>, dtype: DType, shape: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            dtype,
            shape,
            quant: None,
            data: None,
        }
    }

    pub fn with_quant(mut self, quant: QuantParams) -> Self {
        self.quant = Some(quant);
        self
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }
}

/// Built-in operators understood by the importer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinOperator {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Elu,
    Where,
    MaxPool2D,
    ReverseSequence,
    BatchMatMul,
}

impl BuiltinOperator {
    pub const ALL: [BuiltinOperator; 10] = [
        BuiltinOperator::Add,
        BuiltinOperator::Sub,
        BuiltinOperator::Mul,
        BuiltinOperator::Div,
        BuiltinOperator::Pow,
        BuiltinOperator::Elu,
        BuiltinOperator::Where,
        BuiltinOperator::MaxPool2D,
        BuiltinOperator::ReverseSequence,
        BuiltinOperator::BatchMatMul,
    ];

    /// Schema name, as printed in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinOperator::Add => "ADD",
            BuiltinOperator::Sub => "SUB",
            BuiltinOperator::Mul => "MUL",
            BuiltinOperator::Div => "DIV",
            BuiltinOperator::Pow => "POW",
            BuiltinOperator::Elu => "ELU",
            BuiltinOperator::Where => "WHERE",
            BuiltinOperator::MaxPool2D => "MAX_POOL_2D",
            BuiltinOperator::ReverseSequence => "REVERSE_SEQUENCE",
            BuiltinOperator::BatchMatMul => "BATCH_MATMUL",
        }
    }

    /// Value in the schema's `BuiltinOperator` enumeration.
    pub fn wire_code(&self) -> i32 {
        match self {
            BuiltinOperator::Add => 0,
            BuiltinOperator::MaxPool2D => 17,
            BuiltinOperator::Mul => 18,
            BuiltinOperator::Sub => 41,
            BuiltinOperator::Div => 42,
            BuiltinOperator::Pow => 78,
            BuiltinOperator::Where => 109,
            BuiltinOperator::Elu => 111,
            BuiltinOperator::ReverseSequence => 112,
            BuiltinOperator::BatchMatMul => 126,
        }
    }

    pub fn from_wire_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.wire_code() == code)
    }
}

impl fmt::Display for BuiltinOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatorCode {
    Builtin(BuiltinOperator),
    Custom(String),
}

impl fmt::Display for OperatorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorCode::Builtin(op) => write!(f, "{}", op),
            OperatorCode::Custom(code) => write!(f, "CUSTOM({})", code),
        }
    }
}

/// Builtin options block, one variant per options table. Enum-valued fields
/// keep their wire integers; the importer maps them through explicit tables.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BuiltinOptions {
    #[default]
    None,
    Add {
        activation: i32,
    },
    Sub {
        activation: i32,
    },
    Mul {
        activation: i32,
    },
    Div {
        activation: i32,
    },
    Pool2D {
        padding: i32,
        stride_w: i32,
        stride_h: i32,
        filter_width: i32,
        filter_height: i32,
        activation: i32,
    },
    ReverseSequence {
        seq_dim: i32,
        batch_dim: i32,
    },
    BatchMatMul {
        adj_x: bool,
        adj_y: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorRecord {
    pub code: OperatorCode,
    /// Tensor indices; [`OMITTED_INPUT`] (omitted optional input) is rejected.
    pub inputs: Vec<i32>,
    pub outputs: Vec<i32>,
    pub options: BuiltinOptions,
    pub custom_options: Vec<u8>,
}

impl OperatorRecord {
    pub fn builtin(
        op: BuiltinOperator,
        inputs: Vec<i32>,
        outputs: Vec<i32>,
        options: BuiltinOptions,
    ) -> Self {
        Self {
            code: OperatorCode::Builtin(op),
            inputs,
            outputs,
            options,
            custom_options: Vec::new(),
        }
    }

    pub fn custom(
        code: impl Into<String>,
        inputs: Vec<i32>,
        outputs: Vec<i32>,
        custom_options: Vec<u8>,
    ) -> Self {
        Self {
            code: OperatorCode::Custom(code.into()),
            inputs,
            outputs,
            options: BuiltinOptions::None,
            custom_options,
        }
    }
}

/// One decoded subgraph.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelRecord {
    pub tensors: Vec<TensorRecord>,
    pub operators: Vec<OperatorRecord>,
    pub inputs: Vec<i32>,
    pub outputs: Vec<i32>,
}
