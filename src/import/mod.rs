//! Importer: decoded model records → IR graph.
//!
//! Each operator record is checked by its [`GraphBuilder`] before any node
//! is created for it; the first rejection aborts the import.

pub mod builder;
pub mod importer;
pub mod nodes;
pub mod record;

pub use builder::{builder_for, GraphBuilder, ValidateArgs};
pub use importer::Importer;
pub use record::{
    BuiltinOperator, BuiltinOptions, ModelRecord, OperatorCode, OperatorRecord, TensorRecord,
    OMITTED_INPUT,
};
