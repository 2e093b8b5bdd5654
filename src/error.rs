//! Unified error handling for circleforge
//!
//! Every subsystem reports failures through [`ForgeError`]. Variants are
//! grouped by the stage that raises them so callers can decide how to react
//! via [`ForgeError::category`]:
//! - Import errors (a model record was rejected, nothing was built)
//! - Configuration errors (type or shape resolution of a kernel failed)
//! - Execution errors (a kernel could not compute its result)
//! - Pass errors (a rewrite matched but could not be completed)
//! - Internal errors (bugs)

use std::fmt;

use crate::ir::{DType, NodeId};

/// Unified error type for circleforge
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    // ========== Import Errors ==========
    /// An operator record failed its builder's validation
    #[error("import validation failed for operator #{op_index} ({op})")]
    ImportValidation { op_index: usize, op: String },

    /// Structurally malformed model records (bad indices, data lengths)
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    // ========== Configuration Errors ==========
    /// Element kinds of inputs/outputs do not agree
    #[error("type mismatch: expected {expected:?}, got {got:?}")]
    TypeMismatch { expected: DType, got: DType },

    /// Shapes cannot be combined (broadcast, rank, dimension checks)
    #[error("incompatible shapes: {0}")]
    ShapeIncompatible(String),

    /// Invalid crate configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ========== Execution Errors ==========
    /// Element kind or attribute combination not implemented by a kernel
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Arithmetic outside the operator's domain (e.g. quantized divide by zero)
    #[error("arithmetic domain error: {0}")]
    ArithmeticDomain(String),

    /// A node's kernel failed; carries the offending node identity
    #[error("evaluation of node {node} ({op}) failed: {source}")]
    NodeEvaluation {
        node: NodeId,
        op: String,
        #[source]
        source: Box<ForgeError>,
    },

    // ========== Pass Errors ==========
    /// A rewrite matched a node but its payload could not be honoured
    #[error("pass '{pass}' inconsistency: {reason}")]
    PassInconsistency { pass: &'static str, reason: String },

    // ========== Graph Errors ==========
    /// Graph structure invariant violated
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    // ========== Internal Errors ==========
    /// Internal error (indicates a bug)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ForgeError {
    /// Categorize the error for handling decisions
    ///
    /// # Examples
    /// ```ignore
    /// match error.category() {
    ///     ErrorCategory::Import => println!("fix the model"),
    ///     ErrorCategory::Internal => println!("report this bug"),
    ///     _ => println!("evaluation failed"),
    /// }
    /// ```
    pub fn category(&self) -> ErrorCategory {
        match self {
            ForgeError::ImportValidation { .. } | ForgeError::InvalidModel(_) => {
                ErrorCategory::Import
            }

            ForgeError::TypeMismatch { .. }
            | ForgeError::ShapeIncompatible(_)
            | ForgeError::InvalidConfiguration(_)
            | ForgeError::InvalidGraph(_) => ErrorCategory::Configuration,

            ForgeError::UnsupportedOperation(_) | ForgeError::ArithmeticDomain(_) => {
                ErrorCategory::Execution
            }

            // The wrapper inherits the category of what actually went wrong
            ForgeError::NodeEvaluation { source, .. } => source.category(),

            ForgeError::PassInconsistency { .. } => ErrorCategory::Pass,

            ForgeError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Check if this error was raised while importing a model
    pub fn is_import_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Import)
    }

    /// Check if this error came from shape/type resolution
    pub fn is_configuration_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Configuration)
    }

    /// Check if this error came from a kernel computation
    pub fn is_execution_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Execution)
    }

    /// Check if this is an internal error (indicates a bug)
    pub fn is_internal_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Internal)
    }

    /// Strip any [`ForgeError::NodeEvaluation`] wrappers.
    pub fn root_cause(&self) -> &ForgeError {
        match self {
            ForgeError::NodeEvaluation { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Error category for handling decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Model records rejected during import
    Import,
    /// Type/shape resolution or graph structure
    Configuration,
    /// Numeric evaluation failure
    Execution,
    /// Rewrite pass could not complete a match
    Pass,
    /// Bug
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Import => write!(f, "Import"),
            ErrorCategory::Configuration => write!(f, "Configuration"),
            ErrorCategory::Execution => write!(f, "Execution"),
            ErrorCategory::Pass => write!(f, "Pass"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

/// Helper type alias for Results using ForgeError
pub type ForgeResult<T> = std::result::Result<T, ForgeError>;

// ========== Helper Macros ==========

/// Create an unsupported-operation error
///
/// # Examples
/// ```ignore
/// return Err(unsupported_op!("Div does not support {:?}", dtype));
/// ```
#[macro_export]
macro_rules! unsupported_op {
    ($msg:expr) => {
        $crate::error::ForgeError::UnsupportedOperation($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::ForgeError::UnsupportedOperation(format!($fmt, $($arg)*))
    };
}

/// Create a shape-incompatible error
#[macro_export]
macro_rules! shape_error {
    ($msg:expr) => {
        $crate::error::ForgeError::ShapeIncompatible($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::ForgeError::ShapeIncompatible(format!($fmt, $($arg)*))
    };
}

/// Create an internal error with context
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::error::ForgeError::Internal($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::ForgeError::Internal(format!($fmt, $($arg)*))
    };
}

/// Fail with a type mismatch unless both kinds agree
pub fn ensure_same_dtype(expected: DType, got: DType) -> ForgeResult<()> {
    if expected == got {
        Ok(())
    } else {
        Err(ForgeError::TypeMismatch { expected, got })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            ForgeError::ImportValidation {
                op_index: 0,
                op: "WHERE".to_string()
            }
            .category(),
            ErrorCategory::Import
        );
        assert_eq!(
            ForgeError::TypeMismatch {
                expected: DType::Float32,
                got: DType::Int32
            }
            .category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            ForgeError::ShapeIncompatible("x".to_string()).category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            ForgeError::ArithmeticDomain("x".to_string()).category(),
            ErrorCategory::Execution
        );
        assert_eq!(
            ForgeError::PassInconsistency {
                pass: "p",
                reason: "r".to_string()
            }
            .category(),
            ErrorCategory::Pass
        );
        assert_eq!(
            ForgeError::Internal("x".to_string()).category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn test_node_evaluation_inherits_category() {
        let err = ForgeError::NodeEvaluation {
            node: NodeId(3),
            op: "Div".to_string(),
            source: Box::new(ForgeError::UnsupportedOperation("bool".to_string())),
        };
        assert!(err.is_execution_error());
        assert!(matches!(
            err.root_cause(),
            ForgeError::UnsupportedOperation(_)
        ));
        assert!(err.to_string().contains("node 3"));
    }

    #[test]
    fn test_macros() {
        let err = unsupported_op!("kind {:?}", DType::Bool);
        assert!(matches!(err, ForgeError::UnsupportedOperation(ref m) if m.contains("Bool")));
        let err = shape_error!("rank");
        assert!(err.is_configuration_error());
        let err = internal_error!("bug");
        assert!(err.is_internal_error());
    }

    #[test]
    fn test_ensure_same_dtype() {
        assert!(ensure_same_dtype(DType::UInt8, DType::UInt8).is_ok());
        let err = ensure_same_dtype(DType::Float32, DType::Int32).unwrap_err();
        assert!(matches!(
            err,
            ForgeError::TypeMismatch {
                expected: DType::Float32,
                got: DType::Int32
            }
        ));
    }

    #[test]
    fn test_category_display() {
        assert_eq!(format!("{}", ErrorCategory::Pass), "Pass");
        assert_eq!(format!("{}", ErrorCategory::Import), "Import");
    }
}
