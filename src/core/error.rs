// This module defines error types for the gridline backend using the thiserror
// crate for idiomatic Rust error handling. CompileError is the main error enum
// covering the failure classes of kernel lowering: unsupported type or
// operation shapes, loads of values that were never allocated a variable,
// kind-mismatched variable loads (a typing gap upstream), invalid intrinsic
// architecture ranges rejected at registration time, and internal code
// generation invariant violations. Each variant carries relevant context for
// debugging. The module also provides CompileResult<T> as a convenience type
// alias for Result<T, CompileError>.

//! Error types for kernel compilation.
//!
//! Using thiserror for more idiomatic error handling.

use thiserror::Error;

use crate::ir::ValueId;

/// Main error type for kernel lowering.
#[derive(Error, Debug)]
pub enum CompileError {
    /// A type variant or operation shape the backend does not handle, e.g.
    /// requesting an intrinsic (register-backed) variable for a view, or
    /// calling a declared method with no registered implementation.
    #[error("not supported: {reason}")]
    NotSupported { reason: String },

    /// A value was loaded before any variable was allocated for it. This is
    /// an ordering bug in the code generator, not a user error.
    #[error("no variable bound for value {value:?}")]
    UnboundValue { value: ValueId },

    /// A variable was loaded as the wrong kind.
    #[error("invalid code generation: expected {expected} variable for {value:?}, found {found}")]
    InvalidCodeGeneration {
        value: ValueId,
        expected: &'static str,
        found: &'static str,
    },

    /// Intrinsic registration with min architecture above max.
    #[error("invalid intrinsic architecture range: min {min} exceeds max {max}")]
    InvalidArchitectureRange { min: String, max: String },

    #[error("code generation failed: {reason}")]
    CodeGeneration { reason: String },
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
