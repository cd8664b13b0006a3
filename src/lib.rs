//! Gridline - Retargetable GPU Kernel Backend.
//!
//! Gridline compiles a small SSA kernel IR into GPU assembly. The backend
//! maps IR values onto typed register variables and resolves intrinsic
//! operations through an architecture-gated registry: an operation either
//! lowers natively, runs an emission callback, or is replaced by a software
//! routine spliced into the function before emission. Whether a kernel uses
//! hardware support or a software fallback is decided per target
//! architecture by the registry, not by the kernel author.
//!
//! # Primary Usage
//!
//! ```ignore
//! use gridline::core::CompilationSession;
//! use gridline::ir::{FunctionBuilder, IrContext};
//! use gridline::ptx::{PtxBackend, PtxTargetConfig, SmArchitecture};
//! use bumpalo::Bump;
//!
//! // Build a kernel
//! let mut ctx = IrContext::new();
//! let mut builder = FunctionBuilder::kernel(&mut ctx, "scale");
//! /* ... parameters, blocks, operations ... */
//! let method = builder.finish();
//!
//! // Compile it for sm_70
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let backend = PtxBackend::new(PtxTargetConfig::new(SmArchitecture::Sm70))?;
//! let ptx = backend.compile_kernel(&mut ctx, method, &session)?;
//! ```
//!
//! # Architecture
//!
//! - [`ir`] - Kernel IR: types, functions, blocks, and the builder
//! - [`core`] - Shared infrastructure (session, variables, intrinsics)
//! - [`ptx`] - PTX backend for NVIDIA SM architectures

pub mod core;
pub mod ir;
pub mod ptx;

// Re-export common types from organized modules
pub use core::{
    // Variable management
    ObjectVariable, PointerVariable, PrimitiveVariable, Variable, VariableAllocator, ViewVariable,
    // Intrinsic resolution
    IntrinsicImplementation, IntrinsicKey, IntrinsicRegistry,
    // Session management
    CompilationSession, CompilationStats,
    // Errors
    CompileError, CompileResult,
};
pub use ir::{FunctionBuilder, IrContext, MethodId};
pub use ptx::{PtxBackend, PtxTargetConfig, SmArchitecture};
