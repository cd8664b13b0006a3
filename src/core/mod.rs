// This module serves as the central hub for the target-independent backend
// infrastructure shared by every code generator: session management
// (arena-based allocation and compilation statistics), variable allocation
// (mapping IR values onto backend register variables), the intrinsic
// registry (architecture-gated implementation lookup), redirect
// specialization (splicing software routines over intrinsic sites), and the
// common error type. Nothing in here knows about a concrete instruction
// set; backends layer their emitters on top of these pieces.

//! Core Backend Infrastructure
//!
//! Target-independent building blocks shared across backend
//! implementations.
//!
//! # Key Components
//!
//! ## Session Management (`session`)
//! - Arena-based memory allocation using `bumpalo`
//! - Compilation statistics and per-mnemonic instruction counts
//!
//! ## Variable Allocation (`variables`)
//! - Primitive, pointer, object, and view variables with stable ids
//! - Idempotent allocation and typed loads with precise failure modes
//!
//! ## Intrinsic Registry (`intrinsics`)
//! - Descriptor keys for atomics, broadcasts, shuffles, and named methods
//! - Inclusive architecture ranges with narrowest-range resolution
//! - Redirect and generate-code implementation modes
//!
//! ## Redirect Specialization (`specialize`)
//! - Clones a function and splices redirect routines over their call sites
//! - Inlines device calls; depth-bounded against runaway recursion

pub mod error;
pub mod intrinsics;
pub mod session;
pub mod specialize;
pub mod variables;

// Re-export core components
pub use error::{CompileError, CompileResult};

pub use intrinsics::{
    intrinsic_key_for, ArchitectureVersion, IntrinsicImplementation, IntrinsicKey,
    IntrinsicRegistry, RedirectBuilder,
};

pub use session::{CompilationSession, CompilationStats};

pub use specialize::specialize_method;

pub use variables::{
    ObjectVariable, PointerVariable, PrimitiveVariable, VarId, Variable, VariableAllocator,
    VariableKind, ViewVariable,
};
