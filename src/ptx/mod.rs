// This module gathers the PTX backend: target descriptions (SM architecture
// generations and ISA versions), the shipped intrinsic implementation table,
// the specializing code generator, and the backend facade that drives a
// kernel through both stages. The target-independent pieces it builds on
// live in `core`; everything here is NVPTX-specific.

//! PTX Backend
//!
//! Compiles kernel IR into PTX assembly text for a configured SM
//! architecture.
//!
//! # Key Components
//!
//! ## Target Description (`target`)
//! - SM architecture generations from `sm_30` to `sm_90`
//! - Minimum PTX ISA version per architecture
//! - Feature predicates used to gate intrinsic implementations
//!
//! ## Intrinsic Table (`intrinsics`)
//! - Shipped redirect routines (software float atomics, broadcasts, ctz)
//! - Emission callbacks (legacy warp shuffles, reinterpret methods)
//! - Architecture-gated registrations resolved per target
//!
//! ## Code Generation (`codegen`)
//! - Register allocation through backend variables
//! - Native lowering of the full IR op set
//! - Block-argument moves on branch edges
//!
//! ## Backend Facade (`backend`)
//! - One-call kernel compilation: specialize, then emit

pub mod backend;
pub mod codegen;
pub mod intrinsics;
pub mod target;

pub use backend::PtxBackend;
pub use codegen::{
    pointer_register_name, register_class, register_name, PtxCodeGenerator, RegisterClass,
};
pub use intrinsics::{
    declare_reinterpret_methods, register_intrinsics, reinterpret_method_name, PtxEmitFn,
    PtxImplementationMode, PtxIntrinsic,
};
pub use target::{PtxIsaVersion, PtxTargetConfig, SmArchitecture};
