// This module implements the PTX payload for the intrinsic registry and the
// shipped implementation table. A payload either redirects (substituting an
// IR routine that the specializer splices inline, so the routine is lowered
// like user code and may itself contain intrinsic operations) or generates
// code (an emission callback the code generator invokes at the operation's
// site). Redirect routines are built lazily into the method table, one per
// operand type, and reused across call sites. The table covers the software
// fallbacks the hardware lacks on older generations: CAS-loop float atomics,
// shared-memory group broadcast, pre-`sm_70` warp shuffles, widened
// half-precision arithmetic, trailing-zero-count via `popc`, and
// register-level reinterpret methods.

//! PTX intrinsic implementations and their registration table.

use crate::core::error::{CompileError, CompileResult};
use crate::core::intrinsics::{IntrinsicImplementation, IntrinsicRegistry, RedirectBuilder};
use crate::ir::types::{AddressSpace, BasicValueType};
use crate::ir::{
    AtomicKind, BinaryArithmeticKind, BroadcastKind, CompareKind, Function, FunctionBuilder,
    IrContext, MethodId, Op, ShuffleKind, ThreadValue, UnaryArithmeticKind, ValueId,
};
use crate::ptx::codegen::{register_name, PtxCodeGenerator};
use crate::ptx::target::SmArchitecture;

/// Site-level emission callback for GenerateCode-mode implementations.
pub type PtxEmitFn = fn(&mut PtxCodeGenerator<'_, '_>, ValueId) -> CompileResult<()>;

/// How a PTX intrinsic implementation fulfills its operation.
#[derive(Debug, Clone, Copy)]
pub enum PtxImplementationMode {
    /// Substitute an IR routine; the specializer inlines it before lowering.
    Redirect(RedirectBuilder),
    /// Emit instructions directly at the operation's site.
    GenerateCode(PtxEmitFn),
}

/// One shipped implementation: a mode plus its applicability range.
#[derive(Debug, Clone, Copy)]
pub struct PtxIntrinsic {
    name: &'static str,
    mode: PtxImplementationMode,
    min: Option<SmArchitecture>,
    max: Option<SmArchitecture>,
}

impl PtxIntrinsic {
    pub fn redirect(
        name: &'static str,
        builder: RedirectBuilder,
        min: Option<SmArchitecture>,
        max: Option<SmArchitecture>,
    ) -> Self {
        Self {
            name,
            mode: PtxImplementationMode::Redirect(builder),
            min,
            max,
        }
    }

    pub fn generate(
        name: &'static str,
        emit: PtxEmitFn,
        min: Option<SmArchitecture>,
        max: Option<SmArchitecture>,
    ) -> Self {
        Self {
            name,
            mode: PtxImplementationMode::GenerateCode(emit),
            min,
            max,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The emission callback, for GenerateCode-mode payloads.
    pub fn emit_callback(&self) -> Option<PtxEmitFn> {
        match self.mode {
            PtxImplementationMode::GenerateCode(emit) => Some(emit),
            PtxImplementationMode::Redirect(_) => None,
        }
    }
}

impl IntrinsicImplementation for PtxIntrinsic {
    type Architecture = SmArchitecture;

    fn min_architecture(&self) -> Option<SmArchitecture> {
        self.min
    }

    fn max_architecture(&self) -> Option<SmArchitecture> {
        self.max
    }

    fn redirect_builder(&self) -> Option<RedirectBuilder> {
        match self.mode {
            PtxImplementationMode::Redirect(builder) => Some(builder),
            PtxImplementationMode::GenerateCode(_) => None,
        }
    }
}

/// Equal-width reinterpret pairs shipped as named methods.
pub const REINTERPRET_PAIRS: [(BasicValueType, BasicValueType); 16] = [
    (BasicValueType::Float32, BasicValueType::Int32),
    (BasicValueType::Int32, BasicValueType::Float32),
    (BasicValueType::Float32, BasicValueType::UInt32),
    (BasicValueType::UInt32, BasicValueType::Float32),
    (BasicValueType::Float64, BasicValueType::Int64),
    (BasicValueType::Int64, BasicValueType::Float64),
    (BasicValueType::Float64, BasicValueType::UInt64),
    (BasicValueType::UInt64, BasicValueType::Float64),
    (BasicValueType::Float16, BasicValueType::Int16),
    (BasicValueType::Int16, BasicValueType::Float16),
    (BasicValueType::Float16, BasicValueType::UInt16),
    (BasicValueType::UInt16, BasicValueType::Float16),
    (BasicValueType::Int32, BasicValueType::UInt32),
    (BasicValueType::UInt32, BasicValueType::Int32),
    (BasicValueType::Int64, BasicValueType::UInt64),
    (BasicValueType::UInt64, BasicValueType::Int64),
];

pub fn reinterpret_method_name(from: BasicValueType, to: BasicValueType) -> String {
    format!("reinterpret.{from}.{to}")
}

/// Declare the bodyless reinterpret methods so front ends can call them.
pub fn declare_reinterpret_methods(ctx: &mut IrContext) {
    for (from, to) in REINTERPRET_PAIRS {
        let name = reinterpret_method_name(from, to);
        if ctx.find_method(&name).is_some() {
            continue;
        }
        let param = ctx.types_mut().primitive(from);
        let ret = ctx.types_mut().primitive(to);
        ctx.declare_method(&name, vec![param], Some(ret));
    }
}

/// Populate `registry` with every implementation this backend ships.
pub fn register_intrinsics(registry: &mut IntrinsicRegistry<PtxIntrinsic>) -> CompileResult<()> {
    use SmArchitecture::*;

    // Float atomics the hardware lacks: `atom.add.f64` exists from sm_60,
    // float min/max atomics not at all in our emission set.
    registry.register_generic_atomic(
        AtomicKind::Add,
        BasicValueType::Float64,
        PtxIntrinsic::redirect("atomic_add_f64", atomic_add_f64, None, Some(Sm53)),
    )?;
    registry.register_generic_atomic(
        AtomicKind::Min,
        BasicValueType::Float32,
        PtxIntrinsic::redirect("atomic_min_f32", atomic_min_f32, None, None),
    )?;
    registry.register_generic_atomic(
        AtomicKind::Max,
        BasicValueType::Float32,
        PtxIntrinsic::redirect("atomic_max_f32", atomic_max_f32, None, None),
    )?;
    registry.register_generic_atomic(
        AtomicKind::Min,
        BasicValueType::Float64,
        PtxIntrinsic::redirect("atomic_min_f64", atomic_min_f64, None, None),
    )?;
    registry.register_generic_atomic(
        AtomicKind::Max,
        BasicValueType::Float64,
        PtxIntrinsic::redirect("atomic_max_f64", atomic_max_f64, None, None),
    )?;

    // Broadcasts are always software: shared memory for the group, a shuffle
    // for the warp. The warp routine re-specializes on legacy targets.
    registry.register_broadcast(
        BroadcastKind::GroupLevel,
        PtxIntrinsic::redirect("group_broadcast", group_broadcast, None, None),
    )?;
    registry.register_broadcast(
        BroadcastKind::WarpLevel,
        PtxIntrinsic::redirect("warp_broadcast", warp_broadcast, None, None),
    )?;

    // Pre-sm_70 shuffles use the unguarded legacy instruction.
    for kind in [
        ShuffleKind::Idx,
        ShuffleKind::Up,
        ShuffleKind::Down,
        ShuffleKind::Bfly,
    ] {
        registry.register_warp_shuffle(
            kind,
            PtxIntrinsic::generate("legacy_shuffle", emit_legacy_shuffle, None, Some(Sm62)),
        )?;
    }

    // No ctz instruction on any generation.
    registry.register_unary_arithmetic(
        UnaryArithmeticKind::Ctz,
        BasicValueType::Int32,
        PtxIntrinsic::redirect("ctz", ctz_i32, None, None),
    )?;
    registry.register_unary_arithmetic(
        UnaryArithmeticKind::Ctz,
        BasicValueType::Int64,
        PtxIntrinsic::redirect("ctz", ctz_i64, None, None),
    )?;

    // Scalar half arithmetic arrived with sm_53; division never did.
    registry.register_binary_arithmetic(
        BinaryArithmeticKind::Add,
        BasicValueType::Float16,
        PtxIntrinsic::redirect("half_add", half_add, None, Some(Sm52)),
    )?;
    registry.register_binary_arithmetic(
        BinaryArithmeticKind::Sub,
        BasicValueType::Float16,
        PtxIntrinsic::redirect("half_sub", half_sub, None, Some(Sm52)),
    )?;
    registry.register_binary_arithmetic(
        BinaryArithmeticKind::Mul,
        BasicValueType::Float16,
        PtxIntrinsic::redirect("half_mul", half_mul, None, Some(Sm52)),
    )?;
    registry.register_binary_arithmetic(
        BinaryArithmeticKind::Div,
        BasicValueType::Float16,
        PtxIntrinsic::redirect("half_div", half_div, None, None),
    )?;

    for (from, to) in REINTERPRET_PAIRS {
        registry.register_method(
            &reinterpret_method_name(from, to),
            PtxIntrinsic::generate("reinterpret", emit_reinterpret, None, None),
        )?;
    }
    Ok(())
}

// Redirect routine builders.
//
// Routine parameters follow the operand order of the substituted operation.
// Each builder is idempotent: routines are looked up by name before building.

fn atomic_add_f64(
    ctx: &mut IrContext,
    _func: &Function,
    _value: ValueId,
) -> CompileResult<MethodId> {
    build_float_atomic(ctx, BinaryArithmeticKind::Add, BasicValueType::Float64)
}

fn atomic_min_f32(
    ctx: &mut IrContext,
    _func: &Function,
    _value: ValueId,
) -> CompileResult<MethodId> {
    build_float_atomic(ctx, BinaryArithmeticKind::Min, BasicValueType::Float32)
}

fn atomic_max_f32(
    ctx: &mut IrContext,
    _func: &Function,
    _value: ValueId,
) -> CompileResult<MethodId> {
    build_float_atomic(ctx, BinaryArithmeticKind::Max, BasicValueType::Float32)
}

fn atomic_min_f64(
    ctx: &mut IrContext,
    _func: &Function,
    _value: ValueId,
) -> CompileResult<MethodId> {
    build_float_atomic(ctx, BinaryArithmeticKind::Min, BasicValueType::Float64)
}

fn atomic_max_f64(
    ctx: &mut IrContext,
    _func: &Function,
    _value: ValueId,
) -> CompileResult<MethodId> {
    build_float_atomic(ctx, BinaryArithmeticKind::Max, BasicValueType::Float64)
}

/// CAS-loop emulation of a float read-modify-write atomic.
///
/// The loop compares raw bits, not float values, so stores of NaN or negative
/// zero cannot spin forever. Returns the previous memory contents, matching
/// hardware `atom` semantics.
fn build_float_atomic(
    ctx: &mut IrContext,
    kind: BinaryArithmeticKind,
    basic: BasicValueType,
) -> CompileResult<MethodId> {
    let op_name = match kind {
        BinaryArithmeticKind::Add => "add",
        BinaryArithmeticKind::Min => "min",
        BinaryArithmeticKind::Max => "max",
        other => {
            return Err(CompileError::NotSupported {
                reason: format!("no software atomic for {other:?}"),
            })
        }
    };
    let name = format!("ptx.atomic_{op_name}_{basic}");
    if let Some(existing) = ctx.find_method(&name) {
        return Ok(existing);
    }

    let container = basic.bit_container();
    let elem = ctx.types_mut().primitive(basic);
    let container_ty = ctx.types_mut().primitive(container);
    let ptr = ctx.types_mut().pointer(elem, AddressSpace::Generic);

    let mut b = FunctionBuilder::device(ctx, &name, Some(elem));
    let target = b.add_param(ptr);
    let value = b.add_param(elem);

    let (entry, _) = b.create_block(&[]);
    let (body, body_params) = b.create_block(&[container_ty]);
    let (exit, exit_params) = b.create_block(&[container_ty]);

    b.switch_to(entry);
    let bits_ptr = b.pointer_cast(target, container_ty);
    let initial = b.load(bits_ptr);
    b.branch(body, &[initial]);

    b.switch_to(body);
    let expected = body_params[0];
    let current = b.reinterpret(expected, basic);
    let combined = b.binary(kind, current, value);
    let combined_bits = b.reinterpret(combined, container);
    let witnessed = b.atomic_cas(bits_ptr, expected, combined_bits);
    let done = b.compare(CompareKind::Eq, witnessed, expected);
    b.cond_branch(done, exit, &[witnessed], body, &[witnessed]);

    b.switch_to(exit);
    let old = b.reinterpret(exit_params[0], basic);
    b.ret(Some(old));
    Ok(b.finish())
}

fn group_broadcast(
    ctx: &mut IrContext,
    func: &Function,
    value: ValueId,
) -> CompileResult<MethodId> {
    let basic = broadcast_operand_type(ctx, func, value)?;
    build_group_broadcast(ctx, basic)
}

fn warp_broadcast(
    ctx: &mut IrContext,
    func: &Function,
    value: ValueId,
) -> CompileResult<MethodId> {
    let basic = broadcast_operand_type(ctx, func, value)?;
    if basic.bit_width() != 32 {
        return Err(CompileError::NotSupported {
            reason: format!("warp broadcast of {basic} needs a 32-bit operand"),
        });
    }
    build_warp_broadcast(ctx, basic)
}

fn broadcast_operand_type(
    ctx: &IrContext,
    func: &Function,
    value: ValueId,
) -> CompileResult<BasicValueType> {
    let Op::Broadcast { value: source, .. } = func.op(value) else {
        return Err(CompileError::CodeGeneration {
            reason: "broadcast builder invoked on a non-broadcast value".to_string(),
        });
    };
    func.value_type(*source)
        .and_then(|ty| ctx.types().basic_type(ty))
        .ok_or_else(|| CompileError::NotSupported {
            reason: "broadcast of a non-primitive value".to_string(),
        })
}

/// Group broadcast through a one-element shared slot: barrier, origin thread
/// stores, barrier, everyone loads.
fn build_group_broadcast(ctx: &mut IrContext, basic: BasicValueType) -> CompileResult<MethodId> {
    let name = format!("ptx.group_broadcast_{basic}");
    if let Some(existing) = ctx.find_method(&name) {
        return Ok(existing);
    }
    let elem = ctx.types_mut().primitive(basic);
    let i32t = ctx.types_mut().primitive(BasicValueType::Int32);

    let mut b = FunctionBuilder::device(ctx, &name, Some(elem));
    let value = b.add_param(elem);
    let origin = b.add_param(i32t);

    let (entry, _) = b.create_block(&[]);
    let (write, _) = b.create_block(&[]);
    let (join, _) = b.create_block(&[]);

    b.switch_to(entry);
    b.barrier();
    let slot = b.shared_alloc(elem, 1);
    let tid = b.thread(ThreadValue::GroupThreadIndex);
    let at_origin = b.compare(CompareKind::Eq, tid, origin);
    b.cond_branch(at_origin, write, &[], join, &[]);

    b.switch_to(write);
    b.store(slot, value);
    b.branch(join, &[]);

    b.switch_to(join);
    b.barrier();
    let result = b.load(slot);
    b.ret(Some(result));
    Ok(b.finish())
}

/// Warp broadcast is an index shuffle from the origin lane. On legacy
/// targets the shuffle inside re-resolves to the legacy emission callback.
fn build_warp_broadcast(ctx: &mut IrContext, basic: BasicValueType) -> CompileResult<MethodId> {
    let name = format!("ptx.warp_broadcast_{basic}");
    if let Some(existing) = ctx.find_method(&name) {
        return Ok(existing);
    }
    let elem = ctx.types_mut().primitive(basic);
    let i32t = ctx.types_mut().primitive(BasicValueType::Int32);

    let mut b = FunctionBuilder::device(ctx, &name, Some(elem));
    let value = b.add_param(elem);
    let origin = b.add_param(i32t);
    let (entry, _) = b.create_block(&[]);
    b.switch_to(entry);
    let result = b.shuffle(ShuffleKind::Idx, value, origin);
    b.ret(Some(result));
    Ok(b.finish())
}

fn ctz_i32(ctx: &mut IrContext, _func: &Function, _value: ValueId) -> CompileResult<MethodId> {
    build_ctz(ctx, BasicValueType::Int32)
}

fn ctz_i64(ctx: &mut IrContext, _func: &Function, _value: ValueId) -> CompileResult<MethodId> {
    build_ctz(ctx, BasicValueType::Int64)
}

/// `ctz(x) = popc(~x & (x - 1))`; `popc` lowers natively everywhere.
fn build_ctz(ctx: &mut IrContext, basic: BasicValueType) -> CompileResult<MethodId> {
    let name = format!("ptx.ctz_{basic}");
    if let Some(existing) = ctx.find_method(&name) {
        return Ok(existing);
    }
    let elem = ctx.types_mut().primitive(basic);

    let mut b = FunctionBuilder::device(ctx, &name, Some(elem));
    let x = b.add_param(elem);
    let (entry, _) = b.create_block(&[]);
    b.switch_to(entry);
    let inverted = b.unary(UnaryArithmeticKind::Not, x);
    let one = b.const_int(basic, 1);
    let below = b.binary(BinaryArithmeticKind::Sub, x, one);
    let mask = b.binary(BinaryArithmeticKind::And, inverted, below);
    let count = b.unary(UnaryArithmeticKind::PopCount, mask);
    b.ret(Some(count));
    Ok(b.finish())
}

fn half_add(ctx: &mut IrContext, _func: &Function, _value: ValueId) -> CompileResult<MethodId> {
    build_half_binary(ctx, BinaryArithmeticKind::Add)
}

fn half_sub(ctx: &mut IrContext, _func: &Function, _value: ValueId) -> CompileResult<MethodId> {
    build_half_binary(ctx, BinaryArithmeticKind::Sub)
}

fn half_mul(ctx: &mut IrContext, _func: &Function, _value: ValueId) -> CompileResult<MethodId> {
    build_half_binary(ctx, BinaryArithmeticKind::Mul)
}

fn half_div(ctx: &mut IrContext, _func: &Function, _value: ValueId) -> CompileResult<MethodId> {
    build_half_binary(ctx, BinaryArithmeticKind::Div)
}

/// Half arithmetic as widen, operate in `f32`, narrow back.
fn build_half_binary(ctx: &mut IrContext, kind: BinaryArithmeticKind) -> CompileResult<MethodId> {
    let op_name = match kind {
        BinaryArithmeticKind::Add => "add",
        BinaryArithmeticKind::Sub => "sub",
        BinaryArithmeticKind::Mul => "mul",
        BinaryArithmeticKind::Div => "div",
        other => {
            return Err(CompileError::NotSupported {
                reason: format!("no widened half routine for {other:?}"),
            })
        }
    };
    let name = format!("ptx.half_{op_name}");
    if let Some(existing) = ctx.find_method(&name) {
        return Ok(existing);
    }
    let half = ctx.types_mut().primitive(BasicValueType::Float16);

    let mut b = FunctionBuilder::device(ctx, &name, Some(half));
    let lhs = b.add_param(half);
    let rhs = b.add_param(half);
    let (entry, _) = b.create_block(&[]);
    b.switch_to(entry);
    let wide_lhs = b.convert(lhs, BasicValueType::Float32);
    let wide_rhs = b.convert(rhs, BasicValueType::Float32);
    let wide = b.binary(kind, wide_lhs, wide_rhs);
    let narrow = b.convert(wide, BasicValueType::Float16);
    b.ret(Some(narrow));
    Ok(b.finish())
}

// Emission callbacks.

/// Pre-`sm_70` shuffle: the unguarded `shfl` instruction. The last operand
/// packs the lane clamp; `up` clamps at lane 0, the rest at lane 31.
fn emit_legacy_shuffle(
    gen: &mut PtxCodeGenerator<'_, '_>,
    value: ValueId,
) -> CompileResult<()> {
    let (kind, source, origin) = match gen.function().op(value) {
        Op::Shuffle {
            kind,
            value: source,
            origin,
        } => (*kind, *source, *origin),
        _ => {
            return Err(CompileError::CodeGeneration {
                reason: "shuffle callback invoked on a non-shuffle value".to_string(),
            })
        }
    };
    let basic = gen.value_basic_type(source)?;
    if basic.bit_width() != 32 {
        return Err(CompileError::NotSupported {
            reason: format!("warp shuffle of {basic} needs a 32-bit operand"),
        });
    }
    let mode = match kind {
        ShuffleKind::Idx => "idx",
        ShuffleKind::Up => "up",
        ShuffleKind::Down => "down",
        ShuffleKind::Bfly => "bfly",
    };
    let clamp: u32 = match kind {
        ShuffleKind::Up => 0x0,
        _ => 0x1f,
    };
    let dest = gen.allocate_primitive(value)?;
    let a = gen.load_primitive(source)?;
    let b = gen.load_primitive(origin)?;
    gen.emit(&format!(
        "shfl.{mode}.b32 {}, {}, {}, {:#x};",
        register_name(dest),
        register_name(a),
        register_name(b),
        clamp
    ));
    Ok(())
}

/// Reinterpret methods move bits between registers. Same register class
/// means a pure rebind with no instruction; across classes a `mov.bNN`.
fn emit_reinterpret(gen: &mut PtxCodeGenerator<'_, '_>, value: ValueId) -> CompileResult<()> {
    let args = match gen.function().op(value) {
        Op::Call { args, .. } => args.clone(),
        _ => {
            return Err(CompileError::CodeGeneration {
                reason: "reinterpret callback invoked on a non-call value".to_string(),
            })
        }
    };
    let &[source] = args.as_slice() else {
        return Err(CompileError::CodeGeneration {
            reason: "reinterpret takes exactly one argument".to_string(),
        });
    };
    gen.reinterpret_value(value, source)
}
