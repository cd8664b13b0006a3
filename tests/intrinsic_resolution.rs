//! Intrinsic registry behavior through the backend.
//!
//! The unit tests pin the resolution rules in isolation; these tests cover
//! the registry as users meet it: custom registrations layered over the
//! shipped table, generation callbacks firing during emission, and the
//! silent native fallback when nothing matches.

use bumpalo::Bump;
use gridline::core::{CompilationSession, CompileError, CompileResult};
use gridline::ir::{
    AddressSpace, AtomicKind, BasicValueType, FunctionBuilder, IrContext, MethodId, Op, ValueId,
};
use gridline::ptx::{
    pointer_register_name, register_name, PtxBackend, PtxCodeGenerator, PtxIntrinsic,
    PtxTargetConfig, SmArchitecture,
};

fn atomic_add_f64_kernel(ctx: &mut IrContext) -> MethodId {
    let mut b = FunctionBuilder::kernel(ctx, "accumulate");
    let f64t = b.types().primitive(BasicValueType::Float64);
    let ptr = b.types().pointer(f64t, AddressSpace::Generic);
    let target = b.add_param(ptr);
    let value = b.add_param(f64t);
    let (entry, _) = b.create_block(&[]);
    b.switch_to(entry);
    b.atomic_rmw(AtomicKind::Add, target, value);
    b.ret(None);
    b.finish()
}

fn emit_lane_id(gen: &mut PtxCodeGenerator<'_, '_>, value: ValueId) -> CompileResult<()> {
    let dest = gen.allocate_primitive(value)?;
    gen.emit(&format!("mov.u32 {}, %laneid;", register_name(dest)));
    Ok(())
}

/// Pretends the target has a native f64 atomic add regardless of
/// generation; stands in for a vendor-specific workaround.
fn emit_forced_native_add(gen: &mut PtxCodeGenerator<'_, '_>, value: ValueId) -> CompileResult<()> {
    let op = gen.function().op(value).clone();
    let Op::AtomicRmw { target, value: source, .. } = op else {
        return Err(CompileError::CodeGeneration {
            reason: "callback expects an atomic site".to_string(),
        });
    };
    let ptr = gen.load_pointer(target)?;
    let src = gen.load_primitive(source)?;
    let dest = gen.allocate_primitive(value)?;
    gen.emit(&format!(
        "atom.add.f64 {}, [{}], {};",
        register_name(dest),
        pointer_register_name(ptr),
        register_name(src)
    ));
    Ok(())
}

#[test]
fn test_custom_method_callbacks_emit_inline() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut ctx = IrContext::new();
    let u32t = ctx.types_mut().primitive(BasicValueType::UInt32);
    let lane = ctx.declare_method("platform.lane", Vec::new(), Some(u32t));

    let mut b = FunctionBuilder::kernel(&mut ctx, "which_lane");
    let u32t = b.types().primitive(BasicValueType::UInt32);
    let ptr = b.types().pointer(u32t, AddressSpace::Generic);
    let out = b.add_param(ptr);
    let (entry, _) = b.create_block(&[]);
    b.switch_to(entry);
    let id = b.call(lane, &[]);
    b.store(out, id);
    b.ret(None);
    let method = b.finish();

    let mut backend = PtxBackend::new(PtxTargetConfig::new(SmArchitecture::Sm70)).unwrap();
    backend
        .registry_mut()
        .register_method(
            "platform.lane",
            PtxIntrinsic::generate("platform_lane", emit_lane_id, None, None),
        )
        .unwrap();

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let ptx = backend.compile_kernel(&mut ctx, method, &session).unwrap();

    assert!(ptx.contains("mov.u32 %r1, %laneid;"), "{ptx}");
    assert_eq!(session.stats().callbacks_invoked, 1);

    println!("✅ custom method callback emitted inline");
}

#[test]
fn test_unregistered_declarations_do_not_compile() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut ctx = IrContext::new();
    let u32t = ctx.types_mut().primitive(BasicValueType::UInt32);
    let mystery = ctx.declare_method("platform.mystery", Vec::new(), Some(u32t));

    let mut b = FunctionBuilder::kernel(&mut ctx, "undefined_call");
    let u32t = b.types().primitive(BasicValueType::UInt32);
    let ptr = b.types().pointer(u32t, AddressSpace::Generic);
    let out = b.add_param(ptr);
    let (entry, _) = b.create_block(&[]);
    b.switch_to(entry);
    let id = b.call(mystery, &[]);
    b.store(out, id);
    b.ret(None);
    let method = b.finish();

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let backend = PtxBackend::new(PtxTargetConfig::new(SmArchitecture::Sm70)).unwrap();
    let err = backend
        .compile_kernel(&mut ctx, method, &session)
        .unwrap_err();
    assert!(matches!(err, CompileError::NotSupported { .. }), "{err}");
}

#[test]
fn test_narrower_registrations_override_the_shipped_table() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut ctx = IrContext::new();
    let method = atomic_add_f64_kernel(&mut ctx);

    let mut backend = PtxBackend::new(PtxTargetConfig::new(SmArchitecture::Sm52)).unwrap();
    backend
        .registry_mut()
        .register_generic_atomic(
            AtomicKind::Add,
            BasicValueType::Float64,
            PtxIntrinsic::generate(
                "forced_native_add",
                emit_forced_native_add,
                Some(SmArchitecture::Sm52),
                Some(SmArchitecture::Sm52),
            ),
        )
        .unwrap();

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let ptx = backend.compile_kernel(&mut ctx, method, &session).unwrap();

    // The single-architecture registration is narrower than the shipped
    // CAS-loop redirect, so it wins at sm_52.
    assert!(ptx.contains("atom.add.f64"), "{ptx}");
    assert!(!ptx.contains("atom.cas"));
    assert_eq!(session.stats().callbacks_invoked, 1);
    assert_eq!(session.stats().redirects_inlined, 0);
}

#[test]
fn test_range_maxima_are_inclusive() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut ctx = IrContext::new();
    let method = atomic_add_f64_kernel(&mut ctx);

    // sm_53 is the last architecture inside the shipped redirect's range.
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let backend = PtxBackend::new(PtxTargetConfig::new(SmArchitecture::Sm53)).unwrap();
    let ptx = backend.compile_kernel(&mut ctx, method, &session).unwrap();
    assert!(ptx.contains("atom.cas.b64"), "{ptx}");
    assert_eq!(session.stats().redirects_inlined, 1);
}

#[test]
fn test_inverted_ranges_surface_a_registration_error() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut backend = PtxBackend::new(PtxTargetConfig::new(SmArchitecture::Sm70)).unwrap();
    let err = backend
        .registry_mut()
        .register_method(
            "platform.backwards",
            PtxIntrinsic::generate(
                "backwards",
                emit_lane_id,
                Some(SmArchitecture::Sm70),
                Some(SmArchitecture::Sm60),
            ),
        )
        .unwrap_err();
    assert!(matches!(err, CompileError::InvalidArchitectureRange { .. }));
}
