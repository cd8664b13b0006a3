// This module implements PTX emission for a specialized kernel function. The
// generator walks blocks in reverse post order, allocates backend variables
// for values as they are lowered, and appends textual instructions to the
// kernel body. Operations first consult the intrinsic registry: a
// GenerateCode-mode hit hands the site to the implementation's callback, a
// Redirect-mode hit at this stage is an internal error (the specializer runs
// first), and a miss lowers natively. Register declarations are derived from
// the allocator's log after the walk, grouped by register class; shared
// allocations collect `.shared` directives. Branch arguments become register
// moves on the edge, staged through scratch registers when target and source
// registers overlap.

//! PTX code generation.

use hashbrown::{HashMap, HashSet};

use crate::core::error::{CompileError, CompileResult};
use crate::core::intrinsics::{intrinsic_key_for, IntrinsicRegistry};
use crate::core::session::CompilationSession;
use crate::core::variables::{
    PointerVariable, PrimitiveVariable, Variable, VariableAllocator, ViewVariable,
};
use crate::ir::types::{AddressSpace, BasicValueType, TypeContext, TypeNode};
use crate::ir::{
    AtomicKind, BinaryArithmeticKind, BlockId, CompareKind, Constant, Function, IrContext,
    MethodKind, Op, ShuffleKind, Terminator, ThreadValue, UnaryArithmeticKind, ValueId,
};
use crate::ptx::intrinsics::PtxIntrinsic;
use crate::ptx::target::{PtxTargetConfig, SmArchitecture};

/// Emits one kernel. Construct per function, then call [`generate`].
///
/// [`generate`]: PtxCodeGenerator::generate
pub struct PtxCodeGenerator<'a, 'arena> {
    config: PtxTargetConfig,
    registry: &'a IntrinsicRegistry<PtxIntrinsic>,
    session: &'a CompilationSession<'arena>,
    ctx: &'a IrContext,
    func: &'a Function,
    allocator: VariableAllocator<'a>,
    body: String,
    shared: Vec<SharedAllocation>,
    /// Block labels, interned up front; referenced once per definition and
    /// once per incoming branch.
    labels: Vec<&'arena str>,
}

struct SharedAllocation {
    name: String,
    bytes: u32,
    align: u32,
}

/// One register copy on a branch edge.
struct RegMove {
    dest: String,
    src: String,
    suffix: &'static str,
    class: RegisterClass,
    dest_id: u32,
    src_id: u32,
}

impl<'a, 'arena> PtxCodeGenerator<'a, 'arena> {
    pub fn new(
        config: PtxTargetConfig,
        registry: &'a IntrinsicRegistry<PtxIntrinsic>,
        session: &'a CompilationSession<'arena>,
        ctx: &'a IrContext,
        func: &'a Function,
    ) -> Self {
        let labels = (0..func.block_count())
            .map(|index| session.intern_str(&format!("LBB_{index}")))
            .collect();
        Self {
            config,
            registry,
            session,
            ctx,
            func,
            allocator: VariableAllocator::new(ctx.types(), func),
            body: String::new(),
            shared: Vec::new(),
            labels,
        }
    }

    /// Lower the whole kernel and return the PTX module text.
    pub fn generate(mut self) -> CompileResult<String> {
        if self.func.kind != MethodKind::Kernel {
            return Err(CompileError::CodeGeneration {
                reason: format!("'{}' is not a kernel entry point", self.func.name),
            });
        }
        let params = self.lower_prologue()?;
        let func = self.func;
        for block in func.reverse_post_order() {
            self.start_block(block)?;
            for &value in &func.block(block).values {
                self.lower_value(value)?;
            }
            self.lower_terminator(block)?;
        }
        let text = self.assemble(&params);
        self.session
            .record_kernel_compiled(&self.func.name, text.len());
        self.session
            .record_variables_allocated(self.allocator.allocation_count());
        Ok(text)
    }

    // Callback surface. GenerateCode implementations drive emission through
    // these rather than touching the allocator or body directly.

    pub fn function(&self) -> &'a Function {
        self.func
    }

    pub fn types(&self) -> &'a TypeContext {
        self.ctx.types()
    }

    pub fn architecture(&self) -> SmArchitecture {
        self.config.architecture
    }

    /// The primitive type of `value`, or an error for untyped and aggregate
    /// values.
    pub fn value_basic_type(&self, value: ValueId) -> CompileResult<BasicValueType> {
        self.func
            .value_type(value)
            .and_then(|ty| self.ctx.types().basic_type(ty))
            .ok_or_else(|| CompileError::CodeGeneration {
                reason: format!("value {value:?} is not primitive-typed"),
            })
    }

    pub fn load_variable(&self, value: ValueId) -> CompileResult<Variable> {
        self.allocator.load(value)
    }

    pub fn load_primitive(&self, value: ValueId) -> CompileResult<PrimitiveVariable> {
        self.allocator.load_as::<PrimitiveVariable>(value)
    }

    pub fn load_pointer(&self, value: ValueId) -> CompileResult<PointerVariable> {
        self.allocator.load_as::<PointerVariable>(value)
    }

    pub fn allocate_value(&mut self, value: ValueId) -> CompileResult<Variable> {
        self.allocator.allocate(value)
    }

    pub fn allocate_primitive(&mut self, value: ValueId) -> CompileResult<PrimitiveVariable> {
        match self.allocator.allocate(value)? {
            Variable::Primitive(p) => Ok(p),
            other => Err(CompileError::InvalidCodeGeneration {
                value,
                expected: "primitive",
                found: other.kind_name(),
            }),
        }
    }

    pub fn bind(&mut self, value: ValueId, variable: Variable) {
        self.allocator.bind(value, variable);
    }

    /// Append one instruction line to the kernel body.
    pub fn emit(&mut self, text: &str) {
        self.session.record_instruction_emitted(mnemonic_of(text));
        self.body.push_str("    ");
        self.body.push_str(text);
        self.body.push('\n');
    }

    /// Rebind `value` to `source`'s register when the register class carries
    /// over, otherwise move the bits. Shared between the native reinterpret
    /// operation and the named reinterpret methods.
    pub fn reinterpret_value(&mut self, value: ValueId, source: ValueId) -> CompileResult<()> {
        let dest_type = self.value_basic_type(value)?;
        let src = self.load_primitive(source)?;
        if register_class(src.basic_type) == register_class(dest_type) {
            self.bind(
                value,
                Variable::Primitive(PrimitiveVariable {
                    id: src.id,
                    basic_type: dest_type,
                }),
            );
        } else {
            let dest = self.allocate_primitive(value)?;
            self.emit(&format!(
                "mov.b{} {}, {};",
                dest_type.bit_width(),
                register_name(dest),
                register_name(src)
            ));
        }
        Ok(())
    }

    // Prologue: parameter directives plus their loads. Views take two
    // parameter slots, the base address and the 32-bit length.

    fn lower_prologue(&mut self) -> CompileResult<Vec<String>> {
        let func = self.func;
        let mut directives = Vec::new();
        for (index, &value) in func.params.iter().enumerate() {
            let name = format!("{}_param_{}", func.name, index);
            match self.allocator.allocate(value)? {
                Variable::Primitive(p) => {
                    if p.basic_type == BasicValueType::Int1 {
                        return Err(CompileError::NotSupported {
                            reason: "predicate kernel parameters".to_string(),
                        });
                    }
                    let suffix = param_suffix(p.basic_type);
                    directives.push(format!("    .param .{suffix} {name}"));
                    self.emit(&format!(
                        "ld.param.{suffix} {}, [{name}];",
                        register_name(p)
                    ));
                }
                Variable::Pointer(p) => {
                    directives.push(format!("    .param .u64 {name}"));
                    self.emit(&format!(
                        "ld.param.u64 {}, [{name}];",
                        pointer_register_name(p)
                    ));
                }
                Variable::View(v) => {
                    directives.push(format!("    .param .u64 {name}"));
                    directives.push(format!("    .param .u32 {name}_len"));
                    self.emit(&format!(
                        "ld.param.u64 {}, [{name}];",
                        pointer_register_name(v.pointer)
                    ));
                    self.emit(&format!(
                        "ld.param.u32 {}, [{name}_len];",
                        register_name(v.length)
                    ));
                }
                Variable::Object(_) => {
                    return Err(CompileError::NotSupported {
                        reason: "structure kernel parameters".to_string(),
                    });
                }
            }
        }
        Ok(directives)
    }

    fn label(&self, block: BlockId) -> &'arena str {
        self.labels[block.index()]
    }

    fn start_block(&mut self, block: BlockId) -> CompileResult<()> {
        let text = format!("{}:\n", self.label(block));
        self.body.push_str(&text);
        let func = self.func;
        for &param in &func.block(block).params {
            self.allocator.allocate(param)?;
        }
        Ok(())
    }

    fn lower_value(&mut self, value: ValueId) -> CompileResult<()> {
        self.session.record_value_lowered();
        if let Some(key) = intrinsic_key_for(self.ctx, self.func, value) {
            if let Some(imp) = self.registry.resolve(&key, self.config.architecture) {
                if let Some(emit) = imp.emit_callback() {
                    self.session.record_callback_invoked();
                    return emit(self, value);
                }
                return Err(CompileError::CodeGeneration {
                    reason: format!(
                        "redirect intrinsic '{}' survived specialization",
                        imp.name()
                    ),
                });
            }
        }
        self.lower_native(value)
    }

    fn lower_native(&mut self, value: ValueId) -> CompileResult<()> {
        let func = self.func;
        match func.op(value) {
            Op::Param { .. } | Op::BlockParam { .. } => {
                self.allocator.allocate(value)?;
                Ok(())
            }
            Op::Nop => Ok(()),
            Op::Constant(constant) => self.lower_constant(value, *constant),
            Op::Thread(source) => self.lower_thread(value, *source),
            Op::Unary { kind, value: v } => self.lower_unary(value, *kind, *v),
            Op::Binary { kind, lhs, rhs } => self.lower_binary(value, *kind, *lhs, *rhs),
            Op::Compare { kind, lhs, rhs } => self.lower_compare(value, *kind, *lhs, *rhs),
            Op::Convert { value: v } => self.lower_convert(value, *v),
            Op::Reinterpret { value: v } => self.reinterpret_value(value, *v),
            Op::PointerCast { value: v } => self.lower_pointer_cast(value, *v),
            Op::Load { address } => self.lower_load(value, *address),
            Op::Store { address, value: v } => self.lower_store(*address, *v),
            Op::ElementAddress { source, index } => {
                self.lower_element_address(value, *source, *index)
            }
            Op::ViewLength { view } => {
                let view = self.allocator.load_as::<ViewVariable>(*view)?;
                self.allocator.bind(value, Variable::Primitive(view.length));
                Ok(())
            }
            Op::SharedAlloc { count } => self.lower_shared_alloc(value, *count),
            Op::AtomicRmw {
                kind,
                target,
                value: v,
            } => self.lower_atomic_rmw(value, *kind, *target, *v),
            Op::AtomicCas {
                target,
                compare,
                value: v,
            } => self.lower_atomic_cas(value, *target, *compare, *v),
            Op::Shuffle {
                kind,
                value: v,
                origin,
            } => self.lower_shuffle(value, *kind, *v, *origin),
            Op::Barrier => {
                self.emit("bar.sync 0;");
                Ok(())
            }
            Op::Select {
                cond,
                true_value,
                false_value,
            } => self.lower_select(value, *cond, *true_value, *false_value),
            Op::Broadcast { .. } => Err(CompileError::CodeGeneration {
                reason: "broadcast requires a registered implementation".to_string(),
            }),
            Op::Call { .. } => Err(CompileError::CodeGeneration {
                reason: "call survived specialization".to_string(),
            }),
        }
    }

    fn lower_constant(&mut self, value: ValueId, constant: Constant) -> CompileResult<()> {
        let dest = self.allocate_primitive(value)?;
        let d = register_name(dest);
        let text = match constant {
            Constant::Int(basic, bits) => match register_class(basic) {
                RegisterClass::Pred => {
                    format!("mov.pred {d}, {};", if bits != 0 { 1 } else { 0 })
                }
                _ if basic.is_signed() => {
                    format!("mov.{} {d}, {bits};", arith_type(basic))
                }
                _ => {
                    let width = basic.bit_width();
                    let masked = if width >= 64 {
                        bits as u64
                    } else {
                        (bits as u64) & ((1u64 << width) - 1)
                    };
                    format!("mov.{} {d}, {masked};", arith_type(basic))
                }
            },
            Constant::Float16(bits) => format!("mov.b16 {d}, 0x{bits:04X};"),
            Constant::Float32(v) => format!("mov.f32 {d}, {};", float32_literal(v)),
            Constant::Float64(v) => format!("mov.f64 {d}, {};", float64_literal(v)),
        };
        self.emit(&text);
        Ok(())
    }

    fn lower_thread(&mut self, value: ValueId, source: ThreadValue) -> CompileResult<()> {
        let dest = self.allocate_primitive(value)?;
        let d = register_name(dest);
        match source {
            ThreadValue::LaneIndex => self.emit(&format!("mov.u32 {d}, %laneid;")),
            ThreadValue::GroupThreadIndex => self.emit(&format!("mov.u32 {d}, %tid.x;")),
            ThreadValue::GroupDimension => self.emit(&format!("mov.u32 {d}, %ntid.x;")),
            ThreadValue::GridIndex => self.emit(&format!("mov.u32 {d}, %ctaid.x;")),
            ThreadValue::WarpSize => self.emit(&format!("mov.u32 {d}, WARP_SZ;")),
            ThreadValue::GlobalThreadIndex => {
                let cta = self.allocator.allocate_basic(BasicValueType::Int32);
                let ntid = self.allocator.allocate_basic(BasicValueType::Int32);
                let tid = self.allocator.allocate_basic(BasicValueType::Int32);
                self.emit(&format!("mov.u32 {}, %ctaid.x;", register_name(cta)));
                self.emit(&format!("mov.u32 {}, %ntid.x;", register_name(ntid)));
                self.emit(&format!("mov.u32 {}, %tid.x;", register_name(tid)));
                self.emit(&format!(
                    "mad.lo.s32 {d}, {}, {}, {};",
                    register_name(cta),
                    register_name(ntid),
                    register_name(tid)
                ));
            }
        }
        Ok(())
    }

    fn lower_unary(
        &mut self,
        value: ValueId,
        kind: UnaryArithmeticKind,
        operand: ValueId,
    ) -> CompileResult<()> {
        let a = self.load_primitive(operand)?;
        let basic = a.basic_type;
        let dest = self.allocate_primitive(value)?;
        let d = register_name(dest);
        let s = register_name(a);
        match kind {
            UnaryArithmeticKind::Neg => {
                if basic == BasicValueType::Float16 {
                    return Err(CompileError::NotSupported {
                        reason: "half-precision negation".to_string(),
                    });
                }
                let suffix = if basic.is_float() {
                    arith_type(basic).to_string()
                } else {
                    format!("s{}", arith_width(basic))
                };
                self.emit(&format!("neg.{suffix} {d}, {s};"));
            }
            UnaryArithmeticKind::Not => {
                if basic == BasicValueType::Int1 {
                    self.emit(&format!("not.pred {d}, {s};"));
                } else if basic.is_integer() {
                    self.emit(&format!("not.b{} {d}, {s};", arith_width(basic)));
                } else {
                    return Err(CompileError::NotSupported {
                        reason: "bitwise not on a float".to_string(),
                    });
                }
            }
            UnaryArithmeticKind::Abs => {
                if basic == BasicValueType::Float16 {
                    return Err(CompileError::NotSupported {
                        reason: "half-precision absolute value".to_string(),
                    });
                }
                let suffix = if basic.is_float() {
                    arith_type(basic).to_string()
                } else {
                    format!("s{}", arith_width(basic))
                };
                self.emit(&format!("abs.{suffix} {d}, {s};"));
            }
            UnaryArithmeticKind::PopCount | UnaryArithmeticKind::Clz => {
                let op = if kind == UnaryArithmeticKind::PopCount {
                    "popc"
                } else {
                    "clz"
                };
                match basic.bit_width() {
                    32 => self.emit(&format!("{op}.b32 {d}, {s};")),
                    64 => {
                        // The b64 forms write a 32-bit result.
                        let narrow = self.allocator.allocate_basic(BasicValueType::Int32);
                        self.emit(&format!("{op}.b64 {}, {s};", register_name(narrow)));
                        self.emit(&format!("cvt.u64.u32 {d}, {};", register_name(narrow)));
                    }
                    _ => {
                        return Err(CompileError::NotSupported {
                            reason: format!("{op} of a {basic} value"),
                        })
                    }
                }
            }
            UnaryArithmeticKind::Ctz => {
                return Err(CompileError::CodeGeneration {
                    reason: "ctz requires a registered implementation".to_string(),
                })
            }
        }
        Ok(())
    }

    fn lower_binary(
        &mut self,
        value: ValueId,
        kind: BinaryArithmeticKind,
        lhs: ValueId,
        rhs: ValueId,
    ) -> CompileResult<()> {
        let a = self.load_primitive(lhs)?;
        let b = self.load_primitive(rhs)?;
        let basic = a.basic_type;
        let dest = self.allocate_primitive(value)?;
        let d = register_name(dest);
        let ra = register_name(a);
        let rb = register_name(b);
        let is_float = basic.is_float();
        match kind {
            BinaryArithmeticKind::Add | BinaryArithmeticKind::Sub => {
                let op = if kind == BinaryArithmeticKind::Add {
                    "add"
                } else {
                    "sub"
                };
                self.emit(&format!("{op}.{} {d}, {ra}, {rb};", arith_type(basic)));
            }
            BinaryArithmeticKind::Mul => {
                if is_float {
                    self.emit(&format!("mul.{} {d}, {ra}, {rb};", arith_type(basic)));
                } else {
                    self.emit(&format!("mul.lo.{} {d}, {ra}, {rb};", arith_type(basic)));
                }
            }
            BinaryArithmeticKind::Div => match basic {
                BasicValueType::Float32 | BasicValueType::Float64 => {
                    self.emit(&format!("div.rn.{} {d}, {ra}, {rb};", arith_type(basic)));
                }
                BasicValueType::Float16 => {
                    return Err(CompileError::CodeGeneration {
                        reason: "half division requires a registered implementation".to_string(),
                    })
                }
                _ => self.emit(&format!("div.{} {d}, {ra}, {rb};", arith_type(basic))),
            },
            BinaryArithmeticKind::Rem => {
                if is_float {
                    return Err(CompileError::NotSupported {
                        reason: "floating-point remainder".to_string(),
                    });
                }
                self.emit(&format!("rem.{} {d}, {ra}, {rb};", arith_type(basic)));
            }
            BinaryArithmeticKind::Min | BinaryArithmeticKind::Max => {
                if basic == BasicValueType::Float16 {
                    return Err(CompileError::NotSupported {
                        reason: "half-precision min/max".to_string(),
                    });
                }
                let op = if kind == BinaryArithmeticKind::Min {
                    "min"
                } else {
                    "max"
                };
                self.emit(&format!("{op}.{} {d}, {ra}, {rb};", arith_type(basic)));
            }
            BinaryArithmeticKind::And | BinaryArithmeticKind::Or | BinaryArithmeticKind::Xor => {
                let op = match kind {
                    BinaryArithmeticKind::And => "and",
                    BinaryArithmeticKind::Or => "or",
                    _ => "xor",
                };
                if basic == BasicValueType::Int1 {
                    self.emit(&format!("{op}.pred {d}, {ra}, {rb};"));
                } else if basic.is_integer() {
                    self.emit(&format!("{op}.b{} {d}, {ra}, {rb};", arith_width(basic)));
                } else {
                    return Err(CompileError::NotSupported {
                        reason: "bitwise arithmetic on a float".to_string(),
                    });
                }
            }
            BinaryArithmeticKind::Shl | BinaryArithmeticKind::Shr => {
                if !basic.is_integer() || basic == BasicValueType::Int1 {
                    return Err(CompileError::NotSupported {
                        reason: format!("shift of a {basic} value"),
                    });
                }
                let amount = self.shift_amount_register(b)?;
                if kind == BinaryArithmeticKind::Shl {
                    self.emit(&format!("shl.b{} {d}, {ra}, {amount};", arith_width(basic)));
                } else if basic.is_signed() {
                    self.emit(&format!("shr.s{} {d}, {ra}, {amount};", arith_width(basic)));
                } else {
                    self.emit(&format!("shr.u{} {d}, {ra}, {amount};", arith_width(basic)));
                }
            }
        }
        Ok(())
    }

    /// Shift amounts are 32-bit in PTX; wider sources are narrowed first.
    fn shift_amount_register(&mut self, amount: PrimitiveVariable) -> CompileResult<String> {
        if amount.basic_type.bit_width() == 32 {
            return Ok(register_name(amount));
        }
        let narrow = self.allocator.allocate_basic(BasicValueType::UInt32);
        self.emit(&format!(
            "cvt.u32.{} {}, {};",
            int_type_name(amount.basic_type)?,
            register_name(narrow),
            register_name(amount)
        ));
        Ok(register_name(narrow))
    }

    fn lower_compare(
        &mut self,
        value: ValueId,
        kind: CompareKind,
        lhs: ValueId,
        rhs: ValueId,
    ) -> CompileResult<()> {
        let cmp = compare_name(kind);
        let dest = self.allocate_primitive(value)?;
        let d = register_name(dest);
        let func = self.func;
        let lhs_ty = func.value_type(lhs).ok_or(CompileError::CodeGeneration {
            reason: "comparison of an untyped value".to_string(),
        })?;
        match self.ctx.types().node(lhs_ty) {
            TypeNode::Pointer { .. } => {
                let a = self.load_pointer(lhs)?;
                let b = self.load_pointer(rhs)?;
                self.emit(&format!(
                    "setp.{cmp}.u64 {d}, {}, {};",
                    pointer_register_name(a),
                    pointer_register_name(b)
                ));
            }
            TypeNode::Primitive(basic) => match basic {
                BasicValueType::Int1 => {
                    return Err(CompileError::NotSupported {
                        reason: "predicate comparison".to_string(),
                    })
                }
                BasicValueType::Float16 => {
                    // No setp.f16 across our ISA range; compare widened.
                    let a = self.load_primitive(lhs)?;
                    let b = self.load_primitive(rhs)?;
                    let wa = self.allocator.allocate_basic(BasicValueType::Float32);
                    let wb = self.allocator.allocate_basic(BasicValueType::Float32);
                    self.emit(&format!(
                        "cvt.f32.f16 {}, {};",
                        register_name(wa),
                        register_name(a)
                    ));
                    self.emit(&format!(
                        "cvt.f32.f16 {}, {};",
                        register_name(wb),
                        register_name(b)
                    ));
                    self.emit(&format!(
                        "setp.{cmp}.f32 {d}, {}, {};",
                        register_name(wa),
                        register_name(wb)
                    ));
                }
                basic => {
                    let a = self.load_primitive(lhs)?;
                    let b = self.load_primitive(rhs)?;
                    self.emit(&format!(
                        "setp.{cmp}.{} {d}, {}, {};",
                        arith_type(*basic),
                        register_name(a),
                        register_name(b)
                    ));
                }
            },
            _ => {
                return Err(CompileError::NotSupported {
                    reason: "comparison of aggregate values".to_string(),
                })
            }
        }
        Ok(())
    }

    fn lower_convert(&mut self, value: ValueId, source: ValueId) -> CompileResult<()> {
        let dest_type = self.value_basic_type(value)?;
        let src = self.load_primitive(source)?;
        let src_type = src.basic_type;
        if dest_type == src_type {
            self.bind(value, Variable::Primitive(src));
            return Ok(());
        }
        if dest_type == BasicValueType::Int1 {
            return self.lower_truth_test(value, src);
        }
        if src_type == BasicValueType::Int1 {
            return self.lower_predicate_select(value, src, dest_type);
        }
        let dest = self.allocate_primitive(value)?;
        self.emit(&format!(
            "{} {}, {};",
            cvt_instruction(dest_type, src_type)?,
            register_name(dest),
            register_name(src)
        ));
        Ok(())
    }

    /// `x != 0` into a predicate register.
    fn lower_truth_test(&mut self, value: ValueId, src: PrimitiveVariable) -> CompileResult<()> {
        let dest = self.allocate_primitive(value)?;
        let d = register_name(dest);
        match src.basic_type {
            BasicValueType::Float32 => self.emit(&format!(
                "setp.ne.f32 {d}, {}, 0f00000000;",
                register_name(src)
            )),
            BasicValueType::Float64 => self.emit(&format!(
                "setp.ne.f64 {d}, {}, 0d0000000000000000;",
                register_name(src)
            )),
            BasicValueType::Float16 => {
                let wide = self.allocator.allocate_basic(BasicValueType::Float32);
                self.emit(&format!(
                    "cvt.f32.f16 {}, {};",
                    register_name(wide),
                    register_name(src)
                ));
                self.emit(&format!(
                    "setp.ne.f32 {d}, {}, 0f00000000;",
                    register_name(wide)
                ));
            }
            basic => self.emit(&format!(
                "setp.ne.{} {d}, {}, 0;",
                arith_type(basic),
                register_name(src)
            )),
        }
        Ok(())
    }

    /// Predicate into 1/0 (or 1.0/0.0) of the destination type.
    fn lower_predicate_select(
        &mut self,
        value: ValueId,
        src: PrimitiveVariable,
        dest_type: BasicValueType,
    ) -> CompileResult<()> {
        let dest = self.allocate_primitive(value)?;
        let d = register_name(dest);
        let p = register_name(src);
        match dest_type {
            BasicValueType::Float32 => {
                self.emit(&format!("selp.f32 {d}, 0f3F800000, 0f00000000, {p};"))
            }
            BasicValueType::Float64 => self.emit(&format!(
                "selp.f64 {d}, 0d3FF0000000000000, 0d0000000000000000, {p};"
            )),
            BasicValueType::Float16 => {
                self.emit(&format!("selp.b16 {d}, 0x3C00, 0x0000, {p};"))
            }
            basic => self.emit(&format!("selp.b{} {d}, 1, 0, {p};", arith_width(basic))),
        }
        Ok(())
    }

    fn lower_pointer_cast(&mut self, value: ValueId, source: ValueId) -> CompileResult<()> {
        let src = self.load_pointer(source)?;
        let ty = self.func.value_type(value).ok_or(CompileError::CodeGeneration {
            reason: "untyped pointer cast".to_string(),
        })?;
        let TypeNode::Pointer { element, .. } = self.ctx.types().node(ty) else {
            return Err(CompileError::CodeGeneration {
                reason: "pointer cast to a non-pointer type".to_string(),
            });
        };
        self.bind(
            value,
            Variable::Pointer(PointerVariable {
                id: src.id,
                element: *element,
                space: src.space,
            }),
        );
        Ok(())
    }

    fn lower_load(&mut self, value: ValueId, address: ValueId) -> CompileResult<()> {
        let ptr = self.load_pointer(address)?;
        let space = space_qualifier(ptr.space);
        match self.allocator.allocate(value)? {
            Variable::Primitive(d) => {
                let suffix = memory_suffix(d.basic_type, true)?;
                self.emit(&format!(
                    "ld{space}.{suffix} {}, [{}];",
                    register_name(d),
                    pointer_register_name(ptr)
                ));
            }
            Variable::Pointer(d) => {
                self.emit(&format!(
                    "ld{space}.u64 {}, [{}];",
                    pointer_register_name(d),
                    pointer_register_name(ptr)
                ));
            }
            _ => {
                return Err(CompileError::NotSupported {
                    reason: "aggregate load".to_string(),
                })
            }
        }
        Ok(())
    }

    fn lower_store(&mut self, address: ValueId, source: ValueId) -> CompileResult<()> {
        let ptr = self.load_pointer(address)?;
        let space = space_qualifier(ptr.space);
        match self.allocator.load(source)? {
            Variable::Primitive(s) => {
                let suffix = memory_suffix(s.basic_type, false)?;
                self.emit(&format!(
                    "st{space}.{suffix} [{}], {};",
                    pointer_register_name(ptr),
                    register_name(s)
                ));
            }
            Variable::Pointer(s) => {
                self.emit(&format!(
                    "st{space}.u64 [{}], {};",
                    pointer_register_name(ptr),
                    pointer_register_name(s)
                ));
            }
            _ => {
                return Err(CompileError::NotSupported {
                    reason: "aggregate store".to_string(),
                })
            }
        }
        Ok(())
    }

    fn lower_element_address(
        &mut self,
        value: ValueId,
        source: ValueId,
        index: ValueId,
    ) -> CompileResult<()> {
        let (base, element) = match self.load_variable(source)? {
            Variable::Pointer(p) => (pointer_register_name(p), p.element),
            Variable::View(v) => (pointer_register_name(v.pointer), v.pointer.element),
            other => {
                return Err(CompileError::InvalidCodeGeneration {
                    value: source,
                    expected: "pointer or view",
                    found: other.kind_name(),
                })
            }
        };
        let size = self.ctx.types().size_of(element);
        let idx = self.load_primitive(index)?;
        let dest = match self.allocator.allocate(value)? {
            Variable::Pointer(p) => p,
            other => {
                return Err(CompileError::InvalidCodeGeneration {
                    value,
                    expected: "pointer",
                    found: other.kind_name(),
                })
            }
        };
        let sign = if idx.basic_type.is_signed() { 's' } else { 'u' };
        match idx.basic_type.bit_width() {
            32 => self.emit(&format!(
                "mad.wide.{sign}32 {}, {}, {size}, {base};",
                pointer_register_name(dest),
                register_name(idx)
            )),
            64 => self.emit(&format!(
                "mad.lo.{sign}64 {}, {}, {size}, {base};",
                pointer_register_name(dest),
                register_name(idx)
            )),
            _ => {
                return Err(CompileError::NotSupported {
                    reason: format!("{} element index", idx.basic_type),
                })
            }
        }
        Ok(())
    }

    fn lower_shared_alloc(&mut self, value: ValueId, count: u32) -> CompileResult<()> {
        let dest = match self.allocator.allocate(value)? {
            Variable::Pointer(p) => p,
            other => {
                return Err(CompileError::InvalidCodeGeneration {
                    value,
                    expected: "pointer",
                    found: other.kind_name(),
                })
            }
        };
        let bytes = self.ctx.types().size_of(dest.element) * count;
        let align = self.ctx.types().align_of(dest.element);
        let name = format!("shared_{}", dest.id);
        self.emit(&format!(
            "mov.u64 {}, {name};",
            pointer_register_name(dest)
        ));
        self.shared.push(SharedAllocation { name, bytes, align });
        Ok(())
    }

    fn lower_atomic_rmw(
        &mut self,
        value: ValueId,
        kind: AtomicKind,
        target: ValueId,
        source: ValueId,
    ) -> CompileResult<()> {
        let ptr = self.load_pointer(target)?;
        let src = self.load_primitive(source)?;
        let basic = src.basic_type;
        if basic.bit_width() < 32 {
            return Err(CompileError::NotSupported {
                reason: format!("sub-word atomic on {basic}"),
            });
        }
        let (op, suffix) = match kind {
            AtomicKind::Add => match basic {
                BasicValueType::Float32 => ("add", "f32".to_string()),
                BasicValueType::Float64 => {
                    if !self.config.architecture.supports_f64_atomic_add() {
                        return Err(CompileError::CodeGeneration {
                            reason: "atom.add.f64 requires sm_60".to_string(),
                        });
                    }
                    ("add", "f64".to_string())
                }
                // atom.add has no .s64 form; two's-complement add is
                // width-only, so the unsigned spelling covers it.
                BasicValueType::Int64 => ("add", "u64".to_string()),
                _ => ("add", arith_type(basic).to_string()),
            },
            AtomicKind::Min | AtomicKind::Max => {
                if basic.is_float() {
                    return Err(CompileError::CodeGeneration {
                        reason: "float atomic min/max requires a registered implementation"
                            .to_string(),
                    });
                }
                let op = if kind == AtomicKind::Min { "min" } else { "max" };
                (op, arith_type(basic).to_string())
            }
            AtomicKind::And | AtomicKind::Or | AtomicKind::Xor => {
                let op = match kind {
                    AtomicKind::And => "and",
                    AtomicKind::Or => "or",
                    _ => "xor",
                };
                (op, format!("b{}", basic.bit_width()))
            }
            AtomicKind::Exchange => ("exch", format!("b{}", basic.bit_width())),
        };
        let dest = self.allocate_primitive(value)?;
        self.emit(&format!(
            "atom{}.{op}.{suffix} {}, [{}], {};",
            space_qualifier(ptr.space),
            register_name(dest),
            pointer_register_name(ptr),
            register_name(src)
        ));
        Ok(())
    }

    fn lower_atomic_cas(
        &mut self,
        value: ValueId,
        target: ValueId,
        compare: ValueId,
        source: ValueId,
    ) -> CompileResult<()> {
        let ptr = self.load_pointer(target)?;
        let cmp = self.load_primitive(compare)?;
        let src = self.load_primitive(source)?;
        let width = src.basic_type.bit_width();
        if width != 32 && width != 64 {
            return Err(CompileError::NotSupported {
                reason: format!("compare-and-swap on {}", src.basic_type),
            });
        }
        let dest = self.allocate_primitive(value)?;
        self.emit(&format!(
            "atom{}.cas.b{width} {}, [{}], {}, {};",
            space_qualifier(ptr.space),
            register_name(dest),
            pointer_register_name(ptr),
            register_name(cmp),
            register_name(src)
        ));
        Ok(())
    }

    fn lower_shuffle(
        &mut self,
        value: ValueId,
        kind: ShuffleKind,
        source: ValueId,
        origin: ValueId,
    ) -> CompileResult<()> {
        if !self.config.architecture.supports_shuffle_sync() {
            return Err(CompileError::CodeGeneration {
                reason: "legacy shuffle must resolve through the registry".to_string(),
            });
        }
        let src = self.load_primitive(source)?;
        if src.basic_type.bit_width() != 32 {
            return Err(CompileError::NotSupported {
                reason: format!("warp shuffle of {} needs a 32-bit operand", src.basic_type),
            });
        }
        let lane = self.load_primitive(origin)?;
        let dest = self.allocate_primitive(value)?;
        let (mode, clamp) = shuffle_mode(kind);
        self.emit(&format!(
            "shfl.sync.{mode}.b32 {}, {}, {}, {clamp:#x}, 0xffffffff;",
            register_name(dest),
            register_name(src),
            register_name(lane)
        ));
        Ok(())
    }

    fn lower_select(
        &mut self,
        value: ValueId,
        cond: ValueId,
        true_value: ValueId,
        false_value: ValueId,
    ) -> CompileResult<()> {
        let p = self.load_primitive(cond)?;
        let t = self.load_primitive(true_value)?;
        let f = self.load_primitive(false_value)?;
        let basic = t.basic_type;
        let dest = self.allocate_primitive(value)?;
        let suffix = match basic {
            BasicValueType::Int1 => {
                return Err(CompileError::NotSupported {
                    reason: "predicate select".to_string(),
                })
            }
            BasicValueType::Float32 => "f32".to_string(),
            BasicValueType::Float64 => "f64".to_string(),
            other => format!("b{}", arith_width(other)),
        };
        self.emit(&format!(
            "selp.{suffix} {}, {}, {}, {};",
            register_name(dest),
            register_name(t),
            register_name(f),
            register_name(p)
        ));
        Ok(())
    }

    // Terminators. Branch arguments become register moves on the edge.

    fn lower_terminator(&mut self, block: BlockId) -> CompileResult<()> {
        let func = self.func;
        let term = func
            .block(block)
            .terminator
            .as_ref()
            .ok_or_else(|| CompileError::CodeGeneration {
                reason: format!("block {} is unterminated", block.index()),
            })?;
        match term {
            Terminator::Ret { value: None } => {
                self.emit("ret;");
                Ok(())
            }
            Terminator::Ret { value: Some(_) } => Err(CompileError::CodeGeneration {
                reason: format!("kernel '{}' returns a value", self.func.name),
            }),
            Terminator::Br { target, args } => {
                let moves = self.edge_moves(*target, args)?;
                self.emit_moves(&moves);
                self.emit(&format!("bra {};", self.label(*target)));
                Ok(())
            }
            Terminator::CondBr {
                cond,
                true_target,
                true_args,
                false_target,
                false_args,
            } => {
                let p = self.load_primitive(*cond)?;
                let true_moves = self.edge_moves(*true_target, true_args)?;
                let false_moves = self.edge_moves(*false_target, false_args)?;
                if true_moves.is_empty() {
                    self.emit(&format!(
                        "@{} bra {};",
                        register_name(p),
                        self.label(*true_target)
                    ));
                    self.emit_moves(&false_moves);
                    self.emit(&format!("bra {};", self.label(*false_target)));
                } else {
                    // The taken edge needs its own move block.
                    let edge = format!("{}_{}", self.label(block), true_target.index());
                    self.emit(&format!("@{} bra {};", register_name(p), edge));
                    self.emit_moves(&false_moves);
                    self.emit(&format!("bra {};", self.label(*false_target)));
                    self.body.push_str(&format!("{edge}:\n"));
                    self.emit_moves(&true_moves);
                    self.emit(&format!("bra {};", self.label(*true_target)));
                }
                Ok(())
            }
        }
    }

    fn edge_moves(&mut self, target: BlockId, args: &[ValueId]) -> CompileResult<Vec<RegMove>> {
        let func = self.func;
        let params = &func.block(target).params;
        if params.len() != args.len() {
            return Err(CompileError::CodeGeneration {
                reason: format!(
                    "block {} takes {} parameters but the branch passes {}",
                    target.index(),
                    params.len(),
                    args.len()
                ),
            });
        }
        let mut moves = Vec::new();
        for (&param, &arg) in params.iter().zip(args) {
            let dest = self.allocator.allocate(param)?;
            let src = self.allocator.load(arg)?;
            if dest == src {
                continue;
            }
            match (dest, src) {
                (Variable::Primitive(d), Variable::Primitive(s)) => {
                    let class = register_class(d.basic_type);
                    moves.push(RegMove {
                        dest: register_name(d),
                        src: register_name(s),
                        suffix: class.move_suffix(),
                        class,
                        dest_id: d.id,
                        src_id: s.id,
                    });
                }
                (Variable::Pointer(d), Variable::Pointer(s)) => {
                    moves.push(RegMove {
                        dest: pointer_register_name(d),
                        src: pointer_register_name(s),
                        suffix: "b64",
                        class: RegisterClass::B64,
                        dest_id: d.id,
                        src_id: s.id,
                    });
                }
                (Variable::View(d), Variable::View(s)) => {
                    moves.push(RegMove {
                        dest: pointer_register_name(d.pointer),
                        src: pointer_register_name(s.pointer),
                        suffix: "b64",
                        class: RegisterClass::B64,
                        dest_id: d.pointer.id,
                        src_id: s.pointer.id,
                    });
                    let class = register_class(d.length.basic_type);
                    moves.push(RegMove {
                        dest: register_name(d.length),
                        src: register_name(s.length),
                        suffix: class.move_suffix(),
                        class,
                        dest_id: d.length.id,
                        src_id: s.length.id,
                    });
                }
                _ => {
                    return Err(CompileError::CodeGeneration {
                        reason: format!(
                            "branch argument kind mismatch at block {}",
                            target.index()
                        ),
                    })
                }
            }
        }
        Ok(moves)
    }

    /// Emit the moves of one edge. When a destination register also appears
    /// as a source the batch is staged through scratch registers.
    fn emit_moves(&mut self, moves: &[RegMove]) {
        let dest_ids: HashSet<u32> = moves.iter().map(|m| m.dest_id).collect();
        let overlap = moves.iter().any(|m| dest_ids.contains(&m.src_id));
        if !overlap {
            for m in moves {
                self.emit(&format!("mov.{} {}, {};", m.suffix, m.dest, m.src));
            }
            return;
        }
        let scratch: Vec<PrimitiveVariable> = moves
            .iter()
            .map(|m| self.allocator.allocate_basic(m.class.scratch_type()))
            .collect();
        for (m, s) in moves.iter().zip(&scratch) {
            self.emit(&format!("mov.{} {}, {};", m.suffix, register_name(*s), m.src));
        }
        for (m, s) in moves.iter().zip(&scratch) {
            self.emit(&format!("mov.{} {}, {};", m.suffix, m.dest, register_name(*s)));
        }
    }

    // Assembly of the final module text.

    fn assemble(&self, params: &[String]) -> String {
        let mut out = String::new();
        out.push_str("//\n// Generated by gridline\n//\n\n");
        out.push_str(&format!(".version {}\n", self.config.isa));
        out.push_str(&format!(".target {}\n", self.config.architecture));
        out.push_str(".address_size 64\n\n");
        out.push_str(&format!(".visible .entry {}(\n", self.func.name));
        out.push_str(&params.join(",\n"));
        if !params.is_empty() {
            out.push('\n');
        }
        out.push_str(")\n{\n");
        for line in self.register_declarations() {
            out.push_str("    ");
            out.push_str(&line);
            out.push('\n');
        }
        for shared in &self.shared {
            out.push_str(&format!(
                "    .shared .align {} .b8 {}[{}];\n",
                shared.align, shared.name, shared.bytes
            ));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push_str("}\n");
        out
    }

    /// One `.reg` directive per used class, sized past the largest id.
    fn register_declarations(&self) -> Vec<String> {
        let mut max_ids: HashMap<RegisterClass, u32> = HashMap::new();
        let mut note = |class: RegisterClass, id: u32| {
            let slot = max_ids.entry(class).or_insert(0);
            *slot = (*slot).max(id);
        };
        for variable in self.allocator.allocations() {
            match variable {
                Variable::Primitive(p) => note(register_class(p.basic_type), p.id),
                Variable::Pointer(p) => note(RegisterClass::B64, p.id),
                Variable::View(v) => {
                    note(RegisterClass::B64, v.pointer.id);
                    note(register_class(v.length.basic_type), v.length.id);
                }
                Variable::Object(_) => {}
            }
        }
        RegisterClass::ALL
            .iter()
            .filter_map(|class| {
                max_ids.get(class).map(|max| {
                    format!(
                        ".reg {} %{}<{}>;",
                        class.declaration(),
                        class.prefix(),
                        max + 1
                    )
                })
            })
            .collect()
    }
}

/// PTX register classes; one declaration group each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterClass {
    Pred,
    B16,
    B32,
    B64,
    F32,
    F64,
}

impl RegisterClass {
    const ALL: [RegisterClass; 6] = [
        RegisterClass::Pred,
        RegisterClass::B16,
        RegisterClass::B32,
        RegisterClass::B64,
        RegisterClass::F32,
        RegisterClass::F64,
    ];

    fn prefix(self) -> &'static str {
        match self {
            RegisterClass::Pred => "p",
            RegisterClass::B16 => "rs",
            RegisterClass::B32 => "r",
            RegisterClass::B64 => "rd",
            RegisterClass::F32 => "f",
            RegisterClass::F64 => "fd",
        }
    }

    fn declaration(self) -> &'static str {
        match self {
            RegisterClass::Pred => ".pred",
            RegisterClass::B16 => ".b16",
            RegisterClass::B32 => ".b32",
            RegisterClass::B64 => ".b64",
            RegisterClass::F32 => ".f32",
            RegisterClass::F64 => ".f64",
        }
    }

    fn move_suffix(self) -> &'static str {
        match self {
            RegisterClass::Pred => "pred",
            RegisterClass::B16 => "b16",
            RegisterClass::B32 => "b32",
            RegisterClass::B64 => "b64",
            RegisterClass::F32 => "f32",
            RegisterClass::F64 => "f64",
        }
    }

    fn scratch_type(self) -> BasicValueType {
        match self {
            RegisterClass::Pred => BasicValueType::Int1,
            RegisterClass::B16 => BasicValueType::UInt16,
            RegisterClass::B32 => BasicValueType::UInt32,
            RegisterClass::B64 => BasicValueType::UInt64,
            RegisterClass::F32 => BasicValueType::Float32,
            RegisterClass::F64 => BasicValueType::Float64,
        }
    }
}

/// The register class a primitive type lives in.
pub fn register_class(basic: BasicValueType) -> RegisterClass {
    match basic {
        BasicValueType::Int1 => RegisterClass::Pred,
        BasicValueType::Int8
        | BasicValueType::UInt8
        | BasicValueType::Int16
        | BasicValueType::UInt16
        | BasicValueType::Float16 => RegisterClass::B16,
        BasicValueType::Int32 | BasicValueType::UInt32 => RegisterClass::B32,
        BasicValueType::Int64 | BasicValueType::UInt64 => RegisterClass::B64,
        BasicValueType::Float32 => RegisterClass::F32,
        BasicValueType::Float64 => RegisterClass::F64,
    }
}

/// The register spelling of a primitive variable, e.g. `%f3`.
pub fn register_name(variable: PrimitiveVariable) -> String {
    format!(
        "%{}{}",
        register_class(variable.basic_type).prefix(),
        variable.id
    )
}

/// The register spelling of an address variable, e.g. `%rd7`.
pub fn pointer_register_name(variable: PointerVariable) -> String {
    format!("%rd{}", variable.id)
}

/// First instruction token, for the per-mnemonic statistics.
fn mnemonic_of(text: &str) -> &str {
    let mut tokens = text.split_whitespace();
    let first = tokens.next().unwrap_or("");
    let token = if first.starts_with('@') {
        tokens.next().unwrap_or(first)
    } else {
        first
    };
    token.trim_end_matches(';')
}

fn space_qualifier(space: AddressSpace) -> &'static str {
    match space {
        AddressSpace::Generic => "",
        AddressSpace::Global => ".global",
        AddressSpace::Shared => ".shared",
        AddressSpace::Local => ".local",
    }
}

fn shuffle_mode(kind: ShuffleKind) -> (&'static str, u32) {
    match kind {
        ShuffleKind::Idx => ("idx", 0x1f),
        ShuffleKind::Up => ("up", 0x0),
        ShuffleKind::Down => ("down", 0x1f),
        ShuffleKind::Bfly => ("bfly", 0x1f),
    }
}

fn compare_name(kind: CompareKind) -> &'static str {
    match kind {
        CompareKind::Eq => "eq",
        CompareKind::Ne => "ne",
        CompareKind::Lt => "lt",
        CompareKind::Le => "le",
        CompareKind::Gt => "gt",
        CompareKind::Ge => "ge",
    }
}

/// Arithmetic operates on at least 16-bit registers; sub-word types widen.
fn arith_width(basic: BasicValueType) -> u32 {
    basic.bit_width().max(16)
}

fn arith_type(basic: BasicValueType) -> &'static str {
    match basic {
        BasicValueType::Int1 => "pred",
        BasicValueType::Int8 | BasicValueType::Int16 => "s16",
        BasicValueType::Int32 => "s32",
        BasicValueType::Int64 => "s64",
        BasicValueType::UInt8 | BasicValueType::UInt16 => "u16",
        BasicValueType::UInt32 => "u32",
        BasicValueType::UInt64 => "u64",
        BasicValueType::Float16 => "f16",
        BasicValueType::Float32 => "f32",
        BasicValueType::Float64 => "f64",
    }
}

/// Exact-width integer name for `cvt`.
fn int_type_name(basic: BasicValueType) -> CompileResult<&'static str> {
    match basic {
        BasicValueType::Int8 => Ok("s8"),
        BasicValueType::UInt8 => Ok("u8"),
        BasicValueType::Int16 => Ok("s16"),
        BasicValueType::UInt16 => Ok("u16"),
        BasicValueType::Int32 => Ok("s32"),
        BasicValueType::UInt32 => Ok("u32"),
        BasicValueType::Int64 => Ok("s64"),
        BasicValueType::UInt64 => Ok("u64"),
        other => Err(CompileError::CodeGeneration {
            reason: format!("{other} is not an integer conversion type"),
        }),
    }
}

fn float_type_name(basic: BasicValueType) -> Option<&'static str> {
    match basic {
        BasicValueType::Float16 => Some("f16"),
        BasicValueType::Float32 => Some("f32"),
        BasicValueType::Float64 => Some("f64"),
        _ => None,
    }
}

/// The `cvt` spelling for a conversion, including the rounding mode: `.rn`
/// into floats and float narrowing, `.rzi` for float-to-int truncation.
fn cvt_instruction(dest: BasicValueType, src: BasicValueType) -> CompileResult<String> {
    match (float_type_name(dest), float_type_name(src)) {
        (None, None) => Ok(format!(
            "cvt.{}.{}",
            int_type_name(dest)?,
            int_type_name(src)?
        )),
        (Some(fd), None) => Ok(format!("cvt.rn.{fd}.{}", int_type_name(src)?)),
        (None, Some(fs)) => Ok(format!("cvt.rzi.{}.{fs}", int_type_name(dest)?)),
        (Some(fd), Some(fs)) => {
            if dest.bit_width() < src.bit_width() {
                Ok(format!("cvt.rn.{fd}.{fs}"))
            } else {
                Ok(format!("cvt.{fd}.{fs}"))
            }
        }
    }
}

fn param_suffix(basic: BasicValueType) -> &'static str {
    match basic {
        BasicValueType::Int8 => "s8",
        BasicValueType::UInt8 => "u8",
        BasicValueType::Int16 | BasicValueType::UInt16 => "u16",
        BasicValueType::Float16 => "b16",
        BasicValueType::Int32 | BasicValueType::UInt32 => "u32",
        BasicValueType::Int64 | BasicValueType::UInt64 => "u64",
        BasicValueType::Float32 => "f32",
        BasicValueType::Float64 => "f64",
        BasicValueType::Int1 => "u8",
    }
}

/// Memory access width. Signed 8-bit loads sign-extend into the 16-bit
/// register; everything else is width-exact.
fn memory_suffix(basic: BasicValueType, load: bool) -> CompileResult<&'static str> {
    match basic {
        BasicValueType::Int1 => Err(CompileError::NotSupported {
            reason: "predicate loads and stores".to_string(),
        }),
        BasicValueType::Int8 if load => Ok("s8"),
        BasicValueType::Int8 | BasicValueType::UInt8 => Ok("u8"),
        BasicValueType::Int16 | BasicValueType::UInt16 => Ok("u16"),
        BasicValueType::Float16 => Ok("b16"),
        BasicValueType::Int32 | BasicValueType::UInt32 => Ok("u32"),
        BasicValueType::Int64 | BasicValueType::UInt64 => Ok("u64"),
        BasicValueType::Float32 => Ok("f32"),
        BasicValueType::Float64 => Ok("f64"),
    }
}

fn float32_literal(value: f32) -> String {
    format!("0f{:08X}", value.to_bits())
}

fn float64_literal(value: f64) -> String {
    format!("0d{:016X}", value.to_bits())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_names_follow_class_prefixes() {
        let f = PrimitiveVariable {
            id: 3,
            basic_type: BasicValueType::Float32,
        };
        assert_eq!(register_name(f), "%f3");
        let p = PrimitiveVariable {
            id: 0,
            basic_type: BasicValueType::Int1,
        };
        assert_eq!(register_name(p), "%p0");
        let h = PrimitiveVariable {
            id: 12,
            basic_type: BasicValueType::Float16,
        };
        assert_eq!(register_name(h), "%rs12");
        assert_eq!(register_class(BasicValueType::UInt8), RegisterClass::B16);
        assert_eq!(register_class(BasicValueType::Int64), RegisterClass::B64);
    }

    #[test]
    fn cvt_spellings_carry_rounding_modes() {
        let cvt = |d, s| cvt_instruction(d, s).unwrap();
        assert_eq!(
            cvt(BasicValueType::Int32, BasicValueType::Float32),
            "cvt.rzi.s32.f32"
        );
        assert_eq!(
            cvt(BasicValueType::Float32, BasicValueType::Int32),
            "cvt.rn.f32.s32"
        );
        assert_eq!(
            cvt(BasicValueType::Float64, BasicValueType::Float32),
            "cvt.f64.f32"
        );
        assert_eq!(
            cvt(BasicValueType::Float32, BasicValueType::Float64),
            "cvt.rn.f32.f64"
        );
        assert_eq!(
            cvt(BasicValueType::Int64, BasicValueType::Int32),
            "cvt.s64.s32"
        );
        assert_eq!(
            cvt(BasicValueType::Float16, BasicValueType::Float32),
            "cvt.rn.f16.f32"
        );
    }

    #[test]
    fn float_literals_are_raw_bits() {
        assert_eq!(float32_literal(1.0), "0f3F800000");
        assert_eq!(float64_literal(1.0), "0d3FF0000000000000");
        assert_eq!(float32_literal(-2.5), "0fC0200000");
    }

    #[test]
    fn mnemonics_skip_predication() {
        assert_eq!(mnemonic_of("add.s32 %r1, %r2, %r3;"), "add.s32");
        assert_eq!(mnemonic_of("@%p1 bra LBB_2;"), "bra");
        assert_eq!(mnemonic_of("ret;"), "ret");
    }
}
