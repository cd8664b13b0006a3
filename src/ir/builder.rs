//! Append-only construction of IR functions.
//!
//! The builder computes result types as ops are appended and enforces the
//! structural rules (blocks terminate exactly once, operand types line up).
//! Misuse is a caller bug and panics; compilation-time failures are
//! reported by the backend, not here.

use super::types::{AddressSpace, BasicValueType, TypeContext, TypeId, TypeNode};
use super::{
    AtomicKind, BinaryArithmeticKind, BlockData, BlockId, BroadcastKind, CompareKind, Constant,
    Function, IrContext, MethodId, MethodKind, Op, ShuffleKind, Terminator, ThreadValue,
    UnaryArithmeticKind, ValueData, ValueId,
};

/// Builds one function inside an [`IrContext`].
///
/// ```
/// use gridline::ir::{
///     AddressSpace, BasicValueType, BinaryArithmeticKind, FunctionBuilder, IrContext,
///     ThreadValue,
/// };
///
/// let mut ctx = IrContext::new();
/// let f32t = ctx.types_mut().primitive(BasicValueType::Float32);
/// let view = ctx.types_mut().view(f32t, AddressSpace::Global);
///
/// let mut b = FunctionBuilder::kernel(&mut ctx, "scale");
/// let data = b.add_param(view);
/// let factor = b.add_param(f32t);
/// let (entry, _) = b.create_block(&[]);
/// b.switch_to(entry);
/// let idx = b.thread(ThreadValue::GlobalThreadIndex);
/// let addr = b.element_address(data, idx);
/// let x = b.load(addr);
/// let scaled = b.binary(BinaryArithmeticKind::Mul, x, factor);
/// b.store(addr, scaled);
/// b.ret(None);
/// let kernel = b.finish();
/// assert_eq!(ctx.method(kernel).name, "scale");
/// ```
pub struct FunctionBuilder<'ctx> {
    ctx: &'ctx mut IrContext,
    func: Function,
    current: Option<BlockId>,
}

impl<'ctx> FunctionBuilder<'ctx> {
    /// Start a launchable kernel entry point (no return value).
    pub fn kernel(ctx: &'ctx mut IrContext, name: &str) -> Self {
        Self {
            ctx,
            func: Function::new(name.to_string(), MethodKind::Kernel, Vec::new(), None),
            current: None,
        }
    }

    /// Start a device routine.
    pub fn device(ctx: &'ctx mut IrContext, name: &str, return_type: Option<TypeId>) -> Self {
        Self {
            ctx,
            func: Function::new(name.to_string(), MethodKind::Device, Vec::new(), return_type),
            current: None,
        }
    }

    pub fn types(&mut self) -> &mut TypeContext {
        self.ctx.types_mut()
    }

    /// Append a function parameter. Must precede block creation.
    pub fn add_param(&mut self, ty: TypeId) -> ValueId {
        assert!(
            self.func.block_count() == 0,
            "parameters must be added before blocks"
        );
        let index = self.func.params.len() as u32;
        let id = self.func.push_value(ValueData {
            ty: Some(ty),
            op: Op::Param { index },
        });
        self.func.params.push(id);
        self.func.param_types.push(ty);
        id
    }

    /// Create a block with the given parameter types; returns the block and
    /// its parameter values. The first block created is the entry.
    pub fn create_block(&mut self, param_types: &[TypeId]) -> (BlockId, Vec<ValueId>) {
        let block = self.func.push_block(BlockData::default());
        let mut params = Vec::with_capacity(param_types.len());
        for (index, &ty) in param_types.iter().enumerate() {
            let id = self.func.push_value(ValueData {
                ty: Some(ty),
                op: Op::BlockParam {
                    index: index as u32,
                },
            });
            self.func.block_mut(block).params.push(id);
            params.push(id);
        }
        (block, params)
    }

    pub fn switch_to(&mut self, block: BlockId) {
        assert!(
            self.func.block(block).terminator.is_none(),
            "cannot append to a terminated block"
        );
        self.current = Some(block);
    }

    fn append(&mut self, ty: Option<TypeId>, op: Op) -> ValueId {
        let block = self.current.expect("no current block");
        let id = self.func.push_value(ValueData { ty, op });
        self.func.block_mut(block).values.push(id);
        id
    }

    fn terminate(&mut self, terminator: Terminator) {
        let block = self.current.take().expect("no current block");
        let data = self.func.block_mut(block);
        assert!(data.terminator.is_none(), "block already terminated");
        data.terminator = Some(terminator);
    }

    fn basic_type_of(&self, value: ValueId) -> BasicValueType {
        let ty = self
            .func
            .value_type(value)
            .expect("operand has no result type");
        self.ctx
            .types()
            .basic_type(ty)
            .expect("operand is not a primitive value")
    }

    fn pointer_parts(&self, value: ValueId) -> (TypeId, AddressSpace) {
        let ty = self
            .func
            .value_type(value)
            .expect("operand has no result type");
        match *self.ctx.types().node(ty) {
            TypeNode::Pointer { element, space } => (element, space),
            ref other => panic!("expected a pointer operand, found {other:?}"),
        }
    }

    // Constants.

    pub fn const_int(&mut self, basic: BasicValueType, bits: i64) -> ValueId {
        assert!(basic.is_integer(), "const_int needs an integer kind");
        let ty = self.ctx.types_mut().primitive(basic);
        self.append(Some(ty), Op::Constant(Constant::Int(basic, bits)))
    }

    pub fn const_bool(&mut self, value: bool) -> ValueId {
        self.const_int(BasicValueType::Int1, value as i64)
    }

    pub fn const_i32(&mut self, value: i32) -> ValueId {
        self.const_int(BasicValueType::Int32, value as i64)
    }

    pub fn const_i64(&mut self, value: i64) -> ValueId {
        self.const_int(BasicValueType::Int64, value)
    }

    pub fn const_u32(&mut self, value: u32) -> ValueId {
        self.const_int(BasicValueType::UInt32, value as i64)
    }

    pub fn const_u64(&mut self, value: u64) -> ValueId {
        self.const_int(BasicValueType::UInt64, value as i64)
    }

    pub fn const_f32(&mut self, value: f32) -> ValueId {
        let ty = self.ctx.types_mut().primitive(BasicValueType::Float32);
        self.append(Some(ty), Op::Constant(Constant::Float32(value)))
    }

    pub fn const_f64(&mut self, value: f64) -> ValueId {
        let ty = self.ctx.types_mut().primitive(BasicValueType::Float64);
        self.append(Some(ty), Op::Constant(Constant::Float64(value)))
    }

    pub fn const_f16_bits(&mut self, bits: u16) -> ValueId {
        let ty = self.ctx.types_mut().primitive(BasicValueType::Float16);
        self.append(Some(ty), Op::Constant(Constant::Float16(bits)))
    }

    // Thread coordinates.

    pub fn thread(&mut self, source: ThreadValue) -> ValueId {
        let ty = self.ctx.types_mut().primitive(BasicValueType::Int32);
        self.append(Some(ty), Op::Thread(source))
    }

    // Scalar computation.

    pub fn unary(&mut self, kind: UnaryArithmeticKind, value: ValueId) -> ValueId {
        let ty = self.func.value_type(value);
        self.append(ty, Op::Unary { kind, value })
    }

    pub fn binary(&mut self, kind: BinaryArithmeticKind, lhs: ValueId, rhs: ValueId) -> ValueId {
        // Shift amounts may be narrower than the shifted value.
        if !matches!(
            kind,
            BinaryArithmeticKind::Shl | BinaryArithmeticKind::Shr
        ) {
            assert_eq!(
                self.basic_type_of(lhs),
                self.basic_type_of(rhs),
                "binary operands must share a type"
            );
        }
        let ty = self.func.value_type(lhs);
        self.append(ty, Op::Binary { kind, lhs, rhs })
    }

    pub fn compare(&mut self, kind: CompareKind, lhs: ValueId, rhs: ValueId) -> ValueId {
        assert_eq!(
            self.basic_type_of(lhs),
            self.basic_type_of(rhs),
            "compare operands must share a type"
        );
        let ty = self.ctx.types_mut().primitive(BasicValueType::Int1);
        self.append(Some(ty), Op::Compare { kind, lhs, rhs })
    }

    pub fn convert(&mut self, value: ValueId, to: BasicValueType) -> ValueId {
        let _ = self.basic_type_of(value);
        let ty = self.ctx.types_mut().primitive(to);
        self.append(Some(ty), Op::Convert { value })
    }

    pub fn reinterpret(&mut self, value: ValueId, to: BasicValueType) -> ValueId {
        let from = self.basic_type_of(value);
        assert_eq!(
            from.size_bytes(),
            to.size_bytes(),
            "reinterpret requires equal widths"
        );
        let ty = self.ctx.types_mut().primitive(to);
        self.append(Some(ty), Op::Reinterpret { value })
    }

    pub fn pointer_cast(&mut self, value: ValueId, element: TypeId) -> ValueId {
        let (_, space) = self.pointer_parts(value);
        let ty = self.ctx.types_mut().pointer(element, space);
        self.append(Some(ty), Op::PointerCast { value })
    }

    // Memory.

    pub fn load(&mut self, address: ValueId) -> ValueId {
        let (element, _) = self.pointer_parts(address);
        self.append(Some(element), Op::Load { address })
    }

    pub fn store(&mut self, address: ValueId, value: ValueId) -> ValueId {
        self.append(None, Op::Store { address, value })
    }

    /// Address of `source[index]`; `source` may be a pointer or a view.
    pub fn element_address(&mut self, source: ValueId, index: ValueId) -> ValueId {
        let src_ty = self
            .func
            .value_type(source)
            .expect("operand has no result type");
        let (element, space) = match *self.ctx.types().node(src_ty) {
            TypeNode::Pointer { element, space } | TypeNode::View { element, space } => {
                (element, space)
            }
            ref other => panic!("expected pointer or view, found {other:?}"),
        };
        let ty = self.ctx.types_mut().pointer(element, space);
        self.append(Some(ty), Op::ElementAddress { source, index })
    }

    pub fn view_length(&mut self, view: ValueId) -> ValueId {
        let ty = self.ctx.types_mut().primitive(BasicValueType::Int32);
        self.append(Some(ty), Op::ViewLength { view })
    }

    pub fn shared_alloc(&mut self, element: TypeId, count: u32) -> ValueId {
        let ty = self.ctx.types_mut().pointer(element, AddressSpace::Shared);
        self.append(Some(ty), Op::SharedAlloc { count })
    }

    // Atomics and cross-lane primitives.

    pub fn atomic_rmw(&mut self, kind: AtomicKind, target: ValueId, value: ValueId) -> ValueId {
        let ty = self.func.value_type(value);
        self.append(ty, Op::AtomicRmw { kind, target, value })
    }

    pub fn atomic_cas(&mut self, target: ValueId, compare: ValueId, value: ValueId) -> ValueId {
        let ty = self.func.value_type(value);
        self.append(
            ty,
            Op::AtomicCas {
                target,
                compare,
                value,
            },
        )
    }

    pub fn broadcast(&mut self, kind: BroadcastKind, value: ValueId, origin: ValueId) -> ValueId {
        let ty = self.func.value_type(value);
        self.append(ty, Op::Broadcast { kind, value, origin })
    }

    pub fn shuffle(&mut self, kind: ShuffleKind, value: ValueId, origin: ValueId) -> ValueId {
        let ty = self.func.value_type(value);
        self.append(ty, Op::Shuffle { kind, value, origin })
    }

    pub fn barrier(&mut self) -> ValueId {
        self.append(None, Op::Barrier)
    }

    pub fn call(&mut self, method: MethodId, args: &[ValueId]) -> ValueId {
        let ret = self.ctx.method(method).return_type;
        self.append(
            ret,
            Op::Call {
                method,
                args: args.to_vec(),
            },
        )
    }

    pub fn select(&mut self, cond: ValueId, true_value: ValueId, false_value: ValueId) -> ValueId {
        assert_eq!(
            self.basic_type_of(cond),
            BasicValueType::Int1,
            "select condition must be i1"
        );
        let ty = self.func.value_type(true_value);
        self.append(
            ty,
            Op::Select {
                cond,
                true_value,
                false_value,
            },
        )
    }

    // Terminators.

    pub fn ret(&mut self, value: Option<ValueId>) {
        self.terminate(Terminator::Ret { value });
    }

    pub fn branch(&mut self, target: BlockId, args: &[ValueId]) {
        assert_eq!(
            self.func.block(target).params.len(),
            args.len(),
            "branch argument count must match target params"
        );
        self.terminate(Terminator::Br {
            target,
            args: args.to_vec(),
        });
    }

    pub fn cond_branch(
        &mut self,
        cond: ValueId,
        true_target: BlockId,
        true_args: &[ValueId],
        false_target: BlockId,
        false_args: &[ValueId],
    ) {
        assert_eq!(
            self.func.block(true_target).params.len(),
            true_args.len(),
            "branch argument count must match target params"
        );
        assert_eq!(
            self.func.block(false_target).params.len(),
            false_args.len(),
            "branch argument count must match target params"
        );
        self.terminate(Terminator::CondBr {
            cond,
            true_target,
            true_args: true_args.to_vec(),
            false_target,
            false_args: false_args.to_vec(),
        });
    }

    /// Register the finished function with the context.
    pub fn finish(self) -> MethodId {
        assert!(self.func.block_count() > 0, "function has no blocks");
        for index in 0..self.func.block_count() {
            assert!(
                self.func.block(BlockId::new(index)).terminator.is_some(),
                "block {index} is not terminated"
            );
        }
        self.ctx.add_method(self.func)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_straight_line_kernel() {
        let mut ctx = IrContext::new();
        let f32t = ctx.types_mut().primitive(BasicValueType::Float32);
        let view = ctx.types_mut().view(f32t, AddressSpace::Global);

        let mut b = FunctionBuilder::kernel(&mut ctx, "copy");
        let src = b.add_param(view);
        let dst = b.add_param(view);
        let (entry, _) = b.create_block(&[]);
        b.switch_to(entry);
        let idx = b.thread(ThreadValue::GlobalThreadIndex);
        let from = b.element_address(src, idx);
        let x = b.load(from);
        let to = b.element_address(dst, idx);
        b.store(to, x);
        b.ret(None);
        let id = b.finish();

        let func = ctx.method(id);
        assert_eq!(func.kind, MethodKind::Kernel);
        assert_eq!(func.params.len(), 2);
        assert_eq!(func.block_count(), 1);
        assert_eq!(func.block(func.entry()).values.len(), 5);
        assert_eq!(func.value_type(x), Some(f32t));
        assert!(matches!(func.op(from), Op::ElementAddress { .. }));
        assert_eq!(ctx.find_method("copy"), Some(id));
    }

    #[test]
    fn block_params_carry_loop_state() {
        let mut ctx = IrContext::new();
        let i32t = ctx.types_mut().primitive(BasicValueType::Int32);

        let mut b = FunctionBuilder::device(&mut ctx, "count_down", Some(i32t));
        let n = b.add_param(i32t);
        let (entry, _) = b.create_block(&[]);
        let (loop_blk, loop_params) = b.create_block(&[i32t]);
        let (exit, exit_params) = b.create_block(&[i32t]);

        b.switch_to(entry);
        b.branch(loop_blk, &[n]);

        b.switch_to(loop_blk);
        let cur = loop_params[0];
        let one = b.const_i32(1);
        let next = b.binary(BinaryArithmeticKind::Sub, cur, one);
        let zero = b.const_i32(0);
        let done = b.compare(CompareKind::Le, next, zero);
        b.cond_branch(done, exit, &[next], loop_blk, &[next]);

        b.switch_to(exit);
        b.ret(Some(exit_params[0]));
        let id = b.finish();

        let func = ctx.method(id);
        assert_eq!(func.block_count(), 3);
        assert_eq!(func.block(loop_blk).params.len(), 1);
        assert!(matches!(
            func.op(loop_params[0]),
            Op::BlockParam { index: 0 }
        ));
        let order = func.reverse_post_order();
        assert_eq!(order[0], entry);
    }

    #[test]
    #[should_panic(expected = "must share a type")]
    fn mismatched_binary_operands_panic() {
        let mut ctx = IrContext::new();
        let mut b = FunctionBuilder::device(&mut ctx, "bad", None);
        let (entry, _) = b.create_block(&[]);
        b.switch_to(entry);
        let a = b.const_i32(1);
        let x = b.const_f32(1.0);
        b.binary(BinaryArithmeticKind::Add, a, x);
    }

    #[test]
    fn declarations_have_no_body() {
        let mut ctx = IrContext::new();
        let f64t = ctx.types_mut().primitive(BasicValueType::Float64);
        let i64t = ctx.types_mut().primitive(BasicValueType::Int64);
        let id = ctx.declare_method("reinterpret.f64.i64", vec![f64t], Some(i64t));
        let func = ctx.method(id);
        assert!(func.is_declaration());
        assert_eq!(func.block_count(), 0);
        assert_eq!(func.param_types, vec![f64t]);
    }
}
