// This module defines the target-independent kernel IR the backend consumes.
// Functions own a dense arena of values (ValueId indices) grouped into basic
// blocks; blocks take parameters instead of phi instructions, and branch
// terminators pass arguments to their targets. The op set covers kernel
// parameters, constants, thread coordinates, scalar arithmetic, memory access
// through pointers and views, atomics, cross-lane primitives, and calls to
// device routines. IrContext is the shared home of the type arena and the
// method table; FunctionBuilder (ir::builder) is the construction surface.

//! Target-independent kernel IR.
//!
//! Functions are immutable once built. The backend consumes the graph and
//! never rewrites it in place; specialization clones a function before
//! splicing into the clone.

pub mod builder;
pub mod types;

pub use builder::FunctionBuilder;
pub use types::{AddressSpace, BasicValueType, TypeContext, TypeId, TypeNode};

/// Dense handle of a value within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(u32);

impl ValueId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Dense handle of a block within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(u32);

impl BlockId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle of a method in an [`IrContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId(u32);

impl MethodId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Thread/group coordinate sources (one-dimensional launch vocabulary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadValue {
    /// Lane index within the warp.
    LaneIndex,
    /// Thread index within the group.
    GroupThreadIndex,
    /// Number of threads per group.
    GroupDimension,
    /// Group index within the grid.
    GridIndex,
    /// Globally linearized thread index.
    GlobalThreadIndex,
    /// Threads per warp on the target.
    WarpSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryArithmeticKind {
    Neg,
    Not,
    Abs,
    PopCount,
    Clz,
    Ctz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryArithmeticKind {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Min,
    Max,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareKind {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Read-modify-write atomic operations. All return the previous value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicKind {
    Add,
    Min,
    Max,
    And,
    Or,
    Xor,
    Exchange,
}

/// Scope of a broadcast: whole group or single warp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BroadcastKind {
    GroupLevel,
    WarpLevel,
}

/// Warp shuffle addressing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShuffleKind {
    /// Read from an absolute lane.
    Idx,
    /// Read from `lane - delta`.
    Up,
    /// Read from `lane + delta`.
    Down,
    /// Read from `lane ^ mask`.
    Bfly,
}

/// Literal constant payloads. Integers carry sign-extended bits for every
/// integer kind including `Int1`; `Float16` carries raw IEEE 754 bits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    Int(BasicValueType, i64),
    Float16(u16),
    Float32(f32),
    Float64(f64),
}

impl Constant {
    pub fn basic_type(self) -> BasicValueType {
        match self {
            Constant::Int(basic, _) => basic,
            Constant::Float16(_) => BasicValueType::Float16,
            Constant::Float32(_) => BasicValueType::Float32,
            Constant::Float64(_) => BasicValueType::Float64,
        }
    }
}

/// One IR operation. The result type lives in the owning [`ValueData`].
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Function parameter `index`.
    Param { index: u32 },
    /// Parameter `index` of the block that owns this value.
    BlockParam { index: u32 },
    Constant(Constant),
    Thread(ThreadValue),
    Unary {
        kind: UnaryArithmeticKind,
        value: ValueId,
    },
    Binary {
        kind: BinaryArithmeticKind,
        lhs: ValueId,
        rhs: ValueId,
    },
    Compare {
        kind: CompareKind,
        lhs: ValueId,
        rhs: ValueId,
    },
    /// Numeric conversion to the result type.
    Convert { value: ValueId },
    /// Equal-width bit reinterpretation to the result type.
    Reinterpret { value: ValueId },
    /// Retype a pointer's element, keeping the address space.
    PointerCast { value: ValueId },
    Load { address: ValueId },
    Store { address: ValueId, value: ValueId },
    /// Address of element `index` behind a pointer or view `source`.
    ElementAddress { source: ValueId, index: ValueId },
    /// Element count of a view.
    ViewLength { view: ValueId },
    /// Statically sized group-shared allocation; yields a shared pointer.
    SharedAlloc { count: u32 },
    AtomicRmw {
        kind: AtomicKind,
        target: ValueId,
        value: ValueId,
    },
    /// Compare-and-swap; returns the previous memory contents.
    AtomicCas {
        target: ValueId,
        compare: ValueId,
        value: ValueId,
    },
    Broadcast {
        kind: BroadcastKind,
        value: ValueId,
        origin: ValueId,
    },
    Shuffle {
        kind: ShuffleKind,
        value: ValueId,
        origin: ValueId,
    },
    /// Group-wide execution barrier.
    Barrier,
    Call {
        method: MethodId,
        args: Vec<ValueId>,
    },
    Select {
        cond: ValueId,
        true_value: ValueId,
        false_value: ValueId,
    },
    /// Placeholder left behind when a value is absorbed elsewhere.
    Nop,
}

impl Op {
    /// Operand list in evaluation order.
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            Op::Param { .. }
            | Op::BlockParam { .. }
            | Op::Constant(_)
            | Op::Thread(_)
            | Op::SharedAlloc { .. }
            | Op::Barrier
            | Op::Nop => Vec::new(),
            Op::Unary { value, .. }
            | Op::Convert { value }
            | Op::Reinterpret { value }
            | Op::PointerCast { value } => vec![*value],
            Op::Binary { lhs, rhs, .. } | Op::Compare { lhs, rhs, .. } => vec![*lhs, *rhs],
            Op::Load { address } => vec![*address],
            Op::Store { address, value } => vec![*address, *value],
            Op::ElementAddress { source, index } => vec![*source, *index],
            Op::ViewLength { view } => vec![*view],
            Op::AtomicRmw { target, value, .. } => vec![*target, *value],
            Op::AtomicCas {
                target,
                compare,
                value,
            } => vec![*target, *compare, *value],
            Op::Broadcast { value, origin, .. } | Op::Shuffle { value, origin, .. } => {
                vec![*value, *origin]
            }
            Op::Call { args, .. } => args.clone(),
            Op::Select {
                cond,
                true_value,
                false_value,
            } => vec![*cond, *true_value, *false_value],
        }
    }

    /// Clone with every operand rewritten through `map`.
    pub fn remapped(&self, map: &mut impl FnMut(ValueId) -> ValueId) -> Op {
        let mut op = self.clone();
        match &mut op {
            Op::Param { .. }
            | Op::BlockParam { .. }
            | Op::Constant(_)
            | Op::Thread(_)
            | Op::SharedAlloc { .. }
            | Op::Barrier
            | Op::Nop => {}
            Op::Unary { value, .. }
            | Op::Convert { value }
            | Op::Reinterpret { value }
            | Op::PointerCast { value } => *value = map(*value),
            Op::Binary { lhs, rhs, .. } | Op::Compare { lhs, rhs, .. } => {
                *lhs = map(*lhs);
                *rhs = map(*rhs);
            }
            Op::Load { address } => *address = map(*address),
            Op::Store { address, value } => {
                *address = map(*address);
                *value = map(*value);
            }
            Op::ElementAddress { source, index } => {
                *source = map(*source);
                *index = map(*index);
            }
            Op::ViewLength { view } => *view = map(*view),
            Op::AtomicRmw { target, value, .. } => {
                *target = map(*target);
                *value = map(*value);
            }
            Op::AtomicCas {
                target,
                compare,
                value,
            } => {
                *target = map(*target);
                *compare = map(*compare);
                *value = map(*value);
            }
            Op::Broadcast { value, origin, .. } | Op::Shuffle { value, origin, .. } => {
                *value = map(*value);
                *origin = map(*origin);
            }
            Op::Call { args, .. } => {
                for arg in args {
                    *arg = map(*arg);
                }
            }
            Op::Select {
                cond,
                true_value,
                false_value,
            } => {
                *cond = map(*cond);
                *true_value = map(*true_value);
                *false_value = map(*false_value);
            }
        }
        op
    }
}

/// A value: result type (None for value-less operations) plus its op.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueData {
    pub ty: Option<TypeId>,
    pub op: Op,
}

/// Block terminators. Branch arguments bind to the target's block params.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Ret {
        value: Option<ValueId>,
    },
    Br {
        target: BlockId,
        args: Vec<ValueId>,
    },
    CondBr {
        cond: ValueId,
        true_target: BlockId,
        true_args: Vec<ValueId>,
        false_target: BlockId,
        false_args: Vec<ValueId>,
    },
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Ret { .. } => Vec::new(),
            Terminator::Br { target, .. } => vec![*target],
            Terminator::CondBr {
                true_target,
                false_target,
                ..
            } => vec![*true_target, *false_target],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockData {
    /// Block-parameter values (their ops are `Op::BlockParam`).
    pub params: Vec<ValueId>,
    /// Body values in evaluation order. Excludes params.
    pub values: Vec<ValueId>,
    /// Set exactly once; `None` only mid-construction.
    pub terminator: Option<Terminator>,
}

/// What a method is to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Externally launchable kernel entry point.
    Kernel,
    /// Device routine, always inlined into its callers.
    Device,
    /// Bodyless declaration; calls must resolve to a registered
    /// implementation.
    Declaration,
}

/// One function: signature, value arena, block list. Entry block is index 0.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub kind: MethodKind,
    pub param_types: Vec<TypeId>,
    pub return_type: Option<TypeId>,
    /// Parameter values (ops are `Op::Param`); empty for declarations.
    pub params: Vec<ValueId>,
    values: Vec<ValueData>,
    blocks: Vec<BlockData>,
}

impl Function {
    pub(crate) fn new(
        name: String,
        kind: MethodKind,
        param_types: Vec<TypeId>,
        return_type: Option<TypeId>,
    ) -> Self {
        Self {
            name,
            kind,
            param_types,
            return_type,
            params: Vec::new(),
            values: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.kind == MethodKind::Declaration
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn value(&self, id: ValueId) -> &ValueData {
        &self.values[id.index()]
    }

    pub fn op(&self, id: ValueId) -> &Op {
        &self.values[id.index()].op
    }

    pub fn value_type(&self, id: ValueId) -> Option<TypeId> {
        self.values[id.index()].ty
    }

    pub fn block(&self, id: BlockId) -> &BlockData {
        &self.blocks[id.index()]
    }

    pub(crate) fn value_mut(&mut self, id: ValueId) -> &mut ValueData {
        &mut self.values[id.index()]
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> &mut BlockData {
        &mut self.blocks[id.index()]
    }

    pub(crate) fn push_value(&mut self, data: ValueData) -> ValueId {
        let id = ValueId::new(self.values.len());
        self.values.push(data);
        id
    }

    pub(crate) fn push_block(&mut self, data: BlockData) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(data);
        id
    }

    /// Blocks in reverse post order from the entry. Unreachable blocks are
    /// omitted.
    pub fn reverse_post_order(&self) -> Vec<BlockId> {
        if self.blocks.is_empty() {
            return Vec::new();
        }
        let mut visited = vec![false; self.blocks.len()];
        let mut post = Vec::with_capacity(self.blocks.len());
        // Iterative DFS; each stack entry remembers how many successors it
        // already descended into.
        let mut stack: Vec<(BlockId, usize)> = Vec::new();
        let entry = self.entry();
        visited[entry.index()] = true;
        stack.push((entry, 0));
        while let Some(&mut (block, ref mut cursor)) = stack.last_mut() {
            let succs = self.successors(block);
            if *cursor < succs.len() {
                let next = succs[*cursor];
                *cursor += 1;
                if !visited[next.index()] {
                    visited[next.index()] = true;
                    stack.push((next, 0));
                }
            } else {
                post.push(block);
                stack.pop();
            }
        }
        post.reverse();
        post
    }

    fn successors(&self, block: BlockId) -> Vec<BlockId> {
        match &self.blocks[block.index()].terminator {
            Some(term) => term.successors(),
            None => Vec::new(),
        }
    }
}

/// Shared home of the type arena and the method table.
#[derive(Debug, Default)]
pub struct IrContext {
    types: TypeContext,
    methods: Vec<Function>,
}

impl IrContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn types(&self) -> &TypeContext {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut TypeContext {
        &mut self.types
    }

    pub fn method(&self, id: MethodId) -> &Function {
        &self.methods[id.index()]
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    pub fn find_method(&self, name: &str) -> Option<MethodId> {
        self.methods
            .iter()
            .position(|m| m.name == name)
            .map(|i| MethodId(i as u32))
    }

    /// Declare a bodyless device method. Calls to it must be satisfied by a
    /// registered intrinsic implementation.
    pub fn declare_method(
        &mut self,
        name: &str,
        param_types: Vec<TypeId>,
        return_type: Option<TypeId>,
    ) -> MethodId {
        self.add_method(Function::new(
            name.to_string(),
            MethodKind::Declaration,
            param_types,
            return_type,
        ))
    }

    pub(crate) fn add_method(&mut self, function: Function) -> MethodId {
        let id = MethodId(self.methods.len() as u32);
        self.methods.push(function);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> Function {
        // entry -> (left | right) -> join
        let mut types = TypeContext::new();
        let i1 = types.primitive(BasicValueType::Int1);
        let mut f = Function::new("diamond".into(), MethodKind::Device, Vec::new(), None);
        let cond = f.push_value(ValueData {
            ty: Some(i1),
            op: Op::Constant(Constant::Int(BasicValueType::Int1, 1)),
        });
        let entry = f.push_block(BlockData::default());
        let left = f.push_block(BlockData::default());
        let right = f.push_block(BlockData::default());
        let join = f.push_block(BlockData::default());
        f.block_mut(entry).values.push(cond);
        f.block_mut(entry).terminator = Some(Terminator::CondBr {
            cond,
            true_target: left,
            true_args: Vec::new(),
            false_target: right,
            false_args: Vec::new(),
        });
        f.block_mut(left).terminator = Some(Terminator::Br {
            target: join,
            args: Vec::new(),
        });
        f.block_mut(right).terminator = Some(Terminator::Br {
            target: join,
            args: Vec::new(),
        });
        f.block_mut(join).terminator = Some(Terminator::Ret { value: None });
        f
    }

    #[test]
    fn rpo_starts_at_entry_and_ends_at_join() {
        let f = diamond();
        let order = f.reverse_post_order();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], f.entry());
        assert_eq!(order[3].index(), 3);
    }

    #[test]
    fn rpo_skips_unreachable_blocks() {
        let mut f = diamond();
        let dead = f.push_block(BlockData::default());
        f.block_mut(dead).terminator = Some(Terminator::Ret { value: None });
        let order = f.reverse_post_order();
        assert_eq!(order.len(), 4);
        assert!(!order.contains(&dead));
    }

    #[test]
    fn operand_listing_and_remap() {
        let a = ValueId::new(3);
        let b = ValueId::new(7);
        let op = Op::Binary {
            kind: BinaryArithmeticKind::Add,
            lhs: a,
            rhs: b,
        };
        assert_eq!(op.operands(), vec![a, b]);

        let shifted = op.remapped(&mut |v| ValueId::new(v.index() + 10));
        assert_eq!(
            shifted.operands(),
            vec![ValueId::new(13), ValueId::new(17)]
        );
    }

    #[test]
    fn call_operands_are_its_arguments() {
        let args = vec![ValueId::new(0), ValueId::new(1), ValueId::new(2)];
        let op = Op::Call {
            method: MethodId(0),
            args: args.clone(),
        };
        assert_eq!(op.operands(), args);
    }
}
