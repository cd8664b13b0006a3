// This module implements the variable allocation system that maps IR values to
// backend-level variables during kernel lowering. Every value that produces a
// result gets exactly one variable for the lifetime of the compilation unit:
// a scalar register (PrimitiveVariable), an address register (PointerVariable),
// an opaque aggregate placeholder (ObjectVariable), or a compound view
// (ViewVariable, decomposed into a pointer part and a 32-bit length part).
// Register-backed variables carry monotonically assigned ids that are never
// reused within a unit, so the code generator can derive stable register names
// and declarations from the allocation log. The binding table is a dense array
// indexed by the value's arena index; lookups never hash.

//! Variable allocation for kernel code generation.
//!
//! [`VariableAllocator`] is created once per kernel compilation and is the
//! single authority on where each IR value lives at the target level.
//! Allocation is idempotent; loads of never-allocated values are ordering
//! bugs and surface as errors.

use crate::core::error::{CompileError, CompileResult};
use crate::ir::types::{AddressSpace, BasicValueType, TypeContext, TypeId, TypeNode};
use crate::ir::{Function, ValueId};

/// Identifier of a register-backed variable, unique within one compilation
/// unit.
pub type VarId = u32;

/// A scalar register variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveVariable {
    pub id: VarId,
    pub basic_type: BasicValueType,
}

/// An address register variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerVariable {
    pub id: VarId,
    pub element: TypeId,
    pub space: AddressSpace,
}

/// Opaque placeholder for an aggregate; never decomposed at this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectVariable {
    pub id: VarId,
    pub object_type: TypeId,
}

/// A view: pointer part plus 32-bit element count. Not itself id-bearing;
/// its two parts own the ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewVariable {
    pub view_type: TypeId,
    pub pointer: PointerVariable,
    pub length: PrimitiveVariable,
}

/// The closed variable union.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    Primitive(PrimitiveVariable),
    Pointer(PointerVariable),
    Object(ObjectVariable),
    View(ViewVariable),
}

impl Variable {
    /// The register id, for the three register-backed kinds.
    pub fn id(&self) -> Option<VarId> {
        match self {
            Variable::Primitive(v) => Some(v.id),
            Variable::Pointer(v) => Some(v.id),
            Variable::Object(v) => Some(v.id),
            Variable::View(_) => None,
        }
    }

    /// Whether this variable maps to a single hardware register.
    pub fn is_intrinsic(&self) -> bool {
        !matches!(self, Variable::View(_))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Variable::Primitive(_) => "primitive",
            Variable::Pointer(_) => "pointer",
            Variable::Object(_) => "object",
            Variable::View(_) => "view",
        }
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::PrimitiveVariable {}
    impl Sealed for super::PointerVariable {}
    impl Sealed for super::ObjectVariable {}
    impl Sealed for super::ViewVariable {}
}

/// Typed access to one [`Variable`] kind, used by
/// [`VariableAllocator::load_as`].
pub trait VariableKind: sealed::Sealed + Sized {
    const KIND_NAME: &'static str;

    fn from_variable(variable: &Variable) -> Option<Self>;
}

impl VariableKind for PrimitiveVariable {
    const KIND_NAME: &'static str = "primitive";

    fn from_variable(variable: &Variable) -> Option<Self> {
        match variable {
            Variable::Primitive(v) => Some(*v),
            _ => None,
        }
    }
}

impl VariableKind for PointerVariable {
    const KIND_NAME: &'static str = "pointer";

    fn from_variable(variable: &Variable) -> Option<Self> {
        match variable {
            Variable::Pointer(v) => Some(*v),
            _ => None,
        }
    }
}

impl VariableKind for ObjectVariable {
    const KIND_NAME: &'static str = "object";

    fn from_variable(variable: &Variable) -> Option<Self> {
        match variable {
            Variable::Object(v) => Some(*v),
            _ => None,
        }
    }
}

impl VariableKind for ViewVariable {
    const KIND_NAME: &'static str = "view";

    fn from_variable(variable: &Variable) -> Option<Self> {
        match variable {
            Variable::View(v) => Some(*v),
            _ => None,
        }
    }
}

/// Maps IR values to backend variables for one compilation unit.
///
/// Not thread-safe by design; each compiling thread owns its instance.
pub struct VariableAllocator<'a> {
    types: &'a TypeContext,
    function: &'a Function,
    /// Dense binding table indexed by the value's arena index.
    bindings: Vec<Option<Variable>>,
    /// Every register-backed variable ever created, in id order. Drives
    /// register declaration emission.
    created: Vec<Variable>,
    id_counter: VarId,
}

impl<'a> VariableAllocator<'a> {
    pub fn new(types: &'a TypeContext, function: &'a Function) -> Self {
        Self {
            types,
            function,
            bindings: vec![None; function.value_count()],
            created: Vec::new(),
            id_counter: 0,
        }
    }

    fn fresh_id(&mut self) -> VarId {
        let id = self.id_counter;
        self.id_counter += 1;
        id
    }

    /// The variable for `value`, allocating it on first request. Later
    /// requests return the recorded variable unchanged.
    pub fn allocate(&mut self, value: ValueId) -> CompileResult<Variable> {
        if let Some(variable) = self.bindings[value.index()] {
            return Ok(variable);
        }
        let ty = self
            .function
            .value_type(value)
            .ok_or_else(|| CompileError::CodeGeneration {
                reason: format!("cannot allocate a variable for value-less {value:?}"),
            })?;
        let variable = self.allocate_ir_type(ty);
        self.bindings[value.index()] = Some(variable);
        Ok(variable)
    }

    /// Like [`allocate`](Self::allocate), but restricted to register-backed
    /// variables; views are rejected.
    pub fn allocate_intrinsic(&mut self, value: ValueId) -> CompileResult<Variable> {
        let variable = self.allocate(value)?;
        if !variable.is_intrinsic() {
            return Err(CompileError::NotSupported {
                reason: format!("{value:?} is a view; views have no single register"),
            });
        }
        Ok(variable)
    }

    /// Allocate a scalar register not tied to any IR value (emulation and
    /// move-resolution temporaries).
    pub fn allocate_basic(&mut self, basic_type: BasicValueType) -> PrimitiveVariable {
        let variable = PrimitiveVariable {
            id: self.fresh_id(),
            basic_type,
        };
        self.created.push(Variable::Primitive(variable));
        variable
    }

    /// Allocate an address register not tied to any IR value.
    pub fn allocate_pointer(&mut self, element: TypeId, space: AddressSpace) -> PointerVariable {
        let variable = PointerVariable {
            id: self.fresh_id(),
            element,
            space,
        };
        self.created.push(Variable::Pointer(variable));
        variable
    }

    /// Allocate a variable for an arbitrary type. Dispatch over the variant
    /// set is exhaustive; a view allocates its pointer part first, then its
    /// length part.
    pub fn allocate_ir_type(&mut self, ty: TypeId) -> Variable {
        let node = self.types.node(ty).clone();
        match node {
            TypeNode::Primitive(basic) => Variable::Primitive(self.allocate_basic(basic)),
            TypeNode::Pointer { element, space } => {
                Variable::Pointer(self.allocate_pointer(element, space))
            }
            TypeNode::View { element, space } => {
                let pointer = self.allocate_pointer(element, space);
                let length = self.allocate_basic(BasicValueType::Int32);
                Variable::View(ViewVariable {
                    view_type: ty,
                    pointer,
                    length,
                })
            }
            TypeNode::Structure { .. } => {
                let variable = ObjectVariable {
                    id: self.fresh_id(),
                    object_type: ty,
                };
                self.created.push(Variable::Object(variable));
                Variable::Object(variable)
            }
        }
    }

    /// The variable previously allocated for `value`.
    pub fn load(&self, value: ValueId) -> CompileResult<Variable> {
        self.bindings[value.index()]
            .ok_or(CompileError::UnboundValue { value })
    }

    /// Load as a specific variable kind.
    pub fn load_as<K: VariableKind>(&self, value: ValueId) -> CompileResult<K> {
        let variable = self.load(value)?;
        K::from_variable(&variable).ok_or_else(|| CompileError::InvalidCodeGeneration {
            value,
            expected: K::KIND_NAME,
            found: variable.kind_name(),
        })
    }

    /// Load, rejecting views.
    pub fn load_intrinsic(&self, value: ValueId) -> CompileResult<Variable> {
        let variable = self.load(value)?;
        if !variable.is_intrinsic() {
            return Err(CompileError::InvalidCodeGeneration {
                value,
                expected: "intrinsic",
                found: variable.kind_name(),
            });
        }
        Ok(variable)
    }

    /// Force-associate `value` with `variable`, replacing any prior binding.
    /// This is how generation callbacks alias a result to an existing
    /// register.
    pub fn bind(&mut self, value: ValueId, variable: Variable) {
        self.bindings[value.index()] = Some(variable);
    }

    pub fn is_allocated(&self, value: ValueId) -> bool {
        self.bindings[value.index()].is_some()
    }

    /// Register-backed variables in creation (id) order.
    pub fn allocations(&self) -> &[Variable] {
        &self.created
    }

    pub fn allocation_count(&self) -> usize {
        self.created.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, IrContext, MethodId};

    fn fixture() -> (IrContext, MethodId) {
        let mut ctx = IrContext::new();
        let f32t = ctx.types_mut().primitive(BasicValueType::Float32);
        let f64t = ctx.types_mut().primitive(BasicValueType::Float64);
        let view = ctx.types_mut().view(f32t, AddressSpace::Global);
        let pair = ctx.types_mut().structure(vec![f32t, f64t]);

        let mut b = FunctionBuilder::kernel(&mut ctx, "fixture");
        b.add_param(view);
        b.add_param(f64t);
        b.add_param(pair);
        let (entry, _) = b.create_block(&[]);
        b.switch_to(entry);
        b.ret(None);
        let id = b.finish();
        (ctx, id)
    }

    #[test]
    fn allocation_is_idempotent() {
        let (ctx, id) = fixture();
        let func = ctx.method(id);
        let scalar = func.params[1];
        let mut alloc = VariableAllocator::new(ctx.types(), func);

        let first = alloc.allocate(scalar).unwrap();
        let second = alloc.allocate(scalar).unwrap();
        assert_eq!(first, second);
        assert_eq!(alloc.allocation_count(), 1);
    }

    #[test]
    fn ids_are_monotonic_and_views_take_two() {
        let (ctx, id) = fixture();
        let func = ctx.method(id);
        let mut alloc = VariableAllocator::new(ctx.types(), func);

        let view = alloc.allocate(func.params[0]).unwrap();
        let Variable::View(view) = view else {
            panic!("expected a view variable");
        };
        assert_eq!(view.pointer.id, 0);
        assert_eq!(view.length.id, 1);
        assert_eq!(view.length.basic_type, BasicValueType::Int32);

        let scalar = alloc.allocate(func.params[1]).unwrap();
        assert_eq!(scalar.id(), Some(2));
    }

    #[test]
    fn structures_become_opaque_objects() {
        let (ctx, id) = fixture();
        let func = ctx.method(id);
        let mut alloc = VariableAllocator::new(ctx.types(), func);

        let var = alloc.allocate(func.params[2]).unwrap();
        let Variable::Object(obj) = var else {
            panic!("expected an object variable");
        };
        assert_eq!(obj.id, 0);
        assert!(var.is_intrinsic());
    }

    #[test]
    fn intrinsic_allocation_rejects_views() {
        let (ctx, id) = fixture();
        let func = ctx.method(id);
        let mut alloc = VariableAllocator::new(ctx.types(), func);

        let err = alloc.allocate_intrinsic(func.params[0]).unwrap_err();
        assert!(matches!(err, CompileError::NotSupported { .. }));
        // The failed request still allocated and recorded the view.
        assert!(alloc.is_allocated(func.params[0]));
    }

    #[test]
    fn load_before_allocate_fails() {
        let (ctx, id) = fixture();
        let func = ctx.method(id);
        let alloc = VariableAllocator::new(ctx.types(), func);

        let err = alloc.load(func.params[1]).unwrap_err();
        assert!(matches!(err, CompileError::UnboundValue { .. }));
    }

    #[test]
    fn load_as_checks_the_kind() {
        let (ctx, id) = fixture();
        let func = ctx.method(id);
        let mut alloc = VariableAllocator::new(ctx.types(), func);
        alloc.allocate(func.params[1]).unwrap();

        let ok = alloc.load_as::<PrimitiveVariable>(func.params[1]).unwrap();
        assert_eq!(ok.basic_type, BasicValueType::Float64);

        let err = alloc
            .load_as::<PointerVariable>(func.params[1])
            .unwrap_err();
        match err {
            CompileError::InvalidCodeGeneration {
                expected, found, ..
            } => {
                assert_eq!(expected, "pointer");
                assert_eq!(found, "primitive");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn load_intrinsic_rejects_views() {
        let (ctx, id) = fixture();
        let func = ctx.method(id);
        let mut alloc = VariableAllocator::new(ctx.types(), func);
        alloc.allocate(func.params[0]).unwrap();

        let err = alloc.load_intrinsic(func.params[0]).unwrap_err();
        assert!(matches!(
            err,
            CompileError::InvalidCodeGeneration {
                expected: "intrinsic",
                ..
            }
        ));
    }

    #[test]
    fn bind_overwrites_previous_binding() {
        let (ctx, id) = fixture();
        let func = ctx.method(id);
        let mut alloc = VariableAllocator::new(ctx.types(), func);
        let scalar = func.params[1];
        let original = alloc.allocate(scalar).unwrap();

        let replacement = alloc.allocate_basic(BasicValueType::Float64);
        alloc.bind(scalar, Variable::Primitive(replacement));

        let loaded = alloc.load(scalar).unwrap();
        assert_ne!(loaded, original);
        assert_eq!(loaded.id(), Some(replacement.id));
    }

    #[test]
    fn raw_allocations_are_logged_but_unbound() {
        let (ctx, id) = fixture();
        let func = ctx.method(id);
        let mut alloc = VariableAllocator::new(ctx.types(), func);

        let a = alloc.allocate_basic(BasicValueType::Int32);
        let b = alloc.allocate_basic(BasicValueType::Float32);
        assert_eq!(a.id + 1, b.id);
        assert_eq!(alloc.allocation_count(), 2);
        assert!(!alloc.is_allocated(func.params[1]));
    }
}
