// This module defines the closed type system consumed by the backend: scalar
// primitives (BasicValueType), pointers qualified by a memory address space,
// views (pointer plus element count, the marshalling shape of kernel array
// parameters), and opaque structure aggregates. Types are interned in a
// TypeContext arena and referenced everywhere by dense TypeId handles, so
// type equality is handle equality and type data is never duplicated. The
// context also answers size/alignment queries used for element addressing
// and shared-memory layout.

//! Interned kernel IR types.
//!
//! All types live in a [`TypeContext`] and are referred to by [`TypeId`].
//! The variant set is closed; the allocator and the code generator match on
//! it exhaustively.

use std::fmt;

use hashbrown::HashMap;

/// Scalar value kinds.
///
/// Integers are fixed-width two's complement; the unsigned kinds matter for
/// conversion and division lowering. `Float16` is a storage and arithmetic
/// type of its own, subject to architecture gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicValueType {
    Int1,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,
}

impl BasicValueType {
    /// Storage size in bytes.
    pub fn size_bytes(self) -> u32 {
        match self {
            BasicValueType::Int1 | BasicValueType::Int8 | BasicValueType::UInt8 => 1,
            BasicValueType::Int16 | BasicValueType::UInt16 | BasicValueType::Float16 => 2,
            BasicValueType::Int32 | BasicValueType::UInt32 | BasicValueType::Float32 => 4,
            BasicValueType::Int64 | BasicValueType::UInt64 | BasicValueType::Float64 => 8,
        }
    }

    /// Width in bits.
    pub fn bit_width(self) -> u32 {
        match self {
            BasicValueType::Int1 => 1,
            other => other.size_bytes() * 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            BasicValueType::Float16 | BasicValueType::Float32 | BasicValueType::Float64
        )
    }

    pub fn is_integer(self) -> bool {
        !self.is_float()
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            BasicValueType::Int1
                | BasicValueType::Int8
                | BasicValueType::Int16
                | BasicValueType::Int32
                | BasicValueType::Int64
        )
    }

    /// The unsigned integer kind of the same width, used when an operation
    /// needs a raw bit container (atomic compare-and-swap payloads).
    pub fn bit_container(self) -> BasicValueType {
        match self.size_bytes() {
            1 => BasicValueType::UInt8,
            2 => BasicValueType::UInt16,
            4 => BasicValueType::UInt32,
            _ => BasicValueType::UInt64,
        }
    }
}

impl fmt::Display for BasicValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BasicValueType::Int1 => "i1",
            BasicValueType::Int8 => "i8",
            BasicValueType::Int16 => "i16",
            BasicValueType::Int32 => "i32",
            BasicValueType::Int64 => "i64",
            BasicValueType::UInt8 => "u8",
            BasicValueType::UInt16 => "u16",
            BasicValueType::UInt32 => "u32",
            BasicValueType::UInt64 => "u64",
            BasicValueType::Float16 => "f16",
            BasicValueType::Float32 => "f32",
            BasicValueType::Float64 => "f64",
        };
        f.write_str(name)
    }
}

/// Memory address spaces a pointer or view can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressSpace {
    /// Unqualified; accesses go through the generic addressing path.
    Generic,
    /// Device-global memory.
    Global,
    /// Work-group shared memory.
    Shared,
    /// Per-thread local memory.
    Local,
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AddressSpace::Generic => "generic",
            AddressSpace::Global => "global",
            AddressSpace::Shared => "shared",
            AddressSpace::Local => "local",
        };
        f.write_str(name)
    }
}

/// Dense handle of an interned type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The closed type-variant set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeNode {
    Primitive(BasicValueType),
    Pointer { element: TypeId, space: AddressSpace },
    View { element: TypeId, space: AddressSpace },
    Structure { fields: Vec<TypeId> },
}

/// Interning arena for [`TypeNode`]s.
///
/// Interning makes `TypeId` equality meaningful: requesting the same shape
/// twice yields the same handle.
#[derive(Debug, Default)]
pub struct TypeContext {
    nodes: Vec<TypeNode>,
    interner: HashMap<TypeNode, TypeId>,
}

impl TypeContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, node: TypeNode) -> TypeId {
        if let Some(&id) = self.interner.get(&node) {
            return id;
        }
        let id = TypeId(self.nodes.len() as u32);
        self.nodes.push(node.clone());
        self.interner.insert(node, id);
        id
    }

    pub fn primitive(&mut self, basic: BasicValueType) -> TypeId {
        self.intern(TypeNode::Primitive(basic))
    }

    pub fn pointer(&mut self, element: TypeId, space: AddressSpace) -> TypeId {
        self.intern(TypeNode::Pointer { element, space })
    }

    pub fn view(&mut self, element: TypeId, space: AddressSpace) -> TypeId {
        self.intern(TypeNode::View { element, space })
    }

    pub fn structure(&mut self, fields: Vec<TypeId>) -> TypeId {
        self.intern(TypeNode::Structure { fields })
    }

    pub fn node(&self, id: TypeId) -> &TypeNode {
        &self.nodes[id.index()]
    }

    /// The scalar kind behind `id`, if it is a primitive type.
    pub fn basic_type(&self, id: TypeId) -> Option<BasicValueType> {
        match self.node(id) {
            TypeNode::Primitive(basic) => Some(*basic),
            _ => None,
        }
    }

    /// Storage size in bytes. Pointers are 8 bytes (64-bit device
    /// addressing); a view is its pointer plus a 32-bit length.
    pub fn size_of(&self, id: TypeId) -> u32 {
        match self.node(id) {
            TypeNode::Primitive(basic) => basic.size_bytes(),
            TypeNode::Pointer { .. } => 8,
            TypeNode::View { .. } => 12,
            TypeNode::Structure { fields } => {
                let mut size = 0u32;
                for field in fields {
                    let align = self.align_of(*field);
                    size = align_up(size, align) + self.size_of(*field);
                }
                align_up(size, self.align_of(id))
            }
        }
    }

    /// Natural alignment in bytes.
    pub fn align_of(&self, id: TypeId) -> u32 {
        match self.node(id) {
            TypeNode::Primitive(basic) => basic.size_bytes(),
            TypeNode::Pointer { .. } => 8,
            TypeNode::View { .. } => 8,
            TypeNode::Structure { fields } => {
                fields.iter().map(|f| self.align_of(*f)).max().unwrap_or(1)
            }
        }
    }

    /// Human-readable rendering for diagnostics.
    pub fn describe(&self, id: TypeId) -> String {
        match self.node(id) {
            TypeNode::Primitive(basic) => basic.to_string(),
            TypeNode::Pointer { element, space } => {
                format!("ptr<{}, {}>", self.describe(*element), space)
            }
            TypeNode::View { element, space } => {
                format!("view<{}, {}>", self.describe(*element), space)
            }
            TypeNode::Structure { fields } => {
                let inner: Vec<String> = fields.iter().map(|f| self.describe(*f)).collect();
                format!("{{{}}}", inner.join(", "))
            }
        }
    }
}

fn align_up(value: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}
