// This module implements the intrinsic implementation registry that decides,
// per target architecture, how abstract operations (atomics, broadcasts, warp
// shuffles, bit arithmetic, half-precision arithmetic, ad-hoc named methods)
// are fulfilled. Implementations are registered once at backend construction
// under a descriptor key together with an inclusive applicability range of
// architecture versions; lookup filters by range containment and prefers the
// narrowest matching range, falling back to registration order on ties. A
// failed lookup is not an error: it means the operation lowers natively. The
// registry is generic over the implementation payload so the core stays
// target-neutral; backends decide what a payload carries (redirect routine
// builders or emission callbacks).

//! Intrinsic descriptor keys and the implementation registry.

use std::fmt;

use hashbrown::HashMap;
use log::{debug, trace};

use crate::core::error::{CompileError, CompileResult};
use crate::ir::types::BasicValueType;
use crate::ir::{
    AtomicKind, BinaryArithmeticKind, BroadcastKind, Function, IrContext, MethodId, Op,
    ShuffleKind, UnaryArithmeticKind, ValueId,
};

/// Descriptor of an abstract operation an implementation can fulfill.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IntrinsicKey {
    GenericAtomic {
        kind: AtomicKind,
        basic_type: BasicValueType,
    },
    Broadcast {
        kind: BroadcastKind,
    },
    WarpShuffle {
        kind: ShuffleKind,
    },
    UnaryArithmetic {
        kind: UnaryArithmeticKind,
        basic_type: BasicValueType,
    },
    BinaryArithmetic {
        kind: BinaryArithmeticKind,
        basic_type: BasicValueType,
    },
    /// Ad-hoc method identity, keyed by name.
    Method { name: String },
}

/// Architecture version identifiers: totally ordered, with a numeric ordinal
/// used to compare applicability-range widths.
pub trait ArchitectureVersion: Copy + Ord + fmt::Display {
    fn ordinal(self) -> u32;
}

/// Builds (or returns) the IR routine a Redirect-mode implementation
/// substitutes for the operation at `value`. The routine is expressed in the
/// same IR vocabulary and is re-lowered like user code.
pub type RedirectBuilder = fn(&mut IrContext, &Function, ValueId) -> CompileResult<MethodId>;

/// One registered implementation. Backends define the payload; the registry
/// only needs the applicability range and, for the specializer, whether the
/// payload redirects.
pub trait IntrinsicImplementation {
    type Architecture: ArchitectureVersion;

    /// Inclusive lower bound; `None` is unbounded below.
    fn min_architecture(&self) -> Option<Self::Architecture>;

    /// Inclusive upper bound; `None` is unbounded above.
    fn max_architecture(&self) -> Option<Self::Architecture>;

    /// The redirect routine builder, for Redirect-mode payloads.
    fn redirect_builder(&self) -> Option<RedirectBuilder>;
}

fn covers<I: IntrinsicImplementation>(imp: &I, architecture: I::Architecture) -> bool {
    imp.min_architecture().map_or(true, |min| architecture >= min)
        && imp.max_architecture().map_or(true, |max| architecture <= max)
}

/// Range width for the narrowest-wins rule. Half-bounded ranges rank between
/// fully bounded and fully unbounded ones.
fn specificity<I: IntrinsicImplementation>(imp: &I) -> u64 {
    match (
        imp.min_architecture().map(ArchitectureVersion::ordinal),
        imp.max_architecture().map(ArchitectureVersion::ordinal),
    ) {
        (Some(min), Some(max)) => u64::from(max.saturating_sub(min)),
        (Some(_), None) | (None, Some(_)) => u64::MAX - 1,
        (None, None) => u64::MAX,
    }
}

/// Registry of intrinsic implementations, keyed by descriptor.
///
/// Populated single-threaded at backend construction, immutable afterwards;
/// lookups are read-only and safe to share across compilations.
#[derive(Debug)]
pub struct IntrinsicRegistry<I> {
    implementations: HashMap<IntrinsicKey, Vec<I>>,
}

impl<I> Default for IntrinsicRegistry<I> {
    fn default() -> Self {
        Self {
            implementations: HashMap::new(),
        }
    }
}

impl<I: IntrinsicImplementation> IntrinsicRegistry<I> {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, key: IntrinsicKey, imp: I) -> CompileResult<()> {
        if let (Some(min), Some(max)) = (imp.min_architecture(), imp.max_architecture()) {
            if min > max {
                return Err(CompileError::InvalidArchitectureRange {
                    min: min.to_string(),
                    max: max.to_string(),
                });
            }
        }
        debug!("registering intrinsic implementation for {key:?}");
        self.implementations.entry(key).or_default().push(imp);
        Ok(())
    }

    pub fn register_generic_atomic(
        &mut self,
        kind: AtomicKind,
        basic_type: BasicValueType,
        imp: I,
    ) -> CompileResult<()> {
        self.register(IntrinsicKey::GenericAtomic { kind, basic_type }, imp)
    }

    pub fn register_broadcast(&mut self, kind: BroadcastKind, imp: I) -> CompileResult<()> {
        self.register(IntrinsicKey::Broadcast { kind }, imp)
    }

    pub fn register_warp_shuffle(&mut self, kind: ShuffleKind, imp: I) -> CompileResult<()> {
        self.register(IntrinsicKey::WarpShuffle { kind }, imp)
    }

    pub fn register_unary_arithmetic(
        &mut self,
        kind: UnaryArithmeticKind,
        basic_type: BasicValueType,
        imp: I,
    ) -> CompileResult<()> {
        self.register(IntrinsicKey::UnaryArithmetic { kind, basic_type }, imp)
    }

    pub fn register_binary_arithmetic(
        &mut self,
        kind: BinaryArithmeticKind,
        basic_type: BasicValueType,
        imp: I,
    ) -> CompileResult<()> {
        self.register(IntrinsicKey::BinaryArithmetic { kind, basic_type }, imp)
    }

    pub fn register_method(&mut self, name: &str, imp: I) -> CompileResult<()> {
        self.register(
            IntrinsicKey::Method {
                name: name.to_string(),
            },
            imp,
        )
    }

    /// The implementation to use for `key` at `architecture`, if any.
    ///
    /// `None` means the operation lowers natively; it is never an error.
    pub fn resolve(&self, key: &IntrinsicKey, architecture: I::Architecture) -> Option<&I> {
        let candidates = self.implementations.get(key)?;
        let mut best: Option<(&I, u64)> = None;
        for imp in candidates {
            if !covers(imp, architecture) {
                continue;
            }
            let width = specificity(imp);
            // Strict comparison keeps the first registered on ties.
            match best {
                Some((_, best_width)) if width >= best_width => {}
                _ => best = Some((imp, width)),
            }
        }
        if best.is_some() {
            trace!("resolved {key:?} at {architecture}");
        }
        best.map(|(imp, _)| imp)
    }
}

/// The descriptor for `value`'s operation, if the operation is subject to
/// intrinsic specialization at all.
pub fn intrinsic_key_for(
    ctx: &IrContext,
    function: &Function,
    value: ValueId,
) -> Option<IntrinsicKey> {
    let basic_of = |v: ValueId| {
        function
            .value_type(v)
            .and_then(|ty| ctx.types().basic_type(ty))
    };
    match function.op(value) {
        Op::AtomicRmw { kind, value: v, .. } => Some(IntrinsicKey::GenericAtomic {
            kind: *kind,
            basic_type: basic_of(*v)?,
        }),
        Op::Broadcast { kind, .. } => Some(IntrinsicKey::Broadcast { kind: *kind }),
        Op::Shuffle { kind, .. } => Some(IntrinsicKey::WarpShuffle { kind: *kind }),
        Op::Unary { kind, value: v } => Some(IntrinsicKey::UnaryArithmetic {
            kind: *kind,
            basic_type: basic_of(*v)?,
        }),
        Op::Binary { kind, lhs, .. } => Some(IntrinsicKey::BinaryArithmetic {
            kind: *kind,
            basic_type: basic_of(*lhs)?,
        }),
        Op::Call { method, .. } => Some(IntrinsicKey::Method {
            name: ctx.method(*method).name.clone(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    struct V(u32);

    impl fmt::Display for V {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "v{}", self.0)
        }
    }

    impl ArchitectureVersion for V {
        fn ordinal(self) -> u32 {
            self.0
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct TestImp {
        tag: &'static str,
        min: Option<V>,
        max: Option<V>,
    }

    impl TestImp {
        fn new(tag: &'static str, min: Option<u32>, max: Option<u32>) -> Self {
            Self {
                tag,
                min: min.map(V),
                max: max.map(V),
            }
        }
    }

    impl IntrinsicImplementation for TestImp {
        type Architecture = V;

        fn min_architecture(&self) -> Option<V> {
            self.min
        }

        fn max_architecture(&self) -> Option<V> {
            self.max
        }

        fn redirect_builder(&self) -> Option<RedirectBuilder> {
            None
        }
    }

    fn atomic_key() -> IntrinsicKey {
        IntrinsicKey::GenericAtomic {
            kind: AtomicKind::Add,
            basic_type: BasicValueType::Float64,
        }
    }

    #[test]
    fn unregistered_keys_resolve_to_none() {
        let registry: IntrinsicRegistry<TestImp> = IntrinsicRegistry::new();
        assert!(registry.resolve(&atomic_key(), V(60)).is_none());
    }

    #[test]
    fn range_containment_is_inclusive() {
        let mut registry = IntrinsicRegistry::new();
        registry
            .register_generic_atomic(
                AtomicKind::Add,
                BasicValueType::Float64,
                TestImp::new("bounded", Some(30), Some(53)),
            )
            .unwrap();

        assert!(registry.resolve(&atomic_key(), V(30)).is_some());
        assert!(registry.resolve(&atomic_key(), V(53)).is_some());
        assert!(registry.resolve(&atomic_key(), V(29)).is_none());
        assert!(registry.resolve(&atomic_key(), V(54)).is_none());
    }

    #[test]
    fn adjacent_ranges_split_at_the_boundary() {
        let mut registry = IntrinsicRegistry::new();
        registry
            .register_broadcast(
                BroadcastKind::WarpLevel,
                TestImp::new("low", None, Some(62)),
            )
            .unwrap();
        registry
            .register_broadcast(
                BroadcastKind::WarpLevel,
                TestImp::new("high", Some(70), None),
            )
            .unwrap();

        let key = IntrinsicKey::Broadcast {
            kind: BroadcastKind::WarpLevel,
        };
        assert_eq!(registry.resolve(&key, V(62)).unwrap().tag, "low");
        assert_eq!(registry.resolve(&key, V(70)).unwrap().tag, "high");
        // A gap between the ranges means native lowering.
        assert!(registry.resolve(&key, V(65)).is_none());
    }

    #[test]
    fn narrowest_range_wins() {
        let mut registry = IntrinsicRegistry::new();
        registry
            .register_method("wide", TestImp::new("unbounded", None, None))
            .unwrap();
        registry
            .register_method("wide", TestImp::new("narrow", Some(50), Some(52)))
            .unwrap();
        registry
            .register_method("wide", TestImp::new("half", Some(40), None))
            .unwrap();

        let key = IntrinsicKey::Method {
            name: "wide".to_string(),
        };
        assert_eq!(registry.resolve(&key, V(51)).unwrap().tag, "narrow");
        assert_eq!(registry.resolve(&key, V(60)).unwrap().tag, "half");
        assert_eq!(registry.resolve(&key, V(30)).unwrap().tag, "unbounded");
    }

    #[test]
    fn equal_ranges_keep_registration_order() {
        let mut registry = IntrinsicRegistry::new();
        registry
            .register_method("m", TestImp::new("first", Some(10), Some(20)))
            .unwrap();
        registry
            .register_method("m", TestImp::new("second", Some(10), Some(20)))
            .unwrap();

        let key = IntrinsicKey::Method {
            name: "m".to_string(),
        };
        assert_eq!(registry.resolve(&key, V(15)).unwrap().tag, "first");
    }

    #[test]
    fn inverted_ranges_are_rejected_at_registration() {
        let mut registry = IntrinsicRegistry::new();
        let err = registry
            .register_method("bad", TestImp::new("bad", Some(70), Some(60)))
            .unwrap_err();
        assert!(matches!(err, CompileError::InvalidArchitectureRange { .. }));
    }
}
