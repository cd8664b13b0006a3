// This module implements the CUDA target model for the PTX backend: the
// closed, ordered set of supported streaming-multiprocessor architectures,
// the minimum PTX ISA revision each of them requires, and the per-target
// configuration the code generator is parameterized with. Architectures are
// plain enum variants so an unsupported value cannot be constructed; the
// numeric ordinal doubles as the applicability-range metric for intrinsic
// resolution.

//! CUDA architecture versions and PTX target configuration.

use std::fmt;

use crate::core::intrinsics::ArchitectureVersion;

/// Streaming-multiprocessor architecture generations, oldest first.
///
/// The discriminant is the conventional numeric name (`Sm70` is `sm_70`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum SmArchitecture {
    Sm30 = 30,
    Sm32 = 32,
    Sm35 = 35,
    Sm37 = 37,
    Sm50 = 50,
    Sm52 = 52,
    Sm53 = 53,
    Sm60 = 60,
    Sm61 = 61,
    Sm62 = 62,
    Sm70 = 70,
    Sm72 = 72,
    Sm75 = 75,
    Sm80 = 80,
    Sm86 = 86,
    Sm89 = 89,
    Sm90 = 90,
}

impl SmArchitecture {
    pub const ALL: [SmArchitecture; 17] = [
        SmArchitecture::Sm30,
        SmArchitecture::Sm32,
        SmArchitecture::Sm35,
        SmArchitecture::Sm37,
        SmArchitecture::Sm50,
        SmArchitecture::Sm52,
        SmArchitecture::Sm53,
        SmArchitecture::Sm60,
        SmArchitecture::Sm61,
        SmArchitecture::Sm62,
        SmArchitecture::Sm70,
        SmArchitecture::Sm72,
        SmArchitecture::Sm75,
        SmArchitecture::Sm80,
        SmArchitecture::Sm86,
        SmArchitecture::Sm89,
        SmArchitecture::Sm90,
    ];

    /// Threads per warp; fixed across all supported generations.
    pub const WARP_SIZE: u32 = 32;

    /// Lowest PTX ISA revision that can encode this target.
    pub fn minimum_isa(self) -> PtxIsaVersion {
        use SmArchitecture::*;
        match self {
            Sm30 | Sm32 | Sm35 => PtxIsaVersion::new(4, 0),
            Sm37 | Sm50 | Sm52 => PtxIsaVersion::new(4, 1),
            Sm53 => PtxIsaVersion::new(4, 2),
            Sm60 | Sm61 => PtxIsaVersion::new(5, 0),
            Sm62 => PtxIsaVersion::new(5, 1),
            Sm70 => PtxIsaVersion::new(6, 0),
            Sm72 => PtxIsaVersion::new(6, 1),
            Sm75 => PtxIsaVersion::new(6, 3),
            Sm80 => PtxIsaVersion::new(7, 0),
            Sm86 => PtxIsaVersion::new(7, 1),
            Sm89 | Sm90 => PtxIsaVersion::new(7, 8),
        }
    }

    /// `shfl.sync` replaced the unguarded `shfl` family with `sm_70`.
    pub fn supports_shuffle_sync(self) -> bool {
        self >= SmArchitecture::Sm70
    }

    /// Hardware `atom.add.f64` arrived with `sm_60`.
    pub fn supports_f64_atomic_add(self) -> bool {
        self >= SmArchitecture::Sm60
    }

    /// Scalar `f16` arithmetic arrived with `sm_53`.
    pub fn supports_half_arithmetic(self) -> bool {
        self >= SmArchitecture::Sm53
    }
}

impl fmt::Display for SmArchitecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sm_{}", *self as u32)
    }
}

impl ArchitectureVersion for SmArchitecture {
    fn ordinal(self) -> u32 {
        self as u32
    }
}

/// A PTX ISA revision, printed as the `.version` directive expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PtxIsaVersion {
    pub major: u32,
    pub minor: u32,
}

impl PtxIsaVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for PtxIsaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Everything the code generator needs to know about the compilation target.
#[derive(Debug, Clone, Copy)]
pub struct PtxTargetConfig {
    pub architecture: SmArchitecture,
    pub isa: PtxIsaVersion,
}

impl PtxTargetConfig {
    /// Target `architecture` at its minimum ISA revision.
    pub fn new(architecture: SmArchitecture) -> Self {
        Self {
            architecture,
            isa: architecture.minimum_isa(),
        }
    }

    /// Raise the emitted `.version` directive; the architecture's minimum is
    /// kept if `isa` is older.
    pub fn with_isa(mut self, isa: PtxIsaVersion) -> Self {
        self.isa = self.isa.max(isa);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generations_are_ordered() {
        assert!(SmArchitecture::Sm52 < SmArchitecture::Sm53);
        assert!(SmArchitecture::Sm62 < SmArchitecture::Sm70);
        let mut sorted = SmArchitecture::ALL;
        sorted.sort();
        assert_eq!(sorted, SmArchitecture::ALL);
    }

    #[test]
    fn display_matches_target_directive_spelling() {
        assert_eq!(SmArchitecture::Sm70.to_string(), "sm_70");
        assert_eq!(SmArchitecture::Sm90.to_string(), "sm_90");
        assert_eq!(PtxIsaVersion::new(7, 0).to_string(), "7.0");
    }

    #[test]
    fn feature_boundaries() {
        assert!(!SmArchitecture::Sm62.supports_shuffle_sync());
        assert!(SmArchitecture::Sm70.supports_shuffle_sync());
        assert!(!SmArchitecture::Sm53.supports_f64_atomic_add());
        assert!(SmArchitecture::Sm60.supports_f64_atomic_add());
        assert!(!SmArchitecture::Sm52.supports_half_arithmetic());
        assert!(SmArchitecture::Sm53.supports_half_arithmetic());
    }

    #[test]
    fn config_never_drops_below_the_minimum_isa() {
        let config = PtxTargetConfig::new(SmArchitecture::Sm80);
        assert_eq!(config.isa, PtxIsaVersion::new(7, 0));
        let raised = config.with_isa(PtxIsaVersion::new(7, 8));
        assert_eq!(raised.isa, PtxIsaVersion::new(7, 8));
        let lowered = config.with_isa(PtxIsaVersion::new(6, 0));
        assert_eq!(lowered.isa, PtxIsaVersion::new(7, 0));
    }

    #[test]
    fn ordinals_track_the_numeric_name() {
        use crate::core::intrinsics::ArchitectureVersion;
        assert_eq!(SmArchitecture::Sm30.ordinal(), 30);
        assert_eq!(SmArchitecture::Sm90.ordinal(), 90);
    }
}
