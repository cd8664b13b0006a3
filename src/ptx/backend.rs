// The backend owns the target configuration and the intrinsic registry and
// drives one kernel through the two compilation stages: redirect
// specialization over the IR, then PTX emission. The registry ships with the
// standard implementation table and stays open for overrides before the
// first kernel is compiled.

//! PTX backend entry point.

use crate::core::error::{CompileError, CompileResult};
use crate::core::intrinsics::IntrinsicRegistry;
use crate::core::session::CompilationSession;
use crate::core::specialize::specialize_method;
use crate::ir::{IrContext, MethodId, MethodKind};
use crate::ptx::codegen::PtxCodeGenerator;
use crate::ptx::intrinsics::{register_intrinsics, PtxIntrinsic};
use crate::ptx::target::PtxTargetConfig;

/// Compiles kernel functions into PTX modules for one target configuration.
pub struct PtxBackend {
    config: PtxTargetConfig,
    registry: IntrinsicRegistry<PtxIntrinsic>,
}

impl PtxBackend {
    /// A backend carrying the shipped intrinsic table.
    pub fn new(config: PtxTargetConfig) -> CompileResult<Self> {
        let mut registry = IntrinsicRegistry::new();
        register_intrinsics(&mut registry)?;
        Ok(Self { config, registry })
    }

    pub fn config(&self) -> PtxTargetConfig {
        self.config
    }

    pub fn registry(&self) -> &IntrinsicRegistry<PtxIntrinsic> {
        &self.registry
    }

    /// Mutable registry access, for registering additional implementations
    /// before compiling.
    pub fn registry_mut(&mut self) -> &mut IntrinsicRegistry<PtxIntrinsic> {
        &mut self.registry
    }

    /// Compile `method` into a complete PTX module.
    ///
    /// Specialization may add redirect routines to `ctx`; routines are cached
    /// there, so compiling further kernels reuses them.
    pub fn compile_kernel(
        &self,
        ctx: &mut IrContext,
        method: MethodId,
        session: &CompilationSession<'_>,
    ) -> CompileResult<String> {
        {
            let function = ctx.method(method);
            if function.kind != MethodKind::Kernel {
                return Err(CompileError::CodeGeneration {
                    reason: format!("'{}' is not a kernel entry point", function.name),
                });
            }
            log::debug!(
                "compiling kernel '{}' for {}",
                function.name,
                self.config.architecture
            );
        }
        let specialized = specialize_method(
            ctx,
            method,
            &self.registry,
            self.config.architecture,
            session,
        )?;
        let generator =
            PtxCodeGenerator::new(self.config, &self.registry, session, ctx, &specialized);
        generator.generate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FunctionBuilder;
    use crate::ptx::target::SmArchitecture;
    use bumpalo::Bump;

    #[test]
    fn device_functions_are_rejected() {
        let mut ctx = IrContext::new();
        let mut b = FunctionBuilder::device(&mut ctx, "helper", None);
        let (entry, _) = b.create_block(&[]);
        b.switch_to(entry);
        b.ret(None);
        let method = b.finish();

        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let backend = PtxBackend::new(PtxTargetConfig::new(SmArchitecture::Sm70)).unwrap();
        let err = backend
            .compile_kernel(&mut ctx, method, &session)
            .unwrap_err();
        assert!(matches!(err, CompileError::CodeGeneration { .. }));
    }

    #[test]
    fn empty_kernels_produce_a_module_header() {
        let mut ctx = IrContext::new();
        let mut b = FunctionBuilder::kernel(&mut ctx, "noop");
        let (entry, _) = b.create_block(&[]);
        b.switch_to(entry);
        b.ret(None);
        let method = b.finish();

        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let backend = PtxBackend::new(PtxTargetConfig::new(SmArchitecture::Sm70)).unwrap();
        let ptx = backend.compile_kernel(&mut ctx, method, &session).unwrap();
        assert!(ptx.contains(".version 6.0"));
        assert!(ptx.contains(".target sm_70"));
        assert!(ptx.contains(".address_size 64"));
        assert!(ptx.contains(".visible .entry noop("));
        assert!(ptx.contains("ret;"));
        assert_eq!(session.stats().kernels_compiled, 1);
    }
}
