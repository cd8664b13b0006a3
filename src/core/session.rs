// This module provides arena-based compilation session management using the
// bumpalo crate to simplify lifetime management during kernel lowering.
// CompilationSession owns the arena allocator and the per-run bookkeeping
// shared by the specializer and the code generator: interned strings (kernel
// names, block labels) that live as long as the session, and compilation
// statistics (kernels compiled, values lowered, redirect routines inlined,
// generation callbacks invoked, variables allocated, emitted instruction
// breakdown). Statistics sit behind a RefCell so recording works through the
// shared references the generator hands out to callbacks.

//! Arena-based compilation session management.
//!
//! One session typically spans one backend invocation; independent
//! compilations use independent sessions.

use std::cell::RefCell;
use std::fmt;

use bumpalo::Bump;
use hashbrown::HashMap;

/// Arena-backed session state for one compilation run.
pub struct CompilationSession<'arena> {
    /// Arena allocator for compilation objects.
    arena: &'arena Bump,

    /// Statistics for debugging and tuning.
    stats: RefCell<CompilationStats>,

    /// String interning; interned strings share the arena lifetime.
    interned_strings: RefCell<HashMap<String, &'arena str>>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(CompilationStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Allocate an object in the session arena.
    pub fn alloc<T>(&self, value: T) -> &'arena mut T {
        self.arena.alloc(value)
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    /// Record that a kernel finished lowering.
    pub fn record_kernel_compiled(&self, name: &str, code_size: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.kernels_compiled += 1;
        stats.total_code_size += code_size;

        if stats.largest_kernel_size < code_size {
            stats.largest_kernel_size = code_size;
            stats.largest_kernel_name = name.to_string();
        }
    }

    /// Record one lowered IR value.
    pub fn record_value_lowered(&self) {
        self.stats.borrow_mut().values_lowered += 1;
    }

    /// Record an emitted instruction by mnemonic.
    pub fn record_instruction_emitted(&self, mnemonic: &str) {
        let mut stats = self.stats.borrow_mut();
        stats.instructions_emitted += 1;
        *stats
            .instruction_counts
            .entry(mnemonic.to_string())
            .or_insert(0) += 1;
    }

    /// Record an inlined redirect routine.
    pub fn record_redirect_inlined(&self, name: &str) {
        self.stats.borrow_mut().redirects_inlined += 1;
        log::debug!("redirect routine inlined: {name}");
    }

    /// Record an invoked generation callback.
    pub fn record_callback_invoked(&self) {
        self.stats.borrow_mut().callbacks_invoked += 1;
    }

    /// Record the variable count of a finished kernel.
    pub fn record_variables_allocated(&self, count: usize) {
        self.stats.borrow_mut().variables_allocated += count;
    }

    /// Get compilation statistics.
    pub fn stats(&self) -> CompilationStats {
        self.stats.borrow().clone()
    }
}

/// Compilation statistics.
#[derive(Debug, Default, Clone)]
pub struct CompilationStats {
    /// Number of kernels compiled.
    pub kernels_compiled: usize,

    /// Total assembly size generated (bytes).
    pub total_code_size: usize,

    /// Number of IR values lowered.
    pub values_lowered: usize,

    /// Number of instructions emitted.
    pub instructions_emitted: usize,

    /// Count per emitted mnemonic.
    pub instruction_counts: HashMap<String, usize>,

    /// Largest kernel compiled (for analysis).
    pub largest_kernel_size: usize,

    /// Name of the largest kernel.
    pub largest_kernel_name: String,

    /// Redirect routines inlined by specialization.
    pub redirects_inlined: usize,

    /// Generation callbacks invoked.
    pub callbacks_invoked: usize,

    /// Backend variables allocated.
    pub variables_allocated: usize,
}

impl fmt::Display for CompilationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Kernels compiled: {}", self.kernels_compiled)?;
        writeln!(f, "  Values lowered: {}", self.values_lowered)?;
        writeln!(f, "  Instructions emitted: {}", self.instructions_emitted)?;
        writeln!(f, "  Total code size: {} bytes", self.total_code_size)?;
        writeln!(f, "  Redirects inlined: {}", self.redirects_inlined)?;
        writeln!(f, "  Callbacks invoked: {}", self.callbacks_invoked)?;
        writeln!(f, "  Variables allocated: {}", self.variables_allocated)?;

        if !self.largest_kernel_name.is_empty() {
            writeln!(
                f,
                "  Largest kernel: {} ({} bytes)",
                self.largest_kernel_name, self.largest_kernel_size
            )?;
        }

        if !self.instruction_counts.is_empty() {
            writeln!(f, "  Instruction breakdown:")?;
            let mut sorted: Vec<_> = self.instruction_counts.iter().collect();
            sorted.sort_by_key(|(_, count)| std::cmp::Reverse(*count));

            for (mnemonic, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", mnemonic, count)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sessions_start_empty() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let stats = session.stats();
        assert_eq!(stats.kernels_compiled, 0);
        assert_eq!(stats.values_lowered, 0);
        assert_eq!(stats.redirects_inlined, 0);
    }

    #[test]
    fn string_interning_shares_storage() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let s1 = session.intern_str("LBB0");
        let s2 = session.intern_str("LBB0");
        let s3 = session.intern_str("LBB1");

        assert_eq!(s1.as_ptr(), s2.as_ptr());
        assert_ne!(s1.as_ptr(), s3.as_ptr());
    }

    #[test]
    fn statistics_accumulate() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.record_kernel_compiled("saxpy", 512);
        session.record_value_lowered();
        session.record_value_lowered();
        session.record_instruction_emitted("add");
        session.record_instruction_emitted("ld");
        session.record_instruction_emitted("add");
        session.record_redirect_inlined("atomic_add_f64");
        session.record_callback_invoked();
        session.record_variables_allocated(7);

        let stats = session.stats();
        assert_eq!(stats.kernels_compiled, 1);
        assert_eq!(stats.total_code_size, 512);
        assert_eq!(stats.values_lowered, 2);
        assert_eq!(stats.instruction_counts["add"], 2);
        assert_eq!(stats.instruction_counts["ld"], 1);
        assert_eq!(stats.redirects_inlined, 1);
        assert_eq!(stats.callbacks_invoked, 1);
        assert_eq!(stats.variables_allocated, 7);
    }

    #[test]
    fn statistics_display_lists_the_largest_kernel() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.record_kernel_compiled("scan", 256);
        session.record_kernel_compiled("reduce", 1024);

        let output = format!("{}", session.stats());
        assert!(output.contains("Kernels compiled: 2"));
        assert!(output.contains("reduce (1024 bytes)"));
    }
}
