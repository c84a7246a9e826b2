//! Optimization pipeline for Spinel tensor programs.
//!
//! This crate hosts the graph-rewriting passes and the pipeline that drives
//! them. Passes implement [`spinel_core::Pass`] and are grouped into stages;
//! the pipeline runs them in stage order and reports whether the module
//! changed, so a driver can iterate to a fixed point if it wants to.
//!
//! # Example
//!
//! ```
//! use spinel_compiler::PassPipeline;
//! use spinel_core::Module;
//!
//! # fn main() -> spinel_core::Result<()> {
//! let mut module = Module::new("example");
//! let mut pipeline = PassPipeline::new();
//! let changed = pipeline.run(&mut module)?;
//! assert!(!changed);
//! # Ok(())
//! # }
//! ```

pub mod passes;

pub use passes::CanonicalizeAllGatherForCse;

// Re-export commonly used types from spinel-core
pub use spinel_core::{Module, Pass, Result, Stage};

/// Pass pipeline with pluggable passes.
///
/// Passes run ordered by stage; within a stage they run in registration
/// order. The built-in pass set contains the all-gather canonicalization
/// pass, and custom passes can be added via `add_pass()`.
pub struct PassPipeline {
    /// All passes to run, ordered by (stage, registration order).
    passes: Vec<Box<dyn Pass>>,
}

impl PassPipeline {
    /// Create a pipeline with the built-in passes.
    pub fn new() -> Self {
        let mut pipeline = Self { passes: Vec::new() };
        pipeline.add_pass(CanonicalizeAllGatherForCse::new());
        pipeline
    }

    /// Create a pipeline with no passes registered.
    pub fn empty() -> Self {
        Self { passes: Vec::new() }
    }

    /// Add a custom pass to the pipeline.
    ///
    /// The pass is inserted into the stage reported by `pass.stage()`.
    /// Returns a mutable reference to self for method chaining.
    pub fn add_pass(&mut self, pass: impl Pass + 'static) -> &mut Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// Number of registered passes.
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Run all passes over the module, in stage order.
    ///
    /// Returns `Ok(true)` if any pass changed the module. A pass failure
    /// aborts the run and propagates unchanged.
    #[tracing::instrument(skip_all, fields(module = module.name()))]
    pub fn run(&mut self, module: &mut Module) -> Result<bool> {
        self.passes.sort_by_key(|p| p.stage());

        let mut changed = false;
        for pass in &self.passes {
            let _span =
                tracing::debug_span!("pass", name = pass.name(), stage = ?pass.stage()).entered();
            let pass_changed = pass.run(module)?;
            changed |= pass_changed;
        }

        Ok(changed)
    }
}

impl Default for PassPipeline {
    fn default() -> Self {
        Self::new()
    }
}
