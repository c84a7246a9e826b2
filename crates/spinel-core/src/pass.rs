//! Optimization pass trait and stage definitions.

use crate::module::Module;
use crate::Result;

/// Compilation stage for organizing passes.
///
/// Passes are grouped into stages and run in a fixed order. Within each stage,
/// passes run in the order they were registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Rewrites that normalize equivalent instruction patterns into one
    /// syntactic form, so later stages can recognize them as identical.
    Canonicalization,

    /// Graph rewriting that improves the program (CSE, dead code
    /// elimination, collective combining, ...).
    Optimization,
}

/// Trait for implementing compiler passes.
///
/// A pass is a module transformation that runs during a specific compilation
/// stage.
///
/// # Return Value
///
/// The `run()` method returns `Ok(true)` if the pass made changes to the
/// module, or `Ok(false)` if no changes were made. This allows the driver
/// to detect when the module reaches a fixed point and skip unnecessary work.
pub trait Pass: Send + Sync {
    /// Get the pass name (used for logging and debugging).
    fn name(&self) -> &str;

    /// Get the compilation stage this pass belongs to.
    fn stage(&self) -> Stage;

    /// Run the pass on the given module.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` if the pass made changes to the module.
    /// * `Ok(false)` if no changes were made.
    /// * `Err(_)` if the pass encountered an error; the module must not be
    ///   relied upon after a failed run.
    fn run(&self, module: &mut Module) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Mock pass for testing
    struct NoOpPass;

    impl Pass for NoOpPass {
        fn name(&self) -> &str {
            "noop"
        }

        fn stage(&self) -> Stage {
            Stage::Optimization
        }

        fn run(&self, _module: &mut Module) -> Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_pass_trait() {
        let pass: Box<dyn Pass> = Box::new(NoOpPass);
        let mut module = Module::new("test");

        assert_eq!(pass.name(), "noop");
        assert_eq!(pass.stage(), Stage::Optimization);
        assert!(!pass.run(&mut module).unwrap());
    }

    #[test]
    fn test_stage_ordering() {
        assert!(Stage::Canonicalization < Stage::Optimization);
    }
}
