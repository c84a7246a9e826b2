//! Program-level container for computation subgraphs.

use crate::ir::Computation;

/// A whole tensor program: a named, owned collection of computations.
///
/// Passes receive a mutable `Module` and report whether they changed it.
pub struct Module {
    /// Module name.
    name: String,

    /// Owned computation subgraphs.
    computations: Vec<Computation>,
}

impl Module {
    /// Create a new empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            computations: Vec::new(),
        }
    }

    /// Get the module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a computation, returning its index.
    pub fn add_computation(&mut self, computation: Computation) -> usize {
        self.computations.push(computation);
        self.computations.len() - 1
    }

    /// All computations.
    pub fn computations(&self) -> &[Computation] {
        &self.computations
    }

    /// All computations, mutably.
    pub fn computations_mut(&mut self) -> impl Iterator<Item = &mut Computation> {
        self.computations.iter_mut()
    }

    /// Look up a computation by name.
    pub fn computation_by_name(&self, name: &str) -> Option<&Computation> {
        self.computations.iter().find(|c| c.name() == name)
    }

    /// The smallest collective channel id not yet used anywhere in the
    /// program.
    ///
    /// Channel ids are positive, so a program with no channeled collectives
    /// starts at 1. Allocating from this watermark guarantees fresh ids never
    /// collide with existing ones.
    pub fn next_channel_id(&self) -> u64 {
        self.computations
            .iter()
            .flat_map(|c| c.instructions())
            .filter_map(|(_, instr)| instr.channel_id())
            .max()
            .map_or(1, |max| max + 1)
    }
}
