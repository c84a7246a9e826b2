//! Intermediate representation for tensor-program computations.
//!
//! The IR is a directed acyclic instruction graph:
//! - **Instructions** (`Instruction`) are operations (all-gather, reshape, ...)
//! - petgraph edges run from an operand to each instruction that consumes it
//!   and exist solely for dependency ordering and use tracking
//!
//! A `Computation` owns its instructions in a stable arena: instruction ids
//! stay valid across removals, which lets passes snapshot a traversal order
//! and then mutate the graph while iterating.

use crate::shape::Shape;
use crate::{Error, Result};
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::visit::Topo;
use petgraph::Direction;

/// Type alias for instruction identifiers (backed by petgraph NodeIndex).
pub type InstrId = NodeIndex;

// ─────────────────────────────────── Op ──────────────────────────────────

/// Collective configuration carried by an all-gather instruction.
///
/// `channel_id` is an explicit optional: a cross-device synchronized
/// collective carries `Some(id)`, a within-replica collective carries `None`.
/// The two must stay distinguishable, so no sentinel value is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllGatherSpec {
    /// Dimension along which shards are concatenated.
    pub gather_dim: usize,

    /// Partition of participants; each group gathers independently.
    pub replica_groups: Vec<Vec<u64>>,

    /// Whether the operand and output layouts are pinned.
    pub constrain_layout: bool,

    /// Token tying this collective to its counterparts on other devices.
    pub channel_id: Option<u64>,

    /// Whether replica group entries are global device ids.
    pub use_global_device_ids: bool,
}

/// Operation kind of an instruction.
///
/// Only the variants the optimizer inspects carry structured payloads;
/// every other operation in a program is an `Opaque` leaf identified by its
/// kind name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Computation input.
    Parameter,

    /// Compile-time constant value.
    Constant,

    /// Collective concatenation of per-participant shards.
    AllGather(AllGatherSpec),

    /// Shape reinterpretation; may reorder data in general.
    Reshape,

    /// Shape reinterpretation without data movement.
    Bitcast,

    /// Any operation kind this crate does not model structurally.
    Opaque(String),
}

impl Op {
    /// Kind name for diagnostics.
    pub fn kind_name(&self) -> &str {
        match self {
            Op::Parameter => "parameter",
            Op::Constant => "constant",
            Op::AllGather(_) => "all-gather",
            Op::Reshape => "reshape",
            Op::Bitcast => "bitcast",
            Op::Opaque(kind) => kind,
        }
    }
}

// ──────────────────────────────── Instruction ────────────────────────────

/// A node in the instruction graph.
#[derive(Debug, Clone)]
pub struct Instruction {
    /// Instruction name (unique naming is the builder's concern).
    name: String,

    /// Operation kind, with structured payloads for modeled kinds.
    op: Op,

    /// Output shape.
    shape: Shape,

    /// Ordered operand references.
    operands: Vec<InstrId>,
}

impl Instruction {
    /// Create an instruction with no operands.
    pub fn new(name: impl Into<String>, op: Op, shape: Shape) -> Self {
        Self {
            name: name.into(),
            op,
            shape,
            operands: Vec::new(),
        }
    }

    /// Create a parameter instruction.
    pub fn parameter(name: impl Into<String>, shape: Shape) -> Self {
        Self::new(name, Op::Parameter, shape)
    }

    /// Create a constant instruction.
    pub fn constant(name: impl Into<String>, shape: Shape) -> Self {
        Self::new(name, Op::Constant, shape)
    }

    /// Get the instruction name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the operation kind.
    pub fn op(&self) -> &Op {
        &self.op
    }

    /// Get the output shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Get the ordered operand list.
    pub fn operands(&self) -> &[InstrId] {
        &self.operands
    }

    pub(crate) fn operands_mut(&mut self) -> &mut [InstrId] {
        &mut self.operands
    }

    /// Append an operand reference.
    pub fn add_operand(&mut self, id: InstrId) {
        self.operands.push(id);
    }

    /// Get the all-gather payload, if this is an all-gather.
    pub fn as_all_gather(&self) -> Option<&AllGatherSpec> {
        match &self.op {
            Op::AllGather(spec) => Some(spec),
            _ => None,
        }
    }

    /// Get the collective channel id, if this instruction carries one.
    pub fn channel_id(&self) -> Option<u64> {
        self.as_all_gather().and_then(|spec| spec.channel_id)
    }
}

// ──────────────────────────────── Computation ────────────────────────────

/// One computation subgraph: a named, owned collection of instructions with
/// a designated root (output) instruction.
pub struct Computation {
    /// Computation name.
    name: String,

    /// Instruction arena; edges run operand -> consumer.
    graph: StableGraph<Instruction, ()>,

    /// The computation's output instruction.
    root: Option<InstrId>,
}

impl Computation {
    /// Create a new empty computation.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            graph: StableGraph::new(),
            root: None,
        }
    }

    /// Get the computation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    // ── Instruction access ──

    /// Get an immutable reference to an instruction.
    pub fn instruction(&self, id: InstrId) -> Result<&Instruction> {
        self.graph
            .node_weight(id)
            .ok_or_else(|| Error::InvalidGraph(format!("Instruction {:?} not found", id)))
    }

    /// Get a mutable reference to an instruction.
    pub fn instruction_mut(&mut self, id: InstrId) -> Result<&mut Instruction> {
        self.graph
            .node_weight_mut(id)
            .ok_or_else(|| Error::InvalidGraph(format!("Instruction {:?} not found", id)))
    }

    /// Check whether an instruction id is still live in this computation.
    pub fn contains(&self, id: InstrId) -> bool {
        self.graph.node_weight(id).is_some()
    }

    /// Iterate over all live instructions.
    pub fn instructions(&self) -> impl Iterator<Item = (InstrId, &Instruction)> {
        self.graph
            .node_indices()
            .filter_map(|id| self.graph.node_weight(id).map(|instr| (id, instr)))
    }

    /// Number of live instructions.
    pub fn instruction_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the root (output) instruction.
    pub fn root(&self) -> Option<InstrId> {
        self.root
    }

    /// Designate the root (output) instruction.
    pub fn set_root(&mut self, id: InstrId) -> Result<()> {
        if !self.contains(id) {
            return Err(Error::InvalidGraph(format!(
                "Cannot set root: instruction {:?} not found",
                id
            )));
        }
        self.root = Some(id);
        Ok(())
    }

    // ── Graph mutation ──

    /// Add an instruction to the computation and return its id.
    ///
    /// Every operand must already be present; dependency edges are added
    /// from each operand to the new instruction.
    pub fn add_instruction(&mut self, instr: Instruction) -> Result<InstrId> {
        for &operand in instr.operands() {
            if !self.contains(operand) {
                return Err(Error::InvalidGraph(format!(
                    "Instruction '{}' references unknown operand {:?}",
                    instr.name(),
                    operand
                )));
            }
        }

        let operands = instr.operands().to_vec();
        let id = self.graph.add_node(instr);
        for operand in operands {
            self.graph.add_edge(operand, id, ());
        }
        Ok(id)
    }

    /// Get the distinct instructions that consume an instruction's output.
    pub fn users(&self, id: InstrId) -> Vec<InstrId> {
        let mut users: Vec<InstrId> = self
            .graph
            .neighbors_directed(id, Direction::Outgoing)
            .collect();
        users.sort_unstable();
        users.dedup();
        users
    }

    /// Rewire every consumer of `old` to consume `new` instead.
    ///
    /// `new` itself is never rewired, so an instruction built on top of `old`
    /// can become its replacement without forming a cycle. If `old` was the
    /// computation root, `new` takes its place.
    pub fn replace_all_uses_with(&mut self, old: InstrId, new: InstrId) -> Result<()> {
        if !self.contains(old) {
            return Err(Error::InvalidGraph(format!(
                "Cannot replace uses: instruction {:?} not found",
                old
            )));
        }
        if !self.contains(new) {
            return Err(Error::InvalidGraph(format!(
                "Cannot replace uses with unknown instruction {:?}",
                new
            )));
        }

        for user in self.users(old) {
            if user == new {
                continue;
            }

            let mut replaced = 0;
            let instr = self.instruction_mut(user)?;
            for slot in instr.operands_mut() {
                if *slot == old {
                    *slot = new;
                    replaced += 1;
                }
            }

            while let Some(edge) = self.graph.find_edge(old, user) {
                self.graph.remove_edge(edge);
            }
            for _ in 0..replaced {
                self.graph.add_edge(new, user, ());
            }
        }

        if self.root == Some(old) {
            self.root = Some(new);
        }
        Ok(())
    }

    /// Remove an instruction with no remaining consumers, then transitively
    /// remove any of its operands left without consumers.
    ///
    /// Parameters and the computation root are never removed by the
    /// transitive sweep; asking to remove one directly is an error, as is
    /// removing an instruction that still has users.
    pub fn remove_instruction_and_unused_operands(&mut self, id: InstrId) -> Result<()> {
        let instr = self.instruction(id)?;
        if matches!(instr.op(), Op::Parameter) {
            return Err(Error::InvalidGraph(format!(
                "Cannot remove parameter '{}'",
                instr.name()
            )));
        }
        if self.root == Some(id) {
            return Err(Error::InvalidGraph(format!(
                "Cannot remove root instruction '{}'",
                instr.name()
            )));
        }
        if !self.users(id).is_empty() {
            return Err(Error::InvalidGraph(format!(
                "Cannot remove instruction '{}': it still has users",
                instr.name()
            )));
        }

        let mut worklist = vec![id];
        while let Some(next) = worklist.pop() {
            if !self.contains(next) || !self.users(next).is_empty() {
                continue;
            }
            if self.root == Some(next) {
                continue;
            }
            if next != id && matches!(self.instruction(next)?.op(), Op::Parameter) {
                continue;
            }

            if let Some(removed) = self.graph.remove_node(next) {
                let mut operands = removed.operands().to_vec();
                operands.sort_unstable();
                operands.dedup();
                worklist.extend(operands);
            }
        }
        Ok(())
    }

    // ── Graph queries ──

    /// Dependency-respecting instruction order: every instruction appears
    /// after all of its operands.
    ///
    /// The returned ids are a snapshot; passes compute this once before
    /// mutating so that in-place rewrites cannot invalidate the traversal.
    pub fn post_order(&self) -> Vec<InstrId> {
        let mut topo = Topo::new(&self.graph);
        let mut order = Vec::new();

        while let Some(id) = topo.next(&self.graph) {
            if self.graph.node_weight(id).is_some() {
                order.push(id);
            }
        }

        order
    }
}
