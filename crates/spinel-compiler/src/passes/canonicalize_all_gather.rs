//! All-gather canonicalization for CSE.
//!
//! Re-anchors all-gather instructions below chains of degenerate reshapes on
//! their operand. Two all-gathers that differ only in incidental unit-dimension
//! wrapping become syntactically identical after this pass, which lets a later
//! common-subexpression-elimination pass collapse them.

use spinel_core::{
    AllGatherSpec, Computation, Error, InstrId, Instruction, Module, Op, Pass, Result, Shape, Stage,
};
use tracing::debug;

/// Whether an instruction is a reshape-family operation that only inserts or
/// removes unit dimensions, like going from `[X,Y]` to `[1,X,Y,1]`.
///
/// Such a reshape is a pure reinterpretation: element order is untouched, so
/// gathering after it is equivalent to gathering before it on the remapped
/// dimension.
fn is_degenerate_reshape(comp: &Computation, id: InstrId) -> Result<bool> {
    let instr = comp.instruction(id)?;
    if !matches!(instr.op(), Op::Reshape | Op::Bitcast) {
        return Ok(false);
    }
    if instr.operands().len() != 1 {
        return Ok(false);
    }

    let in_shape = comp.instruction(instr.operands()[0])?.shape();
    let out_shape = instr.shape();
    Ok(in_shape.element_count() == out_shape.element_count()
        && in_shape.eq_ignoring_unit_dims(out_shape))
}

/// Map a gather dimension of the wrapped (post-reshape) shape to the
/// corresponding dimension of the real (pre-reshape) producer shape.
///
/// The elements major to the gather dimension are counted in the wrapped
/// shape, then consumed dimension by dimension from the front of the real
/// shape. Each division must partition exactly: a remainder means the two
/// shapes are not reshape-equivalent, which is an upstream shape-inference
/// bug rather than a recoverable condition.
fn remap_gather_dim(wrapped: &Shape, gather_dim: usize, real: &Shape) -> Result<usize> {
    if gather_dim >= wrapped.rank() {
        return Err(Error::Shape(format!(
            "gather dimension {} out of range for shape {}",
            gather_dim, wrapped
        )));
    }

    let mut major_elements: usize = wrapped.dims()[..gather_dim].iter().product();
    let mut new_dim = 0;
    while major_elements > 1 {
        let size = real.dim(new_dim).ok_or_else(|| {
            Error::Shape(format!(
                "exhausted shape {} while remapping gather dimension {} of {}",
                real, gather_dim, wrapped
            ))
        })?;
        if size == 0 || major_elements % size != 0 {
            return Err(Error::Shape(format!(
                "dimension {} of {} does not exactly partition {} major elements of {}",
                new_dim, real, major_elements, wrapped
            )));
        }
        major_elements /= size;
        new_dim += 1;
    }
    Ok(new_dim)
}

/// Number of participants in a gather: the ratio of output to input size
/// along the gather dimension. A non-integer or zero ratio violates the
/// all-gather shape contract.
fn gather_participant_count(in_shape: &Shape, out_shape: &Shape, gather_dim: usize) -> Result<usize> {
    let in_size = in_shape.dim(gather_dim).ok_or_else(|| {
        Error::Shape(format!(
            "gather dimension {} out of range for input shape {}",
            gather_dim, in_shape
        ))
    })?;
    let out_size = out_shape.dim(gather_dim).ok_or_else(|| {
        Error::Shape(format!(
            "gather dimension {} out of range for output shape {}",
            gather_dim, out_shape
        ))
    })?;

    if in_size == 0 || out_size % in_size != 0 || out_size < in_size {
        return Err(Error::Shape(format!(
            "all-gather output size {} along dimension {} is not a positive multiple of input size {}",
            out_size, gather_dim, in_size
        )));
    }
    Ok(out_size / in_size)
}

/// Pass that normalizes degenerate-reshape wrapping around all-gathers.
///
/// For every single-operand all-gather whose operand is a chain of degenerate
/// reshapes, the gather is rebuilt directly over the real producer (with its
/// dimension remapped into the producer's coordinate space) and a single
/// reshape restores the original output shape:
///
/// ```text
/// producer [X,Y] -> reshape [1,X,Y] -> all-gather(dim=1) [1,kX,Y]
/// ```
///
/// becomes
///
/// ```text
/// producer [X,Y] -> all-gather(dim=0) [kX,Y] -> reshape [1,kX,Y]
/// ```
///
/// Cross-device collectives get a fresh channel id for the rebuilt gather so
/// channel ids stay unique program-wide. All-gathers with more than one
/// operand are left alone.
pub struct CanonicalizeAllGatherForCse;

impl CanonicalizeAllGatherForCse {
    /// Create a new canonicalization pass.
    pub fn new() -> Self {
        Self
    }

    fn run_on_computation(
        &self,
        comp: &mut Computation,
        next_channel_id: &mut u64,
    ) -> Result<bool> {
        let mut changed = false;

        // Snapshot the traversal before mutating; ids are stable, so removed
        // instructions are simply skipped when their turn comes.
        let ordered = comp.post_order();

        for id in ordered {
            if !comp.contains(id) {
                continue;
            }

            let instr = comp.instruction(id)?;
            let Some(spec) = instr.as_all_gather() else {
                continue;
            };
            if instr.operands().len() != 1 {
                continue;
            }
            let spec = spec.clone();
            let ag_name = instr.name().to_string();
            let out_shape = instr.shape().clone();
            let operand = instr.operands()[0];
            let in_shape = comp.instruction(operand)?.shape().clone();

            // Look through the chain of degenerate reshapes to the producer
            // of the real data.
            let mut real_data = operand;
            while is_degenerate_reshape(comp, real_data)? {
                real_data = comp.instruction(real_data)?.operands()[0];
            }
            if real_data == operand {
                continue;
            }

            let real_shape = comp.instruction(real_data)?.shape().clone();
            let new_dim = remap_gather_dim(&in_shape, spec.gather_dim, &real_shape)?;
            let participants = gather_participant_count(&in_shape, &out_shape, spec.gather_dim)?;

            let mut new_shape = real_shape;
            let dim_size = new_shape.dim(new_dim).ok_or_else(|| {
                Error::Shape(format!(
                    "remapped gather dimension {} out of range for shape {}",
                    new_dim, new_shape
                ))
            })?;
            new_shape.set_dim(new_dim, dim_size * participants)?;

            // A synchronized collective keeps being synchronized, but under a
            // fresh channel id so ids stay unique program-wide.
            let channel_id = spec.channel_id.is_some().then(|| {
                let fresh = *next_channel_id;
                *next_channel_id += 1;
                fresh
            });

            debug!(
                instruction = %ag_name,
                old_dim = spec.gather_dim,
                new_dim,
                participants,
                "re-anchoring all-gather below degenerate reshapes"
            );

            let mut new_ag = Instruction::new(
                format!("{ag_name}.canonical"),
                Op::AllGather(AllGatherSpec {
                    gather_dim: new_dim,
                    replica_groups: spec.replica_groups,
                    constrain_layout: spec.constrain_layout,
                    channel_id,
                    use_global_device_ids: spec.use_global_device_ids,
                }),
                new_shape,
            );
            new_ag.add_operand(real_data);
            let new_ag_id = comp.add_instruction(new_ag)?;

            let mut restore = Instruction::new(format!("{ag_name}.reshape"), Op::Reshape, out_shape);
            restore.add_operand(new_ag_id);
            let restore_id = comp.add_instruction(restore)?;

            comp.replace_all_uses_with(id, restore_id)?;
            comp.remove_instruction_and_unused_operands(id)?;
            changed = true;
        }

        Ok(changed)
    }
}

impl Pass for CanonicalizeAllGatherForCse {
    fn name(&self) -> &str {
        "canonicalize_all_gather_for_cse"
    }

    fn stage(&self) -> Stage {
        Stage::Canonicalization
    }

    fn run(&self, module: &mut Module) -> Result<bool> {
        let mut changed = false;
        let mut next_channel_id = module.next_channel_id();
        for comp in module.computations_mut() {
            changed |= self.run_on_computation(comp, &mut next_channel_id)?;
        }
        Ok(changed)
    }
}

impl Default for CanonicalizeAllGatherForCse {
    fn default() -> Self {
        Self::new()
    }
}
