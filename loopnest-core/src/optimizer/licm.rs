//! Loop-Invariant Code Motion
//!
//! This module hoists loop-invariant instructions out of loops into preheaders, synthesizing
//! a preheader block when a loop is entered from more than one place.
//!
//! # Invariance
//! An instruction inside loop `H` is invariant when it is safe to move (no memory access,
//! call, phi, terminator or exception construct) and each operand is either a constant or
//! defined outside `H`. Operands that cannot be traced to a defining instruction
//! (parameters, detached or unknown instructions) count as defined outside every loop.
//!
//! # Algorithm
//! 1. Visit reducible and self-loop headers innermost first (decreasing preorder number)
//! 2. Scan the header's member blocks in preorder, instructions in block order
//! 3. On the first invariant instruction: hoist it, rebuild the `LoopNest` snapshot, and
//!    rescan the same header
//! 4. Once a header yields nothing, move to the next innermost header not yet drained
//! 5. Repeat whole passes until one pass hoists nothing
//!
//! Every hoist moves one instruction out of at least one loop and never into one, so the
//! number of in-loop invariant instructions strictly decreases and the fixpoint is reached.
//!
//! # Preheader Resolution
//! Let `X` be the reachable predecessors of `H` outside `H`:
//! - `|X| == 0`: structural inconsistency, the transform aborts for this function
//! - `|X| == 1` and `H` is its only successor: that block is the preheader
//! - otherwise a new block is laid out after the first block of `X`, every edge `X -> H`
//!   is redirected to it, `H`'s phis are split, and it branches unconditionally to `H`
//!
//! The hoisted instruction is placed right before the preheader's terminator.
//!
//! # Irreducible Regions
//! Irreducible headers are never hoist targets, and an instruction sitting inside an
//! irreducible loop nested in `H` is not moved out of `H`.

use crate::analysis::{BlockKind, LoopNest};
use crate::error::LoopNestError;
use crate::ir::{BlockId, Function, InstId, Instruction, Opcode, Operand};
use anyhow::Result;
use log::debug;
use smallvec::SmallVec;
use std::collections::HashSet;

/// Outcome of running invariant code motion on one function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionReport {
    /// Whether the function was mutated
    pub changed: bool,
    /// Instructions moved to a preheader
    pub hoisted: usize,
    /// Preheader blocks synthesized
    pub preheaders_created: usize,
    /// Full passes over all headers, including the final quiet one
    pub passes: usize,
}

impl MotionReport {
    /// Any previously computed analysis of the function is stale.
    #[inline]
    pub fn invalidates_analyses(&self) -> bool {
        self.changed
    }
}

/// Loop-invariant code motion pass.
pub struct InvariantMotion;

impl InvariantMotion {
    /// Hoist invariant instructions until no opportunity remains.
    ///
    /// # Arguments
    /// * `func` - Function to transform in place
    /// * `nest` - Loop structure of `func` as it is now
    ///
    /// # Returns
    /// The loop structure of the transformed function and a report of what changed.
    ///
    /// # Errors
    /// `LoopNestError::StructuralInconsistency` when a header has no predecessor outside
    /// its loop. The function is left consistent: every hoist is validated before editing.
    pub fn run(func: &mut Function, nest: LoopNest) -> Result<(LoopNest, MotionReport)> {
        let mut nest = nest;
        let mut report = MotionReport::default();

        loop {
            report.passes += 1;
            let mut pass_hoisted = 0usize;
            let mut drained: HashSet<BlockId> = HashSet::new();

            while let Some(header) = Self::next_header(&nest, &drained) {
                while let Some(inst) = Self::find_invariant(func, &nest, header) {
                    if Self::hoist(func, &nest, header, inst)? {
                        report.preheaders_created += 1;
                    }
                    pass_hoisted += 1;
                    nest = LoopNest::compute(func);
                }
                drained.insert(header);
            }

            report.hoisted += pass_hoisted;
            if pass_hoisted == 0 {
                break;
            }
        }

        report.changed = report.hoisted > 0;
        Ok((nest, report))
    }

    /// Innermost hoist-eligible header not yet drained in this pass.
    fn next_header(nest: &LoopNest, drained: &HashSet<BlockId>) -> Option<BlockId> {
        nest.headers_innermost_first().into_iter().find(|header| {
            !drained.contains(header)
                && matches!(nest.kind(*header), Some(BlockKind::Reducible | BlockKind::SelfLoop))
        })
    }

    /// First invariant instruction of loop `header`, scanning members in preorder.
    pub fn find_invariant(func: &Function, nest: &LoopNest, header: BlockId) -> Option<InstId> {
        for block in nest.members(header) {
            if Self::inside_irreducible(nest, block, header) {
                continue;
            }
            for &id in func.block_insts(block) {
                let Some(inst) = func.inst(id) else {
                    continue;
                };
                if Self::is_invariant(func, nest, header, inst) {
                    return Some(id);
                }
            }
        }
        None
    }

    /// Invariance of `inst` with respect to the loop headed by `header`.
    pub fn is_invariant(func: &Function, nest: &LoopNest, header: BlockId, inst: &Instruction) -> bool {
        inst.is_safe_to_move()
            && inst.operands.iter().all(|operand| match *operand {
                Operand::Const(_) | Operand::Param(_) => true,
                Operand::Inst(def) => match func.owning_block(def) {
                    Some(block) => !nest.is_member(header, block),
                    None => true,
                },
            })
    }

    /// Whether an irreducible header lies on the chain from `block` up to (not including) `header`.
    fn inside_irreducible(nest: &LoopNest, block: BlockId, header: BlockId) -> bool {
        let mut cursor = Some(block);
        while let Some(current) = cursor {
            if current == header {
                return false;
            }
            if nest.kind(current) == Some(BlockKind::Irreducible) {
                return true;
            }
            cursor = nest.header(current);
        }
        false
    }

    /// Move `inst` into the preheader of `header`. Returns `true` if a preheader was created.
    fn hoist(func: &mut Function, nest: &LoopNest, header: BlockId, inst: InstId) -> Result<bool> {
        // Unreachable predecessors never run; their edges into `H` are left alone
        let outside: SmallVec<[BlockId; 4]> = func
            .predecessors(header)
            .into_iter()
            .filter(|&pred| nest.index.is_reachable(pred) && !nest.is_member(header, pred))
            .collect();

        if outside.is_empty() {
            return Err(LoopNestError::structural(header, "loop header has no predecessor outside the loop").into());
        }
        if let Some(&pred) = outside.iter().find(|&&pred| func.terminator(pred).is_none()) {
            return Err(LoopNestError::malformed(Some(pred), "preheader candidate has no terminator").into());
        }
        if func.owning_block(inst).is_none() {
            return Err(LoopNestError::invalid_edit(format!("{} is not in a block", inst)).into());
        }

        // A lone entering block only serves as preheader if the loop is its sole successor
        let dedicated = outside.len() == 1 && func.successors(outside[0]).len() == 1;
        let (preheader, created) = if dedicated {
            (outside[0], false)
        } else {
            (Self::insert_preheader(func, header, &outside)?, true)
        };

        let term = func
            .terminator(preheader)
            .ok_or_else(|| LoopNestError::malformed(Some(preheader), "preheader has no terminator"))?;
        let from = func.owning_block(inst);
        func.move_before(inst, term)?;
        debug!(
            "{}: hoisted {} from {:?} to preheader {} of loop {}",
            func.name(),
            inst,
            from,
            preheader,
            header
        );
        Ok(created)
    }

    /// Synthesize a single preheader for `header` fed by every block in `outside`.
    fn insert_preheader(func: &mut Function, header: BlockId, outside: &[BlockId]) -> Result<BlockId> {
        let preheader = func.create_block_after(outside[0])?;
        for &pred in outside {
            func.redirect_target(pred, header, preheader)?;
        }

        // Header phis: entries from outside now arrive through the preheader
        let phis: Vec<InstId> = func
            .block_insts(header)
            .iter()
            .copied()
            .filter(|&id| func.inst(id).map_or(false, Instruction::is_phi))
            .collect();
        for phi in phis {
            let incoming: Vec<(Operand, BlockId)> = match func.inst(phi) {
                Some(inst) => inst.incoming().collect(),
                None => continue,
            };
            let (entering, mut kept): (Vec<(Operand, BlockId)>, Vec<(Operand, BlockId)>) =
                incoming.into_iter().partition(|(_, block)| outside.contains(block));
            let Some(&(first, _)) = entering.first() else {
                continue;
            };

            let value = if entering.iter().all(|&(value, _)| value == first) {
                first
            } else {
                let values: Vec<Operand> = entering.iter().map(|&(value, _)| value).collect();
                let blocks: Vec<BlockId> = entering.iter().map(|&(_, block)| block).collect();
                let merged = func.append_inst(preheader, Instruction::new(Opcode::Phi, &values, &blocks))?;
                Operand::Inst(merged)
            };
            kept.push((value, preheader));
            func.set_incoming(phi, &kept)?;
        }

        func.append_inst(preheader, Instruction::new(Opcode::Br, &[], &[header]))?;
        debug!(
            "{}: created preheader {} for loop {} ({} entering edges)",
            func.name(),
            preheader,
            header,
            outside.len()
        );
        Ok(preheader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FunctionBuilder;

    #[test]
    fn test_zero_outside_predecessors_is_fatal() -> Result<()> {
        // The entry block heads a self loop, so nothing enters it from outside.
        let mut b = FunctionBuilder::new("entry_loop", 1);
        let entry = b.create_block();
        let exit = b.create_block();
        b.position_at_end(entry);
        let x = b.add(Operand::Param(0), 1i64)?;
        b.cond_br(x, entry, exit)?;
        b.position_at_end(exit);
        b.ret(None)?;
        let mut func = b.finish()?;

        let nest = LoopNest::compute(&func);
        assert_eq!(nest.kind(entry), Some(BlockKind::SelfLoop));
        let before = func.clone();
        let err = InvariantMotion::run(&mut func, nest).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LoopNestError>(),
            Some(LoopNestError::StructuralInconsistency { header, .. }) if *header == entry
        ));
        assert_eq!(func, before);
        Ok(())
    }

    #[test]
    fn test_no_loops_no_change() -> Result<()> {
        let mut b = FunctionBuilder::new("flat", 0);
        let entry = b.create_block();
        b.position_at_end(entry);
        let x = b.add(1i64, 2i64)?;
        b.ret(Some(Operand::Inst(x)))?;
        let mut func = b.finish()?;

        let nest = LoopNest::compute(&func);
        let (_, report) = InvariantMotion::run(&mut func, nest)?;
        assert!(!report.changed);
        assert!(!report.invalidates_analyses());
        assert_eq!(report.passes, 1);
        Ok(())
    }

    #[test]
    fn test_untraceable_operand_is_external() -> Result<()> {
        let mut b = FunctionBuilder::new("ghost", 0);
        let entry = b.create_block();
        let header = b.create_block();
        let exit = b.create_block();
        b.position_at_end(entry);
        b.br(header)?;
        b.position_at_end(header);
        let x = b.add(Operand::Inst(InstId(1000)), 1i64)?;
        let c = b.cmp_lt(x, 10i64)?;
        b.cond_br(c, header, exit)?;
        b.position_at_end(exit);
        b.ret(None)?;
        let mut func = b.finish_unchecked();

        let nest = LoopNest::compute(&func);
        let (_, report) = InvariantMotion::run(&mut func, nest)?;
        assert_eq!(func.owning_block(x), Some(entry));
        assert_eq!(func.owning_block(c), Some(entry));
        assert_eq!(report.hoisted, 2);
        assert_eq!(report.preheaders_created, 0);
        Ok(())
    }
}
