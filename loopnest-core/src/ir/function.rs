//! Procedure Control Flow Graph
//!
//! This module provides the per-procedure CFG that analyses read and code motion mutates.
//! Blocks and instructions are stored in arenas and addressed by `BlockId` / `InstId`;
//! ids are never reused, so an instruction keeps its identity (and every use of it) when it
//! moves between blocks.
//!
//! # Graph Properties
//! - Directed graph, may contain cycles (loops) and unreachable blocks
//! - Single designated entry block
//! - Successors come from the terminator (last instruction) of each block
//! - Predecessors are derived on demand, never stored
//!
//! # Mutation Primitives
//! - `create_block` / `create_block_after`: new empty block (layout position chosen by caller)
//! - `append_inst` / `create_inst`: add an instruction (attached or detached)
//! - `detach` / `insert_before` / `move_before`: relocate an instruction
//! - `redirect_target`: retarget a terminator edge
//! - `set_incoming`: rewrite a phi's incoming pairs
//!
//! Every primitive validates its arguments before touching the graph, so a failed call
//! leaves the function unchanged.

use crate::error::LoopNestError;
use crate::ir::instruction::{BlockId, InstId, Instruction, Operand};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Basic block in the control flow graph.
///
/// A basic block is a maximal straight-line sequence of instructions ending in one terminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicBlock {
    id: BlockId,
    /// Instructions in execution order; the terminator is last
    #[serde(default)]
    instructions: Vec<InstId>,
}

impl BasicBlock {
    #[inline]
    pub fn id(&self) -> BlockId {
        self.id
    }

    #[inline]
    pub fn instructions(&self) -> &[InstId] {
        &self.instructions
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// A single procedure: block arena, instruction arena, layout order and entry block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    name: String,
    #[serde(default)]
    params: u32,
    entry: BlockId,
    blocks: Vec<BasicBlock>,
    insts: Vec<Instruction>,
    /// Block order for printing and placement of new blocks
    layout: Vec<BlockId>,
}

impl Function {
    /// Create an empty function. The first block created becomes the entry block.
    pub fn new(name: impl Into<String>, params: u32) -> Self {
        Self {
            name: name.into(),
            params,
            entry: BlockId(0),
            blocks: Vec::new(),
            insts: Vec::new(),
            layout: Vec::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn inst_count(&self) -> usize {
        self.insts.len()
    }

    /// Blocks in layout order.
    #[inline]
    pub fn layout(&self) -> &[BlockId] {
        &self.layout
    }

    /// Blocks in layout order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> + '_ {
        self.layout.iter().filter_map(move |&id| self.blocks.get(id.index()))
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index())
    }

    #[inline]
    pub fn inst(&self, id: InstId) -> Option<&Instruction> {
        self.insts.get(id.index())
    }

    #[inline]
    pub fn contains_block(&self, id: BlockId) -> bool {
        id.index() < self.blocks.len()
    }

    /// Instruction ids of a block, empty for unknown blocks.
    pub fn block_insts(&self, id: BlockId) -> &[InstId] {
        self.block(id).map(BasicBlock::instructions).unwrap_or(&[])
    }

    /// Block that currently owns the instruction.
    pub fn owning_block(&self, id: InstId) -> Option<BlockId> {
        self.inst(id).and_then(|inst| inst.block)
    }

    /// Terminator of a block (its last instruction, if that is a terminator).
    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        let last = *self.block(block)?.instructions.last()?;
        self.inst(last)
            .filter(|inst| inst.is_terminator())
            .map(|_| last)
    }

    /// Successor blocks in terminator order, without duplicates.
    ///
    /// A block without a terminator has no successors.
    pub fn successors(&self, block: BlockId) -> SmallVec<[BlockId; 2]> {
        let mut successors: SmallVec<[BlockId; 2]> = SmallVec::new();
        if let Some(term) = self.terminator(block).and_then(|id| self.inst(id)) {
            for &target in term.blocks.iter() {
                if !successors.contains(&target) {
                    successors.push(target);
                }
            }
        }
        successors
    }

    /// Predecessors of every block, indexed by `BlockId::index()`.
    ///
    /// # Algorithm
    /// One sweep over the layout, recording each block as a predecessor of its successors.
    /// Edges to nonexistent blocks are ignored.
    pub fn predecessor_table(&self) -> Vec<SmallVec<[BlockId; 2]>> {
        let mut table: Vec<SmallVec<[BlockId; 2]>> = vec![SmallVec::new(); self.blocks.len()];
        for &block in self.layout.iter() {
            for succ in self.successors(block) {
                if let Some(preds) = table.get_mut(succ.index()) {
                    if !preds.contains(&block) {
                        preds.push(block);
                    }
                }
            }
        }
        table
    }

    /// Predecessors of a single block.
    pub fn predecessors(&self, block: BlockId) -> SmallVec<[BlockId; 2]> {
        self.layout
            .iter()
            .copied()
            .filter(|&pred| self.successors(pred).contains(&block))
            .collect()
    }

    /// Append a new empty block at the end of the layout.
    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock {
            id,
            instructions: Vec::new(),
        });
        self.layout.push(id);
        id
    }

    /// Create a new empty block positioned right after `after` in the layout.
    pub fn create_block_after(&mut self, after: BlockId) -> Result<BlockId> {
        self.check_block(after)?;
        let position = self
            .layout
            .iter()
            .position(|&b| b == after)
            .map(|p| p + 1)
            .unwrap_or(self.layout.len());
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock {
            id,
            instructions: Vec::new(),
        });
        self.layout.insert(position, id);
        Ok(id)
    }

    /// Add an instruction to the arena without placing it in a block.
    pub fn create_inst(&mut self, mut inst: Instruction) -> InstId {
        let id = InstId(self.insts.len() as u32);
        inst.block = None;
        self.insts.push(inst);
        id
    }

    /// Add an instruction at the end of `block`.
    pub fn append_inst(&mut self, block: BlockId, inst: Instruction) -> Result<InstId> {
        self.check_block(block)?;
        let id = self.create_inst(inst);
        self.insts[id.index()].block = Some(block);
        self.blocks[block.index()].instructions.push(id);
        Ok(id)
    }

    /// Remove an instruction from its block. The instruction keeps its id and its uses.
    pub fn detach(&mut self, inst: InstId) -> Result<()> {
        let block = self
            .owning_block(self.check_inst(inst)?)
            .ok_or_else(|| LoopNestError::invalid_edit(format!("{} is already detached", inst)))?;
        self.blocks[block.index()].instructions.retain(|&id| id != inst);
        self.insts[inst.index()].block = None;
        Ok(())
    }

    /// Insert a detached instruction immediately before `position`.
    pub fn insert_before(&mut self, inst: InstId, position: InstId) -> Result<()> {
        self.check_inst(inst)?;
        self.check_inst(position)?;
        if let Some(block) = self.owning_block(inst) {
            return Err(LoopNestError::invalid_edit(format!(
                "{} is still attached to {}",
                inst, block
            ))
            .into());
        }
        let (block, index) = self.locate(position)?;
        self.blocks[block.index()].instructions.insert(index, inst);
        self.insts[inst.index()].block = Some(block);
        Ok(())
    }

    /// Relocate an attached instruction so that it sits immediately before `position`.
    ///
    /// Both ends are validated before the instruction is detached.
    pub fn move_before(&mut self, inst: InstId, position: InstId) -> Result<()> {
        if inst == position {
            return Err(LoopNestError::invalid_edit(format!("cannot move {} before itself", inst)).into());
        }
        self.locate(inst)?;
        self.locate(position)?;
        self.detach(inst)?;
        self.insert_before(inst, position)
    }

    /// Retarget every edge `block -> from` to `block -> to`.
    ///
    /// Returns the number of terminator slots rewritten (a conditional branch may
    /// name the same target twice).
    pub fn redirect_target(&mut self, block: BlockId, from: BlockId, to: BlockId) -> Result<usize> {
        self.check_block(from)?;
        self.check_block(to)?;
        let term = self.terminator(self.check_block(block)?).ok_or_else(|| {
            LoopNestError::malformed(Some(block), "block has no terminator to redirect")
        })?;
        let targets = &mut self.insts[term.index()].blocks;
        let mut rewritten = 0usize;
        for target in targets.iter_mut().filter(|t| **t == from) {
            *target = to;
            rewritten += 1;
        }
        if rewritten == 0 {
            return Err(LoopNestError::invalid_edit(format!(
                "{} does not branch to {}",
                block, from
            ))
            .into());
        }
        Ok(rewritten)
    }

    /// Replace the incoming `(value, predecessor)` pairs of a phi.
    pub fn set_incoming(&mut self, phi: InstId, incoming: &[(Operand, BlockId)]) -> Result<()> {
        self.check_inst(phi)?;
        if !self.insts[phi.index()].is_phi() {
            return Err(LoopNestError::invalid_edit(format!("{} is not a phi", phi)).into());
        }
        if let Some(&(_, missing)) = incoming.iter().find(|(_, b)| !self.contains_block(*b)) {
            return Err(LoopNestError::UnknownBlock(missing).into());
        }
        let inst = &mut self.insts[phi.index()];
        inst.operands = incoming.iter().map(|&(value, _)| value).collect();
        inst.blocks = incoming.iter().map(|&(_, block)| block).collect();
        Ok(())
    }

    /// Block and position of an attached instruction.
    fn locate(&self, inst: InstId) -> Result<(BlockId, usize)> {
        let block = self
            .owning_block(self.check_inst(inst)?)
            .ok_or_else(|| LoopNestError::invalid_edit(format!("{} is not in a block", inst)))?;
        let index = self
            .block_insts(block)
            .iter()
            .position(|&id| id == inst)
            .ok_or_else(|| {
                LoopNestError::malformed(Some(block), format!("{} claims {} but is not listed there", inst, block))
            })?;
        Ok((block, index))
    }

    fn check_block(&self, block: BlockId) -> Result<BlockId> {
        if self.contains_block(block) {
            Ok(block)
        } else {
            Err(LoopNestError::UnknownBlock(block).into())
        }
    }

    fn check_inst(&self, inst: InstId) -> Result<InstId> {
        if inst.index() < self.insts.len() {
            Ok(inst)
        } else {
            Err(LoopNestError::UnknownInstruction(inst).into())
        }
    }
}
