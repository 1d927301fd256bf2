//! IR Builder
//!
//! This module provides a positioned builder for assembling a `Function` block by block.
//! It is the programmatic front door to the IR: tests and embedders use it instead of
//! constructing arenas by hand.
//!
//! # Usage Pattern
//! 1. Create blocks up front (`create_block`), the first one is the entry
//! 2. `position_at_end(block)` and append instructions
//! 3. Phis may be created empty and completed later with `add_incoming` (back edges)
//! 4. `finish()` runs the validator and hands back the function

use crate::error::LoopNestError;
use crate::ir::function::Function;
use crate::ir::instruction::{BlockId, InstId, Instruction, Opcode, Operand};
use crate::validator::FunctionValidator;
use anyhow::Result;

/// Builder for a single function.
pub struct FunctionBuilder {
    func: Function,
    current: Option<BlockId>,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>, params: u32) -> Self {
        Self {
            func: Function::new(name, params),
            current: None,
        }
    }

    pub fn create_block(&mut self) -> BlockId {
        self.func.create_block()
    }

    /// Make `block` the insertion point for subsequent instructions.
    pub fn position_at_end(&mut self, block: BlockId) {
        self.current = Some(block);
    }

    /// Arithmetic or comparison: `op lhs, rhs`.
    pub fn binary(&mut self, opcode: Opcode, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> Result<InstId> {
        if !opcode.is_binary() {
            return Err(LoopNestError::invalid_edit(format!("{:?} is not a binary opcode", opcode)).into());
        }
        self.push(Instruction::new(opcode, &[lhs.into(), rhs.into()], &[]))
    }

    pub fn add(&mut self, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> Result<InstId> {
        self.binary(Opcode::Add, lhs, rhs)
    }

    pub fn mul(&mut self, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> Result<InstId> {
        self.binary(Opcode::Mul, lhs, rhs)
    }

    pub fn cmp_lt(&mut self, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> Result<InstId> {
        self.binary(Opcode::CmpLt, lhs, rhs)
    }

    pub fn select(
        &mut self,
        cond: impl Into<Operand>,
        if_true: impl Into<Operand>,
        if_false: impl Into<Operand>,
    ) -> Result<InstId> {
        self.push(Instruction::new(
            Opcode::Select,
            &[cond.into(), if_true.into(), if_false.into()],
            &[],
        ))
    }

    pub fn load(&mut self, addr: impl Into<Operand>) -> Result<InstId> {
        self.push(Instruction::new(Opcode::Load, &[addr.into()], &[]))
    }

    pub fn store(&mut self, addr: impl Into<Operand>, value: impl Into<Operand>) -> Result<InstId> {
        self.push(Instruction::new(Opcode::Store, &[addr.into(), value.into()], &[]))
    }

    pub fn call(&mut self, args: &[Operand]) -> Result<InstId> {
        self.push(Instruction::new(Opcode::Call, args, &[]))
    }

    pub fn landing_pad(&mut self) -> Result<InstId> {
        self.push(Instruction::new(Opcode::LandingPad, &[], &[]))
    }

    /// Empty phi; complete it with `add_incoming`.
    pub fn phi(&mut self) -> Result<InstId> {
        self.push(Instruction::new(Opcode::Phi, &[], &[]))
    }

    pub fn add_incoming(&mut self, phi: InstId, value: impl Into<Operand>, pred: BlockId) -> Result<()> {
        let mut incoming: Vec<(Operand, BlockId)> = self
            .func
            .inst(phi)
            .ok_or(LoopNestError::UnknownInstruction(phi))?
            .incoming()
            .collect();
        incoming.push((value.into(), pred));
        self.func.set_incoming(phi, &incoming)
    }

    pub fn br(&mut self, target: BlockId) -> Result<InstId> {
        self.push(Instruction::new(Opcode::Br, &[], &[target]))
    }

    pub fn cond_br(&mut self, cond: impl Into<Operand>, then_block: BlockId, else_block: BlockId) -> Result<InstId> {
        self.push(Instruction::new(Opcode::CondBr, &[cond.into()], &[then_block, else_block]))
    }

    pub fn ret(&mut self, value: Option<Operand>) -> Result<InstId> {
        let operands: Vec<Operand> = value.into_iter().collect();
        self.push(Instruction::new(Opcode::Ret, &operands, &[]))
    }

    /// Validate and return the function.
    pub fn finish(self) -> Result<Function> {
        FunctionValidator::validate(&self.func)?;
        Ok(self.func)
    }

    /// Return the function without validation.
    pub fn finish_unchecked(self) -> Function {
        self.func
    }

    fn push(&mut self, inst: Instruction) -> Result<InstId> {
        let block = self
            .current
            .ok_or_else(|| LoopNestError::invalid_edit("builder has no insertion block"))?;
        self.func.append_inst(block, inst)
    }
}
