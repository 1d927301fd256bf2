//! CFG Validation
//!
//! This module checks the structural preconditions the loop analyses and code motion rely on.
//! The checks are the collaborator's side of the contract: the analyses themselves assume a
//! well-formed function and do not repeat them.
//!
//! # Validation Checks
//! - **Entry**: function has blocks and the entry block exists
//! - **Terminators**: every laid-out block is non-empty and ends in exactly one terminator
//! - **Targets**: terminator targets and phi incoming blocks exist
//! - **Phis**: grouped at the start of their block, one incoming block per value
//! - **Ownership**: every listed instruction points back at its block and is listed once
//! - **Operands**: instruction references name existing instructions

use crate::error::LoopNestError;
use crate::ir::{Function, Operand};
use anyhow::Result;
use bitvec::prelude::*;

/// Structural validator for functions.
pub struct FunctionValidator;

impl FunctionValidator {
    /// Validate a function.
    ///
    /// # Errors
    /// Returns `LoopNestError::MalformedFunction` describing the first violation found.
    pub fn validate(func: &Function) -> Result<()> {
        if func.block_count() == 0 {
            return Err(LoopNestError::malformed(None, "function has no blocks").into());
        }
        if !func.contains_block(func.entry()) {
            return Err(LoopNestError::malformed(
                None,
                format!("entry {} does not exist", func.entry()),
            )
            .into());
        }

        let mut listed: BitVec<u32> = bitvec![u32, Lsb0; 0; func.inst_count()];
        for block in func.blocks() {
            let id = block.id();
            let insts = block.instructions();
            if insts.is_empty() {
                return Err(LoopNestError::malformed(Some(id), "block is empty").into());
            }

            let mut seen_non_phi = false;
            for (position, &inst_id) in insts.iter().enumerate() {
                let inst = func
                    .inst(inst_id)
                    .ok_or_else(|| LoopNestError::malformed(Some(id), format!("lists unknown instruction {}", inst_id)))?;
                if listed[inst_id.index()] {
                    return Err(LoopNestError::malformed(Some(id), format!("{} is listed twice", inst_id)).into());
                }
                listed.set(inst_id.index(), true);

                if inst.block != Some(id) {
                    return Err(LoopNestError::malformed(
                        Some(id),
                        format!("{} is listed here but owned by {:?}", inst_id, inst.block),
                    )
                    .into());
                }

                let is_last = position + 1 == insts.len();
                if inst.is_terminator() != is_last {
                    let message = if is_last {
                        format!("block does not end in a terminator ({:?})", inst.opcode)
                    } else {
                        format!("terminator {} is not the last instruction", inst_id)
                    };
                    return Err(LoopNestError::malformed(Some(id), message).into());
                }

                if inst.is_phi() {
                    if seen_non_phi {
                        return Err(LoopNestError::malformed(Some(id), format!("phi {} follows a non-phi", inst_id)).into());
                    }
                    if inst.operands.len() != inst.blocks.len() {
                        return Err(LoopNestError::malformed(
                            Some(id),
                            format!("phi {} has {} values for {} blocks", inst_id, inst.operands.len(), inst.blocks.len()),
                        )
                        .into());
                    }
                } else {
                    seen_non_phi = true;
                }

                if let Some(&missing) = inst.blocks.iter().find(|b| !func.contains_block(**b)) {
                    return Err(LoopNestError::malformed(
                        Some(id),
                        format!("{} references missing block {}", inst_id, missing),
                    )
                    .into());
                }

                for operand in inst.operands.iter() {
                    if let Operand::Inst(def) = operand {
                        if func.inst(*def).is_none() {
                            return Err(LoopNestError::malformed(
                                Some(id),
                                format!("{} uses unknown instruction {}", inst_id, def),
                            )
                            .into());
                        }
                    }
                }
            }
        }

        Self::check_detached(func, &listed)
    }

    /// Instructions that claim a block must be listed in it.
    fn check_detached(func: &Function, listed: &BitSlice<u32>) -> Result<()> {
        for index in 0..func.inst_count() {
            let id = crate::ir::InstId(index as u32);
            if let Some(block) = func.owning_block(id) {
                if !listed[index] {
                    return Err(LoopNestError::malformed(
                        Some(block),
                        format!("{} claims {} but is not listed there", id, block),
                    )
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Validate and report whether the function is well formed.
    pub fn is_valid(func: &Function) -> bool {
        Self::validate(func).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BlockId, FunctionBuilder, Instruction, Opcode};

    fn malformed_block(err: anyhow::Error) -> Option<BlockId> {
        match err.downcast_ref::<LoopNestError>() {
            Some(LoopNestError::MalformedFunction { block, .. }) => *block,
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_empty_function_rejected() {
        let func = Function::new("empty", 0);
        assert!(!FunctionValidator::is_valid(&func));
    }

    #[test]
    fn test_missing_terminator() {
        let mut b = FunctionBuilder::new("f", 0);
        let entry = b.create_block();
        b.position_at_end(entry);
        b.add(1i64, 2i64).unwrap();
        let func = b.finish_unchecked();
        let err = FunctionValidator::validate(&func).unwrap_err();
        assert_eq!(malformed_block(err), Some(entry));
    }

    #[test]
    fn test_terminator_mid_block() {
        let mut b = FunctionBuilder::new("f", 0);
        let entry = b.create_block();
        b.position_at_end(entry);
        b.ret(None).unwrap();
        b.ret(None).unwrap();
        assert!(b.finish().is_err());
    }

    #[test]
    fn test_phi_after_arithmetic() {
        let mut b = FunctionBuilder::new("f", 0);
        let entry = b.create_block();
        let next = b.create_block();
        b.position_at_end(entry);
        b.br(next).unwrap();
        b.position_at_end(next);
        b.add(1i64, 1i64).unwrap();
        let phi = b.phi().unwrap();
        b.add_incoming(phi, 0i64, entry).unwrap();
        b.ret(None).unwrap();
        assert!(b.finish().is_err());
    }

    #[test]
    fn test_dangling_target() {
        let mut func = Function::new("f", 0);
        let entry = func.create_block();
        func.append_inst(entry, Instruction::new(Opcode::Br, &[], &[BlockId(7)]))
            .unwrap();
        let err = FunctionValidator::validate(&func).unwrap_err();
        assert_eq!(malformed_block(err), Some(entry));
    }

    #[test]
    fn test_unknown_operand_reference() {
        let mut func = Function::new("f", 0);
        let entry = func.create_block();
        func.append_inst(entry, Instruction::new(Opcode::Ret, &[Operand::Inst(crate::ir::InstId(50))], &[]))
            .unwrap();
        assert!(FunctionValidator::validate(&func).is_err());
    }
}
