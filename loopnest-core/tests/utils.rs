//! Test Utilities
//!
//! This module provides helpers shared by the integration tests: a reference interpreter for
//! checking that transformations preserve behavior, deterministic CFG generators, and
//! assertion helpers over loop structure.

#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use loopnest_core::analysis::LoopNest;
use loopnest_core::ir::{BlockId, Function, FunctionBuilder, InstId, Opcode, Operand};
use loopnest_core::InvariantMotion;
use std::collections::HashMap;

/// Observable behavior of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub ret: Option<i64>,
    /// `(address, value)` for every store, in order
    pub stores: Vec<(i64, i64)>,
    /// Arguments of every call, in order
    pub calls: Vec<Vec<i64>>,
    /// Blocks visited, in order
    pub path: Vec<BlockId>,
}

impl Execution {
    /// Path restricted to blocks that existed before a transformation added any.
    pub fn path_within(&self, block_count: usize) -> Vec<BlockId> {
        self.path
            .iter()
            .copied()
            .filter(|b| b.index() < block_count)
            .collect()
    }
}

/// Interpret `func` on concrete arguments and initial memory.
///
/// Fails on a use of a value that has not been computed yet, which is exactly what a
/// dominance-breaking hoist would produce.
pub fn interpret(func: &Function, args: &[i64], memory: &HashMap<i64, i64>, fuel: usize) -> Result<Execution> {
    let mut memory = memory.clone();
    let mut values: HashMap<InstId, i64> = HashMap::new();
    let mut exec = Execution {
        ret: None,
        stores: Vec::new(),
        calls: Vec::new(),
        path: Vec::new(),
    };
    let mut block = func.entry();
    let mut prev: Option<BlockId> = None;

    for _ in 0..fuel {
        exec.path.push(block);
        let insts = func.block_insts(block);

        let mut merged: Vec<(InstId, i64)> = Vec::new();
        for &id in insts {
            let inst = func.inst(id).ok_or_else(|| anyhow!("unknown instruction {}", id))?;
            if !inst.is_phi() {
                continue;
            }
            let from = prev.ok_or_else(|| anyhow!("phi {} in entry block", id))?;
            let (value, _) = inst
                .incoming()
                .find(|&(_, pred)| pred == from)
                .ok_or_else(|| anyhow!("phi {} has no entry for {}", id, from))?;
            merged.push((id, eval(value, args, &values)?));
        }
        values.extend(merged);

        let mut next: Option<BlockId> = None;
        for &id in insts {
            let inst = func.inst(id).ok_or_else(|| anyhow!("unknown instruction {}", id))?;
            let operand = |i: usize| -> Result<i64> {
                let op = *inst.operands.get(i).ok_or_else(|| anyhow!("{} lacks operand {}", id, i))?;
                eval(op, args, &values)
            };
            let result = match inst.opcode {
                Opcode::Phi => continue,
                Opcode::Add => operand(0)?.wrapping_add(operand(1)?),
                Opcode::Sub => operand(0)?.wrapping_sub(operand(1)?),
                Opcode::Mul => operand(0)?.wrapping_mul(operand(1)?),
                Opcode::And => operand(0)? & operand(1)?,
                Opcode::Or => operand(0)? | operand(1)?,
                Opcode::Xor => operand(0)? ^ operand(1)?,
                Opcode::Shl => operand(0)?.wrapping_shl((operand(1)? & 63) as u32),
                Opcode::CmpEq => i64::from(operand(0)? == operand(1)?),
                Opcode::CmpLt => i64::from(operand(0)? < operand(1)?),
                Opcode::Select => {
                    if operand(0)? != 0 {
                        operand(1)?
                    } else {
                        operand(2)?
                    }
                }
                Opcode::Load => memory.get(&operand(0)?).copied().unwrap_or(0),
                Opcode::Store => {
                    let (addr, value) = (operand(0)?, operand(1)?);
                    memory.insert(addr, value);
                    exec.stores.push((addr, value));
                    0
                }
                Opcode::Call => {
                    let call_args = (0..inst.operands.len()).map(operand).collect::<Result<Vec<i64>>>()?;
                    let result = call_args.iter().sum::<i64>() + exec.calls.len() as i64;
                    exec.calls.push(call_args);
                    result
                }
                Opcode::LandingPad => 0,
                Opcode::Br => {
                    next = Some(inst.blocks[0]);
                    break;
                }
                Opcode::CondBr => {
                    next = Some(if operand(0)? != 0 { inst.blocks[0] } else { inst.blocks[1] });
                    break;
                }
                Opcode::Ret => {
                    exec.ret = match inst.operands.first() {
                        Some(&op) => Some(eval(op, args, &values)?),
                        None => None,
                    };
                    return Ok(exec);
                }
            };
            values.insert(id, result);
        }

        prev = Some(block);
        block = next.ok_or_else(|| anyhow!("{} fell off its end", block))?;
    }

    bail!("out of fuel after {} blocks", fuel)
}

fn eval(op: Operand, args: &[i64], values: &HashMap<InstId, i64>) -> Result<i64> {
    match op {
        Operand::Const(c) => Ok(c),
        Operand::Param(i) => args
            .get(i as usize)
            .copied()
            .ok_or_else(|| anyhow!("missing argument {}", i)),
        Operand::Inst(id) => values
            .get(&id)
            .copied()
            .ok_or_else(|| anyhow!("{} used before it was computed", id)),
    }
}

/// Run invariant code motion from a fresh snapshot.
pub fn hoist_all(func: &mut Function) -> Result<(LoopNest, loopnest_core::MotionReport)> {
    let nest = LoopNest::compute(func);
    InvariantMotion::run(func, nest)
}

/// Assert that no member block of any eligible loop still holds an invariant instruction.
pub fn assert_no_hoist_opportunity(func: &Function) {
    let nest = LoopNest::compute(func);
    for header in nest.headers_innermost_first() {
        let eligible = matches!(
            nest.kind(header),
            Some(loopnest_core::BlockKind::Reducible | loopnest_core::BlockKind::SelfLoop)
        );
        if eligible {
            assert_eq!(
                InvariantMotion::find_invariant(func, &nest, header),
                None,
                "loop {} still has an invariant instruction",
                header
            );
        }
    }
}

/// Deterministic linear congruential generator for reproducible random CFGs.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407))
    }

    pub fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    pub fn below(&mut self, bound: usize) -> usize {
        (self.next() % bound as u64) as usize
    }
}

/// Random CFG over `size` blocks with straight-line arithmetic in every block.
///
/// Operands are parameters, constants, or earlier instructions of the same block, so every
/// use is dominated by its definition regardless of the generated control flow. A separate
/// entry block jumps into the random region, so the entry never heads a loop.
pub fn random_function(seed: u64, size: usize) -> Result<Function> {
    let mut rng = Lcg::new(seed);
    let mut b = FunctionBuilder::new(format!("random_{}", seed), 2);
    let entry = b.create_block();
    let blocks: Vec<BlockId> = (0..size).map(|_| b.create_block()).collect();
    b.position_at_end(entry);
    b.br(blocks[0])?;

    for &block in blocks.iter() {
        b.position_at_end(block);
        let mut local: Vec<InstId> = Vec::new();
        for _ in 0..rng.below(4) {
            let pick = |rng: &mut Lcg, local: &[InstId]| -> Operand {
                match rng.below(3) {
                    0 if !local.is_empty() => Operand::Inst(local[rng.below(local.len())]),
                    1 => Operand::Param(rng.below(2) as u32),
                    _ => Operand::Const(rng.below(16) as i64),
                }
            };
            let lhs = pick(&mut rng, &local);
            let rhs = pick(&mut rng, &local);
            let id = if rng.below(5) == 0 {
                b.load(lhs)?
            } else {
                b.add(lhs, rhs)?
            };
            local.push(id);
        }
        match rng.below(6) {
            0 => {
                b.ret(None)?;
            }
            1 | 2 => {
                b.br(blocks[rng.below(size)])?;
            }
            _ => {
                let then_block = blocks[rng.below(size)];
                let else_block = blocks[rng.below(size)];
                b.cond_br(Operand::Param(0), then_block, else_block)?;
            }
        }
    }
    b.finish()
}
