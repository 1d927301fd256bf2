//! IR Instructions
//!
//! This module defines the instruction-level IR that the loop analyses and code motion operate on.
//! Instructions live in a per-function arena and are referred to by `InstId`; the owning block is
//! stored on the instruction so an operand can be traced back to the block that defines it.
//!
//! # Memory Optimizations
//! - `Opcode` uses `#[repr(u8)]` (1 byte discriminant)
//! - `Instruction.operands` uses `SmallVec<[Operand; 2]>` (most instructions have ≤2 operands)
//! - `Instruction.blocks` uses `SmallVec<[BlockId; 2]>` (branches have ≤2 targets)
//! - Block and instruction ids are `u32` newtypes
//!
//! # Instruction Metadata
//! Code motion only needs a handful of classification queries:
//! - **Memory**: `reads_memory`, `writes_memory`
//! - **Control**: `is_terminator`, `is_control_merge`
//! - **Calls and exceptions**: `is_call`, `is_exception_construct`

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Basic block identifier (index into the function's block arena).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u32);

impl BlockId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Instruction identifier (index into the function's instruction arena).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstId(pub u32);

impl InstId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Instruction opcode.
///
/// # Operand Conventions
/// - **Binary** (`Add` .. `CmpLt`): `[lhs, rhs]`
/// - `Select`: `[cond, if_true, if_false]`
/// - `Load`: `[addr]`, `Store`: `[addr, value]`
/// - `Call`: arguments
/// - `Phi`: incoming values, parallel to `Instruction::blocks`
/// - `Br`: no operands, `blocks = [target]`
/// - `CondBr`: `[cond]`, `blocks = [then, else]`
/// - `Ret`: optional `[value]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Add = 0,
    Sub = 1,
    Mul = 2,
    And = 3,
    Or = 4,
    Xor = 5,
    Shl = 6,
    /// `1` if equal, `0` otherwise
    CmpEq = 7,
    /// Signed less-than, `1` or `0`
    CmpLt = 8,
    Select = 9,
    Load = 10,
    Store = 11,
    /// Opaque call; assumed to read and write memory
    Call = 12,
    /// Control-flow merge of values from predecessor blocks
    Phi = 13,
    /// Exception-handling landing point
    LandingPad = 14,
    Br = 15,
    CondBr = 16,
    Ret = 17,
}

impl Opcode {
    #[inline]
    pub fn reads_memory(self) -> bool {
        matches!(self, Opcode::Load | Opcode::Call)
    }

    #[inline]
    pub fn writes_memory(self) -> bool {
        matches!(self, Opcode::Store | Opcode::Call)
    }

    #[inline]
    pub fn is_terminator(self) -> bool {
        matches!(self, Opcode::Br | Opcode::CondBr | Opcode::Ret)
    }

    #[inline]
    pub fn is_control_merge(self) -> bool {
        matches!(self, Opcode::Phi)
    }

    #[inline]
    pub fn is_call(self) -> bool {
        matches!(self, Opcode::Call)
    }

    #[inline]
    pub fn is_exception_construct(self) -> bool {
        matches!(self, Opcode::LandingPad)
    }

    /// Pure two-operand arithmetic or comparison.
    #[inline]
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::And
                | Opcode::Or
                | Opcode::Xor
                | Opcode::Shl
                | Opcode::CmpEq
                | Opcode::CmpLt
        )
    }
}

/// Instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    /// Integer constant
    Const(i64),
    /// Value produced by another instruction
    Inst(InstId),
    /// Procedure parameter (defined outside every block)
    Param(u32),
}

impl Operand {
    /// Defining instruction, if the operand is traceable to one.
    #[inline]
    pub fn as_inst(self) -> Option<InstId> {
        match self {
            Operand::Inst(id) => Some(id),
            _ => None,
        }
    }
}

impl From<InstId> for Operand {
    fn from(id: InstId) -> Self {
        Operand::Inst(id)
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Const(value)
    }
}

/// A single IR instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: SmallVec<[Operand; 2]>,
    /// Successors for terminators, incoming blocks for `Phi` (parallel to `operands`)
    #[serde(default)]
    pub blocks: SmallVec<[BlockId; 2]>,
    /// Owning block, `None` while detached
    #[serde(default)]
    pub block: Option<BlockId>,
}

impl Instruction {
    /// Create a detached instruction.
    pub fn new(opcode: Opcode, operands: &[Operand], blocks: &[BlockId]) -> Self {
        Self {
            opcode,
            operands: SmallVec::from_slice(operands),
            blocks: SmallVec::from_slice(blocks),
            block: None,
        }
    }

    #[inline]
    pub fn is_terminator(&self) -> bool {
        self.opcode.is_terminator()
    }

    #[inline]
    pub fn is_phi(&self) -> bool {
        self.opcode.is_control_merge()
    }

    /// Whether the instruction may be relocated without changing observable behavior.
    ///
    /// Anything touching memory, control flow, calls or exception handling stays put.
    pub fn is_safe_to_move(&self) -> bool {
        let op = self.opcode;
        !(op.reads_memory()
            || op.writes_memory()
            || op.is_terminator()
            || op.is_control_merge()
            || op.is_call()
            || op.is_exception_construct())
    }

    /// Phi incoming pairs `(value, predecessor)`.
    pub fn incoming(&self) -> impl Iterator<Item = (Operand, BlockId)> + '_ {
        self.operands.iter().copied().zip(self.blocks.iter().copied())
    }
}
