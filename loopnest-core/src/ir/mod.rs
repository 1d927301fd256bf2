//! Intermediate Representation
//!
//! A minimal SSA-style IR: an arena of blocks and instructions per function, plus a
//! serializable `Module` container used by the command-line tool.

pub mod builder;
pub mod function;
pub mod instruction;

pub use builder::FunctionBuilder;
pub use function::{BasicBlock, Function};
pub use instruction::{BlockId, InstId, Instruction, Opcode, Operand};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A collection of independent functions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub functions: Vec<Function>,
}

impl Module {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
