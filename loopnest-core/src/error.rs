//! Error Handling
//!
//! This module provides the error types for loop-nest analysis and code motion using `thiserror`.
//!
//! # Error Categories
//! - **Structural inconsistency**: Loop structure contradicts the CFG (fatal for the procedure)
//! - **Malformed function**: Input CFG violates a precondition checked by the validator
//! - **Invalid edit**: A CFG mutation primitive was misused
//! - **Unknown ids**: A block or instruction id does not exist in the function
//!
//! Library functions return `anyhow::Result`; callers that need the category can
//! recover it with `err.downcast_ref::<LoopNestError>()`.

use crate::ir::{BlockId, InstId};
use thiserror::Error;

/// Loop-nest error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoopNestError {
    /// Loop header without any predecessor outside its own loop.
    ///
    /// Unreachable for a header reachable from the procedure entry; aborts the
    /// transform for the current procedure.
    #[error("Structural inconsistency at loop header {header}: {message}\nSuggestion: {suggestion}")]
    StructuralInconsistency {
        header: BlockId,
        message: String,
        suggestion: String,
    },

    /// Function fails a structural precondition (missing terminator, dangling target, ...).
    #[error("Malformed function{}: {message}\nSuggestion: {suggestion}", .block.map(|b| format!(" at {}", b)).unwrap_or_default())]
    MalformedFunction {
        block: Option<BlockId>,
        message: String,
        suggestion: String,
    },

    /// A CFG mutation primitive was called in a state it cannot handle.
    #[error("Invalid edit: {message}\nSuggestion: {suggestion}")]
    InvalidEdit {
        message: String,
        suggestion: String,
    },

    /// Block id is out of range for the function.
    #[error("Unknown block {0}")]
    UnknownBlock(BlockId),

    /// Instruction id is out of range for the function.
    #[error("Unknown instruction {0}")]
    UnknownInstruction(InstId),
}

impl LoopNestError {
    /// Create a structural inconsistency error for a loop header.
    #[cold]
    pub fn structural(header: BlockId, message: impl Into<String>) -> Self {
        Self::StructuralInconsistency {
            header,
            message: message.into(),
            suggestion: "The header must be reachable from the entry block. Run the validator on the input CFG.".to_string(),
        }
    }

    /// Create a malformed function error, optionally pinned to a block.
    #[cold]
    pub fn malformed(block: Option<BlockId>, message: impl Into<String>) -> Self {
        let suggestion = if block.is_some() {
            "Every block must end in exactly one terminator and reference existing blocks."
        } else {
            "Check that the function has an entry block and consistent instruction ownership."
        };
        Self::MalformedFunction {
            block,
            message: message.into(),
            suggestion: suggestion.to_string(),
        }
    }

    /// Create an invalid edit error.
    #[cold]
    pub fn invalid_edit(message: impl Into<String>) -> Self {
        Self::InvalidEdit {
            message: message.into(),
            suggestion: "Detach an instruction before re-inserting it, and only edit blocks that end in a terminator.".to_string(),
        }
    }
}
