//! Analysis Module
//!
//! This module provides the loop-structure analyses over a single function:
//! - `preorder`: depth-first preorder numbering with subtree intervals
//! - `loop_analysis`: Havlak loop nesting (innermost header + classification per block)
//! - `membership`: nesting-closed member sets per header
//!
//! `LoopNest` bundles the three results into one immutable, block-keyed snapshot. It is
//! valid until the function is next mutated; it is always rebuilt from scratch, never patched.

pub mod loop_analysis;
pub mod membership;
pub mod preorder;

pub use loop_analysis::{BlockKind, LoopInfo, LoopNestBuilder};
pub use membership::LoopMembership;
pub use preorder::{PreorderIndex, PreorderIndexer};

use crate::ir::{BlockId, Function};
use serde::{Deserialize, Serialize};

/// Snapshot of the loop structure of one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopNest {
    pub index: PreorderIndex,
    pub info: LoopInfo,
    pub membership: LoopMembership,
}

/// Per-block row of a `LoopNest`, for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLoopSummary {
    pub block: BlockId,
    pub number: u32,
    pub last: u32,
    pub header: Option<BlockId>,
    pub kind: BlockKind,
    pub depth: usize,
}

impl LoopNest {
    /// Run all three analyses on `func`.
    pub fn compute(func: &Function) -> Self {
        let index = PreorderIndexer::run(func);
        let info = LoopNestBuilder::run(func, &index);
        let membership = LoopMembership::materialize(&info, &index, func.block_count());
        Self {
            index,
            info,
            membership,
        }
    }

    #[inline]
    pub fn number(&self, block: BlockId) -> Option<u32> {
        self.index.number(block)
    }

    /// Innermost enclosing header; `None` outside every loop and for unreachable blocks.
    pub fn header(&self, block: BlockId) -> Option<BlockId> {
        let n = self.index.number(block)?;
        self.info.header(n).map(|h| self.index.block(h))
    }

    /// Classification; `None` for unreachable blocks.
    pub fn kind(&self, block: BlockId) -> Option<BlockKind> {
        self.index.number(block).map(|n| self.info.kind(n))
    }

    #[inline]
    pub fn is_member(&self, header: BlockId, block: BlockId) -> bool {
        self.membership.contains(header, block)
    }

    /// Member blocks of `header` in increasing preorder number.
    pub fn members(&self, header: BlockId) -> Vec<BlockId> {
        let mut blocks = self.membership.member_blocks(header);
        blocks.sort_by_key(|&b| self.index.number(b).unwrap_or(u32::MAX));
        blocks
    }

    /// Number of loops (of any kind) enclosing `block`, counting the one it heads.
    pub fn loop_depth(&self, block: BlockId) -> usize {
        let Some(n) = self.index.number(block) else {
            return 0;
        };
        let own = usize::from(self.info.kind(n).is_header());
        own + self.info.enclosing(n).count()
    }

    /// Headers in decreasing preorder number, so inner loops come before the loops around them.
    pub fn headers_innermost_first(&self) -> Vec<BlockId> {
        (0..self.info.len() as u32)
            .rev()
            .filter(|&n| self.info.kind(n).is_header())
            .map(|n| self.index.block(n))
            .collect()
    }

    /// One row per reachable block, in preorder.
    pub fn summary(&self) -> Vec<BlockLoopSummary> {
        self.index
            .blocks()
            .iter()
            .enumerate()
            .map(|(n, &block)| BlockLoopSummary {
                block,
                number: n as u32,
                last: self.index.last(n as u32),
                header: self.header(block),
                kind: self.info.kind(n as u32),
                depth: self.loop_depth(block),
            })
            .collect()
    }
}
