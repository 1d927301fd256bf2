//! Preorder Indexing
//!
//! This module numbers the blocks of a function in depth-first discovery order and records,
//! for every block, the highest number handed out while it was still open on the traversal.
//!
//! # Interval Property
//! For blocks `w` and `d`: `number[w] <= number[d] <= last[w]` exactly when `d` was discovered
//! while `w` was open, i.e. `w` is an ancestor of `d` in the depth-first spanning tree. Loop
//! discovery uses this as its constant-time ancestor test.
//!
//! # Memory Optimization
//! - Numbers are `u32`; `node` and `last` are dense vectors indexed by preorder number
//! - `discovered` state is the `number` table itself (`None` = undiscovered)
//!
//! # Algorithm
//! Iterative depth-first search with an explicit stack of `(block, next successor slot)`
//! frames. A block is numbered when first pushed; its `last` is fixed when its frame is
//! popped after every successor has been tried. No recursion, so arbitrarily deep CFGs are
//! handled without touching the call stack.

use crate::ir::{BlockId, Function};
use smallvec::SmallVec;

/// Depth-first preorder numbering of the blocks reachable from the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreorderIndex {
    /// Preorder number per block, indexed by `BlockId::index()`; `None` for unreachable blocks
    number: Vec<Option<u32>>,
    /// Block per preorder number
    node: Vec<BlockId>,
    /// Highest preorder number assigned while the block was open, per preorder number
    last: Vec<u32>,
}

impl PreorderIndex {
    /// Number of reachable blocks.
    #[inline]
    pub fn len(&self) -> usize {
        self.node.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.node.is_empty()
    }

    /// Preorder number of a block, `None` if it is unreachable from the entry.
    #[inline]
    pub fn number(&self, block: BlockId) -> Option<u32> {
        self.number.get(block.index()).copied().flatten()
    }

    /// Block carrying preorder number `n`.
    #[inline]
    pub fn block(&self, n: u32) -> BlockId {
        self.node[n as usize]
    }

    /// `last` for preorder number `n`.
    #[inline]
    pub fn last(&self, n: u32) -> u32 {
        self.last[n as usize]
    }

    #[inline]
    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.number(block).is_some()
    }

    /// Whether preorder number `w` is an ancestor of (or equal to) `v` in the spanning tree.
    #[inline]
    pub fn is_ancestor(&self, w: u32, v: u32) -> bool {
        w <= v && v <= self.last[w as usize]
    }

    /// Reachable blocks in preorder.
    pub fn blocks(&self) -> &[BlockId] {
        &self.node
    }
}

/// Builds a `PreorderIndex` for a function.
pub struct PreorderIndexer;

impl PreorderIndexer {
    /// Number every block reachable from the function's entry.
    ///
    /// Successors are explored in terminator order. Blocks that cannot be reached get no
    /// number and do not appear in `node`/`last`.
    pub fn run(func: &Function) -> PreorderIndex {
        Self::run_from(func, func.entry())
    }

    /// Number every block reachable from `entry`.
    pub fn run_from(func: &Function, entry: BlockId) -> PreorderIndex {
        let block_count = func.block_count();
        let mut number: Vec<Option<u32>> = vec![None; block_count];
        let mut node: Vec<BlockId> = Vec::with_capacity(block_count);
        let mut last: Vec<u32> = Vec::with_capacity(block_count);

        if !func.contains_block(entry) {
            return PreorderIndex { number, node, last };
        }

        let successors: Vec<SmallVec<[BlockId; 2]>> = (0..block_count)
            .map(|index| func.successors(BlockId(index as u32)))
            .collect();

        let mut stack: Vec<(BlockId, usize)> = Vec::new();
        number[entry.index()] = Some(0);
        node.push(entry);
        last.push(0);
        stack.push((entry, 0));

        while let Some(frame) = stack.last_mut() {
            let (block, next) = *frame;
            match successors[block.index()].get(next).copied() {
                Some(succ) => {
                    frame.1 += 1;
                    let slot = match number.get_mut(succ.index()) {
                        Some(slot) => slot,
                        None => continue,
                    };
                    if slot.is_none() {
                        let n = node.len() as u32;
                        *slot = Some(n);
                        node.push(succ);
                        last.push(n);
                        stack.push((succ, 0));
                    }
                }
                None => {
                    stack.pop();
                    if let Some(n) = number[block.index()] {
                        last[n as usize] = node.len() as u32 - 1;
                    }
                }
            }
        }

        log::trace!(
            "preorder for {}: {} of {} blocks reachable",
            func.name(),
            node.len(),
            block_count
        );

        PreorderIndex { number, node, last }
    }
}
