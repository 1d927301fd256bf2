//! Loop Membership
//!
//! Materializes, for every loop header, the full set of blocks inside that loop, including
//! blocks of nested loops.
//!
//! # Memory Optimization
//! Member sets are `BitVec<u32>` over block indices: 1 bit per block, O(1) membership tests.

use crate::analysis::loop_analysis::LoopInfo;
use crate::analysis::preorder::PreorderIndex;
use crate::ir::BlockId;
use bitvec::prelude::*;
use std::collections::HashMap;

/// Header -> member blocks, closed under nesting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoopMembership {
    sets: HashMap<BlockId, BitVec<u32>>,
}

impl LoopMembership {
    /// Build member sets from the header chains of `info`.
    ///
    /// # Algorithm
    /// Every header starts with itself as a member. Each block with an enclosing header is
    /// then added to that header's set and to every header further up the chain.
    /// Chains strictly decrease in preorder number, so the walk always ends.
    pub fn materialize(info: &LoopInfo, index: &PreorderIndex, block_count: usize) -> Self {
        let mut sets: HashMap<BlockId, BitVec<u32>> = HashMap::new();

        for n in 0..info.len() as u32 {
            if info.kind(n).is_header() {
                let block = index.block(n);
                sets.entry(block)
                    .or_insert_with(|| bitvec![u32, Lsb0; 0; block_count])
                    .set(block.index(), true);
            }
        }

        for n in 0..info.len() as u32 {
            let block = index.block(n);
            for h in info.enclosing(n) {
                let header = index.block(h);
                let members = sets
                    .entry(header)
                    .or_insert_with(|| bitvec![u32, Lsb0; 0; block_count]);
                members.set(header.index(), true);
                members.set(block.index(), true);
            }
        }

        Self { sets }
    }

    /// Whether `block` lies inside the loop headed by `header`.
    #[inline]
    pub fn contains(&self, header: BlockId, block: BlockId) -> bool {
        self.sets
            .get(&header)
            .and_then(|members| members.get(block.index()).map(|bit| *bit))
            .unwrap_or(false)
    }

    /// Member set of a header.
    pub fn members(&self, header: BlockId) -> Option<&BitSlice<u32>> {
        self.sets.get(&header).map(|members| members.as_bitslice())
    }

    /// Member blocks of a header in block-index order.
    pub fn member_blocks(&self, header: BlockId) -> Vec<BlockId> {
        self.members(header)
            .map(|members| members.iter_ones().map(|i| BlockId(i as u32)).collect())
            .unwrap_or_default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
