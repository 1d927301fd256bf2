//! Loop Analysis
//!
//! This module discovers the loop nesting forest of a function with Havlak's algorithm.
//! It needs only the preorder interval index: no dominator tree is built, and irreducible
//! control flow is classified rather than rejected.
//!
//! # Algorithm
//! 1. **Partition predecessors**: edge `v -> w` is a back edge iff `w` is an ancestor of `v`
//!    in the depth-first spanning tree (interval test); every other edge is a non-back edge.
//! 2. **Sweep in reverse preorder** (innermost-discovered first). For header candidate `w`:
//!    - seed `P` with `find(v)` for each back predecessor `v != w`; a self edge marks `SelfLoop`
//!    - walk non-back predecessors from `P`; a representative outside `w`'s interval marks
//!      `w` irreducible and is recorded as an extra non-back predecessor of `w`
//!    - every block left in `P` gets `header = w` and is merged into `w`'s set
//! 3. The union-find collapses finished inner loops onto their headers, so later sweeps
//!    treat a whole inner loop as a single node.
//!
//! # Memory Optimization
//! - Union-find is a parent-pointer forest over preorder numbers with path compression
//! - `P` membership uses a `BitVec` instead of a linear scan

use crate::analysis::preorder::PreorderIndex;
use crate::ir::{BlockId, Function};
use bitvec::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Loop classification of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BlockKind {
    /// Not a loop header
    NonHeader = 0,
    /// Header of a single-entry natural loop
    Reducible = 1,
    /// Header whose only back edge is a self edge (or that also has one)
    SelfLoop = 2,
    /// Header of a region entered from more than one place
    Irreducible = 3,
}

impl BlockKind {
    #[inline]
    pub fn is_header(self) -> bool {
        self != BlockKind::NonHeader
    }
}

/// Innermost enclosing header and classification of every reachable block.
///
/// Both tables are indexed by preorder number; headers are preorder numbers too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopInfo {
    header: Vec<Option<u32>>,
    kind: Vec<BlockKind>,
}

impl LoopInfo {
    #[inline]
    pub fn len(&self) -> usize {
        self.kind.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.kind.is_empty()
    }

    /// Innermost enclosing header of preorder number `n`.
    #[inline]
    pub fn header(&self, n: u32) -> Option<u32> {
        self.header[n as usize]
    }

    #[inline]
    pub fn kind(&self, n: u32) -> BlockKind {
        self.kind[n as usize]
    }

    /// Chain of enclosing headers, innermost first.
    pub fn enclosing(&self, n: u32) -> impl Iterator<Item = u32> + '_ {
        std::iter::successors(self.header(n), move |&h| self.header(h))
    }
}

/// Union-find over preorder numbers.
///
/// `find` compresses the path it walks; `union(x, w)` hangs `x`'s tree under `w`.
struct LoopSets {
    parent: Vec<u32>,
}

impl LoopSets {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len as u32).collect(),
        }
    }

    fn find(&mut self, x: u32) -> u32 {
        let mut root = x;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut cursor = x;
        while self.parent[cursor as usize] != root {
            let next = self.parent[cursor as usize];
            self.parent[cursor as usize] = root;
            cursor = next;
        }
        root
    }

    fn union(&mut self, x: u32, w: u32) {
        let root = self.find(x);
        let target = self.find(w);
        if root != target {
            self.parent[root as usize] = target;
        }
    }
}

/// Havlak loop nesting builder.
pub struct LoopNestBuilder;

impl LoopNestBuilder {
    /// Classify every reachable block's innermost header and loop kind.
    ///
    /// Total over any CFG: irreducible regions and self loops are ordinary outputs.
    pub fn run(func: &Function, index: &PreorderIndex) -> LoopInfo {
        let len = index.len();
        let mut back_preds: Vec<SmallVec<[u32; 2]>> = vec![SmallVec::new(); len];
        let mut non_back_preds: Vec<SmallVec<[u32; 2]>> = vec![SmallVec::new(); len];

        let pred_table: Vec<SmallVec<[BlockId; 2]>> = func.predecessor_table();
        for w in 0..len as u32 {
            let block = index.block(w);
            for &pred in pred_table[block.index()].iter() {
                // Edges from unreachable blocks do not exist as far as loops are concerned
                let Some(v) = index.number(pred) else {
                    continue;
                };
                if index.is_ancestor(w, v) {
                    back_preds[w as usize].push(v);
                } else {
                    non_back_preds[w as usize].push(v);
                }
            }
        }

        let mut header: Vec<Option<u32>> = vec![None; len];
        let mut kind: Vec<BlockKind> = vec![BlockKind::NonHeader; len];
        let mut sets = LoopSets::new(len);
        let mut in_body: BitVec<u32> = bitvec![u32, Lsb0; 0; len];

        for w in (0..len as u32).rev() {
            let mut body: SmallVec<[u32; 8]> = SmallVec::new();
            for &v in back_preds[w as usize].iter() {
                if v == w {
                    kind[w as usize] = BlockKind::SelfLoop;
                } else {
                    let x = sets.find(v);
                    if !in_body[x as usize] {
                        in_body.set(x as usize, true);
                        body.push(x);
                    }
                }
            }
            if !body.is_empty() && kind[w as usize] != BlockKind::SelfLoop {
                kind[w as usize] = BlockKind::Reducible;
            }

            let mut worklist: SmallVec<[u32; 8]> = body.clone();
            let mut extra_entries: SmallVec<[u32; 2]> = SmallVec::new();
            while let Some(x) = worklist.pop() {
                for &y in non_back_preds[x as usize].iter() {
                    let y_rep = sets.find(y);
                    if !index.is_ancestor(w, y_rep) {
                        kind[w as usize] = BlockKind::Irreducible;
                        if !extra_entries.contains(&y_rep) {
                            extra_entries.push(y_rep);
                        }
                    } else if y_rep != w && !in_body[y_rep as usize] {
                        in_body.set(y_rep as usize, true);
                        body.push(y_rep);
                        worklist.push(y_rep);
                    }
                }
            }
            // Entries into the region propagate upward as entries into `w`
            for y_rep in extra_entries {
                if !non_back_preds[w as usize].contains(&y_rep) {
                    non_back_preds[w as usize].push(y_rep);
                }
            }

            for &x in body.iter() {
                header[x as usize] = Some(w);
                sets.union(x, w);
                in_body.set(x as usize, false);
            }

            if kind[w as usize].is_header() {
                log::trace!(
                    "{}: {} is a {:?} header with {} direct members",
                    func.name(),
                    index.block(w),
                    kind[w as usize],
                    body.len()
                );
            }
        }

        LoopInfo { header, kind }
    }
}
