//! Integration tests for preorder indexing, Havlak loop nesting and loop membership

mod utils;

use anyhow::Result;
use loopnest_core::analysis::{LoopNest, PreorderIndexer};
use loopnest_core::ir::{BlockId, Function, FunctionBuilder, Operand};
use loopnest_core::BlockKind;
use std::collections::BTreeSet;
use utils::random_function;

/// Build a function whose blocks only branch: `edges[i]` lists the successors of block `i`.
/// Two successors become a conditional branch on the first parameter, none a return.
fn shape(edges: &[&[usize]]) -> Result<(Function, Vec<BlockId>)> {
    let mut b = FunctionBuilder::new("shape", 1);
    let blocks: Vec<BlockId> = edges.iter().map(|_| b.create_block()).collect();
    for (i, succs) in edges.iter().enumerate() {
        b.position_at_end(blocks[i]);
        match succs {
            [] => {
                b.ret(None)?;
            }
            [t] => {
                b.br(blocks[*t])?;
            }
            [t, e] => {
                b.cond_br(Operand::Param(0), blocks[*t], blocks[*e])?;
            }
            _ => anyhow::bail!("at most two successors per block"),
        }
    }
    Ok((b.finish()?, blocks))
}

fn assert_preorder_properties(func: &Function) {
    let index = PreorderIndexer::run(func);
    let k = index.len();
    assert!(k > 0);
    assert_eq!(index.number(func.entry()), Some(0));

    let mut seen = vec![false; k];
    for block in func.blocks() {
        if let Some(n) = index.number(block.id()) {
            assert!((n as usize) < k);
            assert!(!seen[n as usize], "number {} assigned twice", n);
            seen[n as usize] = true;
            assert_eq!(index.block(n), block.id());
            assert!(index.last(n) >= n);
            assert!((index.last(n) as usize) < k);
        }
    }
    assert!(seen.iter().all(|&s| s), "numbers are not a permutation of 0..{}", k);

    // Intervals nest or are disjoint
    for w in 0..k as u32 {
        for v in 0..k as u32 {
            if index.is_ancestor(w, v) {
                assert!(index.last(v) <= index.last(w));
            }
        }
    }
}

fn assert_nest_properties(func: &Function) {
    let nest = LoopNest::compute(func);
    let k = nest.index.len();

    for &block in nest.index.blocks() {
        // Header chains are finite and strictly decrease in preorder number
        let mut steps = 0usize;
        let mut cursor = block;
        while let Some(h) = nest.header(cursor) {
            assert!(nest.number(h) < nest.number(cursor));
            assert!(nest.kind(h).map_or(false, BlockKind::is_header));
            cursor = h;
            steps += 1;
            assert!(steps <= k, "header chain from {} does not terminate", block);
        }
    }

    // Nesting closure: x in H and H in G implies x in G
    let headers = nest.headers_innermost_first();
    for &h in headers.iter() {
        assert!(nest.is_member(h, h), "{} is not a member of its own loop", h);
        for &g in headers.iter() {
            if g != h && nest.is_member(g, h) {
                for x in nest.members(h) {
                    assert!(nest.is_member(g, x), "{} in {} but not in enclosing {}", x, h, g);
                }
            }
        }
    }
}

#[test]
fn test_self_edge_is_self_loop() -> Result<()> {
    let (func, blocks) = shape(&[&[1], &[1, 2], &[]])?;
    let nest = LoopNest::compute(&func);
    assert_eq!(nest.kind(blocks[1]), Some(BlockKind::SelfLoop));
    assert_eq!(nest.header(blocks[1]), None);
    assert_eq!(nest.members(blocks[1]), vec![blocks[1]]);
    assert_eq!(nest.loop_depth(blocks[1]), 1);
    assert_eq!(nest.loop_depth(blocks[2]), 0);
    Ok(())
}

#[test]
fn test_entry_self_loop_uses_disjoint_sentinel() -> Result<()> {
    let (func, blocks) = shape(&[&[0, 1], &[]])?;
    let nest = LoopNest::compute(&func);
    assert_eq!(nest.kind(blocks[0]), Some(BlockKind::SelfLoop));
    assert_eq!(nest.header(blocks[0]), None);
    assert_eq!(nest.header(blocks[1]), None);
    assert!(!nest.is_member(blocks[0], blocks[1]));
    Ok(())
}

#[test]
fn test_many_back_edges_single_reducible_header() -> Result<()> {
    // 0 -> 1; 1 -> 2 | 3; 2 -> 1 | 4; 3 -> 1 | 4; 4 -> 1 | 5; 5 ret
    let (func, blocks) = shape(&[&[1], &[2, 3], &[1, 4], &[1, 4], &[1, 5], &[]])?;
    let nest = LoopNest::compute(&func);
    assert_eq!(nest.kind(blocks[1]), Some(BlockKind::Reducible));
    for &b in &blocks[2..5] {
        assert_eq!(nest.kind(b), Some(BlockKind::NonHeader));
        assert_eq!(nest.header(b), Some(blocks[1]));
    }
    assert_eq!(nest.header(blocks[5]), None);
    let members: BTreeSet<BlockId> = nest.members(blocks[1]).into_iter().collect();
    let expected: BTreeSet<BlockId> = blocks[1..5].iter().copied().collect();
    assert_eq!(members, expected);
    assert_eq!(nest.members(blocks[1])[0], blocks[1]);
    assert_eq!(nest.headers_innermost_first(), vec![blocks[1]]);
    Ok(())
}

#[test]
fn test_two_entry_region_is_irreducible() -> Result<()> {
    // 0 -> 1 | 2; 1 -> 2 | 3; 2 -> 1 | 3; 3 ret
    let (func, blocks) = shape(&[&[1, 2], &[2, 3], &[1, 3], &[]])?;
    let nest = LoopNest::compute(&func);
    // Preorder visits 1 before 2, so 2 -> 1 is the back edge and 0 -> 2 enters the region past 1
    assert_eq!(nest.kind(blocks[1]), Some(BlockKind::Irreducible));
    assert_eq!(nest.kind(blocks[2]), Some(BlockKind::NonHeader));
    assert_eq!(nest.header(blocks[2]), Some(blocks[1]));
    assert_eq!(nest.header(blocks[1]), None);
    assert_eq!(nest.kind(blocks[3]), Some(BlockKind::NonHeader));
    assert_nest_properties(&func);
    Ok(())
}

#[test]
fn test_nested_loops_closure() -> Result<()> {
    // 0 -> 1; 1 -> 2; 2 -> 3; 3 -> 2 | 4; 4 -> 1 | 5; 5 ret
    let (func, blocks) = shape(&[&[1], &[2], &[3], &[2, 4], &[1, 5], &[]])?;
    let nest = LoopNest::compute(&func);
    assert_eq!(nest.kind(blocks[1]), Some(BlockKind::Reducible));
    assert_eq!(nest.kind(blocks[2]), Some(BlockKind::Reducible));
    assert_eq!(nest.header(blocks[3]), Some(blocks[2]));
    assert_eq!(nest.header(blocks[2]), Some(blocks[1]));
    assert!(nest.is_member(blocks[1], blocks[3]));
    assert_eq!(nest.loop_depth(blocks[3]), 2);
    assert_eq!(nest.loop_depth(blocks[2]), 2);
    assert_eq!(nest.headers_innermost_first(), vec![blocks[2], blocks[1]]);
    assert_nest_properties(&func);
    Ok(())
}

#[test]
fn test_unreachable_loop_is_ignored() -> Result<()> {
    // Block 2 loops on itself but nothing reaches it
    let (func, blocks) = shape(&[&[1], &[], &[2, 1]])?;
    let nest = LoopNest::compute(&func);
    assert_eq!(nest.kind(blocks[2]), None);
    assert_eq!(nest.header(blocks[2]), None);
    assert!(nest.headers_innermost_first().is_empty());
    assert_eq!(nest.summary().len(), 2);
    Ok(())
}

#[test]
fn test_summary_rows() -> Result<()> {
    let (func, blocks) = shape(&[&[1], &[1, 2], &[]])?;
    let rows = LoopNest::compute(&func).summary();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1].block, blocks[1]);
    assert_eq!(rows[1].kind, BlockKind::SelfLoop);
    assert_eq!(rows[0].last, 2);
    assert_eq!(rows[2].header, None);
    Ok(())
}

#[test]
fn test_random_cfgs_keep_invariants() -> Result<()> {
    for seed in 0..200u64 {
        let func = random_function(seed, 3 + (seed as usize % 12))?;
        assert_preorder_properties(&func);
        assert_nest_properties(&func);
    }
    Ok(())
}
