// CLI command handlers
use anyhow::{bail, Context, Result};
use indicatif::ProgressBar;
use log::{error, info};
use loopnest_core::analysis::BlockLoopSummary;
use loopnest_core::ir::{BlockId, Module};
use loopnest_core::validator::FunctionValidator;
use loopnest_core::{BlockKind, LoopNest, OptimizationLevel, Optimizer, OptimizerConfig};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Loop structure of one function, as emitted by `analyze --json`.
#[derive(Serialize)]
struct FunctionLoops {
    name: String,
    blocks: Vec<BlockLoopSummary>,
    loops: Vec<LoopSummary>,
}

#[derive(Serialize)]
struct LoopSummary {
    header: BlockId,
    kind: BlockKind,
    members: Vec<BlockId>,
}

fn read_module(input: &Path) -> Result<Module> {
    let text = fs::read_to_string(input)
        .with_context(|| format!("Failed to read module: {}", input.display()))?;
    Module::from_json(&text).with_context(|| format!("Failed to parse module: {}", input.display()))
}

fn describe(name: &str, nest: &LoopNest) -> FunctionLoops {
    let loops = nest
        .headers_innermost_first()
        .into_iter()
        .rev()
        .map(|header| LoopSummary {
            header,
            kind: nest.kind(header).unwrap_or(BlockKind::NonHeader),
            members: nest.members(header),
        })
        .collect();
    FunctionLoops {
        name: name.to_string(),
        blocks: nest.summary(),
        loops,
    }
}

fn print_text(loops: &FunctionLoops, block_count: usize) {
    println!("Function: {}", loops.name);
    println!(
        "  Blocks: {} ({} reachable), loops: {}",
        block_count,
        loops.blocks.len(),
        loops.loops.len()
    );
    for row in &loops.blocks {
        let header = row.header.map_or_else(|| "-".to_string(), |h| h.to_string());
        println!(
            "    {:>6}  pre {:>4}  last {:>4}  header {:>6}  {:<12}  depth {}",
            row.block.to_string(),
            row.number,
            row.last,
            header,
            format!("{:?}", row.kind),
            row.depth
        );
    }
    for summary in &loops.loops {
        let members: Vec<String> = summary.members.iter().map(ToString::to_string).collect();
        println!("  Loop {} ({:?}): {}", summary.header, summary.kind, members.join(" "));
    }
}

pub fn analyze_module(input: &Path, json: bool) -> Result<()> {
    let module = read_module(input)?;
    info!("analyzing {} functions from {}", module.functions.len(), input.display());

    let mut reports = Vec::with_capacity(module.functions.len());
    for func in &module.functions {
        if let Err(e) = FunctionValidator::validate(func) {
            error!("{}: skipped: {:#}", func.name(), e);
            if !json {
                println!("Function: {} (skipped: {})", func.name(), e);
            }
            continue;
        }
        let nest = LoopNest::compute(func);
        let loops = describe(func.name(), &nest);
        if !json {
            print_text(&loops, func.block_count());
        }
        reports.push(loops);
    }

    if json {
        let text = serde_json::to_string_pretty(&reports).context("Failed to serialize loop structure")?;
        println!("{}", text);
    }

    Ok(())
}

/// Run the optimizer over every function of a module.
///
/// A function whose transform fails keeps its original body; the others are still
/// transformed and written out, and the command reports the failures at the end.
pub fn licm_module(
    input: &Path,
    output: Option<&Path>,
    level: OptimizationLevel,
    verify: bool,
    pb: &ProgressBar,
) -> Result<()> {
    let mut module = read_module(input)?;
    let optimizer = Optimizer::with_config(OptimizerConfig { level, verify });

    let mut failures = 0usize;
    let mut hoisted = 0usize;
    for func in module.functions.iter_mut() {
        pb.set_message(format!("Hoisting loop-invariant code in {}...", func.name()));
        pb.tick();

        let mut candidate = func.clone();
        match optimizer.optimize(&mut candidate) {
            Ok(outcome) => {
                pb.println(format!(
                    "{}: hoisted {}, preheaders created {}, passes {}",
                    func.name(),
                    outcome.motion.hoisted,
                    outcome.motion.preheaders_created,
                    outcome.motion.passes
                ));
                hoisted += outcome.motion.hoisted;
                *func = candidate;
            }
            Err(e) => {
                error!("{}: left unchanged: {:#}", func.name(), e);
                pb.println(format!("{}: failed: {}", func.name(), e));
                failures += 1;
            }
        }
    }

    let text = module.to_json().context("Failed to serialize module")?;
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("Failed to write module: {}", path.display()))?;
            pb.println(format!("Transformed module written to: {}", path.display()));
        }
        None => println!("{}", text),
    }
    info!("hoisted {} instructions across {} functions", hoisted, module.functions.len());

    if failures > 0 {
        bail!("{} of {} functions could not be transformed", failures, module.functions.len());
    }
    Ok(())
}
