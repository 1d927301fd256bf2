//! Loop Optimizations
//!
//! This module drives the loop analyses and loop-invariant code motion over one function.
//!
//! # Optimization Levels
//!
//! - **None**: Leave the function alone
//! - **Analyze**: Validate and compute the loop nest only
//! - **Aggressive**: Additionally hoist loop-invariant code into preheaders
//!
//! # API Reference
//!
//! ```rust,no_run
//! use loopnest_core::optimizer::{Optimizer, OptimizationLevel};
//!
//! # fn demo(func: &mut loopnest_core::ir::Function) -> anyhow::Result<()> {
//! let optimizer = Optimizer::new(OptimizationLevel::Aggressive);
//! let outcome = optimizer.optimize(func)?;
//! println!("hoisted {} instructions", outcome.motion.hoisted);
//! # Ok(())
//! # }
//! ```

pub mod licm;

pub use licm::{InvariantMotion, MotionReport};

use crate::analysis::LoopNest;
use crate::ir::Function;
use crate::validator::FunctionValidator;
use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Optimization level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    /// No analysis, no transformation
    None,
    /// Loop nest analysis only
    Analyze,
    /// Loop nest analysis plus invariant code motion
    Aggressive,
}

/// Optimizer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub level: OptimizationLevel,
    /// Run the structural validator before and after transforming
    pub verify: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            level: OptimizationLevel::Aggressive,
            verify: true,
        }
    }
}

/// Result of optimizing one function.
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    /// Loop structure of the function as it stands after optimization
    pub nest: Option<LoopNest>,
    pub motion: MotionReport,
}

/// Per-function optimization driver.
pub struct Optimizer {
    config: OptimizerConfig,
}

impl Optimizer {
    /// Create an optimizer with the given level and verification enabled.
    pub fn new(level: OptimizationLevel) -> Self {
        Self {
            config: OptimizerConfig {
                level,
                ..OptimizerConfig::default()
            },
        }
    }

    pub fn with_config(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Optimize a single function in place.
    ///
    /// # Algorithm
    /// 1. Validate the input (if verification is enabled)
    /// 2. Compute the loop nest
    /// 3. Run invariant code motion to a fixpoint (`Aggressive` only)
    /// 4. Re-validate if the function changed
    ///
    /// # Errors
    /// Validation failures and structural inconsistencies abort this function only; the
    /// caller may continue with the next one.
    pub fn optimize(&self, func: &mut Function) -> Result<OptimizationOutcome> {
        if self.config.level == OptimizationLevel::None {
            return Ok(OptimizationOutcome {
                nest: None,
                motion: MotionReport::default(),
            });
        }

        if self.config.verify {
            FunctionValidator::validate(func)?;
        } else {
            warn!("{}: verification disabled, assuming a well-formed CFG", func.name());
        }

        let nest = LoopNest::compute(func);
        if self.config.level == OptimizationLevel::Analyze {
            info!(
                "{}: {} reachable blocks, {} loops",
                func.name(),
                nest.index.len(),
                nest.membership.len()
            );
            return Ok(OptimizationOutcome {
                nest: Some(nest),
                motion: MotionReport::default(),
            });
        }

        let (nest, motion) = InvariantMotion::run(func, nest)?;
        if self.config.verify && motion.changed {
            FunctionValidator::validate(func)?;
        }

        info!(
            "{}: hoisted {} instructions, created {} preheaders in {} passes",
            func.name(),
            motion.hoisted,
            motion.preheaders_created,
            motion.passes
        );

        Ok(OptimizationOutcome {
            nest: Some(nest),
            motion,
        })
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::with_config(OptimizerConfig::default())
    }
}
