//! Loop nest discovery and loop-invariant code motion over a procedure CFG.
//!
//! - [`ir`]: blocks, instructions and the CFG mutation primitives
//! - [`analysis`]: preorder intervals, Havlak loop nesting, loop membership
//! - [`optimizer`]: the per-function driver and invariant code motion
//! - [`validator`]: structural preconditions on input functions

pub mod analysis;
pub mod error;
pub mod ir;
pub mod optimizer;
pub mod validator;

pub use analysis::{BlockKind, LoopNest};
pub use error::LoopNestError;
pub use optimizer::{InvariantMotion, MotionReport, OptimizationLevel, Optimizer, OptimizerConfig};
