//! Pipeline runtime.
//!
//! - **stage**: the [`Stage`] trait and the task that drives one stage
//! - **orchestrator**: [`Pipeline`], which chains stages and owns the intake
//!
//! ```text
//! producer ──▶ PipelineIntake ──▶ drain ──▶ stage 1 ──▶ stage 2 ──▶ … ──▶ (discard)
//! ```

pub mod orchestrator;
pub mod stage;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use orchestrator::{Pipeline, PipelineIntake};
pub use stage::{Downstream, Stage, StageContext, StageHandle, StageIntake, StageState};
