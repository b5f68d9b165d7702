//! Table-driven render pipeline.
//!
//! ```text
//! Pipeline → Stages → Tasks
//!
//! - Pipeline: runs every stage in plan order
//! - Stage: labelled group of tasks with an execution mode (parallel/sequential)
//! - Task: one unit of rendering work against a shared context
//! ```
//!
//! A provisioning instance renders its boot script by building an
//! [`ExecutionPlan`] whose stage order is the boot order, so a block written by
//! an earlier stage always precedes the blocks of later stages.

mod metrics;
#[allow(clippy::module_inception)]
mod pipeline;
mod stage;
mod task;

pub use metrics::{PipelineMetrics, StageMetrics, TaskMetrics};
pub use pipeline::{ExecutionPlan, PipelineExecutor};
pub use stage::{ExecutionMode, Stage};
pub use task::{BoxedTask, PipelineTask};
