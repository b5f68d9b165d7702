//! Boot-script rendering.
//!
//! ## Architecture
//!
//! Rendering is table-driven. The plan depends on whether the instance
//! terminates itself:
//!
//! ```text
//! self_terminate = true:
//!   1. Logging            (ship boot log, always first)
//!   2. Setup              (caller commands, in insertion order)
//!   3. Signal             (report $exitCode, first on-exit block)
//!   4. SelfTermination    (grace sleep, scale group to zero)
//!   5. Seal               (evaluate lazy commands, render script)
//!   6. Policy ─┬─         (role document)
//!      Group  ─┘          (scaling group with encoded script)
//!
//! self_terminate = false:
//!   Same, with 4. Idle    (instance stays up after signaling)
//! ```

mod tasks;
pub(crate) mod types;

pub(crate) use tasks::RenderCtx;

use crate::pipeline::{BoxedTask, ExecutionPlan, Stage};
use tasks::{
    IdleTask, LoggingTask, PolicyTask, ScalingGroupTask, SealScriptTask, SelfTerminationTask,
    SetupTask, SignalTask,
};

pub(crate) fn get_execution_plan(self_terminate: bool) -> ExecutionPlan<RenderCtx> {
    let teardown: Stage<BoxedTask<RenderCtx>> = if self_terminate {
        Stage::sequential("self_termination", vec![Box::new(SelfTerminationTask)])
    } else {
        Stage::sequential("idle", vec![Box::new(IdleTask)])
    };

    let stages: Vec<Stage<BoxedTask<RenderCtx>>> = vec![
        Stage::sequential("logging", vec![Box::new(LoggingTask)]),
        Stage::sequential("setup", vec![Box::new(SetupTask)]),
        Stage::sequential("signal", vec![Box::new(SignalTask)]),
        teardown,
        Stage::sequential("seal", vec![Box::new(SealScriptTask)]),
        Stage::parallel(
            "artifacts",
            vec![Box::new(PolicyTask), Box::new(ScalingGroupTask)],
        ),
    ];

    ExecutionPlan::new(stages)
}
