//! Task: completion signal.
//!
//! First on-exit operation, so the controller hears the outcome before any
//! teardown begins.

use super::{RenderCtx, task_start};
use crate::deployment::SignalTarget;
use crate::instance::BootStage;
use crate::pipeline::PipelineTask;
use crate::script::EXIT_CODE_VAR;
use async_trait::async_trait;
use farmstead_shared::errors::FarmsteadResult;

pub(crate) struct SignalTask;

#[async_trait]
impl PipelineTask<RenderCtx> for SignalTask {
    async fn run(self: Box<Self>, ctx: RenderCtx) -> FarmsteadResult<()> {
        let instance_id = task_start(&ctx, self.name()).await;

        let mut ctx = ctx.lock().await;
        let target = SignalTarget {
            stack: ctx.stack_name.clone(),
            resource: ctx.group_id.clone(),
            region: ctx.region.clone(),
        };
        ctx.sequence
            .add_on_exit_commands([target.command(EXIT_CODE_VAR)])?;
        ctx.trail.advance(BootStage::Signaled)?;

        tracing::debug!(
            instance = %instance_id,
            resource = %target.resource,
            timeout = ?ctx.signal.timeout(),
            "Completion signal wired"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "completion_signal"
    }
}
