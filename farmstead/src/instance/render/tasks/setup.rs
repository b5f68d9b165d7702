//! Task: caller setup commands, in the order they were added.

use super::{RenderCtx, task_start};
use crate::instance::BootStage;
use crate::pipeline::PipelineTask;
use async_trait::async_trait;
use farmstead_shared::errors::FarmsteadResult;

pub(crate) struct SetupTask;

#[async_trait]
impl PipelineTask<RenderCtx> for SetupTask {
    async fn run(self: Box<Self>, ctx: RenderCtx) -> FarmsteadResult<()> {
        let instance_id = task_start(&ctx, self.name()).await;

        let mut ctx = ctx.lock().await;
        let setup = std::mem::take(&mut ctx.setup);
        let count = setup.len();
        ctx.sequence.add_items(setup)?;
        ctx.trail.advance(BootStage::TaskExecuting)?;

        tracing::debug!(instance = %instance_id, commands = count, "Setup commands queued");
        Ok(())
    }

    fn name(&self) -> &str {
        "setup_commands"
    }
}
