//! Task: render the boot script and seal the sequence.
//!
//! Lazy commands are evaluated here, after every feature has had its say.

use super::{RenderCtx, log_task_error, task_start};
use crate::pipeline::PipelineTask;
use async_trait::async_trait;
use farmstead_shared::errors::FarmsteadResult;

pub(crate) struct SealScriptTask;

#[async_trait]
impl PipelineTask<RenderCtx> for SealScriptTask {
    async fn run(self: Box<Self>, ctx: RenderCtx) -> FarmsteadResult<()> {
        let task_name = self.name();
        let instance_id = task_start(&ctx, task_name).await;

        let mut ctx = ctx.lock().await;
        let script = ctx
            .sequence
            .render()
            .inspect_err(|e| log_task_error(&instance_id, task_name, e))?;

        tracing::debug!(instance = %instance_id, bytes = script.len(), "Boot script sealed");
        ctx.script = Some(script);
        Ok(())
    }

    fn name(&self) -> &str {
        "seal_script"
    }
}
