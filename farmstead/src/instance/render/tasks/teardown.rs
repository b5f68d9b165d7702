//! Tasks: what happens after the signal. Exactly one of these runs.

use super::{RenderCtx, log_task_error, task_start};
use crate::instance::BootStage;
use crate::instance::termination::SelfTerminationGuard;
use crate::pipeline::PipelineTask;
use async_trait::async_trait;
use farmstead_shared::errors::{FarmsteadError, FarmsteadResult};

pub(crate) struct SelfTerminationTask;

#[async_trait]
impl PipelineTask<RenderCtx> for SelfTerminationTask {
    async fn run(self: Box<Self>, ctx: RenderCtx) -> FarmsteadResult<()> {
        let task_name = self.name();
        let instance_id = task_start(&ctx, task_name).await;

        let mut guard_ctx = ctx.lock().await;
        let ctx = &mut *guard_ctx;
        let logs = ctx.log_config.as_ref().ok_or_else(|| {
            FarmsteadError::Internal("configure_logging task must run first".into())
        })?;
        let guard = SelfTerminationGuard::new(&ctx.instance_id, ctx.region.clone(), logs);

        guard
            .apply(&mut ctx.tags, &mut ctx.role, &mut ctx.sequence)
            .inspect_err(|e| log_task_error(&instance_id, task_name, e))?;
        ctx.trail.advance(BootStage::Terminating)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "self_termination"
    }
}

/// Leaves the instance running after the signal.
pub(crate) struct IdleTask;

#[async_trait]
impl PipelineTask<RenderCtx> for IdleTask {
    async fn run(self: Box<Self>, ctx: RenderCtx) -> FarmsteadResult<()> {
        let instance_id = task_start(&ctx, self.name()).await;

        ctx.lock().await.trail.advance(BootStage::Idle)?;
        tracing::info!(
            instance = %instance_id,
            "Self-termination disabled; instance stays up after signaling"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "stay_idle"
    }
}
