//! Task: log shipping.
//!
//! Always the first block of the boot script, so every later command's output
//! reaches the log group.

use super::{RenderCtx, log_task_error, task_start};
use crate::instance::BootStage;
use crate::logs::LogAgentConfig;
use crate::pipeline::PipelineTask;
use async_trait::async_trait;
use farmstead_shared::errors::FarmsteadResult;

pub(crate) struct LoggingTask;

#[async_trait]
impl PipelineTask<RenderCtx> for LoggingTask {
    async fn run(self: Box<Self>, ctx: RenderCtx) -> FarmsteadResult<()> {
        let task_name = self.name();
        let instance_id = task_start(&ctx, task_name).await;

        let mut ctx = ctx.lock().await;
        let mut config = LogAgentConfig::for_provisioning(&ctx.options.logs);
        for (name, path) in &ctx.log_streams {
            config.add_stream(name, path);
        }

        let commands = config
            .configure_commands()
            .inspect_err(|e| log_task_error(&instance_id, task_name, e))?;
        ctx.sequence.add_commands(commands)?;
        ctx.trail.advance(BootStage::LoggingConfigured)?;

        tracing::debug!(
            instance = %instance_id,
            streams = config.streams().len(),
            "Log shipping configured"
        );
        ctx.log_config = Some(config);
        Ok(())
    }

    fn name(&self) -> &str {
        "configure_logging"
    }
}
