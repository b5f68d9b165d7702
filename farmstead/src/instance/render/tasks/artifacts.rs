//! Tasks: deployable artifacts built from the sealed script and role.

use super::{RenderCtx, task_start};
use crate::instance::group::{CreationPolicy, ScalingGroupSpec};
use crate::pipeline::PipelineTask;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use farmstead_shared::errors::{FarmsteadError, FarmsteadResult};

pub(crate) struct PolicyTask;

#[async_trait]
impl PipelineTask<RenderCtx> for PolicyTask {
    async fn run(self: Box<Self>, ctx: RenderCtx) -> FarmsteadResult<()> {
        let instance_id = task_start(&ctx, self.name()).await;

        let mut ctx = ctx.lock().await;
        let document = ctx.role.document();
        tracing::debug!(
            instance = %instance_id,
            statements = document.statements.len(),
            "Instance policy built"
        );
        ctx.policy_output = Some(document);
        Ok(())
    }

    fn name(&self) -> &str {
        "instance_policy"
    }
}

pub(crate) struct ScalingGroupTask;

#[async_trait]
impl PipelineTask<RenderCtx> for ScalingGroupTask {
    async fn run(self: Box<Self>, ctx: RenderCtx) -> FarmsteadResult<()> {
        let instance_id = task_start(&ctx, self.name()).await;

        let mut ctx = ctx.lock().await;
        let script = ctx
            .script
            .as_ref()
            .ok_or_else(|| FarmsteadError::Internal("seal_script task must run first".into()))?;
        let capacity = ctx.options.capacity;

        let spec = ScalingGroupSpec {
            logical_id: ctx.group_id.clone(),
            min_size: capacity.min,
            max_size: capacity.max,
            desired_capacity: capacity.desired,
            subnets: ctx.options.subnets.clone(),
            instance_type: ctx.options.instance_type.clone(),
            machine_image: ctx.options.machine_image.clone(),
            key_name: ctx.options.key_name.clone(),
            security_group: ctx.options.security_group.clone(),
            tags: ctx.tags.clone(),
            user_data: STANDARD.encode(script.as_bytes()),
            creation_policy: CreationPolicy {
                count: ctx.signal.count(),
                timeout: ctx.signal.timeout_iso8601(),
            },
        };
        tracing::debug!(
            instance = %instance_id,
            group = %spec.logical_id,
            "Scaling group declared"
        );
        ctx.group_output = Some(spec);
        Ok(())
    }

    fn name(&self) -> &str {
        "scaling_group"
    }
}
