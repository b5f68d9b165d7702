//! Render tasks.
//!
//! Each task takes what it needs from the context, does its work, and writes
//! its block or output back. Stage order in the plan is boot order.

mod artifacts;
mod logging;
mod seal;
mod setup;
mod signal;
mod teardown;

pub(crate) use artifacts::{PolicyTask, ScalingGroupTask};
pub(crate) use logging::LoggingTask;
pub(crate) use seal::SealScriptTask;
pub(crate) use setup::SetupTask;
pub(crate) use signal::SignalTask;
pub(crate) use teardown::{IdleTask, SelfTerminationTask};

use super::types::RenderContext;
use crate::deployment::ResourceId;
use farmstead_shared::errors::FarmsteadError;
use std::sync::Arc;
use tokio::sync::Mutex;

pub(crate) type RenderCtx = Arc<Mutex<RenderContext>>;

/// Log the start of a task and return the instance it renders.
pub(super) async fn task_start(ctx: &RenderCtx, task_name: &str) -> ResourceId {
    let instance_id = ctx.lock().await.instance_id.clone();
    tracing::trace!(instance = %instance_id, task = task_name, "Render task started");
    instance_id
}

pub(super) fn log_task_error(instance_id: &ResourceId, task_name: &str, error: &FarmsteadError) {
    tracing::error!(
        instance = %instance_id,
        task = task_name,
        error = %error,
        "Render task failed"
    );
}
