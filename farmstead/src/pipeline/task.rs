//! Task trait for pipeline execution.

use async_trait::async_trait;
use farmstead_shared::errors::FarmsteadResult;

/// A unit of work run against the shared pipeline context.
///
/// The context is cloned per task, so implementations share state through
/// interior mutability (`Arc<Mutex<_>>`).
#[async_trait]
pub trait PipelineTask<Ctx>: Send + Sync {
    async fn run(self: Box<Self>, ctx: Ctx) -> FarmsteadResult<()>;

    /// Stable name used in metrics and logs.
    fn name(&self) -> &str;
}

pub type BoxedTask<Ctx> = Box<dyn PipelineTask<Ctx>>;
