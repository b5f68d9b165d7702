//! Pipeline executor.

use super::metrics::{PipelineMetrics, StageMetrics, TaskMetrics};
use super::stage::{ExecutionMode, Stage};
use super::task::BoxedTask;
use farmstead_shared::errors::{FarmsteadError, FarmsteadResult};
use futures::future::try_join_all;
use std::time::Instant;

pub struct ExecutionPlan<Ctx> {
    stages: Vec<Stage<BoxedTask<Ctx>>>,
}

impl<Ctx> ExecutionPlan<Ctx> {
    pub fn new(stages: Vec<Stage<BoxedTask<Ctx>>>) -> Self {
        Self { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.label).collect()
    }
}

pub struct PipelineExecutor;

impl PipelineExecutor {
    /// Run every stage of `plan` in order.
    ///
    /// The first failing task aborts the pipeline; later stages never run.
    pub async fn execute<Ctx>(plan: ExecutionPlan<Ctx>, ctx: Ctx) -> FarmsteadResult<PipelineMetrics>
    where
        Ctx: Clone,
    {
        let total_start = Instant::now();
        let mut stage_metrics = Vec::with_capacity(plan.len());

        for (index, stage) in plan.stages.into_iter().enumerate() {
            let Stage {
                label,
                tasks,
                execution,
            } = stage;
            let stage_start = Instant::now();
            tracing::trace!(stage = label, index, "Starting render stage");

            let task_metrics = match execution {
                ExecutionMode::Parallel => {
                    let futures = tasks.into_iter().map(|task| {
                        let ctx = ctx.clone();
                        async move {
                            let name = task.name().to_string();
                            let task_start = Instant::now();
                            task.run(ctx).await?;
                            Ok::<TaskMetrics, FarmsteadError>(TaskMetrics {
                                name,
                                duration_us: task_start.elapsed().as_micros(),
                            })
                        }
                    });
                    try_join_all(futures).await?
                }
                ExecutionMode::Sequential => {
                    let mut task_metrics = Vec::with_capacity(tasks.len());
                    for task in tasks {
                        let name = task.name().to_string();
                        let task_start = Instant::now();
                        task.run(ctx.clone()).await?;
                        task_metrics.push(TaskMetrics {
                            name,
                            duration_us: task_start.elapsed().as_micros(),
                        });
                    }
                    task_metrics
                }
            };

            stage_metrics.push(StageMetrics {
                index,
                label,
                execution,
                duration_us: stage_start.elapsed().as_micros(),
                tasks: task_metrics,
            });
        }

        Ok(PipelineMetrics {
            total_duration_us: total_start.elapsed().as_micros(),
            stages: stage_metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineTask;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    type Trail = Arc<Mutex<Vec<String>>>;

    struct Record(&'static str);

    #[async_trait]
    impl PipelineTask<Trail> for Record {
        async fn run(self: Box<Self>, ctx: Trail) -> FarmsteadResult<()> {
            ctx.lock().await.push(self.0.to_string());
            Ok(())
        }

        fn name(&self) -> &str {
            self.0
        }
    }

    struct Fail;

    #[async_trait]
    impl PipelineTask<Trail> for Fail {
        async fn run(self: Box<Self>, _ctx: Trail) -> FarmsteadResult<()> {
            Err(FarmsteadError::Internal("boom".into()))
        }

        fn name(&self) -> &str {
            "fail"
        }
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let trail: Trail = Arc::new(Mutex::new(Vec::new()));
        let plan: ExecutionPlan<Trail> = ExecutionPlan::new(vec![
            Stage::sequential("first", vec![Box::new(Record("a")), Box::new(Record("b"))]),
            Stage::parallel("second", vec![Box::new(Record("c"))]),
        ]);
        assert_eq!(plan.labels(), vec!["first", "second"]);

        let metrics = PipelineExecutor::execute(plan, Arc::clone(&trail)).await.unwrap();

        assert_eq!(*trail.lock().await, vec!["a", "b", "c"]);
        assert_eq!(metrics.stage_labels(), vec!["first", "second"]);
        assert!(metrics.task_duration_us("b").is_some());
        assert!(metrics.task_duration_us("missing").is_none());
    }

    #[tokio::test]
    async fn test_failure_stops_later_stages() {
        let trail: Trail = Arc::new(Mutex::new(Vec::new()));
        let plan: ExecutionPlan<Trail> = ExecutionPlan::new(vec![
            Stage::sequential("first", vec![Box::new(Fail)]),
            Stage::sequential("second", vec![Box::new(Record("never"))]),
        ]);

        let result = PipelineExecutor::execute(plan, Arc::clone(&trail)).await;

        assert!(result.is_err());
        assert!(trail.lock().await.is_empty());
    }
}
