use crate::pipeline::ExecutionMode;

#[derive(Debug, Clone)]
pub struct TaskMetrics {
    pub name: String,
    pub duration_us: u128,
}

#[derive(Debug, Clone)]
pub struct StageMetrics {
    pub index: usize,
    pub label: &'static str,
    pub execution: ExecutionMode,
    pub duration_us: u128,
    pub tasks: Vec<TaskMetrics>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineMetrics {
    pub total_duration_us: u128,
    pub stages: Vec<StageMetrics>,
}

impl PipelineMetrics {
    pub fn task_duration_us(&self, name: &str) -> Option<u128> {
        self.stages
            .iter()
            .flat_map(|stage| stage.tasks.iter())
            .find(|task| task.name == name)
            .map(|task| task.duration_us)
    }

    /// Labels of the stages that ran, in execution order.
    pub fn stage_labels(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.label).collect()
    }

    pub fn log_stages(&self) {
        for stage in &self.stages {
            tracing::debug!(
                stage = stage.label,
                index = stage.index,
                mode = ?stage.execution,
                duration_us = stage.duration_us,
                tasks = stage.tasks.len(),
                "Render stage complete"
            );
        }
    }
}
