//! Stage definition.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// All tasks are polled concurrently; the stage fails if any task fails.
    Parallel,
    /// Tasks run one after another in declaration order.
    Sequential,
}

/// A labelled group of tasks sharing an execution mode.
#[derive(Debug, Clone)]
pub struct Stage<T> {
    pub label: &'static str,
    pub tasks: Vec<T>,
    pub execution: ExecutionMode,
}

impl<T> Stage<T> {
    pub fn parallel(label: &'static str, tasks: Vec<T>) -> Self {
        Self {
            label,
            tasks,
            execution: ExecutionMode::Parallel,
        }
    }

    pub fn sequential(label: &'static str, tasks: Vec<T>) -> Self {
        Self {
            label,
            tasks,
            execution: ExecutionMode::Sequential,
        }
    }
}
