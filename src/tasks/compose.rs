//! Sequential and concurrent task composition

use super::{Task, TaskError, TaskReport};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;

fn group_name(kind: &str, tasks: &[Arc<dyn Task>]) -> String {
    let names: Vec<&str> = tasks.iter().map(|t| t.name()).collect();
    format!("{}({})", kind, names.join(", "))
}

/// Run tasks one after another; the first failure stops the chain.
pub struct Series {
    name: String,
    tasks: Vec<Arc<dyn Task>>,
}

impl Series {
    /// Compose `tasks` in order.
    pub fn new(tasks: Vec<Arc<dyn Task>>) -> Self {
        Self { name: group_name("series", &tasks), tasks }
    }
}

#[async_trait]
impl Task for Series {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<TaskReport, TaskError> {
        let start = Instant::now();
        let mut report = TaskReport::new(&self.name);
        for task in &self.tasks {
            match task.run().await {
                Ok(step) => report.merge(step),
                Err(e) => {
                    tracing::debug!(group = %self.name, failed = task.name(), "series stopped");
                    return Err(e);
                }
            }
        }
        report.duration = start.elapsed();
        Ok(report)
    }
}

/// Run tasks concurrently and wait for all of them.
///
/// A failing member never cancels its siblings. The group fails if any member
/// failed; with several failures the error lists each of them.
pub struct Parallel {
    name: String,
    tasks: Vec<Arc<dyn Task>>,
}

impl Parallel {
    /// Compose `tasks` concurrently.
    pub fn new(tasks: Vec<Arc<dyn Task>>) -> Self {
        Self { name: group_name("parallel", &tasks), tasks }
    }
}

#[async_trait]
impl Task for Parallel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<TaskReport, TaskError> {
        let start = Instant::now();
        let results = join_all(self.tasks.iter().map(|t| t.run())).await;

        let mut report = TaskReport::new(&self.name);
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(step) => report.merge(step),
                Err(e) => errors.push(e),
            }
        }

        match errors.len() {
            0 => {
                report.duration = start.elapsed();
                Ok(report)
            }
            1 => Err(errors.remove(0)),
            _ => Err(TaskError::Parallel(errors)),
        }
    }
}

/// `series(a, b, ..)` as a shared task.
pub fn series(tasks: Vec<Arc<dyn Task>>) -> Arc<dyn Task> {
    Arc::new(Series::new(tasks))
}

/// `parallel(a, b, ..)` as a shared task.
pub fn parallel(tasks: Vec<Arc<dyn Task>>) -> Arc<dyn Task> {
    Arc::new(Parallel::new(tasks))
}
