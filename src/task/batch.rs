//! `batch` task: every included case, unconditionally

use tracing::info;

use crate::model::ModelError;

use super::context::RunContext;
use super::node::{Task, TaskNode, TaskType};
use super::result::ExecutionResult;

pub struct TaskBatch {
    node: TaskNode,
}

impl TaskBatch {
    pub fn new() -> Self {
        Self {
            node: TaskNode::new(TaskType::Batch, &["name", "version", "description"]),
        }
    }
}

impl Default for TaskBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for TaskBatch {
    fn node(&self) -> &TaskNode {
        &self.node
    }

    fn node_mut(&mut self) -> &mut TaskNode {
        &mut self.node
    }

    fn apply_attribute(&mut self, name: &str, value: &str) -> Result<(), ModelError> {
        self.node.store_attribute(name, value)
    }

    /// Each case reports its own outcome; the batch itself always succeeds
    fn run(&mut self, ctx: &mut RunContext<'_>) -> ExecutionResult {
        let total = self.node.children().len();
        info!(
            "Batch {}: {} cases",
            self.node.attribute("name").unwrap_or("unnamed"),
            total
        );
        for (n, case) in self.node.children_mut().iter_mut().enumerate() {
            let result = case.run(ctx);
            info!("Case {}/{} finished with {}", n + 1, total, result);
        }
        ExecutionResult::Ok
    }
}
