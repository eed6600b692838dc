//! `message` task: log a line

use tracing::info;

use crate::model::ModelError;

use super::context::RunContext;
use super::node::{Task, TaskNode, TaskType};
use super::result::ExecutionResult;

pub struct TaskMessage {
    node: TaskNode,
    text: String,
}

impl TaskMessage {
    pub fn new() -> Self {
        Self {
            node: TaskNode::new(TaskType::Message, &["input"]),
            text: String::new(),
        }
    }
}

impl Default for TaskMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for TaskMessage {
    fn node(&self) -> &TaskNode {
        &self.node
    }

    fn node_mut(&mut self) -> &mut TaskNode {
        &mut self.node
    }

    fn apply_attribute(&mut self, name: &str, value: &str) -> Result<(), ModelError> {
        self.node.store_attribute(name, value)?;
        if name == "input" {
            self.text = value.to_string();
        }
        Ok(())
    }

    /// `$index` references are expanded when they resolve
    fn run(&mut self, ctx: &mut RunContext<'_>) -> ExecutionResult {
        match ctx.vars().translate_var_name(&self.text) {
            Some(text) => info!("{}", text),
            None => info!("{}", self.text),
        }
        ExecutionResult::Ok
    }
}
