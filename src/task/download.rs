//! `download` task: copy a buffer to the device ahead of playback

use tracing::{error, info};

use crate::model::ModelError;

use super::context::RunContext;
use super::node::{Task, TaskNode, TaskType};
use super::result::ExecutionResult;

pub struct TaskDownload {
    node: TaskNode,
    id: String,
}

impl TaskDownload {
    pub fn new() -> Self {
        Self {
            node: TaskNode::new(TaskType::Download, &["id"]),
            id: String::new(),
        }
    }
}

impl Default for TaskDownload {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for TaskDownload {
    fn node(&self) -> &TaskNode {
        &self.node
    }

    fn node_mut(&mut self) -> &mut TaskNode {
        &mut self.node
    }

    fn apply_attribute(&mut self, name: &str, value: &str) -> Result<(), ModelError> {
        self.node.store_attribute(name, value)?;
        if name == "id" {
            self.id = value.to_string();
        }
        Ok(())
    }

    fn run(&mut self, ctx: &mut RunContext<'_>) -> ExecutionResult {
        let Some(buffer) = ctx.vars().find_buffer(&self.id) else {
            error!("download: no buffer {}", self.id);
            return ExecutionResult::Error;
        };
        let key = ctx
            .vars()
            .translate_var_name(&self.id)
            .unwrap_or_else(|| self.id.clone());
        match ctx.remote().and_then(|remote| remote.download_data(&key, buffer)) {
            Ok(id) => {
                info!("Buffer {} is on the device as {}", key, id);
                ExecutionResult::Ok
            }
            Err(e) => {
                error!("download {}: {}", key, e);
                ExecutionResult::Error
            }
        }
    }
}
