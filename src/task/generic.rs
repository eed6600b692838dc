//! Plain containers: `setup` and `action`

use super::node::{Task, TaskNode, TaskType};

/// Runs its children in order, stopping at the first non-OK result
pub struct TaskGeneric {
    node: TaskNode,
}

impl TaskGeneric {
    pub fn new(task_type: TaskType) -> Self {
        Self {
            node: TaskNode::new(task_type, &[]),
        }
    }
}

impl Task for TaskGeneric {
    fn node(&self) -> &TaskNode {
        &self.node
    }

    fn node_mut(&mut self) -> &mut TaskNode {
        &mut self.node
    }
}
