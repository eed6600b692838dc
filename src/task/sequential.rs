//! `sequential` task: bounded repeat loop

use tracing::{debug, trace};

use crate::model::ModelError;

use super::context::RunContext;
use super::node::{parse_int, Task, TaskNode, TaskType};
use super::result::ExecutionResult;

pub struct TaskSequential {
    node: TaskNode,
    repeat: u32,
    index: Option<String>,
}

impl TaskSequential {
    pub fn new() -> Self {
        Self {
            node: TaskNode::new(TaskType::Sequential, &["repeat", "index"]),
            repeat: 1,
            index: None,
        }
    }

    pub fn repeat(&self) -> u32 {
        self.repeat
    }

    fn set_index(&self, ctx: &mut RunContext<'_>, value: u32) {
        if let Some(index) = &self.index {
            ctx.vars_mut().set_index(index, value as i64);
        }
    }

    /// Run one iteration, then complete what it deferred
    fn iterate(&mut self, ctx: &mut RunContext<'_>) -> ExecutionResult {
        ctx.push_async_scope();
        let mut first = ExecutionResult::Ok;
        for child in self.node.children_mut() {
            let result = child.run(ctx);
            if !result.is_ok() {
                first = result;
                break;
            }
        }

        let queued = ctx.pop_async_scope();
        for id in queued {
            let Some(task) = self.node.find_mut(id) else {
                continue;
            };
            trace!("Completing deferred {} {}", task.task_type(), id);
            let result = task.complete(ctx);
            if first.is_ok() && !result.is_ok() {
                first = result;
            }
        }
        first
    }
}

impl Default for TaskSequential {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for TaskSequential {
    fn node(&self) -> &TaskNode {
        &self.node
    }

    fn node_mut(&mut self) -> &mut TaskNode {
        &mut self.node
    }

    fn apply_attribute(&mut self, name: &str, value: &str) -> Result<(), ModelError> {
        self.node.store_attribute(name, value)?;
        match name {
            "repeat" => self.repeat = parse_int(TaskType::Sequential, name, value)?,
            "index" => {
                let index = value.trim();
                if index.is_empty() || !index.chars().all(|c| c.is_ascii_alphanumeric()) {
                    return Err(ModelError::InvalidAttribute {
                        element: TaskType::Sequential.tag().to_string(),
                        attribute: name.to_string(),
                        value: value.to_string(),
                        reason: "index names are alphanumeric".to_string(),
                    });
                }
                self.index = Some(index.to_string());
            }
            _ => {}
        }
        Ok(())
    }

    /// `BreakOneLoop` ends this whole loop as a success; `Error`, `Fail` and
    /// `Pass` end it and propagate, leaving the index at the repeat count.
    fn run(&mut self, ctx: &mut RunContext<'_>) -> ExecutionResult {
        let mut i = 0;
        while i < self.repeat {
            self.set_index(ctx, i);
            trace!("sequential iteration {}/{}", i + 1, self.repeat);
            match self.iterate(ctx) {
                ExecutionResult::Ok | ExecutionResult::Continue => {}
                ExecutionResult::BreakOneLoop => {
                    debug!("sequential: break at iteration {}", i);
                    return ExecutionResult::Ok;
                }
                result => {
                    i = self.repeat;
                    self.set_index(ctx, i);
                    return result;
                }
            }
            i += 1;
        }
        self.set_index(ctx, self.repeat);
        ExecutionResult::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes() {
        let mut task = TaskSequential::new();
        assert_eq!(task.repeat(), 1);
        task.apply_attribute("repeat", "5").unwrap();
        task.apply_attribute("index", "i").unwrap();
        assert_eq!(task.repeat(), 5);
        assert_eq!(task.index.as_deref(), Some("i"));

        assert!(task.apply_attribute("index", "a_b").is_err());
        assert!(task.apply_attribute("repeat", "-2").is_err());
    }
}
