//! `save` task: persist matching buffers and report matching values

use regex::Regex;
use tracing::{error, info, warn};

use crate::model::ModelError;

use super::context::RunContext;
use super::node::{Task, TaskNode, TaskType};
use super::result::ExecutionResult;

pub struct TaskSave {
    node: TaskNode,
    files: Vec<Regex>,
    reports: Vec<Regex>,
}

/// Compile a comma separated list of patterns
fn parse_patterns(name: &str, value: &str) -> Result<Vec<Regex>, ModelError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            Regex::new(p).map_err(|e| ModelError::InvalidAttribute {
                element: TaskType::Save.tag().to_string(),
                attribute: name.to_string(),
                value: p.to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}

impl TaskSave {
    pub fn new() -> Self {
        Self {
            node: TaskNode::new(TaskType::Save, &["file", "report"]),
            files: Vec::new(),
            reports: Vec::new(),
        }
    }

    fn save_buffers(&self, ctx: &RunContext<'_>) -> bool {
        let mut ok = true;
        for pattern in &self.files {
            let matched = ctx.vars().find_buffers(pattern);
            if matched.is_empty() {
                warn!("save: no buffer matches {}", pattern);
            }
            for (name, buffer) in matched {
                match buffer.save(ctx.env.output_dir().join(&name)) {
                    Ok(path) => info!("Saved {} to {:?}", name, path),
                    Err(e) => {
                        error!("save: cannot write {}: {}", name, e);
                        ok = false;
                    }
                }
            }
        }
        ok
    }

    fn report_values(&self, ctx: &mut RunContext<'_>) {
        for pattern in &self.reports {
            let matched = ctx.vars().find_values(pattern);
            if matched.is_empty() {
                warn!("save: no value matches {}", pattern);
            }
            for (name, value) in matched {
                info!("{} = {}", name, value);
                ctx.case.append_details(&format!("{}={}", name, value));
            }
        }
    }
}

impl Default for TaskSave {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for TaskSave {
    fn node(&self) -> &TaskNode {
        &self.node
    }

    fn node_mut(&mut self) -> &mut TaskNode {
        &mut self.node
    }

    fn apply_attribute(&mut self, name: &str, value: &str) -> Result<(), ModelError> {
        self.node.store_attribute(name, value)?;
        match name {
            "file" => self.files = parse_patterns(name, value)?,
            "report" => self.reports = parse_patterns(name, value)?,
            _ => {}
        }
        Ok(())
    }

    fn run(&mut self, ctx: &mut RunContext<'_>) -> ExecutionResult {
        self.report_values(ctx);
        if self.save_buffers(ctx) {
            ExecutionResult::Ok
        } else {
            ExecutionResult::Error
        }
    }
}
