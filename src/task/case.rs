//! `case` task: setup, action, save, report

use tracing::{error, info, warn};

use crate::model::ModelError;

use super::context::{CaseState, RunContext};
use super::node::{Task, TaskNode, TaskType};
use super::result::ExecutionResult;

pub struct TaskCase {
    node: TaskNode,
    state: CaseState,
}

impl TaskCase {
    pub fn new() -> Self {
        Self {
            node: TaskNode::new(TaskType::Case, &["name", "version", "description"]),
            state: CaseState::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.node.attribute("name").unwrap_or("unnamed")
    }

    /// Variables left by the last run
    pub fn state(&self) -> &CaseState {
        &self.state
    }
}

impl Default for TaskCase {
    fn default() -> Self {
        Self::new()
    }
}

fn run_stage(node: &mut TaskNode, stage: TaskType, ctx: &mut RunContext<'_>) -> Option<ExecutionResult> {
    node.child_mut(stage).map(|task| task.run(ctx))
}

impl Task for TaskCase {
    fn node(&self) -> &TaskNode {
        &self.node
    }

    fn node_mut(&mut self) -> &mut TaskNode {
        &mut self.node
    }

    fn apply_attribute(&mut self, name: &str, value: &str) -> Result<(), ModelError> {
        self.node.store_attribute(name, value)
    }

    /// The case passes only when `action` yields `Pass` and `save` succeeds.
    /// The returned result is the first non-OK one, favoring `action`.
    fn run(&mut self, ctx: &mut RunContext<'_>) -> ExecutionResult {
        let TaskCase { node, state } = self;
        let name = node.attribute("name").unwrap_or("unnamed").to_string();
        info!("Case {} started", name);

        *state = CaseState::new();
        let env = ctx.env;
        let mut inner = RunContext::new(env, state);

        let setup = run_stage(node, TaskType::Setup, &mut inner).unwrap_or_default();
        let (passed, result) = if !setup.is_ok() {
            error!("Case {}: setup returned {}", name, setup);
            (false, setup)
        } else {
            let action = run_stage(node, TaskType::Action, &mut inner).unwrap_or(ExecutionResult::Error);
            let mut passed = action == ExecutionResult::Pass;
            if !passed {
                warn!("Case {}: action returned {}", name, action);
            }
            let mut result = action;
            if let Some(save) = run_stage(node, TaskType::Save, &mut inner) {
                if !save.is_ok() {
                    error!("Case {}: save returned {}", name, save);
                    passed = false;
                    if result.is_ok() {
                        result = save;
                    }
                }
            }
            (passed, result)
        };

        env.report().add_case(&name, passed, inner.case.details());

        env.local().stop_playback();
        env.local().stop_recording();
        inner.case.release_remote();
        result
    }
}
