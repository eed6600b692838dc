//! `output` task: play a buffer

use tracing::{debug, error, info};

use crate::audio::{completion_timeout, SharedBuffer};
use crate::model::ModelError;

use super::async_task::{run_async, AsyncOptions, AsyncTask, Device};
use super::context::RunContext;
use super::node::{parse_int, Task, TaskNode, TaskType};
use super::result::ExecutionResult;

const ATTRIBUTES: &[&str] = &["id", "waitforcompletion", "sync", "device", "gain", "mode"];

pub struct TaskOutput {
    node: TaskNode,
    options: AsyncOptions,
    id: String,
    wait_for_completion: bool,
    /// Buffer being played, kept until completion
    playing: Option<SharedBuffer>,
}

impl TaskOutput {
    pub fn new() -> Self {
        Self {
            node: TaskNode::new(TaskType::Output, ATTRIBUTES),
            options: AsyncOptions::default(),
            id: String::new(),
            wait_for_completion: false,
            playing: None,
        }
    }

    fn start_host(&self, ctx: &RunContext<'_>, buffer: SharedBuffer) -> Result<(), String> {
        let local = ctx.env.local();
        // A playback left running by an earlier output without wait
        local.stop_playback();
        local
            .start_playback(buffer, ctx.env.sampling_rate(), self.options.gain)
            .map_err(|e| e.to_string())
    }

    fn start_dut(&self, ctx: &mut RunContext<'_>, buffer: SharedBuffer) -> Result<(), String> {
        let rate = ctx.env.sampling_rate();
        let key = ctx
            .vars()
            .translate_var_name(&self.id)
            .unwrap_or_else(|| self.id.clone());
        let remote = ctx.remote().map_err(|e| e.to_string())?;
        let id = remote.download_data(&key, buffer).map_err(|e| e.to_string())?;
        remote.stop_playback().map_err(|e| e.to_string())?;
        remote
            .start_playback(id, rate, self.options.mode, self.options.gain, 1)
            .map_err(|e| e.to_string())
    }
}

impl Default for TaskOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for TaskOutput {
    fn node(&self) -> &TaskNode {
        &self.node
    }

    fn node_mut(&mut self) -> &mut TaskNode {
        &mut self.node
    }

    fn apply_attribute(&mut self, name: &str, value: &str) -> Result<(), ModelError> {
        self.node.store_attribute(name, value)?;
        if self.options.apply(TaskType::Output, name, value)? {
            return Ok(());
        }
        match name {
            "id" => self.id = value.to_string(),
            "waitforcompletion" => {
                self.wait_for_completion = parse_int::<u32>(TaskType::Output, name, value)? != 0
            }
            _ => {}
        }
        Ok(())
    }

    fn run(&mut self, ctx: &mut RunContext<'_>) -> ExecutionResult {
        run_async(self, ctx)
    }

    fn complete(&mut self, ctx: &mut RunContext<'_>) -> ExecutionResult {
        self.finish(ctx)
    }
}

impl AsyncTask for TaskOutput {
    fn options(&self) -> &AsyncOptions {
        &self.options
    }

    fn start(&mut self, ctx: &mut RunContext<'_>) -> ExecutionResult {
        let Some(buffer) = ctx.vars().find_buffer(&self.id) else {
            error!("output: no buffer {}", self.id);
            return ExecutionResult::Error;
        };
        info!(
            "Playing {} ({} frames) on {}",
            self.id,
            buffer.samples(),
            self.options.device
        );

        let started = match self.options.device {
            Device::Host => self.start_host(ctx, buffer.clone()),
            Device::Dut => self.start_dut(ctx, buffer.clone()),
        };
        match started {
            Ok(()) => {
                self.playing = Some(buffer);
                ExecutionResult::Ok
            }
            Err(e) => {
                error!("output {}: cannot start playback: {}", self.id, e);
                ExecutionResult::Error
            }
        }
    }

    fn finish(&mut self, ctx: &mut RunContext<'_>) -> ExecutionResult {
        let Some(buffer) = self.playing.take() else {
            return ExecutionResult::Ok;
        };
        if !self.wait_for_completion && !self.options.deferred {
            debug!("Not waiting for {} to finish", self.id);
            return ExecutionResult::Ok;
        }

        let waited = match self.options.device {
            Device::Host => ctx
                .env
                .local()
                .wait_for_playback_completion(completion_timeout(buffer.samples(), ctx.env.sampling_rate()))
                .map_err(|e| e.to_string()),
            Device::Dut => ctx
                .remote()
                .and_then(|remote| remote.wait_for_playback_completion())
                .map_err(|e| e.to_string()),
        };
        match waited {
            Ok(()) => {
                debug!("Playback of {} complete", self.id);
                ExecutionResult::Ok
            }
            Err(e) => {
                error!("output {}: playback failed: {}", self.id, e);
                ExecutionResult::Error
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes() {
        let mut task = TaskOutput::new();
        task.apply_attribute("id", "tone").unwrap();
        task.apply_attribute("waitforcompletion", "1").unwrap();
        task.apply_attribute("sync", "start").unwrap();
        assert!(task.wait_for_completion);
        assert!(task.options.deferred);
        assert_eq!(task.options.device, Device::Host);

        assert!(task.apply_attribute("waitforcompletion", "yes").is_err());
        assert!(task.apply_attribute("time", "100").is_err());
    }
}
