//! `input` task: record into a buffer

use tracing::{debug, error, info};

use crate::audio::{completion_timeout, signal};
use crate::model::ModelError;

use super::async_task::{run_async, AsyncOptions, AsyncTask, Device};
use super::context::RunContext;
use super::node::{parse_int, Task, TaskNode, TaskType};
use super::result::ExecutionResult;

const ATTRIBUTES: &[&str] = &["id", "time", "sync", "device", "gain", "mode"];

pub struct TaskInput {
    node: TaskNode,
    options: AsyncOptions,
    id: String,
    time_ms: u32,
    /// Frames of the recording in progress
    pending: Option<usize>,
}

impl TaskInput {
    pub fn new() -> Self {
        Self {
            node: TaskNode::new(TaskType::Input, ATTRIBUTES),
            options: AsyncOptions::default(),
            id: String::new(),
            time_ms: 0,
            pending: None,
        }
    }

    /// DUT recordings are mono unless mode bit 0 asks for stereo
    fn stereo(&self) -> bool {
        match self.options.device {
            Device::Host => true,
            Device::Dut => self.options.mode & 1 != 0,
        }
    }
}

impl Default for TaskInput {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for TaskInput {
    fn node(&self) -> &TaskNode {
        &self.node
    }

    fn node_mut(&mut self) -> &mut TaskNode {
        &mut self.node
    }

    fn apply_attribute(&mut self, name: &str, value: &str) -> Result<(), ModelError> {
        self.node.store_attribute(name, value)?;
        if self.options.apply(TaskType::Input, name, value)? {
            return Ok(());
        }
        match name {
            "id" => self.id = value.to_string(),
            "time" => self.time_ms = parse_int(TaskType::Input, name, value)?,
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

impl AsyncTask for TaskInput {
    fn options(&self) -> &AsyncOptions {
        &self.options
    }

    fn start(&mut self, ctx: &mut RunContext<'_>) -> ExecutionResult {
        let rate = ctx.env.sampling_rate();
        let frames = signal::frames_for(self.time_ms, rate);
        let stereo = self.stereo();
        info!(
            "Recording {} ms into {} on {}",
            self.time_ms, self.id, self.options.device
        );

        let started = match self.options.device {
            Device::Host => ctx
                .env
                .local()
                .start_recording(stereo, frames, rate, self.options.gain)
                .map_err(|e| e.to_string()),
            Device::Dut => ctx
                .remote()
                .and_then(|remote| {
                    remote.start_recording(stereo, rate, self.options.mode, self.options.gain, frames as u32)
                })
                .map_err(|e| e.to_string()),
        };
        match started {
            Ok(()) => {
                self.pending = Some(frames);
                ExecutionResult::Ok
            }
            Err(e) => {
                error!("input {}: cannot start recording: {}", self.id, e);
                ExecutionResult::Error
            }
        }
    }

    fn finish(&mut self, ctx: &mut RunContext<'_>) -> ExecutionResult {
        let Some(frames) = self.pending.take() else {
            return ExecutionResult::Ok;
        };
        let rate = ctx.env.sampling_rate();

        let recorded = match self.options.device {
            Device::Host => ctx
                .env
                .local()
                .wait_for_recording_completion(completion_timeout(frames, rate))
                .map_err(|e| e.to_string()),
            Device::Dut => ctx
                .remote()
                .and_then(|remote| remote.wait_for_recording_completion())
                .map_err(|e| e.to_string())
                .and_then(|buffer| buffer.ok_or_else(|| "no recording in progress".to_string())),
        };
        let buffer = match recorded {
            Ok(buffer) => buffer,
            Err(e) => {
                error!("input {}: recording failed: {}", self.id, e);
                return ExecutionResult::Error;
            }
        };

        debug!("Recorded {} frames into {}", buffer.samples(), self.id);
        if !ctx.vars_mut().set_buffer(&self.id, buffer.into_shared()) {
            error!("input: cannot store buffer {}", self.id);
            return ExecutionResult::Error;
        }
        ExecutionResult::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes() {
        let mut task = TaskInput::new();
        task.apply_attribute("id", "rec_$i").unwrap();
        task.apply_attribute("time", "500").unwrap();
        task.apply_attribute("device", "DUT").unwrap();
        assert_eq!(task.time_ms, 500);
        assert!(!task.stereo());

        task.apply_attribute("mode", "1").unwrap();
        assert!(task.stereo());

        assert!(task.apply_attribute("time", "-1").is_err());
        assert!(task.apply_attribute("waitforcompletion", "1").is_err());
    }
}
