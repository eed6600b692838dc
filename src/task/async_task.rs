//! Start/complete split shared by `input` and `output`
//!
//! `run` starts the operation. Unless `sync="start"` is given, it then
//! completes it immediately; otherwise completion is deferred to the end of the
//! enclosing sequential's iteration.

use std::fmt;

use crate::model::ModelError;

use super::context::RunContext;
use super::node::{parse_int, Task, TaskType};
use super::result::ExecutionResult;

/// Where audio is played or recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Host,
    Dut,
}

impl Device {
    pub fn parse(value: &str) -> Option<Device> {
        if value.eq_ignore_ascii_case("host") {
            Some(Device::Host)
        } else if value.eq_ignore_ascii_case("dut") {
            Some(Device::Dut)
        } else {
            None
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Host => f.write_str("host"),
            Device::Dut => f.write_str("DUT"),
        }
    }
}

/// Parsed common attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncOptions {
    /// `sync="start"`: only start in `run`
    pub deferred: bool,
    pub device: Device,
    /// Percent, 0..=100
    pub gain: u32,
    pub mode: u32,
}

impl Default for AsyncOptions {
    fn default() -> Self {
        Self {
            deferred: false,
            device: Device::Host,
            gain: 100,
            mode: 0,
        }
    }
}

impl AsyncOptions {
    /// Apply a common attribute; `Ok(false)` if `name` is not one of them
    pub fn apply(&mut self, task_type: TaskType, name: &str, value: &str) -> Result<bool, ModelError> {
        let invalid = |reason: &str| ModelError::InvalidAttribute {
            element: task_type.tag().to_string(),
            attribute: name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };
        match name {
            "sync" => self.deferred = value.trim() == "start",
            "device" => self.device = Device::parse(value.trim()).ok_or_else(|| invalid("expected host or DUT"))?,
            "gain" => {
                let gain: u32 = parse_int(task_type, name, value)?;
                if gain > 100 {
                    return Err(invalid("gain is a percentage, 0..100"));
                }
                self.gain = gain;
            }
            "mode" => self.mode = parse_int(task_type, name, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

/// A task whose work is split into start and completion
pub trait AsyncTask: Task {
    fn options(&self) -> &AsyncOptions;

    fn start(&mut self, ctx: &mut RunContext<'_>) -> ExecutionResult;

    fn finish(&mut self, ctx: &mut RunContext<'_>) -> ExecutionResult;
}

/// `run` for async tasks
pub fn run_async<T: AsyncTask + ?Sized>(task: &mut T, ctx: &mut RunContext<'_>) -> ExecutionResult {
    let result = task.start(ctx);
    if !result.is_ok() {
        return result;
    }
    if task.options().deferred && ctx.queue_async(task.node().id()) {
        return ExecutionResult::Ok;
    }
    task.finish(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_parse() {
        assert_eq!(Device::parse("host"), Some(Device::Host));
        assert_eq!(Device::parse("DUT"), Some(Device::Dut));
        assert_eq!(Device::parse("dut"), Some(Device::Dut));
        assert_eq!(Device::parse("phone"), None);
    }

    #[test]
    fn test_options_apply() {
        let mut opts = AsyncOptions::default();
        assert!(opts.apply(TaskType::Input, "sync", "start").unwrap());
        assert!(opts.apply(TaskType::Input, "device", "DUT").unwrap());
        assert!(opts.apply(TaskType::Input, "gain", "50").unwrap());
        assert!(opts.apply(TaskType::Input, "mode", "1").unwrap());
        assert!(!opts.apply(TaskType::Input, "id", "rec").unwrap());
        assert_eq!(
            opts,
            AsyncOptions {
                deferred: true,
                device: Device::Dut,
                gain: 50,
                mode: 1,
            }
        );

        assert!(opts.apply(TaskType::Input, "gain", "101").is_err());
        assert!(opts.apply(TaskType::Input, "device", "phone").is_err());
    }
}
