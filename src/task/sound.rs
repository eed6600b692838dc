//! `sound` task: generate or load a buffer

use tracing::{error, info};

use crate::audio::{signal, Buffer};
use crate::model::ModelError;

use super::context::RunContext;
use super::node::{Task, TaskNode, TaskType};
use super::result::ExecutionResult;

/// Parsed `type` attribute
#[derive(Debug, Clone, PartialEq)]
pub enum SoundSource {
    File(String),
    Sine {
        amplitude: i16,
        freq_hz: f64,
        duration_ms: u32,
    },
    Random {
        amplitude: i16,
        duration_ms: u32,
    },
}

impl SoundSource {
    /// `file:<path>`, `sin:<amp>:<freq>:<ms>` or `random:<amp>:<ms>`
    pub fn parse(value: &str) -> Option<SoundSource> {
        let (kind, rest) = value.split_once(':')?;
        match kind {
            "file" if !rest.is_empty() => Some(SoundSource::File(rest.to_string())),
            "sin" => {
                let mut parts = rest.split(':');
                let amplitude = parts.next()?.trim().parse().ok()?;
                let freq_hz = parts.next()?.trim().parse().ok()?;
                let duration_ms = parts.next()?.trim().parse().ok()?;
                parts.next().is_none().then_some(SoundSource::Sine {
                    amplitude,
                    freq_hz,
                    duration_ms,
                })
            }
            "random" => {
                let (amplitude, duration_ms) = rest.split_once(':')?;
                Some(SoundSource::Random {
                    amplitude: amplitude.trim().parse().ok()?,
                    duration_ms: duration_ms.trim().parse().ok()?,
                })
            }
            _ => None,
        }
    }
}

pub struct TaskSound {
    node: TaskNode,
    id: String,
    source: Option<SoundSource>,
    preload: bool,
}

impl TaskSound {
    pub fn new() -> Self {
        Self {
            node: TaskNode::new(TaskType::Sound, &["id", "type", "preload"]),
            id: String::new(),
            source: None,
            preload: false,
        }
    }

    fn build(&self, ctx: &RunContext<'_>) -> Result<Buffer, String> {
        let rate = ctx.env.sampling_rate();
        match &self.source {
            Some(SoundSource::File(path)) => {
                Buffer::load(ctx.env.resolve(path)).map_err(|e| e.to_string())
            }
            Some(SoundSource::Sine {
                amplitude,
                freq_hz,
                duration_ms,
            }) => Ok(signal::sine(*amplitude, *freq_hz, *duration_ms, rate, true)),
            Some(SoundSource::Random {
                amplitude,
                duration_ms,
            }) => Ok(signal::random(*amplitude, *duration_ms, rate, true)),
            None => Err("no type given".to_string()),
        }
    }
}

impl Default for TaskSound {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for TaskSound {
    fn node(&self) -> &TaskNode {
        &self.node
    }

    fn node_mut(&mut self) -> &mut TaskNode {
        &mut self.node
    }

    fn apply_attribute(&mut self, name: &str, value: &str) -> Result<(), ModelError> {
        self.node.store_attribute(name, value)?;
        match name {
            "id" => self.id = value.to_string(),
            "type" => {
                self.source = Some(SoundSource::parse(value).ok_or_else(|| {
                    ModelError::InvalidAttribute {
                        element: TaskType::Sound.tag().to_string(),
                        attribute: name.to_string(),
                        value: value.to_string(),
                        reason: "expected file:<path>, sin:<amp>:<freq>:<ms> or random:<amp>:<ms>"
                            .to_string(),
                    }
                })?)
            }
            "preload" => self.preload = value.trim() == "1",
            _ => {}
        }
        Ok(())
    }

    fn run(&mut self, ctx: &mut RunContext<'_>) -> ExecutionResult {
        let buffer = match self.build(ctx) {
            Ok(buffer) => buffer.into_shared(),
            Err(e) => {
                error!("sound {}: {}", self.id, e);
                return ExecutionResult::Error;
            }
        };
        info!("Sound {}: {} frames", self.id, buffer.samples());

        if !ctx.vars_mut().register_buffer(&self.id, buffer.clone()) {
            error!("sound: buffer {} already defined", self.id);
            return ExecutionResult::Error;
        }

        if self.preload {
            let downloaded = ctx
                .remote()
                .and_then(|remote| remote.download_data(&self.id, buffer));
            if let Err(e) = downloaded {
                error!("sound {}: preload failed: {}", self.id, e);
                return ExecutionResult::Error;
            }
        }
        ExecutionResult::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sources() {
        assert_eq!(
            SoundSource::parse("sin:1000:1000:100"),
            Some(SoundSource::Sine {
                amplitude: 1000,
                freq_hz: 1000.0,
                duration_ms: 100,
            })
        );
        assert_eq!(
            SoundSource::parse("random:2000:50"),
            Some(SoundSource::Random {
                amplitude: 2000,
                duration_ms: 50,
            })
        );
        assert_eq!(
            SoundSource::parse("file:data/tone.r2s"),
            Some(SoundSource::File("data/tone.r2s".to_string()))
        );
        assert_eq!(SoundSource::parse("sin:1000:1000"), None);
        assert_eq!(SoundSource::parse("sin:1000:1000:100:1"), None);
        assert_eq!(SoundSource::parse("square:1:2"), None);
        assert_eq!(SoundSource::parse("file:"), None);
    }

    #[test]
    fn test_bad_type_rejected() {
        let mut task = TaskSound::new();
        assert!(task.apply_attribute("type", "sin:loud").is_err());
        assert!(task.apply_attribute("type", "random:10:10").is_ok());
    }
}
