//! Host playback and recording
//!
//! Each session (playback, recording) runs on its own thread that owns the
//! `cpal` stream. Callers drive it with a small command protocol:
//!
//! ```text
//! None --spawn--> Created --Initialize--> Initialized --Run--> Running
//! Running --Stop/finished--> Initialized --Stop--> Created
//! any --ThreadStop--> (thread exits)
//! ```
//!
//! Every command is acknowledged on an "accepted" channel; the end of the
//! operation is reported on a separate "complete" channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;
use tracing::{debug, error, info, warn};

use super::buffer::{Buffer, SharedBuffer};
use super::device;
use super::error::AudioError;

/// Slack added to every completion wait
pub const COMPLETION_SLACK: Duration = Duration::from_millis(1000);

/// Time allowed for a session thread to accept a command
const ACCEPT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Completion budget for `frames` at `sample_rate`
pub fn completion_timeout(frames: usize, sample_rate: u32) -> Duration {
    let ms = frames as u64 * 1000 / sample_rate.max(1) as u64;
    Duration::from_millis(ms) + COMPLETION_SLACK
}

/// Host-side audio, as seen by input/output tasks
pub trait LocalAudio: Send + Sync {
    /// Begin playing `buffer`; `gain` is a percentage
    fn start_playback(&self, buffer: SharedBuffer, sample_rate: u32, gain: u32) -> Result<(), AudioError>;

    /// Block until playback ends; returns immediately if nothing is playing
    fn wait_for_playback_completion(&self, timeout: Duration) -> Result<(), AudioError>;

    fn stop_playback(&self);

    /// Begin recording `frames` frames
    fn start_recording(&self, stereo: bool, frames: usize, sample_rate: u32, gain: u32) -> Result<(), AudioError>;

    /// Block until the recording is complete and return it
    fn wait_for_recording_completion(&self, timeout: Duration) -> Result<Buffer, AudioError>;

    fn stop_recording(&self);
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    None,
    Created,
    Initialized,
    Running,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Playback,
    Recording,
}

enum Job {
    Play {
        buffer: SharedBuffer,
        sample_rate: u32,
        gain: u32,
    },
    Record {
        stereo: bool,
        frames: usize,
        sample_rate: u32,
        gain: u32,
    },
}

enum SessionCommand {
    Initialize(Job),
    Run,
    Stop,
    ThreadStop,
    /// Sent by the stream callback when the job has consumed/produced everything
    Finished,
}

type Completion = Result<Option<Buffer>, AudioError>;

/// Handle to one session thread
struct LocalSession {
    direction: Direction,
    commands: Sender<SessionCommand>,
    accepted: Mutex<Receiver<Result<(), AudioError>>>,
    complete: Mutex<Receiver<Completion>>,
    active: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl LocalSession {
    fn spawn(direction: Direction, device_name: Option<String>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (acc_tx, acc_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let finish_tx = cmd_tx.clone();

        let thread = std::thread::Builder::new()
            .name(format!("local-{:?}", direction).to_lowercase())
            .spawn(move || {
                let mut worker = SessionWorker {
                    direction,
                    device_name,
                    state: SessionState::Created,
                    stream: None,
                    pending: None,
                    recorded: None,
                    finish_tx,
                    done_tx,
                };
                worker.run(cmd_rx, acc_tx);
            })
            .map_err(|e| error!("Failed to spawn {:?} session thread: {}", direction, e))
            .ok();

        Self {
            direction,
            commands: cmd_tx,
            accepted: Mutex::new(acc_rx),
            complete: Mutex::new(done_rx),
            active: AtomicBool::new(false),
            thread: Mutex::new(thread),
        }
    }

    fn send(&self, cmd: SessionCommand) -> Result<(), AudioError> {
        let accepted = self.accepted.lock();
        self.commands
            .send(cmd)
            .map_err(|_| AudioError::SessionClosed)?;
        match accepted.recv_timeout(ACCEPT_TIMEOUT) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(AudioError::Timeout("command acceptance")),
            Err(RecvTimeoutError::Disconnected) => Err(AudioError::SessionClosed),
        }
    }

    fn start(&self, job: Job) -> Result<(), AudioError> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(AudioError::Busy);
        }
        // Drop completions left over from an operation that timed out
        while self.complete.lock().try_recv().is_ok() {}

        let result = self
            .send(SessionCommand::Initialize(job))
            .and_then(|_| self.send(SessionCommand::Run));
        if result.is_err() {
            self.active.store(false, Ordering::SeqCst);
            let _ = self.send(SessionCommand::Stop);
        }
        result
    }

    fn wait(&self, timeout: Duration) -> Completion {
        if !self.active.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let result = match self.complete.lock().recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!("{:?} did not complete within {:?}", self.direction, timeout);
                Err(AudioError::Timeout("local audio completion"))
            }
            Err(RecvTimeoutError::Disconnected) => Err(AudioError::SessionClosed),
        };
        let _ = self.send(SessionCommand::Stop);
        self.active.store(false, Ordering::SeqCst);
        result
    }

    fn stop(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.send(SessionCommand::Stop) {
            warn!("Failed to stop {:?}: {}", self.direction, e);
        }
    }
}

impl Drop for LocalSession {
    fn drop(&mut self) {
        let _ = self.commands.send(SessionCommand::ThreadStop);
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

/// State owned by a session thread
struct SessionWorker {
    direction: Direction,
    device_name: Option<String>,
    state: SessionState,
    stream: Option<Stream>,
    pending: Option<Job>,
    recorded: Option<RecordTarget>,
    finish_tx: Sender<SessionCommand>,
    done_tx: Sender<Completion>,
}

struct RecordTarget {
    consumer: ringbuf::HeapCons<i16>,
    stereo: bool,
    frames: usize,
}

impl SessionWorker {
    fn run(&mut self, commands: Receiver<SessionCommand>, accepted: Sender<Result<(), AudioError>>) {
        debug!("{:?} session thread started", self.direction);
        while let Ok(cmd) = commands.recv() {
            let ack = match cmd {
                SessionCommand::Initialize(job) => Some(self.initialize(job)),
                SessionCommand::Run => Some(self.start_stream()),
                SessionCommand::Stop => {
                    self.stop_stream();
                    Some(Ok(()))
                }
                SessionCommand::ThreadStop => {
                    self.stop_stream();
                    self.state = SessionState::None;
                    break;
                }
                SessionCommand::Finished => {
                    self.finish();
                    None
                }
            };
            if let Some(ack) = ack {
                if accepted.send(ack).is_err() {
                    break;
                }
            }
        }
        debug!("{:?} session thread exiting", self.direction);
    }

    fn initialize(&mut self, job: Job) -> Result<(), AudioError> {
        if self.state != SessionState::Created {
            self.stop_stream();
        }
        let stream = match (&job, self.direction) {
            (Job::Play { buffer, sample_rate, gain }, Direction::Playback) => {
                self.build_playback(buffer.clone(), *sample_rate, *gain)?
            }
            (
                Job::Record {
                    stereo,
                    frames,
                    sample_rate,
                    gain,
                },
                Direction::Recording,
            ) => self.build_recording(*stereo, *frames, *sample_rate, *gain)?,
            _ => return Err(AudioError::StreamError("job does not match session".into())),
        };
        self.stream = Some(stream);
        self.pending = Some(job);
        self.state = SessionState::Initialized;
        Ok(())
    }

    fn start_stream(&mut self) -> Result<(), AudioError> {
        if self.state != SessionState::Initialized {
            return Err(AudioError::StreamError(format!(
                "cannot run from state {:?}",
                self.state
            )));
        }
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| AudioError::StreamError("no stream".into()))?;
        stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        self.state = SessionState::Running;
        Ok(())
    }

    fn stop_stream(&mut self) {
        self.stream = None;
        self.pending = None;
        self.recorded = None;
        if self.state != SessionState::None {
            self.state = SessionState::Created;
        }
    }

    fn finish(&mut self) {
        if self.state != SessionState::Running {
            return;
        }
        // Release the device before handing the result over
        self.stream = None;
        let result = match self.recorded.take() {
            Some(mut target) => {
                let channels = if target.stereo { 2 } else { 1 };
                let mut samples = Vec::with_capacity(target.frames * channels);
                while let Some(s) = target.consumer.try_pop() {
                    samples.push(s);
                }
                samples.truncate(target.frames * channels);
                info!("Recorded {} frames", samples.len() / channels);
                Ok(Some(Buffer::from_samples(&samples, target.stereo)))
            }
            None => Ok(None),
        };
        self.pending = None;
        self.state = SessionState::Initialized;
        let _ = self.done_tx.send(result);
    }

    fn build_playback(&self, buffer: SharedBuffer, sample_rate: u32, gain: u32) -> Result<Stream, AudioError> {
        let device = device::output_device(self.device_name.as_deref())?;
        let channels: u16 = if buffer.is_stereo() { 2 } else { 1 };
        let config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        info!(
            "Playing {} frames on {}",
            buffer.samples(),
            device.name().unwrap_or_default()
        );

        let scale = gain as f32 / 100.0 / 32768.0;
        let samples = buffer.to_i16();
        let mut position = 0usize;
        let finish_tx = self.finish_tx.clone();
        let mut finished = false;

        device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for out in data.iter_mut() {
                        *out = match samples.get(position) {
                            Some(s) => *s as f32 * scale,
                            None => 0.0,
                        };
                        position += 1;
                    }
                    if position >= samples.len() && !finished {
                        finished = true;
                        let _ = finish_tx.send(SessionCommand::Finished);
                    }
                },
                |err| error!("Playback stream error: {:?}", err),
                None,
            )
            .map_err(|e| AudioError::StreamError(e.to_string()))
    }

    fn build_recording(
        &mut self,
        stereo: bool,
        frames: usize,
        sample_rate: u32,
        gain: u32,
    ) -> Result<Stream, AudioError> {
        let device = device::input_device(self.device_name.as_deref())?;
        let channels: u16 = if stereo { 2 } else { 1 };
        let config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        info!(
            "Recording {} frames on {}",
            frames,
            device.name().unwrap_or_default()
        );

        let total = frames * channels as usize;
        let (mut producer, consumer) = HeapRb::<i16>::new(total.max(1)).split();
        let scale = gain as f32 / 100.0 * 32767.0;
        let mut captured = 0usize;
        let finish_tx = self.finish_tx.clone();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if captured >= total {
                        return;
                    }
                    for &sample in data.iter().take(total - captured) {
                        let value = (sample.clamp(-1.0, 1.0) * scale) as i16;
                        if producer.try_push(value).is_err() {
                            break;
                        }
                        captured += 1;
                    }
                    if captured >= total {
                        let _ = finish_tx.send(SessionCommand::Finished);
                    }
                },
                |err| error!("Capture stream error: {:?}", err),
                None,
            )
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        self.recorded = Some(RecordTarget {
            consumer,
            stereo,
            frames,
        });
        Ok(stream)
    }
}

/// [`LocalAudio`] backed by the host's default audio API
pub struct CpalLocalAudio {
    playback: LocalSession,
    recording: LocalSession,
}

impl CpalLocalAudio {
    /// Spawn both session threads
    ///
    /// `None` selects the host default device.
    pub fn new(playback_device: Option<String>, recording_device: Option<String>) -> Self {
        Self {
            playback: LocalSession::spawn(Direction::Playback, playback_device),
            recording: LocalSession::spawn(Direction::Recording, recording_device),
        }
    }
}

impl LocalAudio for CpalLocalAudio {
    fn start_playback(&self, buffer: SharedBuffer, sample_rate: u32, gain: u32) -> Result<(), AudioError> {
        self.playback.start(Job::Play {
            buffer,
            sample_rate,
            gain,
        })
    }

    fn wait_for_playback_completion(&self, timeout: Duration) -> Result<(), AudioError> {
        self.playback.wait(timeout).map(|_| ())
    }

    fn stop_playback(&self) {
        self.playback.stop();
    }

    fn start_recording(&self, stereo: bool, frames: usize, sample_rate: u32, gain: u32) -> Result<(), AudioError> {
        self.recording.start(Job::Record {
            stereo,
            frames,
            sample_rate,
            gain,
        })
    }

    fn wait_for_recording_completion(&self, timeout: Duration) -> Result<Buffer, AudioError> {
        match self.recording.wait(timeout)? {
            Some(buffer) => Ok(buffer),
            None => Err(AudioError::StreamError("no recording in progress".into())),
        }
    }

    fn stop_recording(&self) {
        self.recording.stop();
    }
}

/// Shared handle used by the task environment
pub type SharedLocalAudio = Arc<dyn LocalAudio>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_timeout_includes_slack() {
        let timeout = completion_timeout(44100, 44100);
        assert_eq!(timeout, Duration::from_millis(2000));
    }

    #[test]
    fn test_wait_without_start_is_noop() {
        let audio = CpalLocalAudio::new(None, None);
        assert!(audio
            .wait_for_playback_completion(Duration::from_millis(10))
            .is_ok());
        audio.stop_playback();
        audio.stop_recording();
    }
}
