//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use audioqa::audio::{AudioError, Buffer, LocalAudio, SharedBuffer};
use audioqa::protocol::{Command, CommandKind, ReplyHeader, COMMAND_HEADER_SIZE};
use audioqa::remote::RemoteTimeouts;
use audioqa::{Environment, Settings};

/// Value of every sample the mock recorder produces
pub const RECORDED_LEVEL: i16 = 1000;

/// Host audio that records calls instead of touching hardware
#[derive(Default)]
pub struct MockAudio {
    calls: Mutex<Vec<String>>,
    recording: Mutex<Option<(bool, usize)>>,
}

impl MockAudio {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == name).count()
    }

    fn log(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

impl LocalAudio for MockAudio {
    fn start_playback(&self, _buffer: SharedBuffer, _sample_rate: u32, _gain: u32) -> Result<(), AudioError> {
        self.log("start_playback");
        Ok(())
    }

    fn wait_for_playback_completion(&self, _timeout: Duration) -> Result<(), AudioError> {
        self.log("wait_playback");
        Ok(())
    }

    fn stop_playback(&self) {
        self.log("stop_playback");
    }

    fn start_recording(&self, stereo: bool, frames: usize, _sample_rate: u32, _gain: u32) -> Result<(), AudioError> {
        self.log("start_recording");
        *self.recording.lock().unwrap() = Some((stereo, frames));
        Ok(())
    }

    fn wait_for_recording_completion(&self, _timeout: Duration) -> Result<Buffer, AudioError> {
        self.log("wait_recording");
        let (stereo, frames) = self
            .recording
            .lock()
            .unwrap()
            .take()
            .ok_or(AudioError::SessionClosed)?;
        let channels = if stereo { 2 } else { 1 };
        Ok(Buffer::from_samples(&vec![RECORDED_LEVEL; frames * channels], stereo))
    }

    fn stop_recording(&self) {
        self.log("stop_recording");
    }
}

/// Settings pointing at `port` with a small sampling rate to keep buffers short
pub fn test_settings(port: u16) -> Settings {
    Settings {
        remote_port: port,
        sampling_rate: 8000,
        forward_port: false,
        ..Settings::default()
    }
}

pub fn short_timeouts() -> RemoteTimeouts {
    RemoteTimeouts {
        connect: Duration::from_millis(1000),
        ack: Duration::from_millis(300),
        download_base: Duration::from_millis(1000),
        download_bytes_per_ms: 100,
        completion_slack: Duration::from_millis(500),
    }
}

/// Environment with a mock recorder writing into `dir`
pub fn test_env(dir: &Path, port: u16) -> (Environment, Arc<MockAudio>) {
    let audio = Arc::new(MockAudio::default());
    let env = Environment::new(test_settings(port), audio.clone(), dir)
        .with_base_dir(dir)
        .with_remote_timeouts(short_timeouts());
    (env, audio)
}

/// What the scripted device does with one command
pub enum Response {
    Reply {
        kind: CommandKind,
        status: u32,
        payload: Vec<u8>,
    },
    /// Raw bytes written as-is
    Raw(Vec<u8>),
}

impl Response {
    pub fn ok(kind: CommandKind) -> Response {
        Response::Reply {
            kind,
            status: 0,
            payload: Vec::new(),
        }
    }
}

/// Answer everything successfully and at once
pub fn ack_all(cmd: &Command) -> Vec<Response> {
    match cmd {
        Command::StartRecording {
            stereo, samples, ..
        } => {
            let frame = if *stereo { 4 } else { 2 };
            vec![Response::Reply {
                kind: CommandKind::StartRecording,
                status: 0,
                payload: vec![0x10; *samples as usize * frame],
            }]
        }
        Command::GetDeviceInfo => vec![Response::Reply {
            kind: CommandKind::GetDeviceInfo,
            status: 0,
            payload: b"scripted device".to_vec(),
        }],
        other => vec![Response::ok(other.kind())],
    }
}

/// In-process device on `127.0.0.1:0`
pub struct ScriptedDevice {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<CommandKind>>>,
    connections: Arc<Mutex<usize>>,
}

impl ScriptedDevice {
    /// Serve connections one after another, answering with `handler`
    pub fn spawn<F>(handler: F) -> ScriptedDevice
    where
        F: FnMut(&Command) -> Vec<Response> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(Mutex::new(0));

        let log = received.clone();
        let count = connections.clone();
        thread::spawn(move || {
            let mut handler = handler;
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                *count.lock().unwrap() += 1;
                serve(stream, &log, &mut handler);
            }
        });

        ScriptedDevice {
            addr,
            received,
            connections,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn received(&self) -> Vec<CommandKind> {
        self.received.lock().unwrap().clone()
    }

    pub fn count(&self, kind: CommandKind) -> usize {
        self.received().iter().filter(|k| **k == kind).count()
    }

    pub fn connections(&self) -> usize {
        *self.connections.lock().unwrap()
    }
}

fn serve<F>(mut stream: TcpStream, log: &Mutex<Vec<CommandKind>>, handler: &mut F)
where
    F: FnMut(&Command) -> Vec<Response>,
{
    let mut header = [0u8; COMMAND_HEADER_SIZE];
    loop {
        if stream.read_exact(&mut header).is_err() {
            return;
        }
        let Ok((kind, len)) = Command::parse_header(&header) else {
            return;
        };
        let mut payload = vec![0u8; len as usize];
        if stream.read_exact(&mut payload).is_err() {
            return;
        }
        let Ok(cmd) = Command::from_payload(kind, &payload) else {
            return;
        };
        log.lock().unwrap().push(kind);

        for response in handler(&cmd) {
            let bytes = match response {
                Response::Reply {
                    kind,
                    status,
                    payload,
                } => {
                    let mut bytes = ReplyHeader::new(kind, status, payload.len() as u32)
                        .to_bytes()
                        .to_vec();
                    bytes.extend_from_slice(&payload);
                    bytes
                }
                Response::Raw(bytes) => bytes,
            };
            if stream.write_all(&bytes).is_err() {
                return;
            }
        }
    }
}

/// Poll `cond` for up to a second
pub fn eventually(cond: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}
