//! Process-scoped run environment
//!
//! Built once by the driver and shared by reference with every task.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use crate::audio::SharedLocalAudio;
use crate::remote::{RemoteAudio, RemoteError, RemoteTimeouts};
use crate::report::Report;
use crate::settings::Settings;

use super::script::ScriptRunner;

pub struct Environment {
    settings: Settings,
    report: Mutex<Report>,
    local: SharedLocalAudio,
    scripts: ScriptRunner,
    output_dir: PathBuf,
    base_dir: PathBuf,
    remote_timeouts: RemoteTimeouts,
}

impl Environment {
    /// `output_dir` receives saved buffers and script scratch files
    pub fn new(settings: Settings, local: SharedLocalAudio, output_dir: impl Into<PathBuf>) -> Self {
        let scripts = ScriptRunner::new(settings.python.clone(), settings.script_dir.clone());
        Self {
            settings,
            report: Mutex::new(Report::new()),
            local,
            scripts,
            output_dir: output_dir.into(),
            base_dir: PathBuf::from("."),
            remote_timeouts: RemoteTimeouts::default(),
        }
    }

    /// Directory relative `file:` sounds are resolved against
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn with_remote_timeouts(mut self, timeouts: RemoteTimeouts) -> Self {
        self.remote_timeouts = timeouts;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn sampling_rate(&self) -> u32 {
        self.settings.sampling_rate
    }

    pub fn report(&self) -> MutexGuard<'_, Report> {
        self.report.lock()
    }

    pub fn local(&self) -> &SharedLocalAudio {
        &self.local
    }

    pub fn scripts(&self) -> &ScriptRunner {
        &self.scripts
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve a path from the test description
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Open a new connection to the device
    pub fn connect_remote(&self) -> Result<RemoteAudio, RemoteError> {
        let target = format!("{}:{}", self.settings.remote_host, self.settings.remote_port);
        let peer: SocketAddr = target
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| RemoteError::ConnectTimeout(target.clone()))?;
        debug!("Connecting to device at {}", peer);
        RemoteAudio::connect(peer, self.remote_timeouts.clone())
    }
}
