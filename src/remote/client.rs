//! Remote audio client
//!
//! One dedicated thread per connection runs a single-threaded tokio runtime
//! that owns the socket. Callers post encoded commands to it over a channel
//! and block, with a timeout, on the reply channel of that command's slot.
//!
//! A write that fails or outlives its budget breaks the connection, since
//! the device would see a truncated frame. Dropping the client interrupts
//! any write still in progress.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc as tokio_mpsc, Notify};
use tracing::{debug, error, info, trace, warn};

use crate::audio::{Buffer, SharedBuffer, BYTES_PER_SAMPLE};
use crate::protocol::{Command, CommandKind, FrameError, ReplyHeader, REPLY_HEADER_SIZE};

use super::error::RemoteError;
use super::slots::{CommandSlots, Expectation, Reply, ReplyBody, ReplyResult};

/// Largest device-info string accepted
const MAX_INFO_LEN: usize = 64 * 1024;

/// Largest payload skipped for a reply nobody waits for
const MAX_STRAY_PAYLOAD: u64 = 64 * 1024 * 1024;

/// Timeout budgets
#[derive(Debug, Clone)]
pub struct RemoteTimeouts {
    /// TCP connect
    pub connect: Duration,
    /// Acknowledgement of start/stop/device-info commands
    pub ack: Duration,
    /// Fixed part of the download budget
    pub download_base: Duration,
    /// Bytes transferred per millisecond of extra download budget
    pub download_bytes_per_ms: u64,
    /// Added to playback/recording durations
    pub completion_slack: Duration,
}

impl Default for RemoteTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_millis(5000),
            ack: Duration::from_millis(2000),
            download_base: Duration::from_millis(5000),
            download_bytes_per_ms: 100,
            completion_slack: Duration::from_millis(2000),
        }
    }
}

impl RemoteTimeouts {
    /// Budget for downloading `bytes`
    pub fn download(&self, bytes: usize) -> Duration {
        self.download_base + Duration::from_millis(bytes as u64 / self.download_bytes_per_ms.max(1))
    }

    /// Budget for playing or recording `frames` at `sample_rate`, `repeat` times
    pub fn completion(&self, frames: usize, repeat: u32, sample_rate: u32) -> Duration {
        let ms = frames as u64 * repeat.max(1) as u64 * 1000 / sample_rate.max(1) as u64;
        Duration::from_millis(ms) + self.completion_slack
    }
}

/// Work posted to the I/O thread
enum Outbound {
    Send {
        kind: CommandKind,
        bytes: Vec<u8>,
        /// How long the write may take before the connection is given up
        budget: Duration,
        ack: mpsc::Sender<Result<(), RemoteError>>,
    },
    Shutdown,
}

/// Buffers already on the device
#[derive(Default)]
struct BufferRegistry {
    next_id: u32,
    by_name: HashMap<String, u32>,
    by_id: HashMap<u32, SharedBuffer>,
}

/// A pending start whose completion arrives later
struct Running {
    rx: Receiver<ReplyResult>,
    timeout: Duration,
}

/// Client for one device connection
pub struct RemoteAudio {
    peer: SocketAddr,
    outbound: tokio_mpsc::UnboundedSender<Outbound>,
    slots: Arc<CommandSlots>,
    broken: Arc<AtomicBool>,
    /// Interrupts the I/O thread even while it is blocked writing
    shutdown: Arc<Notify>,
    registry: Mutex<BufferRegistry>,
    playback: Mutex<Option<Running>>,
    recording: Mutex<Option<Running>>,
    timeouts: RemoteTimeouts,
    thread: Option<JoinHandle<()>>,
}

impl RemoteAudio {
    /// Connect to the device and start the I/O thread
    pub fn connect(peer: SocketAddr, timeouts: RemoteTimeouts) -> Result<Self, RemoteError> {
        let (outbound_tx, outbound_rx) = tokio_mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let slots = Arc::new(CommandSlots::new());
        let broken = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(Notify::new());

        let thread = {
            let slots = slots.clone();
            let broken = broken.clone();
            let shutdown = shutdown.clone();
            let connect_timeout = timeouts.connect;
            std::thread::Builder::new()
                .name("remote-audio".into())
                .spawn(move || {
                    let runtime = match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(rt) => rt,
                        Err(e) => {
                            let _ = ready_tx.send(Err(RemoteError::Io(e)));
                            return;
                        }
                    };
                    runtime.block_on(async move {
                        let stream = match tokio::time::timeout(
                            connect_timeout,
                            TcpStream::connect(peer),
                        )
                        .await
                        {
                            Ok(Ok(stream)) => stream,
                            Ok(Err(e)) => {
                                let _ = ready_tx.send(Err(RemoteError::Io(e)));
                                return;
                            }
                            Err(_) => {
                                let _ = ready_tx.send(Err(RemoteError::ConnectTimeout(peer.to_string())));
                                return;
                            }
                        };
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!("Failed to set TCP_NODELAY: {}", e);
                        }
                        let _ = ready_tx.send(Ok(()));
                        event_loop(stream, outbound_rx, slots, broken, shutdown).await;
                    });
                })?
        };

        match ready_rx.recv_timeout(timeouts.connect + Duration::from_secs(1)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => return Err(RemoteError::ConnectTimeout(peer.to_string())),
        }

        info!("Connected to device at {}", peer);

        Ok(Self {
            peer,
            outbound: outbound_tx,
            slots,
            broken,
            shutdown,
            registry: Mutex::new(BufferRegistry::default()),
            playback: Mutex::new(None),
            recording: Mutex::new(None),
            timeouts,
            thread: Some(thread),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Whether the I/O thread gave up on the socket
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::SeqCst)
    }

    /// Device id of a buffer already downloaded under `name`
    pub fn buffer_id(&self, name: &str) -> Option<u32> {
        self.registry.lock().by_name.get(name).copied()
    }

    /// Download `buffer` under `name`
    ///
    /// Downloading the same buffer under the same name again is a no-op that
    /// returns the existing id.
    pub fn download_data(&self, name: &str, buffer: SharedBuffer) -> Result<u32, RemoteError> {
        let id = {
            let mut registry = self.registry.lock();
            if let Some(id) = registry.by_name.get(name).copied() {
                if registry
                    .by_id
                    .get(&id)
                    .is_some_and(|known| Arc::ptr_eq(known, &buffer))
                {
                    debug!("Buffer {} already on device as {}", name, id);
                    return Ok(id);
                }
            }
            let id = registry.next_id;
            registry.next_id = registry.next_id.wrapping_add(1);
            id
        };

        let timeout = self.timeouts.download(buffer.size());
        info!("Downloading {} ({} bytes) as id {}", name, buffer.size(), id);
        let cmd = Command::Download {
            id,
            buffer: buffer.clone(),
        };
        self.transact(&cmd, Expectation::default(), timeout)?;

        let mut registry = self.registry.lock();
        if let Some(old) = registry.by_name.insert(name.to_string(), id) {
            registry.by_id.remove(&old);
        }
        registry.by_id.insert(id, buffer);
        Ok(id)
    }

    /// Start playing a downloaded buffer
    pub fn start_playback(
        &self,
        id: u32,
        sampling_rate: u32,
        mode: u32,
        volume: u32,
        repeat: u32,
    ) -> Result<(), RemoteError> {
        let buffer = self
            .registry
            .lock()
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| RemoteError::UnknownBuffer(id.to_string()))?;
        let cmd = Command::StartPlayback {
            id,
            sampling_rate,
            stereo: buffer.is_stereo(),
            mode,
            volume,
            repeat,
        };
        let rx = self.issue(&cmd, Expectation::default(), self.timeouts.ack)?;
        *self.playback.lock() = Some(Running {
            rx,
            timeout: self.timeouts.completion(buffer.samples(), repeat, sampling_rate),
        });
        Ok(())
    }

    /// Block until the device reports playback finished
    ///
    /// Returns immediately if no playback is in progress.
    pub fn wait_for_playback_completion(&self) -> Result<(), RemoteError> {
        let Some(running) = self.playback.lock().take() else {
            return Ok(());
        };
        self.await_reply(CommandKind::StartPlayback, &running.rx, running.timeout)
            .map(|_| ())
    }

    /// Stop playback; a no-op when nothing is playing
    pub fn stop_playback(&self) -> Result<(), RemoteError> {
        if !self.slots.is_active(CommandKind::StartPlayback) {
            return Ok(());
        }
        let result = self.transact(&Command::StopPlayback, Expectation::default(), self.timeouts.ack);
        self.slots.abandon(CommandKind::StartPlayback);
        self.playback.lock().take();
        result.map(|_| ())
    }

    /// Start recording `samples` frames on the device
    pub fn start_recording(
        &self,
        stereo: bool,
        sampling_rate: u32,
        mode: u32,
        volume: u32,
        samples: u32,
    ) -> Result<(), RemoteError> {
        let frame = if stereo { 2 * BYTES_PER_SAMPLE } else { BYTES_PER_SAMPLE };
        let expect = Expectation {
            capacity: samples as usize * frame,
            stereo,
        };
        let cmd = Command::StartRecording {
            sampling_rate,
            stereo,
            mode,
            volume,
            samples,
        };
        let rx = self.issue(&cmd, expect, self.timeouts.ack)?;
        *self.recording.lock() = Some(Running {
            rx,
            timeout: self.timeouts.completion(samples as usize, 1, sampling_rate),
        });
        Ok(())
    }

    /// Block until the recorded data arrives
    ///
    /// Returns `None` immediately if no recording is in progress.
    pub fn wait_for_recording_completion(&self) -> Result<Option<Buffer>, RemoteError> {
        let Some(running) = self.recording.lock().take() else {
            return Ok(None);
        };
        let reply = self.await_reply(CommandKind::StartRecording, &running.rx, running.timeout)?;
        match reply.body {
            ReplyBody::Recorded(buffer) => Ok(Some(buffer)),
            _ => Ok(Some(Buffer::new(0, false))),
        }
    }

    /// Whether a recording was started and not yet collected
    pub fn is_recording(&self) -> bool {
        self.recording.lock().is_some()
    }

    /// Stop recording; a no-op when nothing is recording
    pub fn stop_recording(&self) -> Result<(), RemoteError> {
        if !self.slots.is_active(CommandKind::StartRecording) {
            return Ok(());
        }
        let result = self.transact(&Command::StopRecording, Expectation::default(), self.timeouts.ack);
        self.slots.abandon(CommandKind::StartRecording);
        self.recording.lock().take();
        result.map(|_| ())
    }

    /// Query the device description
    pub fn get_device_info(&self) -> Result<String, RemoteError> {
        let expect = Expectation {
            capacity: MAX_INFO_LEN,
            stereo: false,
        };
        let reply = self.transact(&Command::GetDeviceInfo, expect, self.timeouts.ack)?;
        match reply.body {
            ReplyBody::Text(info) => Ok(info),
            _ => Ok(String::new()),
        }
    }

    fn transact(&self, cmd: &Command, expect: Expectation, timeout: Duration) -> Result<Reply, RemoteError> {
        let rx = self.issue(cmd, expect, timeout)?;
        self.await_reply(cmd.kind(), &rx, timeout)
    }

    /// Claim the slot, hand the frame to the I/O thread and wait until written
    fn issue(&self, cmd: &Command, expect: Expectation, ack_timeout: Duration) -> Result<Receiver<ReplyResult>, RemoteError> {
        if self.is_broken() {
            return Err(RemoteError::Disconnected);
        }
        let kind = cmd.kind();
        let rx = self.slots.claim(kind, expect)?;

        let (ack_tx, ack_rx) = mpsc::channel();
        let posted = self.outbound.send(Outbound::Send {
            kind,
            bytes: cmd.to_bytes(),
            budget: ack_timeout,
            ack: ack_tx,
        });
        if posted.is_err() {
            self.slots.release(kind);
            return Err(RemoteError::Disconnected);
        }

        let written = match ack_rx.recv_timeout(ack_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(RemoteError::Timeout(kind)),
            Err(RecvTimeoutError::Disconnected) => Err(RemoteError::Disconnected),
        };
        if let Err(e) = written {
            self.slots.release(kind);
            return Err(e);
        }
        Ok(rx)
    }

    fn await_reply(&self, kind: CommandKind, rx: &Receiver<ReplyResult>, timeout: Duration) -> Result<Reply, RemoteError> {
        match rx.recv_timeout(timeout) {
            Ok(Ok(reply)) if reply.header.is_ok() => Ok(reply),
            Ok(Ok(reply)) => Err(RemoteError::DeviceStatus {
                kind,
                status: reply.header.status,
            }),
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => {
                warn!("No reply to {:?} within {:?}", kind, timeout);
                self.slots.abandon(kind);
                Err(RemoteError::Timeout(kind))
            }
            Err(RecvTimeoutError::Disconnected) => Err(RemoteError::Disconnected),
        }
    }
}

impl Drop for RemoteAudio {
    fn drop(&mut self) {
        // The permit is kept if the loop is not waiting on it yet
        self.shutdown.notify_one();
        let _ = self.outbound.send(Outbound::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Remote audio thread panicked");
            }
        }
        debug!("Disconnected from {}", self.peer);
    }
}

async fn event_loop(
    stream: TcpStream,
    mut outbound: tokio_mpsc::UnboundedReceiver<Outbound>,
    slots: Arc<CommandSlots>,
    broken: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
) {
    let (reader, mut writer) = stream.into_split();
    let mut read_task = tokio::spawn(read_loop(reader, slots.clone()));

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            msg = outbound.recv() => match msg {
                Some(Outbound::Send { kind, bytes, budget, ack }) => {
                    let result = tokio::select! {
                        written = tokio::time::timeout(budget, writer.write_all(&bytes)) => match written {
                            Ok(written) => written.map_err(RemoteError::from),
                            Err(_) => Err(RemoteError::Timeout(kind)),
                        },
                        _ = shutdown.notified() => Err(RemoteError::Disconnected),
                    };
                    let failed = result.is_err();
                    match &result {
                        Ok(()) => trace!("Sent {:?} ({} bytes)", kind, bytes.len()),
                        Err(e) => error!("Failed to send {:?}: {}", kind, e),
                    }
                    let _ = ack.send(result);
                    // A partly written frame leaves the stream out of sync
                    if failed {
                        break;
                    }
                }
                Some(Outbound::Shutdown) | None => break,
            },
            finished = &mut read_task => {
                match finished {
                    Ok(Ok(())) => info!("Device closed the connection"),
                    Ok(Err(e)) => error!("Connection unusable: {}", e),
                    Err(e) => error!("Reader task failed: {}", e),
                }
                broken.store(true, Ordering::SeqCst);
                slots.fail_all();
                return;
            }
        }
    }

    read_task.abort();
    broken.store(true, Ordering::SeqCst);
    slots.fail_all();
}

/// Read replies until the socket closes or a frame is malformed
async fn read_loop(mut reader: OwnedReadHalf, slots: Arc<CommandSlots>) -> Result<(), RemoteError> {
    let mut raw = [0u8; REPLY_HEADER_SIZE];
    loop {
        match reader.read_exact(&mut raw).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        let header = ReplyHeader::from_bytes(&raw)?;
        let len = header.payload_len as usize;
        trace!("Reply {:?} status {} payload {}", header.kind, header.status, len);

        let Some(expect) = slots.expectation(header.kind) else {
            if !slots.take_straggler(header.kind) {
                error!("Reply to {:?}, which has no command outstanding", header.kind);
                return Err(FrameError::BadReplyId(header.kind.reply_id()).into());
            }
            warn!("Discarding late reply to {:?}", header.kind);
            if header.payload_len as u64 > MAX_STRAY_PAYLOAD {
                return Err(RemoteError::PayloadTooLarge {
                    kind: header.kind,
                    len,
                    capacity: MAX_STRAY_PAYLOAD as usize,
                });
            }
            let mut stray = (&mut reader).take(header.payload_len as u64);
            tokio::io::copy(&mut stray, &mut tokio::io::sink()).await?;
            continue;
        };

        let body = match header.kind {
            CommandKind::StartRecording if len > 0 => {
                if len > expect.capacity {
                    return Err(RemoteError::PayloadTooLarge {
                        kind: header.kind,
                        len,
                        capacity: expect.capacity,
                    });
                }
                let mut buffer = Buffer::new(expect.capacity, expect.stereo);
                reader.read_exact(&mut buffer.data_mut()[..len]).await?;
                buffer.set_size(len);
                ReplyBody::Recorded(buffer)
            }
            CommandKind::GetDeviceInfo => {
                if len > expect.capacity {
                    return Err(RemoteError::PayloadTooLarge {
                        kind: header.kind,
                        len,
                        capacity: expect.capacity,
                    });
                }
                let mut text = vec![0u8; len];
                reader.read_exact(&mut text).await?;
                ReplyBody::Text(String::from_utf8_lossy(&text).into_owned())
            }
            _ if len > 0 => {
                return Err(RemoteError::PayloadTooLarge {
                    kind: header.kind,
                    len,
                    capacity: 0,
                });
            }
            _ => ReplyBody::Empty,
        };

        if !slots.complete(header.kind, Ok(Reply { header, body })) {
            warn!("Reply to {:?} arrived after the caller gave up", header.kind);
        }
    }
}
