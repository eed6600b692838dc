//! Fake device for running test descriptions without hardware
//!
//! Speaks the device side of the remote audio protocol: keeps downloaded
//! buffers, reports playback finished after its real-time duration, answers
//! recordings with a sine tone and device-info with a fixed string.
//!
//! Run with:
//!   cargo run --bin fake-device -- --port 15010
//!
//! Then point audioqa at it with `forward_port = false` in the settings.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn, Level};

use audioqa::audio::{signal, SharedBuffer};
use audioqa::protocol::{Command, CommandKind, ReplyHeader, COMMAND_HEADER_SIZE};

/// Status returned for commands the fake device cannot satisfy
const STATUS_FAILED: u32 = 1;

/// Largest command payload accepted
const MAX_PAYLOAD: u32 = 64 * 1024 * 1024;

/// Fake audio device for audioqa
#[derive(Parser, Debug)]
#[command(name = "fake-device")]
#[command(about = "Device-side responder for the audioqa remote protocol")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "15010")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Amplitude of the recorded sine tone
    #[arg(long, default_value = "8000")]
    amplitude: i16,

    /// Frequency of the recorded sine tone in Hz
    #[arg(long, default_value = "1000")]
    frequency: f64,

    /// Text answered to device-info requests
    #[arg(long, default_value = "fake-device 1.0")]
    info: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Per-connection device state
struct Device {
    writer: Mutex<OwnedWriteHalf>,
    buffers: Mutex<HashMap<u32, SharedBuffer>>,
    /// Bumped by stop commands so pending completions are dropped
    playback_gen: AtomicU64,
    recording_gen: AtomicU64,
    amplitude: i16,
    frequency: f64,
    info: String,
}

impl Device {
    async fn reply(&self, kind: CommandKind, status: u32, payload: &[u8]) -> std::io::Result<()> {
        let header = ReplyHeader::new(kind, status, payload.len() as u32);
        let mut writer = self.writer.lock().await;
        writer.write_all(&header.to_bytes()).await?;
        writer.write_all(payload).await?;
        debug!("Replied {:?} status {} ({} bytes)", kind, status, payload.len());
        Ok(())
    }

    async fn handle(self: &Arc<Self>, cmd: Command) -> std::io::Result<()> {
        match cmd {
            Command::Download { id, buffer } => {
                info!("Download id {} ({} bytes)", id, buffer.size());
                self.buffers.lock().await.insert(id, buffer);
                self.reply(CommandKind::Download, 0, &[]).await
            }
            Command::StartPlayback {
                id,
                sampling_rate,
                stereo,
                repeat,
                ..
            } => {
                let Some(buffer) = self.buffers.lock().await.get(&id).cloned() else {
                    warn!("Playback of unknown id {}", id);
                    return self.reply(CommandKind::StartPlayback, STATUS_FAILED, &[]).await;
                };
                // Downloads carry no layout; the playback command does
                let frame = if stereo { 4 } else { 2 };
                let frames = (buffer.size() / frame) as u64 * repeat.max(1) as u64;
                let duration = Duration::from_millis(frames * 1000 / sampling_rate.max(1) as u64);
                info!("Playing id {} for {:?}", id, duration);

                let generation = self.playback_gen.load(Ordering::SeqCst);
                let device = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(duration).await;
                    if device.playback_gen.load(Ordering::SeqCst) == generation {
                        if let Err(e) = device.reply(CommandKind::StartPlayback, 0, &[]).await {
                            warn!("Failed to report playback end: {}", e);
                        }
                    }
                });
                Ok(())
            }
            Command::StartRecording {
                sampling_rate,
                stereo,
                samples,
                ..
            } => {
                let duration_ms = (samples as u64 * 1000 / sampling_rate.max(1) as u64) as u32;
                info!("Recording {} frames ({} ms)", samples, duration_ms);

                let mut tone = signal::sine(self.amplitude, self.frequency, duration_ms, sampling_rate, stereo);
                let frame = if stereo { 4 } else { 2 };
                tone.set_size(tone.size().min(samples as usize * frame));

                let generation = self.recording_gen.load(Ordering::SeqCst);
                let device = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(duration_ms as u64)).await;
                    if device.recording_gen.load(Ordering::SeqCst) == generation {
                        if let Err(e) = device.reply(CommandKind::StartRecording, 0, tone.data()).await {
                            warn!("Failed to deliver recording: {}", e);
                        }
                    }
                });
                Ok(())
            }
            Command::StopPlayback => {
                self.playback_gen.fetch_add(1, Ordering::SeqCst);
                self.reply(CommandKind::StopPlayback, 0, &[]).await
            }
            Command::StopRecording => {
                self.recording_gen.fetch_add(1, Ordering::SeqCst);
                self.reply(CommandKind::StopRecording, 0, &[]).await
            }
            Command::GetDeviceInfo => {
                self.reply(CommandKind::GetDeviceInfo, 0, self.info.as_bytes()).await
            }
        }
    }
}

async fn serve(stream: TcpStream, peer: SocketAddr, args: Arc<Args>) -> std::io::Result<()> {
    let (mut reader, writer) = stream.into_split();
    let device = Arc::new(Device {
        writer: Mutex::new(writer),
        buffers: Mutex::new(HashMap::new()),
        playback_gen: AtomicU64::new(0),
        recording_gen: AtomicU64::new(0),
        amplitude: args.amplitude,
        frequency: args.frequency,
        info: args.info.clone(),
    });

    let mut header = [0u8; COMMAND_HEADER_SIZE];
    loop {
        match reader.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                info!("{} disconnected", peer);
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        let (kind, len) = match Command::parse_header(&header) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!("Bad command from {}: {}", peer, e);
                return Ok(());
            }
        };
        if len > MAX_PAYLOAD {
            error!("{:?} payload of {} bytes is too large", kind, len);
            return Ok(());
        }
        let mut payload = vec![0u8; len as usize];
        reader.read_exact(&mut payload).await?;

        match Command::from_payload(kind, &payload) {
            Ok(cmd) => device.handle(cmd).await?,
            Err(e) => {
                warn!("Malformed {:?}: {}", kind, e);
                device.reply(kind, STATUS_FAILED, &[]).await?;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Arc::new(Args::parse());

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Fake device listening on {}", listener.local_addr()?);

    // One connection at a time, like the real device
    loop {
        let (stream, peer) = listener.accept().await?;
        info!("Connection from {}", peer);
        if let Err(e) = serve(stream, peer, args.clone()).await {
            error!("Connection from {} failed: {}", peer, e);
        }
    }
}
