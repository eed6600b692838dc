//! PCM buffers
//!
//! A [`Buffer`] holds raw little-endian 16-bit PCM bytes. It is mutable while
//! it is being produced; once handed to a variable table or an in-flight
//! operation it is frozen into a [`SharedBuffer`].
//!
//! File format: raw samples with no header. `.r2s` is interleaved stereo,
//! `.r2m` is mono.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::error::AudioError;

/// Extension for interleaved stereo files
pub const STEREO_EXT: &str = "r2s";

/// Extension for mono files
pub const MONO_EXT: &str = "r2m";

/// Bytes per 16-bit sample
pub const BYTES_PER_SAMPLE: usize = 2;

/// Frozen buffer shared between variable tables and pending operations
pub type SharedBuffer = Arc<Buffer>;

/// How to fold a stereo buffer into mono
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonoMode {
    /// Keep the left channel
    KeepCh0,
    /// Keep the right channel
    KeepCh1,
    /// Average both channels
    Average,
}

/// Raw PCM payload with a consumption cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
    size: usize,
    handled: usize,
    stereo: bool,
}

impl Buffer {
    /// Create an empty buffer with a fixed capacity in bytes
    pub fn new(capacity: usize, stereo: bool) -> Self {
        Self {
            data: vec![0u8; capacity],
            size: 0,
            handled: 0,
            stereo,
        }
    }

    /// Create a buffer that is entirely filled with `data`
    ///
    /// Trailing bytes that do not form a whole frame are dropped.
    pub fn with_data(mut data: Vec<u8>, stereo: bool) -> Self {
        let frame = frame_bytes(stereo);
        let size = data.len() - data.len() % frame;
        data.truncate(size);
        Self {
            data,
            size,
            handled: 0,
            stereo,
        }
    }

    /// Create a buffer from interleaved samples
    pub fn from_samples(samples: &[i16], stereo: bool) -> Self {
        let mut data = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
        for s in samples {
            data.extend_from_slice(&s.to_le_bytes());
        }
        Self::with_data(data, stereo)
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Set the number of valid bytes
    ///
    /// Clamped to the capacity and rounded down to a whole frame.
    pub fn set_size(&mut self, size: usize) {
        let frame = self.frame_bytes();
        let size = size.min(self.capacity());
        self.size = size - size % frame;
        self.handled = self.handled.min(self.size);
    }

    pub fn handled(&self) -> usize {
        self.handled
    }

    /// Advance the cursor, never past `size`
    pub fn increase_handled(&mut self, bytes: usize) {
        self.handled = (self.handled + bytes).min(self.size);
    }

    /// Rewind the cursor for replay
    pub fn restart(&mut self) {
        self.handled = 0;
    }

    pub fn is_stereo(&self) -> bool {
        self.stereo
    }

    /// Bytes per frame (4 for stereo, 2 for mono)
    pub fn frame_bytes(&self) -> usize {
        frame_bytes(self.stereo)
    }

    /// Number of frames in the valid region
    pub fn samples(&self) -> usize {
        self.size / self.frame_bytes()
    }

    /// Valid bytes
    pub fn data(&self) -> &[u8] {
        &self.data[..self.size]
    }

    /// Whole allocation, for producers filling the buffer in place
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.handled..self.size]
    }

    /// Interleaved sample at index `i`
    pub fn sample(&self, i: usize) -> Option<i16> {
        let start = i * BYTES_PER_SAMPLE;
        if start + BYTES_PER_SAMPLE > self.size {
            return None;
        }
        Some(i16::from_le_bytes([self.data[start], self.data[start + 1]]))
    }

    /// All valid samples, interleaved
    pub fn to_i16(&self) -> Vec<i16> {
        self.data()
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect()
    }

    /// Samples of one channel (channel 0 for mono buffers)
    pub fn channel(&self, ch: usize) -> Vec<i16> {
        let samples = self.to_i16();
        if !self.stereo {
            return samples;
        }
        samples.chunks_exact(2).map(|f| f[ch.min(1)]).collect()
    }

    /// Fold a stereo buffer into mono in place
    ///
    /// The capacity, size and handled cursor are all halved. Mono buffers are
    /// left untouched.
    pub fn change_to_mono(&mut self, mode: MonoMode) {
        if !self.stereo {
            return;
        }
        let frames = self.samples();
        let mut out = Vec::with_capacity(self.capacity() / 2);
        for f in 0..frames {
            let l = self.sample(2 * f).unwrap_or(0);
            let r = self.sample(2 * f + 1).unwrap_or(0);
            let v = match mode {
                MonoMode::KeepCh0 => l,
                MonoMode::KeepCh1 => r,
                MonoMode::Average => ((l as i32 + r as i32) / 2) as i16,
            };
            out.extend_from_slice(&v.to_le_bytes());
        }
        let size = out.len();
        out.resize(self.capacity() / 2, 0);
        self.data = out;
        self.size = size;
        self.handled /= 2;
        self.handled -= self.handled % BYTES_PER_SAMPLE;
        self.stereo = false;
    }

    /// Load a buffer from a `.r2s` or `.r2m` file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AudioError> {
        let path = path.as_ref();
        let stereo = match path.extension().and_then(|e| e.to_str()) {
            Some(STEREO_EXT) => true,
            Some(MONO_EXT) => false,
            _ => {
                return Err(AudioError::UnsupportedFile(path.display().to_string()));
            }
        };
        let data = fs::read(path)?;
        debug!("Loaded {} bytes from {}", data.len(), path.display());
        Ok(Self::with_data(data, stereo))
    }

    /// Save the valid bytes to `<base>.r2s` or `<base>.r2m`
    ///
    /// Returns the path actually written.
    pub fn save<P: AsRef<Path>>(&self, base: P) -> Result<PathBuf, AudioError> {
        let ext = if self.stereo { STEREO_EXT } else { MONO_EXT };
        let mut path = base.as_ref().as_os_str().to_owned();
        path.push(".");
        path.push(ext);
        let path = PathBuf::from(path);
        fs::write(&path, self.data())?;
        debug!("Saved {} bytes to {}", self.size, path.display());
        Ok(path)
    }

    /// Freeze into a shareable handle
    pub fn into_shared(self) -> SharedBuffer {
        Arc::new(self)
    }
}

fn frame_bytes(stereo: bool) -> usize {
    if stereo {
        2 * BYTES_PER_SAMPLE
    } else {
        BYTES_PER_SAMPLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer_is_empty() {
        let buffer = Buffer::new(64, true);
        assert_eq!(buffer.capacity(), 64);
        assert_eq!(buffer.size(), 0);
        assert_eq!(buffer.handled(), 0);
        assert!(buffer.is_stereo());
    }

    #[test]
    fn test_set_size_rounds_to_frame() {
        let mut buffer = Buffer::new(64, true);
        buffer.set_size(10);
        assert_eq!(buffer.size(), 8);
        buffer.set_size(1000);
        assert_eq!(buffer.size(), 64);
    }

    #[test]
    fn test_handled_never_exceeds_size() {
        let mut buffer = Buffer::from_samples(&[1, 2, 3, 4], false);
        buffer.increase_handled(6);
        assert_eq!(buffer.handled(), 6);
        buffer.increase_handled(6);
        assert_eq!(buffer.handled(), 8);
        assert!(buffer.remaining().is_empty());

        buffer.restart();
        assert_eq!(buffer.handled(), 0);
        assert_eq!(buffer.remaining().len(), 8);
    }

    #[test]
    fn test_change_to_mono_keeps_left_channel() {
        let samples: Vec<i16> = vec![10, -10, 20, -20, 30, -30, 40, -40];
        let mut buffer = Buffer::from_samples(&samples, true);
        buffer.increase_handled(8);

        buffer.change_to_mono(MonoMode::KeepCh0);

        assert!(!buffer.is_stereo());
        assert_eq!(buffer.samples(), 4);
        assert_eq!(buffer.to_i16(), vec![10, 20, 30, 40]);
        assert_eq!(buffer.handled(), 4);
    }

    #[test]
    fn test_change_to_mono_average() {
        let mut buffer = Buffer::from_samples(&[100, 200, -50, 50], true);
        buffer.change_to_mono(MonoMode::Average);
        assert_eq!(buffer.to_i16(), vec![150, 0]);
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let result = Buffer::load("/tmp/does_not_matter.wav");
        assert!(matches!(result, Err(AudioError::UnsupportedFile(_))));
    }

    #[test]
    fn test_channel_extraction() {
        let buffer = Buffer::from_samples(&[1, 2, 3, 4], true);
        assert_eq!(buffer.channel(0), vec![1, 3]);
        assert_eq!(buffer.channel(1), vec![2, 4]);
    }
}
