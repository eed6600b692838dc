//! Test signal generators
//!
//! Amplitudes are in raw 16-bit sample units. Stereo output duplicates the
//! generated channel into both sides.

use std::f64::consts::PI;

use rand::Rng;

use super::buffer::Buffer;

/// Number of frames covering `duration_ms` at `sample_rate`
pub fn frames_for(duration_ms: u32, sample_rate: u32) -> usize {
    (duration_ms as u64 * sample_rate as u64 / 1000) as usize
}

/// Generate a sine tone
pub fn sine(amplitude: i16, freq_hz: f64, duration_ms: u32, sample_rate: u32, stereo: bool) -> Buffer {
    let frames = frames_for(duration_ms, sample_rate);
    let amp = amplitude as f64;
    let mono = (0..frames).map(|i| {
        let t = i as f64 / sample_rate as f64;
        (amp * (2.0 * PI * freq_hz * t).sin()).round() as i16
    });
    build(mono, frames, stereo)
}

/// Generate uniform white noise in `[-amplitude, amplitude]`
pub fn random(amplitude: i16, duration_ms: u32, sample_rate: u32, stereo: bool) -> Buffer {
    let frames = frames_for(duration_ms, sample_rate);
    let amp = (amplitude.unsigned_abs() as i32).min(i16::MAX as i32);
    let mut rng = rand::thread_rng();
    let mono: Vec<i16> = (0..frames)
        .map(|_| rng.gen_range(-amp..=amp) as i16)
        .collect();
    build(mono.into_iter(), frames, stereo)
}

fn build(mono: impl Iterator<Item = i16>, frames: usize, stereo: bool) -> Buffer {
    let channels = if stereo { 2 } else { 1 };
    let mut samples = Vec::with_capacity(frames * channels);
    for s in mono {
        samples.push(s);
        if stereo {
            samples.push(s);
        }
    }
    Buffer::from_samples(&samples, stereo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sine_length_and_peak() {
        let buffer = sine(10000, 1000.0, 100, 44100, false);
        assert_eq!(buffer.samples(), 4410);

        let peak = buffer.to_i16().iter().map(|s| s.unsigned_abs()).max().unwrap();
        assert!(peak <= 10000);
        assert!(peak > 9900);
    }

    #[test]
    fn test_sine_stereo_duplicates_channel() {
        let buffer = sine(1000, 440.0, 10, 48000, true);
        assert!(buffer.is_stereo());
        assert_eq!(buffer.channel(0), buffer.channel(1));
    }

    #[test]
    fn test_random_within_amplitude() {
        let buffer = random(500, 50, 8000, false);
        assert_eq!(buffer.samples(), 400);
        assert!(buffer.to_i16().iter().all(|s| s.abs() <= 500));
    }
}
