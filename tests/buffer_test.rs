//! Buffer tests
//!
//! PCM buffer invariants, mono folding and the raw file format.

use audioqa::audio::{signal, Buffer, MonoMode, BYTES_PER_SAMPLE};

fn stereo_ramp(frames: i16) -> Buffer {
    let samples: Vec<i16> = (0..frames).flat_map(|i| [i, 100 + i]).collect();
    Buffer::from_samples(&samples, true)
}

/// Test: Save then load is byte exact
/// Given a 32-byte stereo buffer with frames 0..7
/// When it is saved to <dir>/x and loaded from <dir>/x.r2s
/// Then the samples and the stereo flag are unchanged
#[test]
fn test_save_load_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let samples: Vec<i16> = (0..8).flat_map(|i| [i, i]).collect();
    let buffer = Buffer::from_samples(&samples, true);
    assert_eq!(buffer.size(), 32);

    let path = buffer.save(dir.path().join("x")).unwrap();
    assert_eq!(path, dir.path().join("x.r2s"));

    let loaded = Buffer::load(&path).unwrap();
    assert!(loaded.is_stereo());
    assert_eq!(loaded.to_i16(), samples);
    assert_eq!(loaded.data(), buffer.data());
}

/// Test: Mono buffers use the .r2m extension
#[test]
fn test_mono_extension() {
    let dir = tempfile::tempdir().unwrap();
    let buffer = Buffer::from_samples(&[1, -1, 2], false);
    let path = buffer.save(dir.path().join("m")).unwrap();
    assert_eq!(path.extension().unwrap(), "r2m");
    assert!(!Buffer::load(&path).unwrap().is_stereo());
}

/// Test: Unknown extensions are rejected
#[test]
fn test_load_rejects_other_extensions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    std::fs::write(&path, [0u8; 8]).unwrap();
    assert!(Buffer::load(&path).is_err());
}

/// Test: Keep channel 0
/// Given a stereo buffer of N frames with half of it handled
/// When it is changed to mono keeping channel 0
/// Then it has N mono frames equal to the left channel and handled is halved
#[test]
fn test_change_to_mono_keeps_left() {
    let mut buffer = stereo_ramp(8);
    buffer.increase_handled(16);
    buffer.change_to_mono(MonoMode::KeepCh0);

    assert!(!buffer.is_stereo());
    assert_eq!(buffer.samples(), 8);
    assert_eq!(buffer.to_i16(), (0..8).collect::<Vec<i16>>());
    assert_eq!(buffer.handled(), 8);
}

#[test]
fn test_change_to_mono_other_modes() {
    let mut right = stereo_ramp(4);
    right.change_to_mono(MonoMode::KeepCh1);
    assert_eq!(right.to_i16(), vec![100, 101, 102, 103]);

    let mut avg = stereo_ramp(4);
    avg.change_to_mono(MonoMode::Average);
    assert_eq!(avg.to_i16(), vec![50, 51, 52, 53]);
}

/// Test: Cursor invariants
/// handled <= size <= capacity, and size stays a whole number of frames
#[test]
fn test_cursor_invariants() {
    let mut buffer = Buffer::new(64, true);
    assert_eq!(buffer.capacity(), 64);
    assert_eq!(buffer.size(), 0);

    buffer.set_size(1000);
    assert_eq!(buffer.size(), 64);

    buffer.set_size(10);
    assert_eq!(buffer.size(), 8);

    buffer.increase_handled(100);
    assert_eq!(buffer.handled(), buffer.size());

    buffer.restart();
    assert_eq!(buffer.handled(), 0);

    let mut mono = Buffer::new(6, false);
    mono.set_size(5);
    assert_eq!(mono.size() % BYTES_PER_SAMPLE, 0);
}

/// Test: Generated tones have the requested length and layout
#[test]
fn test_generated_signals() {
    let tone = signal::sine(1000, 1000.0, 100, 8000, true);
    assert!(tone.is_stereo());
    assert_eq!(tone.samples(), 800);
    assert!(tone.to_i16().iter().all(|s| s.abs() <= 1000));

    let noise = signal::random(500, 10, 8000, false);
    assert_eq!(noise.samples(), 80);
    assert!(noise.to_i16().iter().all(|s| s.abs() <= 500));
}
