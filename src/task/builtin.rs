//! Native `builtin:` process functions

use crate::audio::{Buffer, MonoMode};

use super::process::{ProcessArg, ProcessOutcome};
use super::result::ExecutionResult;
use super::variables::Value;

/// Arguments, sampling rate → outcome or a message
pub type BuiltinFn = fn(&[ProcessArg], u32) -> Result<ProcessOutcome, String>;

const BUILTINS: &[(&str, BuiltinFn)] = &[
    ("rms_mva", rms_mva),
    ("check_range", check_range),
    ("to_mono", to_mono),
];

/// RMS window length
const WINDOW_MS: u32 = 10;

pub fn lookup(name: &str) -> Option<BuiltinFn> {
    BUILTINS.iter().find(|(n, _)| *n == name).map(|(_, f)| *f)
}

pub fn names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|(n, _)| *n)
}

fn buffer_arg(args: &[ProcessArg], i: usize) -> Result<&Buffer, String> {
    match args.get(i) {
        Some(ProcessArg::Buffer(b)) => Ok(b),
        Some(_) => Err(format!("argument {} must be a buffer", i)),
        None => Err(format!("missing argument {}", i)),
    }
}

fn value_arg(args: &[ProcessArg], i: usize) -> Result<f64, String> {
    match args.get(i) {
        Some(ProcessArg::Value(v)) => Ok(v.as_f64()),
        Some(_) => Err(format!("argument {} must be a value", i)),
        None => Err(format!("missing argument {}", i)),
    }
}

fn verdict(pass: bool) -> ExecutionResult {
    if pass {
        ExecutionResult::Pass
    } else {
        ExecutionResult::Fail
    }
}

/// RMS of each window of the first channel
pub fn window_rms(samples: &[i16], window: usize) -> Vec<f64> {
    samples
        .chunks(window.max(1))
        .map(|chunk| {
            let sum: f64 = chunk.iter().map(|&s| (s as f64) * (s as f64)).sum();
            (sum / chunk.len() as f64).sqrt()
        })
        .collect()
}

/// `rms_mva(id, constf:min, constf:max) -> val:mean_rms`
fn rms_mva(args: &[ProcessArg], sample_rate: u32) -> Result<ProcessOutcome, String> {
    let buffer = buffer_arg(args, 0)?;
    let min = value_arg(args, 1)?;
    let max = value_arg(args, 2)?;

    let samples = buffer.channel(0);
    if samples.is_empty() {
        return Err("empty buffer".to_string());
    }
    let window = (sample_rate as usize * WINDOW_MS as usize / 1000).max(1);
    let rms = window_rms(&samples, window);
    let mean = rms.iter().sum::<f64>() / rms.len() as f64;
    let pass = rms.iter().all(|r| (min..=max).contains(r));

    Ok(ProcessOutcome {
        result: verdict(pass),
        outputs: vec![ProcessArg::Value(Value::Double(mean))],
    })
}

/// `check_range(val, constf:min, constf:max)`
fn check_range(args: &[ProcessArg], _sample_rate: u32) -> Result<ProcessOutcome, String> {
    let x = value_arg(args, 0)?;
    let min = value_arg(args, 1)?;
    let max = value_arg(args, 2)?;
    Ok(ProcessOutcome {
        result: verdict(min <= x && x <= max),
        outputs: Vec::new(),
    })
}

/// `to_mono(id) -> id`, keeping the left channel
fn to_mono(args: &[ProcessArg], _sample_rate: u32) -> Result<ProcessOutcome, String> {
    let mut buffer = buffer_arg(args, 0)?.clone();
    buffer.change_to_mono(MonoMode::KeepCh0);
    Ok(ProcessOutcome {
        result: ExecutionResult::Ok,
        outputs: vec![ProcessArg::Buffer(buffer.into_shared())],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::signal;

    fn run(name: &str, args: &[ProcessArg]) -> Result<ProcessOutcome, String> {
        lookup(name).unwrap()(args, 1000)
    }

    #[test]
    fn test_window_rms_constant() {
        let rms = window_rms(&[3, -3, 3, -3, 4, 4], 2);
        assert_eq!(rms, vec![3.0, 3.0, 4.0]);
    }

    /// A full-scale square wave passes a range around its amplitude
    #[test]
    fn test_rms_mva_pass_and_fail() {
        let samples: Vec<i16> = (0..100).map(|i| if i % 2 == 0 { 1000 } else { -1000 }).collect();
        let buffer = Buffer::from_samples(&samples, false).into_shared();

        let args = vec![
            ProcessArg::Buffer(buffer.clone()),
            ProcessArg::Value(Value::Double(900.0)),
            ProcessArg::Value(Value::Double(1100.0)),
        ];
        let outcome = run("rms_mva", &args).unwrap();
        assert_eq!(outcome.result, ExecutionResult::Pass);
        assert!(matches!(outcome.outputs[0], ProcessArg::Value(Value::Double(v)) if (v - 1000.0).abs() < 1e-9));

        let args = vec![
            ProcessArg::Buffer(buffer),
            ProcessArg::Value(Value::Double(0.0)),
            ProcessArg::Value(Value::Int(10)),
        ];
        assert_eq!(run("rms_mva", &args).unwrap().result, ExecutionResult::Fail);
    }

    #[test]
    fn test_rms_mva_rejects_bad_args() {
        let args = vec![ProcessArg::Value(Value::Int(1))];
        assert!(run("rms_mva", &args).is_err());
    }

    #[test]
    fn test_check_range() {
        let args = |x: f64| {
            vec![
                ProcessArg::Value(Value::Double(x)),
                ProcessArg::Value(Value::Int(1)),
                ProcessArg::Value(Value::Int(2)),
            ]
        };
        assert_eq!(run("check_range", &args(1.5)).unwrap().result, ExecutionResult::Pass);
        assert_eq!(run("check_range", &args(2.5)).unwrap().result, ExecutionResult::Fail);
    }

    #[test]
    fn test_to_mono() {
        let stereo = signal::sine(1000, 100.0, 10, 1000, true).into_shared();
        let outcome = run("to_mono", &[ProcessArg::Buffer(stereo.clone())]).unwrap();
        match &outcome.outputs[0] {
            ProcessArg::Buffer(mono) => {
                assert!(!mono.is_stereo());
                assert_eq!(mono.samples(), stereo.samples());
                assert_eq!(mono.to_i16(), stereo.channel(0));
            }
            _ => panic!("expected buffer"),
        }
    }

    #[test]
    fn test_names() {
        assert_eq!(names().count(), 3);
        assert!(lookup("missing").is_none());
    }
}
