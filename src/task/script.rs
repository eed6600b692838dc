//! Python script bridge for `script:` processes
//!
//! A script is run as `<python> <script_dir>/<fn>.py <args..>`. Buffer
//! arguments are written to a scratch directory and passed by path. The first
//! stdout line is the verdict, each following line is one output.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tracing::{debug, trace};

use crate::audio::{AudioError, Buffer};

use super::process::{Binding, ProcessArg, ProcessOutcome};
use super::result::ExecutionResult;
use super::variables::Value;

static NEXT_INVOCATION: AtomicUsize = AtomicUsize::new(0);

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Script {0} exited with {1}")]
    ExitStatus(String, String),

    #[error("Script {0} printed unexpected output: {1}")]
    BadOutput(String, String),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs processing scripts with a configured interpreter
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    python: String,
    script_dir: PathBuf,
}

impl ScriptRunner {
    pub fn new(python: impl Into<String>, script_dir: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            script_dir: script_dir.into(),
        }
    }

    pub fn script_path(&self, function: &str) -> PathBuf {
        self.script_dir.join(format!("{}.py", function))
    }

    /// Run `function` and decode its verdict and outputs
    ///
    /// `scratch` is the parent of the per-invocation directory holding buffer
    /// arguments; that directory is removed afterwards.
    pub fn run(
        &self,
        function: &str,
        args: &[ProcessArg],
        outputs: &[Binding],
        scratch: &Path,
    ) -> Result<ProcessOutcome, ScriptError> {
        let invocation = NEXT_INVOCATION.fetch_add(1, Ordering::Relaxed);
        let work_dir = scratch.join(format!("{}_{}", function, invocation));
        fs::create_dir_all(&work_dir)?;

        let result = self.invoke(function, args, outputs, &work_dir);
        if let Err(e) = fs::remove_dir_all(&work_dir) {
            debug!("Could not remove {:?}: {}", work_dir, e);
        }
        result
    }

    fn invoke(
        &self,
        function: &str,
        args: &[ProcessArg],
        outputs: &[Binding],
        work_dir: &Path,
    ) -> Result<ProcessOutcome, ScriptError> {
        let mut argv = vec![self.script_path(function).to_string_lossy().into_owned()];
        for (i, arg) in args.iter().enumerate() {
            match arg {
                ProcessArg::Buffer(buffer) => {
                    let path = buffer.save(work_dir.join(format!("arg{}", i)))?;
                    argv.push(path.to_string_lossy().into_owned());
                }
                ProcessArg::Value(value) => argv.push(value.to_string()),
            }
        }

        debug!("Running {} {}", self.python, argv.join(" "));
        let output = Command::new(&self.python)
            .args(&argv)
            .current_dir(work_dir)
            .output()
            .map_err(|source| ScriptError::Spawn {
                program: self.python.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(ScriptError::ExitStatus(
                function.to_string(),
                output.status.to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        trace!("{} stdout: {}", function, stdout);
        parse_output(function, &stdout, outputs, work_dir)
    }
}

/// Decode a script's stdout
///
/// Relative buffer paths are resolved against `work_dir`.
pub(crate) fn parse_output(
    function: &str,
    stdout: &str,
    outputs: &[Binding],
    work_dir: &Path,
) -> Result<ProcessOutcome, ScriptError> {
    let bad = |what: &str| ScriptError::BadOutput(function.to_string(), what.to_string());

    let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());
    let verdict = lines.next().ok_or_else(|| bad("no verdict line"))?;
    let result = match verdict.to_ascii_uppercase().as_str() {
        "OK" => ExecutionResult::Ok,
        "PASS" => ExecutionResult::Pass,
        "FAIL" => ExecutionResult::Fail,
        "CONTINUE" => ExecutionResult::Continue,
        "BREAK" => ExecutionResult::BreakOneLoop,
        other => return Err(bad(other)),
    };

    let mut values = Vec::with_capacity(outputs.len());
    for binding in outputs {
        let line = lines
            .next()
            .ok_or_else(|| bad(&format!("missing output for {}", binding.name())))?;
        let arg = match binding {
            Binding::Buffer(_) => {
                let path = work_dir.join(line);
                ProcessArg::Buffer(Buffer::load(&path)?.into_shared())
            }
            Binding::Value(_) => ProcessArg::Value(parse_value(line).ok_or_else(|| bad(line))?),
        };
        values.push(arg);
    }

    Ok(ProcessOutcome {
        result,
        outputs: values,
    })
}

/// Integer if it parses as one, otherwise floating point
pub(crate) fn parse_value(text: &str) -> Option<Value> {
    if let Ok(v) = text.parse::<i64>() {
        return Some(Value::Int(v));
    }
    text.parse::<f64>().ok().map(Value::Double)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verdict_and_values() {
        let outputs = vec![
            Binding::Value("snr".to_string()),
            Binding::Value("count".to_string()),
        ];
        let outcome = parse_output("f", "PASS\n12.5\n3\n", &outputs, Path::new(".")).unwrap();
        assert_eq!(outcome.result, ExecutionResult::Pass);
        assert_eq!(outcome.outputs.len(), 2);
        assert!(matches!(outcome.outputs[0], ProcessArg::Value(Value::Double(v)) if v == 12.5));
        assert!(matches!(outcome.outputs[1], ProcessArg::Value(Value::Int(3))));
    }

    #[test]
    fn test_missing_output_is_error() {
        let outputs = vec![Binding::Value("snr".to_string())];
        assert!(parse_output("f", "OK\n", &outputs, Path::new(".")).is_err());
        assert!(parse_output("f", "", &[], Path::new(".")).is_err());
        assert!(parse_output("f", "MAYBE\n", &[], Path::new(".")).is_err());
    }

    /// Buffer outputs are loaded from the printed path
    #[test]
    fn test_buffer_output_loaded() {
        let dir = tempfile::tempdir().unwrap();
        Buffer::from_samples(&[1, 2, 3], false)
            .save(dir.path().join("out"))
            .unwrap();

        let outputs = vec![Binding::Buffer("result".to_string())];
        let outcome = parse_output("f", "OK\nout.r2m\n", &outputs, dir.path()).unwrap();
        match &outcome.outputs[0] {
            ProcessArg::Buffer(b) => assert_eq!(b.to_i16(), vec![1, 2, 3]),
            _ => panic!("expected buffer"),
        }
    }

    /// A missing interpreter surfaces as a spawn error
    #[test]
    fn test_missing_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptRunner::new("/nonexistent/python", dir.path());
        let err = runner.run("noop", &[], &[], dir.path()).unwrap_err();
        assert!(matches!(err, ScriptError::Spawn { .. }));
    }
}
