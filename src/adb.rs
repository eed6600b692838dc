//! adb invocation

use std::io;
use std::process::Command;

use tracing::{debug, info, warn};

/// Thin wrapper over the `adb` executable
#[derive(Debug, Clone)]
pub struct AdbBridge {
    program: String,
    serial: Option<String>,
}

impl AdbBridge {
    pub fn new(program: impl Into<String>, serial: Option<String>) -> Self {
        Self {
            program: program.into(),
            serial,
        }
    }

    /// Arguments for `adb forward` of `port` to the same device port
    pub fn forward_args(&self, port: u16) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(serial) = &self.serial {
            args.push("-s".to_string());
            args.push(serial.clone());
        }
        args.push("forward".to_string());
        args.push(format!("tcp:{}", port));
        args.push(format!("tcp:{}", port));
        args
    }

    /// Forward host `port` to the device
    ///
    /// Failures are only logged; a missing forward shows up later as a
    /// connection error of the case that needs the device.
    pub fn forward(&self, port: u16) -> bool {
        let args = self.forward_args(port);
        debug!("Running {} {}", self.program, args.join(" "));
        match run(&self.program, &args) {
            Ok(true) => {
                info!("Forwarded tcp:{} to device", port);
                true
            }
            Ok(false) => {
                warn!("adb forward for port {} failed", port);
                false
            }
            Err(e) => {
                warn!("Could not run {}: {}", self.program, e);
                false
            }
        }
    }
}

fn run(program: &str, args: &[String]) -> io::Result<bool> {
    let output = Command::new(program).args(args).output()?;
    if !output.status.success() {
        debug!("adb stderr: {}", String::from_utf8_lossy(&output.stderr).trim());
    }
    Ok(output.status.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_args_with_serial() {
        let adb = AdbBridge::new("adb", Some("R58M".to_string()));
        assert_eq!(
            adb.forward_args(15010),
            vec!["-s", "R58M", "forward", "tcp:15010", "tcp:15010"]
        );
    }

    #[test]
    fn test_forward_args_without_serial() {
        let adb = AdbBridge::new("adb", None);
        assert_eq!(adb.forward_args(80), vec!["forward", "tcp:80", "tcp:80"]);
    }

    /// A missing executable is reported, not panicked on
    #[test]
    fn test_missing_program() {
        let adb = AdbBridge::new("/nonexistent/adb-binary", None);
        assert!(!adb.forward(15010));
    }
}
