//! Task outcomes

use std::fmt;

/// Outcome of running a task
///
/// Anything other than [`ExecutionResult::Ok`] stops the current scope.
/// `Continue` and `BreakOneLoop` are consumed by the enclosing sequential;
/// `Error`, `Fail` and `Pass` propagate to the case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionResult {
    #[default]
    Ok,
    /// Skip the rest of this iteration, keep looping
    Continue,
    /// Leave the enclosing sequential, as a success
    BreakOneLoop,
    /// Unrecoverable problem
    Error,
    /// The test failed
    Fail,
    /// The test passed
    Pass,
}

impl ExecutionResult {
    pub fn is_ok(self) -> bool {
        self == ExecutionResult::Ok
    }

    /// Whether this result ends the case
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionResult::Error | ExecutionResult::Fail | ExecutionResult::Pass
        )
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionResult::Ok => "OK",
            ExecutionResult::Continue => "Continue",
            ExecutionResult::BreakOneLoop => "BreakOneLoop",
            ExecutionResult::Error => "Error",
            ExecutionResult::Fail => "Fail",
            ExecutionResult::Pass => "Pass",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_results() {
        assert!(ExecutionResult::Error.is_terminal());
        assert!(ExecutionResult::Fail.is_terminal());
        assert!(ExecutionResult::Pass.is_terminal());
        assert!(!ExecutionResult::Continue.is_terminal());
        assert!(!ExecutionResult::BreakOneLoop.is_terminal());
        assert!(ExecutionResult::default().is_ok());
    }
}
