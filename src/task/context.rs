//! Execution context threaded through `Task::run`

use tracing::{debug, warn};

use crate::remote::{RemoteAudio, RemoteError};

use super::environment::Environment;
use super::node::TaskId;
use super::variables::CaseVariables;

/// Mutable state owned by one case
#[derive(Default)]
pub struct CaseState {
    pub vars: CaseVariables,
    remote: Option<RemoteAudio>,
    details: String,
}

impl CaseState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connection to the device, opened on first use
    ///
    /// A connection that hit a framing error or EOF is replaced.
    pub fn remote(&mut self, env: &Environment) -> Result<&RemoteAudio, RemoteError> {
        if self.remote.as_ref().is_some_and(|r| r.is_broken()) {
            warn!("Device connection is broken, reconnecting");
            self.remote = None;
        }
        if self.remote.is_none() {
            self.remote = Some(env.connect_remote()?);
        }
        self.remote.as_ref().ok_or(RemoteError::Disconnected)
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Close the device connection, if any
    pub fn release_remote(&mut self) {
        if let Some(remote) = self.remote.take() {
            debug!("Releasing device connection to {}", remote.peer_addr());
        }
    }

    /// Text recorded with the case's report entry
    pub fn details(&self) -> &str {
        &self.details
    }

    pub fn append_details(&mut self, line: &str) {
        if !self.details.is_empty() {
            self.details.push('\n');
        }
        self.details.push_str(line);
    }
}

/// What a running task can reach
pub struct RunContext<'a> {
    pub env: &'a Environment,
    pub case: &'a mut CaseState,
    async_scopes: Vec<Vec<TaskId>>,
}

impl<'a> RunContext<'a> {
    pub fn new(env: &'a Environment, case: &'a mut CaseState) -> Self {
        Self {
            env,
            case,
            async_scopes: Vec::new(),
        }
    }

    pub fn vars(&self) -> &CaseVariables {
        &self.case.vars
    }

    pub fn vars_mut(&mut self) -> &mut CaseVariables {
        &mut self.case.vars
    }

    pub fn remote(&mut self) -> Result<&RemoteAudio, RemoteError> {
        self.case.remote(self.env)
    }

    /// Open a scope collecting deferred completions
    pub fn push_async_scope(&mut self) {
        self.async_scopes.push(Vec::new());
    }

    /// Close the innermost scope, returning its tasks in registration order
    pub fn pop_async_scope(&mut self) -> Vec<TaskId> {
        self.async_scopes.pop().unwrap_or_default()
    }

    /// Defer `id`'s completion to the innermost scope
    ///
    /// Queueing the same task twice is a no-op. Returns `false` when no scope
    /// is open.
    pub fn queue_async(&mut self, id: TaskId) -> bool {
        match self.async_scopes.last_mut() {
            Some(queue) => {
                if !queue.contains(&id) {
                    queue.push(id);
                }
                true
            }
            None => false,
        }
    }
}
