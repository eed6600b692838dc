//! Task tree and execution engine
//!
//! A test description becomes a tree of [`Task`] nodes. Running the root walks
//! the tree on the caller's thread; only audio completion waits block.

mod async_task;
mod batch;
pub mod builtin;
mod case;
mod context;
mod download;
mod environment;
mod generic;
mod input;
mod message;
mod node;
mod output;
mod process;
mod result;
mod save;
mod script;
mod sequential;
mod sound;
mod variables;

pub use async_task::{run_async, AsyncOptions, AsyncTask, Device};
pub use batch::TaskBatch;
pub use case::TaskCase;
pub use context::{CaseState, RunContext};
pub use download::TaskDownload;
pub use environment::Environment;
pub use generic::TaskGeneric;
pub use input::TaskInput;
pub use message::TaskMessage;
pub use node::{Task, TaskId, TaskNode, TaskType};
pub use output::TaskOutput;
pub use process::{parse_bindings, parse_operands, Binding, Operand, ProcessArg, ProcessOutcome, TaskProcess};
pub use result::ExecutionResult;
pub use save::TaskSave;
pub use script::{ScriptError, ScriptRunner};
pub use sequential::TaskSequential;
pub use sound::{SoundSource, TaskSound};
pub use variables::{CaseVariables, Value, VarTable};

/// Instantiate an empty node of `task_type`
pub fn create_task(task_type: TaskType) -> Box<dyn Task> {
    match task_type {
        TaskType::Batch => Box::new(TaskBatch::new()),
        TaskType::Case => Box::new(TaskCase::new()),
        TaskType::Setup | TaskType::Action => Box::new(TaskGeneric::new(task_type)),
        TaskType::Save => Box::new(TaskSave::new()),
        TaskType::Sequential => Box::new(TaskSequential::new()),
        TaskType::Input => Box::new(TaskInput::new()),
        TaskType::Output => Box::new(TaskOutput::new()),
        TaskType::Process => Box::new(TaskProcess::new()),
        TaskType::Sound => Box::new(TaskSound::new()),
        TaskType::Message => Box::new(TaskMessage::new()),
        TaskType::Download => Box::new(TaskDownload::new()),
    }
}
