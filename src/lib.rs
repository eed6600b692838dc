//! audioqa - XML-driven audio quality test sequencer
//!
//! A test description is parsed into a tree of tasks that generate, play,
//! record and analyse audio on the host and on a remote device under test.

pub mod adb;
pub mod audio;
pub mod model;
pub mod protocol;
pub mod remote;
pub mod report;
pub mod settings;
pub mod task;

pub use audio::{Buffer, SharedBuffer};
pub use model::{parse_test_description_xml, TestModel};
pub use remote::RemoteAudio;
pub use report::Report;
pub use settings::Settings;
pub use task::{Environment, ExecutionResult};
