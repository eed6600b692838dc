//! Test description model
//!
//! Turns a test description XML file into a runnable task tree.

mod builder;
mod error;
pub mod schema;

pub use builder::{build_from_file, build_from_str, parse_test_description_xml, TestModel};
pub use error::ModelError;
