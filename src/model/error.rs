//! Model building errors

use std::path::PathBuf;

use thiserror::Error;

/// Why a test description could not be turned into a task tree
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Unknown element <{0}>")]
    UnknownElement(String),

    #[error("<{element}> does not accept attribute {attribute}")]
    UnknownAttribute { element: String, attribute: String },

    #[error("<{element}> requires attribute {attribute}")]
    MissingAttribute { element: String, attribute: String },

    #[error("<{element}> attribute {attribute}=\"{value}\": {reason}")]
    InvalidAttribute {
        element: String,
        attribute: String,
        value: String,
        reason: String,
    },

    #[error("<{child}> is not allowed inside <{parent}>")]
    ChildNotAllowed { parent: String, child: String },

    #[error("<{child}> may appear only once inside <{parent}>")]
    DuplicateChild { parent: String, child: String },

    #[error("<{parent}> requires a <{child}> child")]
    MissingChild { parent: String, child: String },

    #[error("Unexpected root element <{0}>")]
    BadRoot(String),

    #[error("<batch> has no <include>")]
    EmptyBatch,
}
