//! Static parent/child table of the test description format

use crate::task::TaskType;

/// A child type a container accepts
#[derive(Debug, Clone, Copy)]
pub struct ChildRule {
    pub child: TaskType,
    pub mandatory: bool,
    pub repeatable: bool,
}

const fn one(child: TaskType) -> ChildRule {
    ChildRule {
        child,
        mandatory: true,
        repeatable: false,
    }
}

const fn optional(child: TaskType) -> ChildRule {
    ChildRule {
        child,
        mandatory: false,
        repeatable: false,
    }
}

const fn any(child: TaskType) -> ChildRule {
    ChildRule {
        child,
        mandatory: false,
        repeatable: true,
    }
}

/// One element of the format
#[derive(Debug)]
pub struct SchemaRow {
    pub tag: &'static str,
    pub task_type: TaskType,
    pub children: &'static [ChildRule],
    /// Attributes the element cannot do without
    pub required: &'static [&'static str],
}

impl SchemaRow {
    pub fn rule(&self, child: TaskType) -> Option<(usize, &ChildRule)> {
        self.children
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.child == child)
    }
}

/// Element tag of batch includes
pub const INCLUDE_TAG: &str = "include";

/// `batch` is handled by the builder and is not listed here
pub static SCHEMA: &[SchemaRow] = &[
    SchemaRow {
        tag: "case",
        task_type: TaskType::Case,
        children: &[
            one(TaskType::Setup),
            one(TaskType::Action),
            optional(TaskType::Save),
        ],
        required: &[],
    },
    SchemaRow {
        tag: "setup",
        task_type: TaskType::Setup,
        children: &[
            any(TaskType::Sound),
            any(TaskType::Process),
            any(TaskType::Download),
        ],
        required: &[],
    },
    SchemaRow {
        tag: "action",
        task_type: TaskType::Action,
        children: &[one(TaskType::Sequential)],
        required: &[],
    },
    SchemaRow {
        tag: "sequential",
        task_type: TaskType::Sequential,
        children: &[
            any(TaskType::Sequential),
            any(TaskType::Input),
            any(TaskType::Output),
            any(TaskType::Process),
            any(TaskType::Message),
        ],
        required: &[],
    },
    SchemaRow {
        tag: "save",
        task_type: TaskType::Save,
        children: &[],
        required: &[],
    },
    SchemaRow {
        tag: "input",
        task_type: TaskType::Input,
        children: &[],
        required: &["id", "time"],
    },
    SchemaRow {
        tag: "output",
        task_type: TaskType::Output,
        children: &[],
        required: &["id"],
    },
    SchemaRow {
        tag: "process",
        task_type: TaskType::Process,
        children: &[],
        required: &["method"],
    },
    SchemaRow {
        tag: "sound",
        task_type: TaskType::Sound,
        children: &[],
        required: &["id", "type"],
    },
    SchemaRow {
        tag: "message",
        task_type: TaskType::Message,
        children: &[],
        required: &[],
    },
    SchemaRow {
        tag: "download",
        task_type: TaskType::Download,
        children: &[],
        required: &["id"],
    },
];

pub fn lookup(tag: &str) -> Option<&'static SchemaRow> {
    SCHEMA.iter().find(|row| row.tag == tag)
}
