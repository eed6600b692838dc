//! Task tree nodes

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::model::ModelError;

use super::context::RunContext;
use super::result::ExecutionResult;

static NEXT_TASK_ID: AtomicUsize = AtomicUsize::new(1);

/// Identity of a node, unique within the process
pub type TaskId = usize;

/// Every kind of node in a test description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    Batch,
    Case,
    Setup,
    Action,
    Save,
    Sequential,
    Input,
    Output,
    Process,
    Sound,
    Message,
    Download,
}

impl TaskType {
    /// XML element name
    pub fn tag(self) -> &'static str {
        match self {
            TaskType::Batch => "batch",
            TaskType::Case => "case",
            TaskType::Setup => "setup",
            TaskType::Action => "action",
            TaskType::Save => "save",
            TaskType::Sequential => "sequential",
            TaskType::Input => "input",
            TaskType::Output => "output",
            TaskType::Process => "process",
            TaskType::Sound => "sound",
            TaskType::Message => "message",
            TaskType::Download => "download",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// State shared by every node: type, attributes and owned children
pub struct TaskNode {
    id: TaskId,
    task_type: TaskType,
    allowed: &'static [&'static str],
    attributes: HashMap<String, String>,
    children: Vec<Box<dyn Task>>,
}

impl TaskNode {
    /// `allowed` lists the attribute names this node accepts
    pub fn new(task_type: TaskType, allowed: &'static [&'static str]) -> Self {
        Self {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            task_type,
            allowed,
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    /// Record a raw attribute after checking the allow-list
    pub fn store_attribute(&mut self, name: &str, value: &str) -> Result<(), ModelError> {
        if !self.allowed.contains(&name) {
            return Err(ModelError::UnknownAttribute {
                element: self.task_type.tag().to_string(),
                attribute: name.to_string(),
            });
        }
        self.attributes.insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn children(&self) -> &[Box<dyn Task>] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [Box<dyn Task>] {
        &mut self.children
    }

    pub fn push_child(&mut self, child: Box<dyn Task>) {
        self.children.push(child);
    }

    /// First direct child of the given type
    pub fn child_mut(&mut self, task_type: TaskType) -> Option<&mut Box<dyn Task>> {
        self.children
            .iter_mut()
            .find(|c| c.task_type() == task_type)
    }

    /// Node with the given id anywhere below this one
    pub fn find_mut(&mut self, id: TaskId) -> Option<&mut Box<dyn Task>> {
        for child in self.children.iter_mut() {
            if child.node().id() == id {
                return Some(child);
            }
            if let Some(found) = child.node_mut().find_mut(id) {
                return Some(found);
            }
        }
        None
    }

    /// Run children in order, stopping at the first result that is not OK
    pub fn run_children(&mut self, ctx: &mut RunContext<'_>) -> ExecutionResult {
        for child in self.children.iter_mut() {
            let result = child.run(ctx);
            if !result.is_ok() {
                return result;
            }
        }
        ExecutionResult::Ok
    }
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.id)
            .field("type", &self.task_type)
            .field("attributes", &self.attributes)
            .field("children", &self.children.len())
            .finish()
    }
}

/// A node of the task tree
pub trait Task {
    fn node(&self) -> &TaskNode;

    fn node_mut(&mut self) -> &mut TaskNode;

    fn task_type(&self) -> TaskType {
        self.node().task_type()
    }

    /// Apply one XML attribute; unknown names are rejected
    fn apply_attribute(&mut self, name: &str, value: &str) -> Result<(), ModelError> {
        self.node_mut().store_attribute(name, value)
    }

    /// Take ownership of a child node
    fn add_child(&mut self, child: Box<dyn Task>) {
        self.node_mut().push_child(child);
    }

    /// Execute this node
    fn run(&mut self, ctx: &mut RunContext<'_>) -> ExecutionResult {
        self.node_mut().run_children(ctx)
    }

    /// Finish an operation deferred with `sync="start"`
    fn complete(&mut self, _ctx: &mut RunContext<'_>) -> ExecutionResult {
        ExecutionResult::Ok
    }
}

/// Parse an integer attribute, reporting which one was malformed
pub(crate) fn parse_int<T: std::str::FromStr>(task_type: TaskType, name: &str, value: &str) -> Result<T, ModelError> {
    value
        .trim()
        .parse()
        .map_err(|_| ModelError::InvalidAttribute {
            element: task_type.tag().to_string(),
            attribute: name.to_string(),
            value: value.to_string(),
            reason: "expected an integer".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Leaf {
        node: TaskNode,
    }

    impl Task for Leaf {
        fn node(&self) -> &TaskNode {
            &self.node
        }

        fn node_mut(&mut self) -> &mut TaskNode {
            &mut self.node
        }
    }

    #[test]
    fn test_ids_are_unique() {
        let a = TaskNode::new(TaskType::Setup, &[]);
        let b = TaskNode::new(TaskType::Setup, &[]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let mut node = TaskNode::new(TaskType::Download, &["id"]);
        assert!(node.store_attribute("id", "tone").is_ok());
        assert_eq!(node.attribute("id"), Some("tone"));
        assert!(matches!(
            node.store_attribute("bogus", "1"),
            Err(ModelError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn test_find_nested_child() {
        let mut root = TaskNode::new(TaskType::Action, &[]);
        let mut middle = Leaf {
            node: TaskNode::new(TaskType::Sequential, &[]),
        };
        let leaf = Leaf {
            node: TaskNode::new(TaskType::Message, &[]),
        };
        let leaf_id = leaf.node.id();
        middle.add_child(Box::new(leaf));
        root.push_child(Box::new(middle));

        let found = root.find_mut(leaf_id).unwrap();
        assert_eq!(found.task_type(), TaskType::Message);
        assert!(root.child_mut(TaskType::Sequential).is_some());
        assert!(root.child_mut(TaskType::Save).is_none());
    }

    #[test]
    fn test_parse_int_reports_attribute() {
        let err = parse_int::<u32>(TaskType::Sequential, "repeat", "ten").unwrap_err();
        assert!(err.to_string().contains("repeat"));
        assert_eq!(parse_int::<u32>(TaskType::Sequential, "repeat", " 3 ").unwrap(), 3);
    }
}
