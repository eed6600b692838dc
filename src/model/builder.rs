//! XML test description → task tree

use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use tracing::{debug, error, info};

use crate::task::{create_task, CaseState, Environment, ExecutionResult, RunContext, Task, TaskBatch, TaskType};

use super::error::ModelError;
use super::schema::{self, SchemaRow, INCLUDE_TAG};

/// A built test: one case, or a batch of cases
pub struct TestModel {
    root: Box<dyn Task>,
}

impl TestModel {
    pub fn root(&self) -> &dyn Task {
        self.root.as_ref()
    }

    pub fn root_mut(&mut self) -> &mut dyn Task {
        self.root.as_mut()
    }

    pub fn is_batch(&self) -> bool {
        self.root.task_type() == TaskType::Batch
    }

    /// Number of cases that will run
    pub fn case_count(&self) -> usize {
        if self.is_batch() {
            self.root.node().children().len()
        } else {
            1
        }
    }

    pub fn run(&mut self, env: &Environment) -> ExecutionResult {
        let mut state = CaseState::new();
        let mut ctx = RunContext::new(env, &mut state);
        self.root.run(&mut ctx)
    }
}

/// Build the model in `path`, logging why it failed if it did
pub fn parse_test_description_xml(path: &Path) -> Option<TestModel> {
    match build_from_file(path, true) {
        Ok(model) => {
            info!("Loaded {:?} ({} cases)", path, model.case_count());
            Some(model)
        }
        Err(e) => {
            error!("Cannot load {:?}: {}", path, e);
            None
        }
    }
}

/// Build from a file; includes resolve against its directory
pub fn build_from_file(path: &Path, allow_batch: bool) -> Result<TestModel, ModelError> {
    let text = fs::read_to_string(path).map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    build(&text, &base_dir, allow_batch)
}

/// Build from XML text; `base_dir` resolves batch includes
pub fn build_from_str(text: &str, base_dir: &Path) -> Result<TestModel, ModelError> {
    build(text, base_dir, true)
}

fn build(text: &str, base_dir: &Path, allow_batch: bool) -> Result<TestModel, ModelError> {
    let doc = Document::parse(text)?;
    let root = doc.root_element();
    let tag = root.tag_name().name();
    debug!("Building <{}>", tag);

    let task = match tag {
        "batch" if allow_batch => build_batch(root, base_dir)?,
        "case" => {
            let row = schema::lookup(tag).ok_or_else(|| ModelError::BadRoot(tag.to_string()))?;
            build_node(root, row)?
        }
        _ => return Err(ModelError::BadRoot(tag.to_string())),
    };
    Ok(TestModel { root: task })
}

fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn apply_attributes(task: &mut dyn Task, element: Node<'_, '_>) -> Result<(), ModelError> {
    for attr in element.attributes() {
        task.apply_attribute(attr.name(), attr.value())?;
    }
    Ok(())
}

fn build_node(element: Node<'_, '_>, row: &SchemaRow) -> Result<Box<dyn Task>, ModelError> {
    let mut task = create_task(row.task_type);
    apply_attributes(task.as_mut(), element)?;
    if let Some(name) = row.required.iter().find(|name| !element.has_attribute(**name)) {
        return Err(ModelError::MissingAttribute {
            element: row.tag.to_string(),
            attribute: name.to_string(),
        });
    }

    let mut seen = vec![false; row.children.len()];
    for child in elements(element) {
        let tag = child.tag_name().name();
        let child_row = schema::lookup(tag).ok_or_else(|| ModelError::UnknownElement(tag.to_string()))?;
        let (pos, rule) = row
            .rule(child_row.task_type)
            .ok_or_else(|| ModelError::ChildNotAllowed {
                parent: row.tag.to_string(),
                child: tag.to_string(),
            })?;
        if seen[pos] && !rule.repeatable {
            return Err(ModelError::DuplicateChild {
                parent: row.tag.to_string(),
                child: tag.to_string(),
            });
        }
        seen[pos] = true;
        task.add_child(build_node(child, child_row)?);
    }

    for (rule, seen) in row.children.iter().zip(seen) {
        if rule.mandatory && !seen {
            return Err(ModelError::MissingChild {
                parent: row.tag.to_string(),
                child: rule.child.tag().to_string(),
            });
        }
    }
    Ok(task)
}

fn include_path(include: Node<'_, '_>, base_dir: &Path) -> Result<PathBuf, ModelError> {
    let mut file = None;
    for attr in include.attributes() {
        match attr.name() {
            "file" => file = Some(attr.value()),
            other => {
                return Err(ModelError::UnknownAttribute {
                    element: INCLUDE_TAG.to_string(),
                    attribute: other.to_string(),
                })
            }
        }
    }
    if let Some(child) = elements(include).next() {
        return Err(ModelError::ChildNotAllowed {
            parent: INCLUDE_TAG.to_string(),
            child: child.tag_name().name().to_string(),
        });
    }
    let file = file.ok_or_else(|| ModelError::MissingAttribute {
        element: INCLUDE_TAG.to_string(),
        attribute: "file".to_string(),
    })?;
    Ok(base_dir.join(file))
}

fn build_batch(element: Node<'_, '_>, base_dir: &Path) -> Result<Box<dyn Task>, ModelError> {
    let mut batch = TaskBatch::new();
    apply_attributes(&mut batch, element)?;

    for child in elements(element) {
        let tag = child.tag_name().name();
        if tag != INCLUDE_TAG {
            return Err(ModelError::ChildNotAllowed {
                parent: TaskType::Batch.tag().to_string(),
                child: tag.to_string(),
            });
        }
        let path = include_path(child, base_dir)?;
        debug!("Including {:?}", path);
        let case = build_from_file(&path, false)?;
        batch.add_child(case.root);
    }

    if batch.node().children().is_empty() {
        return Err(ModelError::EmptyBatch);
    }
    Ok(Box::new(batch))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        <case name="minimal" version="1">
          <setup/>
          <action><sequential/></action>
        </case>"#;

    #[test]
    fn test_minimal_case() {
        let model = build_from_str(MINIMAL, Path::new(".")).unwrap();
        assert!(!model.is_batch());
        assert_eq!(model.root().task_type(), TaskType::Case);
        assert_eq!(model.root().node().children().len(), 2);
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let xml = r#"<case name="x"><setup/><setup/><action><sequential/></action></case>"#;
        assert!(matches!(
            build_from_str(xml, Path::new(".")),
            Err(ModelError::DuplicateChild { .. })
        ));
    }

    #[test]
    fn test_unknown_root() {
        assert!(matches!(
            build_from_str("<suite/>", Path::new(".")),
            Err(ModelError::BadRoot(_))
        ));
    }

    #[test]
    fn test_malformed_xml() {
        assert!(matches!(
            build_from_str("<case>", Path::new(".")),
            Err(ModelError::Xml(_))
        ));
    }
}
