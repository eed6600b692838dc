//! `process` task: builtin or script signal processing

use tracing::{debug, error, info};

use crate::audio::SharedBuffer;
use crate::model::ModelError;

use super::builtin::{self, BuiltinFn};
use super::context::RunContext;
use super::node::{Task, TaskNode, TaskType};
use super::result::ExecutionResult;
use super::variables::Value;

/// One entry of the `input` attribute
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Buffer(String),
    Value(String),
    ConstInt(i64),
    ConstFloat(f64),
}

/// One entry of the `output` attribute
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Buffer(String),
    Value(String),
}

impl Binding {
    pub fn name(&self) -> &str {
        match self {
            Binding::Buffer(name) | Binding::Value(name) => name,
        }
    }
}

/// A resolved argument or produced output
#[derive(Debug, Clone)]
pub enum ProcessArg {
    Buffer(SharedBuffer),
    Value(Value),
}

/// What a builtin or script produced
#[derive(Debug)]
pub struct ProcessOutcome {
    pub result: ExecutionResult,
    pub outputs: Vec<ProcessArg>,
}

#[derive(Debug, Clone)]
enum Method {
    Builtin(String, BuiltinFn),
    Script(String),
}

pub struct TaskProcess {
    node: TaskNode,
    method: Option<Method>,
    inputs: Vec<Operand>,
    outputs: Vec<Binding>,
}

impl TaskProcess {
    pub fn new() -> Self {
        Self {
            node: TaskNode::new(TaskType::Process, &["method", "input", "output"]),
            method: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    fn resolve(&self, ctx: &RunContext<'_>) -> Result<Vec<ProcessArg>, String> {
        let vars = ctx.vars();
        self.inputs
            .iter()
            .map(|operand| match operand {
                Operand::Buffer(name) => vars
                    .find_buffer(name)
                    .map(ProcessArg::Buffer)
                    .ok_or_else(|| format!("no buffer {}", name)),
                Operand::Value(name) => vars
                    .find_value(name)
                    .map(ProcessArg::Value)
                    .ok_or_else(|| format!("no value {}", name)),
                Operand::ConstInt(v) => Ok(ProcessArg::Value(Value::Int(*v))),
                Operand::ConstFloat(v) => Ok(ProcessArg::Value(Value::Double(*v))),
            })
            .collect()
    }

    fn bind(&self, ctx: &mut RunContext<'_>, produced: Vec<ProcessArg>) -> Result<(), String> {
        if produced.len() != self.outputs.len() {
            return Err(format!(
                "produced {} outputs, {} expected",
                produced.len(),
                self.outputs.len()
            ));
        }
        let vars = ctx.vars_mut();
        for (binding, value) in self.outputs.iter().zip(produced) {
            let stored = match (binding, value) {
                (Binding::Buffer(name), ProcessArg::Buffer(buffer)) => vars.set_buffer(name, buffer),
                (Binding::Value(name), ProcessArg::Value(value)) => {
                    debug!("{} = {}", name, value);
                    vars.set_value(name, value)
                }
                (binding, _) => return Err(format!("output {} has the wrong kind", binding.name())),
            };
            if !stored {
                return Err(format!("cannot store output {}", binding.name()));
            }
        }
        Ok(())
    }
}

impl Default for TaskProcess {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(name: &str, value: &str, reason: impl Into<String>) -> ModelError {
    ModelError::InvalidAttribute {
        element: TaskType::Process.tag().to_string(),
        attribute: name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_method(value: &str) -> Result<Method, ModelError> {
    match value.split_once(':') {
        Some(("builtin", function)) => builtin::lookup(function)
            .map(|f| Method::Builtin(function.to_string(), f))
            .ok_or_else(|| invalid("method", value, "unknown builtin")),
        Some(("script", function)) if !function.is_empty() => Ok(Method::Script(function.to_string())),
        _ => Err(invalid("method", value, "expected builtin:<fn> or script:<fn>")),
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Parse `input="id:a,val:b,consti:3,constf:0.5"`
pub fn parse_operands(value: &str) -> Result<Vec<Operand>, ModelError> {
    split_list(value)
        .map(|item| {
            let (kind, reference) = item
                .split_once(':')
                .ok_or_else(|| invalid("input", item, "expected <kind>:<ref>"))?;
            match kind {
                "id" => Ok(Operand::Buffer(reference.to_string())),
                "val" => Ok(Operand::Value(reference.to_string())),
                "consti" => reference
                    .parse()
                    .map(Operand::ConstInt)
                    .map_err(|_| invalid("input", item, "expected an integer")),
                "constf" => reference
                    .parse()
                    .map(Operand::ConstFloat)
                    .map_err(|_| invalid("input", item, "expected a number")),
                _ => Err(invalid("input", item, "unknown operand kind")),
            }
        })
        .collect()
}

/// Parse `output="id:a,val:b"`
pub fn parse_bindings(value: &str) -> Result<Vec<Binding>, ModelError> {
    split_list(value)
        .map(|item| match item.split_once(':') {
            Some(("id", name)) if !name.is_empty() => Ok(Binding::Buffer(name.to_string())),
            Some(("val", name)) if !name.is_empty() => Ok(Binding::Value(name.to_string())),
            _ => Err(invalid("output", item, "expected id:<name> or val:<name>")),
        })
        .collect()
}

impl Task for TaskProcess {
    fn node(&self) -> &TaskNode {
        &self.node
    }

    fn node_mut(&mut self) -> &mut TaskNode {
        &mut self.node
    }

    fn apply_attribute(&mut self, name: &str, value: &str) -> Result<(), ModelError> {
        self.node.store_attribute(name, value)?;
        match name {
            "method" => self.method = Some(parse_method(value)?),
            "input" => self.inputs = parse_operands(value)?,
            "output" => self.outputs = parse_bindings(value)?,
            _ => {}
        }
        Ok(())
    }

    fn run(&mut self, ctx: &mut RunContext<'_>) -> ExecutionResult {
        let Some(method) = self.method.clone() else {
            error!("process without method");
            return ExecutionResult::Error;
        };
        let args = match self.resolve(ctx) {
            Ok(args) => args,
            Err(e) => {
                error!("process input: {}", e);
                return ExecutionResult::Error;
            }
        };

        let outcome = match &method {
            Method::Builtin(name, function) => {
                debug!("Running builtin {}", name);
                function(&args, ctx.env.sampling_rate()).map_err(|e| format!("builtin {}: {}", name, e))
            }
            Method::Script(name) => {
                let scratch = ctx.env.output_dir().join("scripts");
                ctx.env
                    .scripts()
                    .run(name, &args, &self.outputs, &scratch)
                    .map_err(|e| e.to_string())
            }
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("{}", e);
                return ExecutionResult::Error;
            }
        };

        if let Err(e) = self.bind(ctx, outcome.outputs) {
            error!("process output: {}", e);
            return ExecutionResult::Error;
        }
        if !outcome.result.is_ok() {
            info!("process returned {}", outcome.result);
        }
        outcome.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_operands() {
        let ops = parse_operands("id:rec_$i, val:gain,consti:3,constf:-0.5").unwrap();
        assert_eq!(
            ops,
            vec![
                Operand::Buffer("rec_$i".to_string()),
                Operand::Value("gain".to_string()),
                Operand::ConstInt(3),
                Operand::ConstFloat(-0.5),
            ]
        );
        assert!(parse_operands("buf:x").is_err());
        assert!(parse_operands("consti:abc").is_err());
        assert!(parse_operands("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_bindings() {
        let outs = parse_bindings("val:rms,id:mono").unwrap();
        assert_eq!(
            outs,
            vec![Binding::Value("rms".to_string()), Binding::Buffer("mono".to_string())]
        );
        assert!(parse_bindings("consti:1").is_err());
        assert!(parse_bindings("val:").is_err());
    }

    #[test]
    fn test_method_validation() {
        let mut task = TaskProcess::new();
        assert!(task.apply_attribute("method", "builtin:rms_mva").is_ok());
        assert!(task.apply_attribute("method", "script:snr").is_ok());
        assert!(matches!(
            task.apply_attribute("method", "builtin:nope"),
            Err(ModelError::InvalidAttribute { .. })
        ));
        assert!(task.apply_attribute("method", "native:x").is_err());
    }
}
