//! Tool framework: registry, argument validation, dispatch.
//!
//! Tools are named strings at the wire; this crate maps each name to a
//! JSON-schema validator and a handler over the engine. It knows nothing
//! about transports; the stdio server and the HTTP API both sit on top.

pub mod catalog;

use std::collections::HashMap;

use serde_json::Value;

use docweaver_engine::Project;
use docweaver_types::{EngineError, ToolDefinition};

/// Error taxonomy for tool dispatch.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("bad tool args: {0}")]
    BadArgs(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("duplicate tool registered: {0}")]
    DuplicateTool(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ToolError {
    /// JSON-RPC error code for this failure.
    #[must_use]
    pub fn code(&self) -> i64 {
        match self {
            Self::UnknownTool(_) => -32601,
            Self::BadArgs(_) | Self::Engine(EngineError::InvalidArgument(_)) => -32602,
            Self::DuplicateTool(_) => -32603,
            Self::Engine(_) => -32000,
        }
    }

    /// Stable `error.data.kind` identifier, when one applies.
    #[must_use]
    pub fn kind(&self) -> Option<&'static str> {
        match self {
            Self::BadArgs(_) => Some("invalid_argument"),
            Self::Engine(err) => Some(err.kind()),
            Self::UnknownTool(_) | Self::DuplicateTool(_) => None,
        }
    }
}

/// One callable tool.
pub trait ToolExecutor: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn schema(&self) -> Value;
    fn execute(&self, args: &Value, project: &Project) -> Result<Value, ToolError>;
}

/// Deserialize a tool's argument object into its typed form.
pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(args: &Value) -> Result<T, ToolError> {
    serde_json::from_value(args.clone()).map_err(|err| ToolError::BadArgs(err.to_string()))
}

/// Validate arguments against a tool's declared JSON schema.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), ToolError> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|err| ToolError::BadArgs(format!("invalid tool schema: {err}")))?;
    if let Err(error) = validator.validate(args) {
        return Err(ToolError::BadArgs(error.to_string()));
    }
    Ok(())
}

/// Flat name → executor registry.
#[derive(Default)]
pub struct ToolRegistry {
    executors: HashMap<String, Box<dyn ToolExecutor>>,
}

impl ToolRegistry {
    pub fn register(&mut self, executor: Box<dyn ToolExecutor>) -> Result<(), ToolError> {
        let name = executor.name().to_string();
        if self.executors.contains_key(&name) {
            return Err(ToolError::DuplicateTool(name));
        }
        self.executors.insert(name, executor);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&dyn ToolExecutor, ToolError> {
        self.executors
            .get(name)
            .map(AsRef::as_ref)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    /// Wire definitions for `tools/list`, name-sorted.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self
            .executors
            .values()
            .map(|executor| {
                ToolDefinition::new(executor.name(), executor.description(), executor.schema())
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Validate and run one tool call.
    pub fn dispatch(
        &self,
        name: &str,
        args: &Value,
        project: &Project,
    ) -> Result<Value, ToolError> {
        let executor = self.lookup(name)?;
        validate_args(&executor.schema(), args)?;
        executor.execute(args, project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    impl ToolExecutor for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn description(&self) -> &'static str {
            "Echo the message back"
        }
        fn schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "message": { "type": "string" } },
                "required": ["message"]
            })
        }
        fn execute(&self, args: &Value, _project: &Project) -> Result<Value, ToolError> {
            Ok(json!({ "echo": args["message"] }))
        }
    }

    fn sample_project() -> (tempfile::TempDir, std::sync::Arc<Project>) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.adoc"), "= Intro\n").unwrap();
        let project = Project::open(dir.path()).unwrap();
        (dir, project)
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ToolRegistry::default();
        registry.register(Box::new(Echo)).unwrap();
        let err = registry.register(Box::new(Echo)).unwrap_err();
        assert!(matches!(err, ToolError::DuplicateTool(name) if name == "echo"));
    }

    #[test]
    fn dispatch_validates_arguments_against_the_schema() {
        let (_dir, project) = sample_project();
        let mut registry = ToolRegistry::default();
        registry.register(Box::new(Echo)).unwrap();

        let ok = registry
            .dispatch("echo", &json!({"message": "hi"}), &project)
            .unwrap();
        assert_eq!(ok["echo"], "hi");

        let err = registry
            .dispatch("echo", &json!({"message": 7}), &project)
            .unwrap_err();
        assert_eq!(err.code(), -32602);
        assert_eq!(err.kind(), Some("invalid_argument"));

        let err = registry.dispatch("echo", &json!({}), &project).unwrap_err();
        assert!(matches!(err, ToolError::BadArgs(_)));
    }

    #[test]
    fn unknown_tool_maps_to_method_not_found() {
        let (_dir, project) = sample_project();
        let registry = ToolRegistry::default();
        let err = registry.dispatch("nope", &json!({}), &project).unwrap_err();
        assert_eq!(err.code(), -32601);
        assert_eq!(err.kind(), None);
    }

    #[test]
    fn engine_errors_carry_their_kind() {
        let err = ToolError::from(EngineError::NotFound("section x".into()));
        assert_eq!(err.code(), -32000);
        assert_eq!(err.kind(), Some("not_found"));

        let err = ToolError::from(EngineError::InvalidArgument("level".into()));
        assert_eq!(err.code(), -32602);
    }
}
