//! The built-in tool set over the documentation engine.
//!
//! Query tools propagate engine errors as structured JSON-RPC failures;
//! the two editor tools instead fold failures into a `{success: false,
//! error_kind}` result object, mirroring the editor contract.

use serde::Deserialize;
use serde_json::{json, Value};

use docweaver_engine::editor::InsertPosition;
use docweaver_engine::Project;
use docweaver_types::EngineError;

use crate::{parse_args, ToolError, ToolExecutor, ToolRegistry};

/// Registry holding all thirteen documentation tools.
#[must_use]
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::default();
    let tools: Vec<Box<dyn ToolExecutor>> = vec![
        Box::new(GetStructure),
        Box::new(GetSection),
        Box::new(GetSections { alias: false }),
        Box::new(GetSections { alias: true }),
        Box::new(GetRootFilesStructure),
        Box::new(GetMainChapters),
        Box::new(SearchContent),
        Box::new(GetMetadata),
        Box::new(GetDependencies),
        Box::new(ValidateStructure),
        Box::new(RefreshIndex),
        Box::new(UpdateSection),
        Box::new(InsertSection),
    ];
    for tool in tools {
        registry
            .register(tool)
            .expect("built-in tool names are unique");
    }
    registry
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|err| ToolError::BadArgs(err.to_string()))
}

/// Editor failures become result objects instead of protocol errors.
fn editor_failure(err: &EngineError) -> Value {
    json!({
        "success": false,
        "error_kind": err.kind(),
        "error": err.to_string(),
    })
}

struct GetStructure;

#[derive(Deserialize)]
struct GetStructureArgs {
    max_depth: Option<u8>,
}

impl ToolExecutor for GetStructure {
    fn name(&self) -> &'static str {
        "get_structure"
    }
    fn description(&self) -> &'static str {
        "Get the hierarchical table of contents, optionally pruned to a maximum depth"
    }
    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "max_depth": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Deepest heading level to include"
                }
            }
        })
    }
    fn execute(&self, args: &Value, project: &Project) -> Result<Value, ToolError> {
        let args: GetStructureArgs = parse_args(args)?;
        to_value(&project.read(|index| index.get_structure(args.max_depth)))
    }
}

struct GetSection;

#[derive(Deserialize)]
struct PathArgs {
    path: String,
}

impl ToolExecutor for GetSection {
    fn name(&self) -> &'static str {
        "get_section"
    }
    fn description(&self) -> &'static str {
        "Get one section's content and children by its dotted identifier"
    }
    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Dotted section identifier" }
            },
            "required": ["path"]
        })
    }
    fn execute(&self, args: &Value, project: &Project) -> Result<Value, ToolError> {
        let args: PathArgs = parse_args(args)?;
        let view = project.read(|index| index.get_section(&args.path))?;
        to_value(&view)
    }
}

/// `get_sections` and its historical alias `get_sections_by_level`.
struct GetSections {
    alias: bool,
}

#[derive(Deserialize)]
struct LevelArgs {
    level: i64,
}

impl ToolExecutor for GetSections {
    fn name(&self) -> &'static str {
        if self.alias {
            "get_sections_by_level"
        } else {
            "get_sections"
        }
    }
    fn description(&self) -> &'static str {
        "Get all sections at a specific heading level"
    }
    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "level": { "type": "integer", "description": "Heading level, 1 to 6" }
            },
            "required": ["level"]
        })
    }
    fn execute(&self, args: &Value, project: &Project) -> Result<Value, ToolError> {
        let args: LevelArgs = parse_args(args)?;
        let sections = project.read(|index| index.sections_at_level(args.level))?;
        to_value(&sections)
    }
}

struct GetRootFilesStructure;

impl ToolExecutor for GetRootFilesStructure {
    fn name(&self) -> &'static str {
        "get_root_files_structure"
    }
    fn description(&self) -> &'static str {
        "Get the section tree grouped by root file; included files are hidden"
    }
    fn schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }
    fn execute(&self, _args: &Value, project: &Project) -> Result<Value, ToolError> {
        to_value(&project.read(|index| index.get_root_files_structure()))
    }
}

struct GetMainChapters;

impl ToolExecutor for GetMainChapters {
    fn name(&self) -> &'static str {
        "get_main_chapters"
    }
    fn description(&self) -> &'static str {
        "Get numbered main chapters (arc42-style) plus unnumbered top-level documents"
    }
    fn schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }
    fn execute(&self, _args: &Value, project: &Project) -> Result<Value, ToolError> {
        to_value(&project.read(|index| index.get_main_chapters()))
    }
}

struct SearchContent;

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
}

impl ToolExecutor for SearchContent {
    fn name(&self) -> &'static str {
        "search_content"
    }
    fn description(&self) -> &'static str {
        "Case-insensitive substring search over section titles and bodies"
    }
    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "minLength": 1 }
            },
            "required": ["query"]
        })
    }
    fn execute(&self, args: &Value, project: &Project) -> Result<Value, ToolError> {
        let args: SearchArgs = parse_args(args)?;
        let hits = project.read(|index| index.search_content(&args.query))?;
        to_value(&hits)
    }
}

struct GetMetadata;

#[derive(Deserialize)]
struct MetadataArgs {
    path: Option<String>,
}

impl ToolExecutor for GetMetadata {
    fn name(&self) -> &'static str {
        "get_metadata"
    }
    fn description(&self) -> &'static str {
        "Get metadata for one section, or for the whole project when no path is given"
    }
    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Optional dotted section identifier" }
            }
        })
    }
    fn execute(&self, args: &Value, project: &Project) -> Result<Value, ToolError> {
        let args: MetadataArgs = parse_args(args)?;
        match args.path {
            Some(path) => {
                let metadata = project.read(|index| index.section_metadata(&path))?;
                to_value(&metadata)
            }
            None => to_value(&project.read(|index| index.project_metadata())),
        }
    }
}

struct GetDependencies;

impl ToolExecutor for GetDependencies {
    fn name(&self) -> &'static str {
        "get_dependencies"
    }
    fn description(&self) -> &'static str {
        "Get the include tree, cross-references and orphaned-section check"
    }
    fn schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }
    fn execute(&self, _args: &Value, project: &Project) -> Result<Value, ToolError> {
        to_value(&project.read(|index| index.get_dependencies()))
    }
}

struct ValidateStructure;

impl ToolExecutor for ValidateStructure {
    fn name(&self) -> &'static str {
        "validate_structure"
    }
    fn description(&self) -> &'static str {
        "Validate index invariants and report accumulated parse warnings"
    }
    fn schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }
    fn execute(&self, _args: &Value, project: &Project) -> Result<Value, ToolError> {
        to_value(&project.read(|index| index.validate_structure()))
    }
}

struct RefreshIndex;

impl ToolExecutor for RefreshIndex {
    fn name(&self) -> &'static str {
        "refresh_index"
    }
    fn description(&self) -> &'static str {
        "Force a full re-discovery and re-parse of the project"
    }
    fn schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }
    fn execute(&self, _args: &Value, project: &Project) -> Result<Value, ToolError> {
        let report = project.refresh_full()?;
        let metadata = project.read(|index| index.project_metadata());
        Ok(json!({
            "success": report.success,
            "old_section_count": report.old_section_count,
            "new_section_count": report.new_section_count,
            "metadata": to_value(&metadata)?,
        }))
    }
}

struct UpdateSection;

#[derive(Deserialize)]
struct UpdateArgs {
    path: String,
    content: String,
}

impl ToolExecutor for UpdateSection {
    fn name(&self) -> &'static str {
        "update_section"
    }
    fn description(&self) -> &'static str {
        "Replace a section's body in its source file, atomically"
    }
    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Dotted section identifier" },
                "content": { "type": "string", "description": "New body text" }
            },
            "required": ["path", "content"]
        })
    }
    fn execute(&self, args: &Value, project: &Project) -> Result<Value, ToolError> {
        let args: UpdateArgs = parse_args(args)?;
        match project.update_section(&args.path, &args.content) {
            Ok(diff) => Ok(json!({ "success": true, "diff": to_value(&diff)? })),
            Err(err) => Ok(editor_failure(&err)),
        }
    }
}

struct InsertSection;

#[derive(Deserialize)]
struct InsertArgs {
    parent_path: String,
    title: String,
    content: String,
    position: Option<String>,
}

impl ToolExecutor for InsertSection {
    fn name(&self) -> &'static str {
        "insert_section"
    }
    fn description(&self) -> &'static str {
        "Insert a new child section relative to a parent, atomically"
    }
    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "parent_path": { "type": "string", "description": "Dotted identifier of the parent" },
                "title": { "type": "string" },
                "content": { "type": "string" },
                "position": {
                    "type": "string",
                    "enum": ["before", "after", "append"],
                    "default": "append"
                }
            },
            "required": ["parent_path", "title", "content"]
        })
    }
    fn execute(&self, args: &Value, project: &Project) -> Result<Value, ToolError> {
        let args: InsertArgs = parse_args(args)?;
        let position: InsertPosition = args
            .position
            .as_deref()
            .unwrap_or("append")
            .parse()
            .map_err(|err: EngineError| ToolError::BadArgs(err.to_string()))?;
        match project.insert_section(&args.parent_path, &args.title, &args.content, position) {
            Ok(report) => Ok(json!({
                "success": true,
                "id": report.id,
                "diff": to_value(&report.diff)?,
            })),
            Err(err) => Ok(editor_failure(&err)),
        }
    }
}
