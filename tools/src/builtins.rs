//! The five file capabilities offered to the model.

use minicoder_context::{file_context_message, file_context_text};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{ToolCtx, ToolDispatcher, ToolError, ToolExecutor, ToolFut, parse_args};

const READ_SEPARATOR_WIDTH: usize = 50;

#[derive(Debug, Deserialize)]
struct ReadFileArgs {
    file_path: String,
}

#[derive(Debug, Deserialize)]
struct ReadMultipleFilesArgs {
    file_paths: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CreateFileArgs {
    file_path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct FileSpec {
    path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct CreateMultipleFilesArgs {
    files: Vec<FileSpec>,
}

#[derive(Debug, Deserialize)]
struct EditFileArgs {
    file_path: String,
    original_snippet: String,
    new_snippet: String,
}

pub struct ReadFileTool;
pub struct ReadMultipleFilesTool;
pub struct CreateFileTool;
pub struct CreateMultipleFilesTool;
pub struct EditFileTool;

pub(crate) fn register_builtins(dispatcher: &mut ToolDispatcher) {
    let builtins: [Box<dyn ToolExecutor>; 5] = [
        Box::new(ReadFileTool),
        Box::new(ReadMultipleFilesTool),
        Box::new(CreateFileTool),
        Box::new(CreateMultipleFilesTool),
        Box::new(EditFileTool),
    ];
    for tool in builtins {
        if let Err(e) = dispatcher.register(tool) {
            tracing::warn!(%e, "Skipping builtin tool");
        }
    }
}

impl ToolExecutor for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read the content of a single file from the filesystem"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "The path to the file to read" }
            },
            "required": ["file_path"]
        })
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a mut ToolCtx<'_>) -> ToolFut<'a> {
        Box::pin(async move {
            let typed: ReadFileArgs = parse_args(&args)?;
            let (path, content) = ctx.files.read(&typed.file_path).await.map_err(|e| {
                ToolError::Failed(format!("Error reading '{}': {e}", typed.file_path))
            })?;
            Ok(file_context_text(&path, &content))
        })
    }
}

impl ToolExecutor for ReadMultipleFilesTool {
    fn name(&self) -> &'static str {
        "read_multiple_files"
    }

    fn description(&self) -> &'static str {
        "Read the content of multiple files from the filesystem"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_paths": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Array of file paths to read"
                }
            },
            "required": ["file_paths"]
        })
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a mut ToolCtx<'_>) -> ToolFut<'a> {
        Box::pin(async move {
            let typed: ReadMultipleFilesArgs = parse_args(&args)?;
            let mut blocks = Vec::with_capacity(typed.file_paths.len());
            for raw in &typed.file_paths {
                match ctx.files.read(raw).await {
                    Ok((path, content)) => blocks.push(file_context_text(&path, &content)),
                    Err(e) => blocks.push(format!("Error reading '{raw}': {e}")),
                }
            }
            let separator = format!("\n\n{}\n\n", "=".repeat(READ_SEPARATOR_WIDTH));
            Ok(blocks.join(&separator))
        })
    }
}

impl ToolExecutor for CreateFileTool {
    fn name(&self) -> &'static str {
        "create_file"
    }

    fn description(&self) -> &'static str {
        "Create a new file or overwrite an existing file with the provided content"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "The path where the file should be created" },
                "content": { "type": "string", "description": "The content to write to the file" }
            },
            "required": ["file_path", "content"]
        })
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a mut ToolCtx<'_>) -> ToolFut<'a> {
        Box::pin(async move {
            let typed: CreateFileArgs = parse_args(&args)?;
            ctx.files
                .create(&typed.file_path, &typed.content)
                .await
                .map_err(|e| {
                    ToolError::Failed(format!("Error creating file '{}': {e}", typed.file_path))
                })?;
            Ok(format!("Successfully created file '{}'", typed.file_path))
        })
    }
}

impl ToolExecutor for CreateMultipleFilesTool {
    fn name(&self) -> &'static str {
        "create_multiple_files"
    }

    fn description(&self) -> &'static str {
        "Create multiple files at once"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "files": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "path": { "type": "string" },
                            "content": { "type": "string" }
                        },
                        "required": ["path", "content"]
                    },
                    "description": "Array of files to create with their paths and content"
                }
            },
            "required": ["files"]
        })
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a mut ToolCtx<'_>) -> ToolFut<'a> {
        Box::pin(async move {
            let typed: CreateMultipleFilesArgs = parse_args(&args)?;
            let total = typed.files.len();
            let mut created = Vec::new();
            let mut failures = Vec::new();
            for file in &typed.files {
                match ctx.files.create(&file.path, &file.content).await {
                    Ok(_) => created.push(file.path.as_str()),
                    Err(e) => failures.push(format!("Error creating '{}': {e}", file.path)),
                }
            }

            if failures.is_empty() {
                return Ok(format!(
                    "Successfully created {} files: {}",
                    created.len(),
                    created.join(", ")
                ));
            }
            let mut report = format!("Created {} of {total} files", created.len());
            if !created.is_empty() {
                report.push_str(": ");
                report.push_str(&created.join(", "));
            }
            for failure in failures {
                report.push('\n');
                report.push_str(&failure);
            }
            Err(ToolError::Failed(report))
        })
    }
}

impl ToolExecutor for EditFileTool {
    fn name(&self) -> &'static str {
        "edit_file"
    }

    fn description(&self) -> &'static str {
        "Edit an existing file by replacing a specific snippet with new content"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "The path to the file to edit" },
                "original_snippet": { "type": "string", "description": "The exact text snippet to find and replace" },
                "new_snippet": { "type": "string", "description": "The new text to replace the original snippet with" }
            },
            "required": ["file_path", "original_snippet", "new_snippet"]
        })
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a mut ToolCtx<'_>) -> ToolFut<'a> {
        Box::pin(async move {
            let typed: EditFileArgs = parse_args(&args)?;
            let raw = typed.file_path.as_str();
            let editing = |e: ToolError| ToolError::Failed(format!("Error editing file '{raw}': {e}"));

            ensure_in_context(ctx, raw).await?;

            let report = ctx
                .files
                .replace_snippet(raw, &typed.original_snippet, &typed.new_snippet)
                .await
                .map_err(editing)?;
            let mut text = format!("Successfully edited file '{raw}'");
            if report.occurrences > 1 {
                text.push_str(&format!(
                    " (warning: {} matches found, replaced the first)",
                    report.occurrences
                ));
            }
            Ok(text)
        })
    }
}

/// Inject the file's current text unless its marker is already present.
async fn ensure_in_context(ctx: &mut ToolCtx<'_>, raw: &str) -> Result<(), ToolError> {
    let path = ctx
        .files
        .resolve(raw)
        .map_err(|e| ToolError::Failed(format!("Error editing file '{raw}': {e}")))?;
    if ctx.store.has_file_context(&path) {
        return Ok(());
    }
    let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
        tracing::warn!(path = %path.display(), %e, "Could not read file for editing context");
        ToolError::Failed(format!("Error: Could not read file '{raw}' for editing"))
    })?;
    ctx.store.append(file_context_message(&path, &content))?;
    tracing::debug!(path = %path.display(), "Injected file context for edit");
    Ok(())
}
