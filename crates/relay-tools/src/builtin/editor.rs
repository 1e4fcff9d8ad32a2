//! File editor tool — view, create, replace and insert.
//!
//! Relative paths resolve against the shell session's current directory.

use crate::error::ToolError;
use crate::session::CommandSession;
use crate::traits::{schema_for, validate_against_schema, LocalTool, ValidatedInput};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MAX_LISTING_ENTRIES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EditorCommand {
    /// Show a file with line numbers, or list a directory.
    View,
    /// Create or overwrite a file with `file_text`.
    Create,
    /// Replace the single occurrence of `old_str` with `new_str`.
    StrReplace,
    /// Insert `new_str` after line `insert_line` (0 inserts at the top).
    Insert,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EditorParams {
    pub command: EditorCommand,
    /// File or directory path, relative to the shell's working directory.
    pub path: String,
    /// 1-based inclusive line range for `view`.
    #[serde(default)]
    pub view_range: Option<(usize, usize)>,
    #[serde(default)]
    pub file_text: Option<String>,
    #[serde(default)]
    pub old_str: Option<String>,
    #[serde(default)]
    pub new_str: Option<String>,
    #[serde(default)]
    pub insert_line: Option<usize>,
}

impl EditorParams {
    fn check_required(&self) -> Result<(), ToolError> {
        let missing = match self.command {
            EditorCommand::View => None,
            EditorCommand::Create if self.file_text.is_none() => Some("file_text"),
            EditorCommand::StrReplace if self.old_str.is_none() => Some("old_str"),
            EditorCommand::StrReplace if self.new_str.is_none() => Some("new_str"),
            EditorCommand::Insert if self.insert_line.is_none() => Some("insert_line"),
            EditorCommand::Insert if self.new_str.is_none() => Some("new_str"),
            _ => None,
        };
        match missing {
            Some(field) => Err(ToolError::InvalidParameters(format!(
                "'{field}' is required for this command"
            ))),
            None => Ok(()),
        }
    }
}

pub struct EditorTool {
    session: Arc<CommandSession>,
}

impl EditorTool {
    pub fn new(session: Arc<CommandSession>) -> Self {
        Self { session }
    }

    async fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.session.working_dir().await.join(path)
        }
    }
}

#[async_trait]
impl LocalTool for EditorTool {
    fn name(&self) -> &str {
        "str_replace_editor"
    }

    fn description(&self) -> &str {
        "View, create and edit text files. `str_replace` fails unless old_str \
         appears exactly once."
    }

    fn parameters_schema(&self) -> Value {
        schema_for::<EditorParams>()
    }

    fn validate(&self, raw: &Value) -> Result<ValidatedInput, ToolError> {
        let input = validate_against_schema(&self.parameters_schema(), raw)?;
        input.clone().parse::<EditorParams>()?.check_required()?;
        Ok(input)
    }

    async fn execute(&self, input: ValidatedInput) -> Result<Value, ToolError> {
        let params: EditorParams = input.parse()?;
        let path = self.resolve(&params.path).await;

        let output = match params.command {
            EditorCommand::View => view(&path, params.view_range).await?,
            EditorCommand::Create => {
                create(&path, params.file_text.as_deref().unwrap_or_default()).await?
            }
            EditorCommand::StrReplace => {
                replace(
                    &path,
                    params.old_str.as_deref().unwrap_or_default(),
                    params.new_str.as_deref().unwrap_or_default(),
                )
                .await?
            }
            EditorCommand::Insert => {
                insert(
                    &path,
                    params.insert_line.unwrap_or_default(),
                    params.new_str.as_deref().unwrap_or_default(),
                )
                .await?
            }
        };

        Ok(Value::String(output))
    }
}

async fn view(path: &Path, range: Option<(usize, usize)>) -> Result<String, ToolError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| ToolError::ExecutionError(format!("Cannot access {}: {e}", path.display())))?;

    if metadata.is_dir() {
        return list_dir(path).await;
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ToolError::ExecutionError(format!("Failed to read file: {e}")))?;
    let lines: Vec<&str> = content.lines().collect();

    let (start, end) = match range {
        Some((start, end)) => {
            if start == 0 || start > end || start > lines.len() {
                return Err(ToolError::InvalidParameters(format!(
                    "view_range [{start}, {end}] is outside the file's {} lines",
                    lines.len()
                )));
            }
            (start, end.min(lines.len()))
        }
        None => (1, lines.len()),
    };

    Ok(lines
        .iter()
        .enumerate()
        .skip(start.saturating_sub(1))
        .take(end + 1 - start.max(1))
        .map(|(idx, line)| format!("{:>6}\t{line}", idx + 1))
        .collect::<Vec<_>>()
        .join("\n"))
}

async fn list_dir(path: &Path) -> Result<String, ToolError> {
    let mut entries = tokio::fs::read_dir(path).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().await.is_ok_and(|ft| ft.is_dir()) {
            name.push('/');
        }
        names.push(name);
    }
    names.sort();
    names.truncate(MAX_LISTING_ENTRIES);
    Ok(names.join("\n"))
}

async fn create(path: &Path, text: &str) -> Result<String, ToolError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, text)
        .await
        .map_err(|e| ToolError::ExecutionError(format!("Failed to write file: {e}")))?;
    Ok(format!("Wrote {} bytes to {}", text.len(), path.display()))
}

async fn replace(path: &Path, old: &str, new: &str) -> Result<String, ToolError> {
    if old.is_empty() {
        return Err(ToolError::InvalidParameters("old_str must not be empty".to_string()));
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ToolError::ExecutionError(format!("Failed to read file: {e}")))?;

    match content.matches(old).count() {
        0 => Err(ToolError::ExecutionError(format!(
            "old_str not found in {}",
            path.display()
        ))),
        1 => {
            tokio::fs::write(path, content.replacen(old, new, 1))
                .await
                .map_err(|e| ToolError::ExecutionError(format!("Failed to write file: {e}")))?;
            Ok(format!("Edited {}", path.display()))
        }
        count => Err(ToolError::ExecutionError(format!(
            "old_str found {count} times in {}; include more context to make it unique",
            path.display()
        ))),
    }
}

async fn insert(path: &Path, after_line: usize, text: &str) -> Result<String, ToolError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ToolError::ExecutionError(format!("Failed to read file: {e}")))?;
    let mut lines: Vec<&str> = content.lines().collect();

    if after_line > lines.len() {
        return Err(ToolError::InvalidParameters(format!(
            "insert_line {after_line} is past the end of the file ({} lines)",
            lines.len()
        )));
    }

    for (offset, line) in text.lines().enumerate() {
        lines.insert(after_line + offset, line);
    }

    let mut updated = lines.join("\n");
    if content.ends_with('\n') || content.is_empty() {
        updated.push('\n');
    }
    tokio::fs::write(path, updated)
        .await
        .map_err(|e| ToolError::ExecutionError(format!("Failed to write file: {e}")))?;
    Ok(format!("Inserted text after line {after_line} of {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_sandbox::ExecutionLimits;
    use serde_json::json;
    use tempfile::TempDir;

    fn tool_in(dir: &TempDir) -> EditorTool {
        EditorTool::new(Arc::new(CommandSession::with_origin(
            dir.path(),
            Default::default(),
            ExecutionLimits::default(),
        )))
    }

    async fn run(tool: &EditorTool, args: Value) -> Result<Value, ToolError> {
        let input = tool.validate(&args)?;
        tool.execute(input).await
    }

    #[tokio::test]
    async fn test_create_then_view() {
        let dir = TempDir::new().unwrap();
        let tool = tool_in(&dir);

        run(&tool, json!({"command": "create", "path": "notes/a.txt", "file_text": "one\ntwo\nthree\n"}))
            .await
            .unwrap();
        let out = run(&tool, json!({"command": "view", "path": "notes/a.txt", "view_range": [2, 3]}))
            .await
            .unwrap();

        assert_eq!(out, Value::String("     2\ttwo\n     3\tthree".to_string()));
    }

    #[tokio::test]
    async fn test_str_replace_single() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("f.txt"), "hello world").unwrap();

        run(
            &tool_in(&dir),
            json!({"command": "str_replace", "path": "f.txt", "old_str": "hello", "new_str": "goodbye"}),
        )
        .await
        .unwrap();

        let content = std::fs::read_to_string(dir.path().join("f.txt")).unwrap();
        assert_eq!(content, "goodbye world");
    }

    #[tokio::test]
    async fn test_str_replace_ambiguous() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("f.txt"), "aaa bbb aaa").unwrap();

        let err = run(
            &tool_in(&dir),
            json!({"command": "str_replace", "path": "f.txt", "old_str": "aaa", "new_str": "c"}),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("2 times"));
        let content = std::fs::read_to_string(dir.path().join("f.txt")).unwrap();
        assert_eq!(content, "aaa bbb aaa");
    }

    #[tokio::test]
    async fn test_insert() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("f.txt"), "a\nc\n").unwrap();

        run(
            &tool_in(&dir),
            json!({"command": "insert", "path": "f.txt", "insert_line": 1, "new_str": "b"}),
        )
        .await
        .unwrap();

        let content = std::fs::read_to_string(dir.path().join("f.txt")).unwrap();
        assert_eq!(content, "a\nb\nc\n");
    }

    #[tokio::test]
    async fn test_view_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("file.txt"), "x").unwrap();

        let out = run(&tool_in(&dir), json!({"command": "view", "path": "."}))
            .await
            .unwrap();
        assert_eq!(out, Value::String("file.txt\nsub/".to_string()));
    }

    #[test]
    fn test_missing_required_field() {
        let dir = TempDir::new().unwrap();
        let err = tool_in(&dir)
            .validate(&json!({"command": "create", "path": "x.txt"}))
            .unwrap_err();
        assert!(err.to_string().contains("file_text"));
    }
}
