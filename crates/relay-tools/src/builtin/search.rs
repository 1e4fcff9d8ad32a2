//! Search tool — regex content search below a directory.

use crate::error::ToolError;
use crate::session::CommandSession;
use crate::traits::{schema_for, LocalTool, ValidatedInput};
use async_trait::async_trait;
use ignore::WalkBuilder;
use regex::{Regex, RegexBuilder};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_MAX_RESULTS: usize = 200;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Regex pattern to search for.
    pub pattern: String,
    /// Directory to search. Defaults to the shell's working directory.
    #[serde(default)]
    pub path: Option<String>,
    /// File glob filter (e.g. `*.rs`), matched against the file name or relative path.
    #[serde(default)]
    pub include: Option<String>,
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default)]
    pub max_results: Option<usize>,
}

pub struct SearchTool {
    session: Arc<CommandSession>,
}

impl SearchTool {
    pub fn new(session: Arc<CommandSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl LocalTool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search file contents with a regex, honouring .gitignore. Returns \
         `path:line: text` per match."
    }

    fn parameters_schema(&self) -> Value {
        schema_for::<SearchParams>()
    }

    async fn execute(&self, input: ValidatedInput) -> Result<Value, ToolError> {
        let params: SearchParams = input.parse()?;

        let re = RegexBuilder::new(&params.pattern)
            .case_insensitive(params.case_insensitive)
            .build()
            .map_err(|e| ToolError::InvalidParameters(format!("Invalid regex: {e}")))?;

        let filter = params
            .include
            .as_deref()
            .map(glob::Pattern::new)
            .transpose()
            .map_err(|e| ToolError::InvalidParameters(format!("Invalid include pattern: {e}")))?;

        let cwd = self.session.working_dir().await;
        let root = match params.path.as_deref() {
            Some(p) if Path::new(p).is_absolute() => PathBuf::from(p),
            Some(p) => cwd.join(p),
            None => cwd,
        };
        if !root.is_dir() {
            return Err(ToolError::NotFound(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let limit = params.max_results.unwrap_or(DEFAULT_MAX_RESULTS).max(1);
        let lines = tokio::task::spawn_blocking(move || scan(&root, &re, filter.as_ref(), limit))
            .await
            .map_err(|e| ToolError::ExecutionError(format!("search task failed: {e}")))?;

        let mut output = lines.join("\n");
        if lines.len() >= limit {
            output.push_str(&format!("\n\n... (truncated at {limit} results)"));
        }
        Ok(Value::String(output))
    }
}

fn scan(root: &Path, re: &Regex, filter: Option<&glob::Pattern>, limit: usize) -> Vec<String> {
    let walker = WalkBuilder::new(root).git_ignore(true).hidden(false).build();
    let mut results = Vec::new();

    for entry in walker.flatten() {
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }

        let path = entry.path();
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let rel_str = rel.to_string_lossy();

        if let Some(filter) = filter {
            let filename = rel
                .file_name()
                .map(|f| f.to_string_lossy())
                .unwrap_or_default();
            if !filter.matches(&filename) && !filter.matches(&rel_str) {
                continue;
            }
        }

        // Binary or unreadable files are skipped.
        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };

        for (i, line) in content.lines().enumerate() {
            if re.is_match(line) {
                results.push(format!("{rel_str}:{}: {line}", i + 1));
                if results.len() >= limit {
                    return results;
                }
            }
        }
    }

    results
}
