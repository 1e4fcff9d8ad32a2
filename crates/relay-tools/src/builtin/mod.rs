//! Built-in tool implementations.

pub mod bash;
pub mod editor;
pub mod search;
pub mod web;

use crate::error::ToolError;
use crate::session::CommandSession;
use crate::ToolRegistry;
use std::sync::Arc;

/// Register all built-in tools into a registry.
///
/// Local tools share `session`, so a `cd` through `bash` also moves the
/// base directory of the editor and search tools.
pub fn register_all(
    registry: &mut ToolRegistry,
    session: Arc<CommandSession>,
    include_web: bool,
) -> Result<(), ToolError> {
    registry.register_local(Arc::new(bash::BashTool::new(Arc::clone(&session))))?;
    registry.register_local(Arc::new(editor::EditorTool::new(Arc::clone(&session))))?;
    registry.register_local(Arc::new(search::SearchTool::new(session)))?;
    if include_web {
        registry.register_remote(web::web_search())?;
        registry.register_remote(web::web_fetch())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_sandbox::ExecutionLimits;

    #[test]
    fn test_register_all() {
        let session = Arc::new(CommandSession::with_origin(
            std::env::temp_dir(),
            Default::default(),
            ExecutionLimits::default(),
        ));
        let mut registry = ToolRegistry::new();
        register_all(&mut registry, session, true).unwrap();

        assert_eq!(
            registry.names(),
            vec!["bash", "str_replace_editor", "search", "web_search", "web_fetch"]
        );
        assert!(!registry.get("web_search").unwrap().capability().is_local());
    }
}
