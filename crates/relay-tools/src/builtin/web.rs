//! Web capabilities executed by the model service.

use crate::registry::RemoteTool;
use serde_json::json;

const MAX_USES: u32 = 5;

/// Service-side web search.
pub fn web_search() -> RemoteTool {
    RemoteTool::new(
        "web_search",
        json!({
            "type": "web_search_20250305",
            "name": "web_search",
            "max_uses": MAX_USES,
        }),
    )
}

/// Service-side page fetch.
pub fn web_fetch() -> RemoteTool {
    RemoteTool::new(
        "web_fetch",
        json!({
            "type": "web_fetch_20250910",
            "name": "web_fetch",
            "max_uses": MAX_USES,
        }),
    )
}
