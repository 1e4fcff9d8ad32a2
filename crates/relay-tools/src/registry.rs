//! Tool registry for managing available tools.

use crate::error::ToolError;
use crate::traits::LocalTool;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A tool that the model service executes itself.
///
/// The registry only forwards `spec` to the service; no result is ever
/// produced locally.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTool {
    /// Tool name as the service reports it in invocations.
    pub name: String,
    /// Vendor-specific descriptor sent verbatim in the tool list.
    pub spec: Value,
}

impl RemoteTool {
    pub fn new(name: impl Into<String>, spec: Value) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }
}

/// Where a tool's logic runs.
#[derive(Clone)]
pub enum ToolCapability {
    /// Validated and executed in this process.
    Local(Arc<dyn LocalTool>),
    /// Resolved by the model service.
    Remote(RemoteTool),
}

impl ToolCapability {
    pub fn is_local(&self) -> bool {
        matches!(self, ToolCapability::Local(_))
    }

    /// Short tag used in listings.
    pub fn tag(&self) -> &'static str {
        match self {
            ToolCapability::Local(_) => "local",
            ToolCapability::Remote(_) => "remote",
        }
    }
}

/// A registered tool.
#[derive(Clone)]
pub struct ToolDescriptor {
    name: String,
    capability: ToolCapability,
}

impl ToolDescriptor {
    pub fn local(tool: Arc<dyn LocalTool>) -> Self {
        Self {
            name: tool.name().to_string(),
            capability: ToolCapability::Local(tool),
        }
    }

    pub fn remote(tool: RemoteTool) -> Self {
        Self {
            name: tool.name.clone(),
            capability: ToolCapability::Remote(tool),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capability(&self) -> &ToolCapability {
        &self.capability
    }

    pub fn description(&self) -> &str {
        match &self.capability {
            ToolCapability::Local(tool) => tool.description(),
            ToolCapability::Remote(_) => "Executed by the model service.",
        }
    }
}

/// Registry of available tools.
///
/// Keeps registration order for the tool list sent to the service and a
/// name index for exact-match lookup.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<(), ToolError> {
        if self.index.contains_key(descriptor.name()) {
            return Err(ToolError::DuplicateTool(descriptor.name().to_string()));
        }
        self.index
            .insert(descriptor.name().to_string(), self.tools.len());
        self.tools.push(descriptor);
        Ok(())
    }

    pub fn register_local(&mut self, tool: Arc<dyn LocalTool>) -> Result<(), ToolError> {
        self.register(ToolDescriptor::local(tool))
    }

    pub fn register_remote(&mut self, tool: RemoteTool) -> Result<(), ToolError> {
        self.register(ToolDescriptor::remote(tool))
    }

    /// Get a tool by exact name.
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&idx| &self.tools[idx])
    }

    /// Check if a tool is registered.
    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Registered tool names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name.clone()).collect()
    }

    /// Registered tools, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
