//! Capability registry
//!
//! Read-only catalog of the tools this server advertises, built once at startup.
//! Tool identities come from the closed [`ToolName`] set; construction refuses
//! duplicates and names clients could not call.

use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};

use regex::Regex;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::domain::{dispatcher::ToolHandler, schema::InputSchema};

const TOOL_NAME_PATTERN: &str = r"^[A-Za-z0-9_-]{1,64}$";
const FIELD_NAME_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    AskHuman,
}

impl ToolName {
    pub const ALL: [ToolName; 1] = [ToolName::AskHuman];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AskHuman => "ask_human",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == value)
            .ok_or(())
    }
}

impl Serialize for ToolName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: ToolName,
    pub description: &'static str,
    pub input_schema: InputSchema,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool `{0}` is registered more than once")]
    DuplicateTool(ToolName),
    #[error("tool name `{0}` is not a valid MCP tool name")]
    InvalidToolName(ToolName),
    #[error("tool `{tool}` declares invalid field name `{field}`")]
    InvalidFieldName { tool: ToolName, field: &'static str },
    #[error("name pattern failed to compile: {0}")]
    Pattern(#[from] regex::Error),
}

pub struct Registry {
    descriptors: Vec<ToolDescriptor>,
    handlers: HashMap<ToolName, Arc<dyn ToolHandler>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("descriptors", &self.descriptors)
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Builds the registry in the given order. Fails if any descriptor is
    /// malformed or two handlers claim the same tool name.
    pub fn new(tools: Vec<Arc<dyn ToolHandler>>) -> Result<Self, RegistryError> {
        let tool_name_pattern = Regex::new(TOOL_NAME_PATTERN)?;
        let field_name_pattern = Regex::new(FIELD_NAME_PATTERN)?;

        let mut descriptors = Vec::with_capacity(tools.len());
        let mut handlers = HashMap::with_capacity(tools.len());

        for handler in tools {
            let descriptor = handler.descriptor();

            if !tool_name_pattern.is_match(descriptor.name.as_str()) {
                return Err(RegistryError::InvalidToolName(descriptor.name));
            }

            if let Some(field) = descriptor
                .input_schema
                .fields()
                .iter()
                .find(|field| !field_name_pattern.is_match(field.name))
            {
                return Err(RegistryError::InvalidFieldName {
                    tool: descriptor.name,
                    field: field.name,
                });
            }

            if handlers.insert(descriptor.name, handler).is_some() {
                return Err(RegistryError::DuplicateTool(descriptor.name));
            }
            descriptors.push(descriptor);
        }

        Ok(Self {
            descriptors,
            handlers,
        })
    }

    pub fn list_tools(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    pub fn resolve(&self, name: &str) -> Option<(&ToolDescriptor, Arc<dyn ToolHandler>)> {
        let name = name.parse::<ToolName>().ok()?;
        let descriptor = self
            .descriptors
            .iter()
            .find(|descriptor| descriptor.name == name)?;
        let handler = self.handlers.get(&name)?;
        Some((descriptor, Arc::clone(handler)))
    }
}
