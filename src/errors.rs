use std::fmt;

use thiserror::Error;

use crate::domain::schema::SchemaError;

/// Closed set of failure tags surfaced for a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    UnknownTool,
    InvalidArguments,
    HandlerError,
    TransportError,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownTool => "unknown_tool",
            Self::InvalidArguments => "invalid_arguments",
            Self::HandlerError => "handler_error",
            Self::TransportError => "transport_error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("channel write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("message serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("channel closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },
    #[error("invalid arguments: {0}")]
    InvalidArguments(#[from] SchemaError),
    #[error("tool failed: {message}")]
    Handler { message: String },
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}

impl InvocationError {
    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::UnknownTool { name: name.into() }
    }

    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::UnknownTool { .. } => FailureKind::UnknownTool,
            Self::InvalidArguments(_) => FailureKind::InvalidArguments,
            Self::Handler { .. } => FailureKind::HandlerError,
            Self::Transport(_) => FailureKind::TransportError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(
            InvocationError::unknown_tool("bogus_tool").kind(),
            FailureKind::UnknownTool
        );
        assert_eq!(
            InvocationError::handler("no human available").kind(),
            FailureKind::HandlerError
        );
        assert_eq!(
            InvocationError::from(TransportError::Closed).kind(),
            FailureKind::TransportError
        );
        assert_eq!(
            InvocationError::from(SchemaError::missing("question")).kind(),
            FailureKind::InvalidArguments
        );
    }

    #[test]
    fn display_includes_details() {
        let error = InvocationError::unknown_tool("bogus_tool");
        assert_eq!(error.to_string(), "unknown tool: bogus_tool");

        let error = InvocationError::from(SchemaError::missing("question"));
        assert!(error.to_string().contains("question"));
    }
}
