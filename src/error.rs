//! Error types
//!
//! `BridgeError` is returned by every fallible public operation. Structural
//! errors (`HierarchyRequest`, `NotFound`) are surfaced to script as
//! catchable exceptions through [`BridgeError::to_script_error`].

use crate::dom::NodeId;
use crate::value::ScriptValue;
use std::fmt;

/// An exception raised by script, or by native code on behalf of script
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptError {
    /// Error class name (`SyntaxError`, `TypeError`, `NotFoundError`, ...)
    pub name: String,
    /// Human readable message
    pub message: String,
    /// One frame per line, innermost first
    pub stack: String,
    /// Source the failing code came from
    pub source_url: String,
    /// 1-based line of the failing statement, 0 when unknown
    pub line: u32,
    /// The thrown value itself
    pub value: ScriptValue,
}

impl ScriptError {
    pub fn new(name: &str, message: impl Into<String>) -> Self {
        ScriptError {
            name: name.to_string(),
            message: message.into(),
            stack: String::new(),
            source_url: String::new(),
            line: 0,
            value: ScriptValue::Undefined,
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new("SyntaxError", message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    pub fn reference(message: impl Into<String>) -> Self {
        Self::new("ReferenceError", message)
    }

    pub fn range(message: impl Into<String>) -> Self {
        Self::new("RangeError", message)
    }

    /// Attach the source location, keeping an already recorded one
    pub fn at(mut self, source_url: &str, line: u32) -> Self {
        if self.source_url.is_empty() {
            self.source_url = source_url.to_string();
        }
        if self.line == 0 {
            self.line = line;
        }
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    pub fn with_stack(mut self, stack: String) -> Self {
        self.stack = stack;
        self
    }

    pub fn with_value(mut self, value: ScriptValue) -> Self {
        self.value = value;
        self
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)?;
        if !self.source_url.is_empty() {
            write!(f, " ({}:{})", self.source_url, self.line)?;
        }
        Ok(())
    }
}

impl std::error::Error for ScriptError {}

/// Rejection reasons for precompiled script blobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BytecodeError {
    /// Blob ended before a complete header or payload
    Truncated,
    /// Blob was not produced by this engine
    BadMagic,
    /// Blob was produced by another engine version
    IncompatibleVersion { expected: u16, found: u16 },
    /// Payload is not valid UTF-8
    InvalidUtf8,
}

impl fmt::Display for BytecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BytecodeError::Truncated => write!(f, "truncated bytecode"),
            BytecodeError::BadMagic => write!(f, "not a bytecode blob"),
            BytecodeError::IncompatibleVersion { expected, found } => write!(
                f,
                "bytecode version {} is incompatible with engine version {}",
                found, expected
            ),
            BytecodeError::InvalidUtf8 => write!(f, "bytecode payload is not valid UTF-8"),
        }
    }
}

impl std::error::Error for BytecodeError {}

/// Error returned across the native API
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Script failed to parse or threw
    Script(ScriptError),
    /// Precompiled input was rejected
    Bytecode(BytecodeError),
    /// The context was disposed
    ContextDisposed(i32),
    /// Tree-structural violation: cycle or type-forbidden insertion
    HierarchyRequest(String),
    /// Referenced node is not where the operation requires it
    NotFound(String),
    /// Node id does not resolve to a live node
    InvalidNode(NodeId),
    /// Argument of the wrong kind
    Type(String),
}

impl BridgeError {
    /// Convert into the exception script code observes
    pub fn to_script_error(&self) -> ScriptError {
        match self {
            BridgeError::Script(e) => e.clone(),
            BridgeError::Bytecode(e) => ScriptError::new("Error", e.to_string()),
            BridgeError::ContextDisposed(_) => {
                ScriptError::new("InvalidStateError", self.to_string())
            }
            BridgeError::HierarchyRequest(msg) => ScriptError::new("HierarchyRequestError", msg.clone()),
            BridgeError::NotFound(msg) => ScriptError::new("NotFoundError", msg.clone()),
            BridgeError::InvalidNode(_) => ScriptError::new("NotFoundError", self.to_string()),
            BridgeError::Type(msg) => ScriptError::type_error(msg.clone()),
        }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Script(e) => write!(f, "{}", e),
            BridgeError::Bytecode(e) => write!(f, "Bytecode error: {}", e),
            BridgeError::ContextDisposed(id) => write!(f, "context {} has been disposed", id),
            BridgeError::HierarchyRequest(msg) => write!(f, "HierarchyRequestError: {}", msg),
            BridgeError::NotFound(msg) => write!(f, "NotFoundError: {}", msg),
            BridgeError::InvalidNode(id) => write!(f, "node {} does not exist", id),
            BridgeError::Type(msg) => write!(f, "TypeError: {}", msg),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::Script(e) => Some(e),
            BridgeError::Bytecode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ScriptError> for BridgeError {
    fn from(e: ScriptError) -> Self {
        BridgeError::Script(e)
    }
}

impl From<BridgeError> for ScriptError {
    fn from(e: BridgeError) -> Self {
        e.to_script_error()
    }
}

impl From<BytecodeError> for BridgeError {
    fn from(e: BytecodeError) -> Self {
        BridgeError::Bytecode(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_error_location_is_sticky() {
        let err = ScriptError::type_error("boom").at("a.js", 3).at("b.js", 9);
        assert_eq!(err.source_url, "a.js");
        assert_eq!(err.line, 3);
        assert_eq!(err.to_string(), "TypeError: boom (a.js:3)");
    }

    #[test]
    fn test_structural_errors_map_to_dom_names() {
        let err = BridgeError::HierarchyRequest("cycle".into()).to_script_error();
        assert_eq!(err.name, "HierarchyRequestError");
        let err = BridgeError::NotFound("missing".into()).to_script_error();
        assert_eq!(err.name, "NotFoundError");
    }

    #[test]
    fn test_bytecode_error_display() {
        let err = BytecodeError::IncompatibleVersion { expected: 2, found: 1 };
        assert_eq!(
            BridgeError::from(err).to_string(),
            "Bytecode error: bytecode version 1 is incompatible with engine version 2"
        );
    }
}
