//! Plugin error classification.
//!
//! The plugin reports failures as free-form strings. These helpers map such a
//! string onto an [`ErrorCode`] so the tool layer can render a structured
//! error.

use serde_json::{Map, Value, json};

use super::codes::ErrorCode;

/// Keywords checked, in order, when the message says something was not found.
const NOT_FOUND_PATTERNS: &[(&str, ErrorCode)] = &[
    ("node", ErrorCode::NodeNotFound),
    ("font", ErrorCode::FontNotFound),
    ("style", ErrorCode::StyleNotFound),
    ("component", ErrorCode::ComponentNotFound),
    ("variable", ErrorCode::VariableNotFound),
];

/// General patterns, checked in order.
const ERROR_PATTERNS: &[(&str, ErrorCode)] = &[
    ("timeout", ErrorCode::CommandTimeout),
    ("locked", ErrorCode::NodeLocked),
    ("not a frame", ErrorCode::InvalidNodeType),
    ("not a text", ErrorCode::InvalidNodeType),
    ("not an instance", ErrorCode::InvalidNodeType),
    ("unknown command", ErrorCode::UnknownCommand),
];

/// A classified plugin-side failure.
#[derive(Clone, Debug, PartialEq)]
pub struct PluginError {
    /// Classified code.
    pub code: ErrorCode,
    /// Original message, or the code's default message when empty.
    pub message: String,
    /// Optional structured context.
    pub details: Option<Map<String, Value>>,
}

impl PluginError {
    /// Build an error, falling back to the code's default message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.is_empty() {
            code.default_message().to_owned()
        } else {
            message
        };
        Self {
            code,
            message,
            details: None,
        }
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details = Some(details);
        self
    }

    /// Render as `{ error: true, code, message, details? }`.
    pub fn to_json(&self) -> Value {
        let mut out = json!({
            "error": true,
            "code": self.code,
            "message": self.message,
        });
        if let (Some(details), Some(obj)) = (&self.details, out.as_object_mut()) {
            let _ = obj.insert("details".into(), Value::Object(details.clone()));
        }
        out
    }
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for PluginError {}

/// Classify a plugin error string.
///
/// Matching is case-insensitive. A "not found" message is first checked
/// against the resource keywords; anything left over is checked against the
/// general patterns, and falls back to [`ErrorCode::CommandFailed`].
pub fn classify_plugin_error(message: &str) -> PluginError {
    let lower = message.to_lowercase();

    if lower.contains("not found") {
        if let Some((_, code)) = NOT_FOUND_PATTERNS.iter().find(|(kw, _)| lower.contains(kw)) {
            return PluginError::new(*code, message);
        }
    }

    let code = ERROR_PATTERNS
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map_or(ErrorCode::CommandFailed, |(_, code)| *code);
    PluginError::new(code, message)
}
