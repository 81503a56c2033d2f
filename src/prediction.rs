//! The output of a finished prediction, and how it is reduced to the one URL
//! the gateway hands back to its callers

use crate::resolver;
use serde_json::Value;

/// One produced artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputItem {
    /// A file the provider is hosting (or inlined as a `data:` URI)
    HasUrl(String),

    /// Anything else, kept as its textual form
    Opaque(String),
}

/// Models return either one artifact or a list of them
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Single(OutputItem),
    Sequence(Vec<OutputItem>),
}

impl OutputItem {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::from_text(s),
            Value::Object(obj) => match obj.get("url").and_then(Value::as_str) {
                Some(url) => OutputItem::HasUrl(url.to_string()),
                None => OutputItem::Opaque(value.to_string()),
            },
            other => OutputItem::Opaque(other.to_string()),
        }
    }

    fn from_text(s: &str) -> Self {
        if resolver::is_remote(s) || s.starts_with("data:") {
            OutputItem::HasUrl(s.to_string())
        } else {
            OutputItem::Opaque(s.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OutputItem::HasUrl(s) | OutputItem::Opaque(s) => s,
        }
    }
}

impl Output {
    /// Interpret a prediction's raw `output` field. Returns `None` when the
    /// prediction produced nothing.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Array(items) => Some(Output::Sequence(
                items.iter().map(OutputItem::from_json).collect(),
            )),
            other => Some(Output::Single(OutputItem::from_json(other))),
        }
    }
}

/// The URL of the first artifact. Items without a URL fall back to their
/// textual form, so this always yields something.
pub fn extract_result_url(output: &Output) -> String {
    match output {
        Output::Single(item) => item.as_str().to_string(),
        Output::Sequence(items) => match items.first() {
            Some(item) => item.as_str().to_string(),
            None => "[]".to_string(),
        },
    }
}
