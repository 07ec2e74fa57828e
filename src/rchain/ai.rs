use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const GENERATE_IMAGE_TOOL: &str = "generate_image";

/// Assistant message returned by chat models.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AIMessage {
    /// Natural language content.
    pub content: String,
}

impl AIMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Single-line JSON instruction a model emits to request an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDirective {
    pub tool: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ToolDirective {
    /// Parses one line. Only `generate_image` with a non-empty prompt counts.
    pub fn parse(line: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(line.trim()).ok()?;
        let object = value.as_object()?;
        if object.get("tool")?.as_str()? != GENERATE_IMAGE_TOOL {
            return None;
        }
        let prompt = object.get("prompt")?.as_str()?.trim();
        if prompt.is_empty() {
            return None;
        }
        let model = object
            .get("model")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .map(str::to_string);
        Some(Self {
            tool: GENERATE_IMAGE_TOOL.to_string(),
            prompt: prompt.to_string(),
            model,
        })
    }

    /// Splits a leading directive line off `text`, returning it with the
    /// remainder (leading newlines dropped).
    pub fn split_leading(text: &str) -> Option<(Self, &str)> {
        let trimmed = text.trim_start();
        let (first, rest) = match trimmed.split_once('\n') {
            Some((first, rest)) => (first, rest),
            None => (trimmed, ""),
        };
        let directive = Self::parse(first)?;
        Some((directive, rest.trim_start_matches(['\r', '\n'])))
    }
}

/// Markdown the directive line is replaced with.
pub fn image_markdown(url: &str) -> String {
    format!("![generated image]({url})\n\n")
}
