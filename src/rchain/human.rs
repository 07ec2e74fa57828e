use std::fs;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant with vision and document analysis capabilities.";
pub const DEFAULT_MODEL_NAME: &str = "mistral-large";

/// File attached to a user turn. Base64 `data` on the JSON wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(
        rename = "data",
        default,
        serialize_with = "encode_base64",
        deserialize_with = "decode_base64"
    )]
    pub bytes: Vec<u8>,
    #[serde(rename = "mime_type", alias = "media_type")]
    pub media_type: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Attachment {
    pub fn new(
        filename: impl Into<String>,
        media_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
            filename: filename.into(),
            url: None,
        }
    }

    /// Reads a local file, guessing the media type from its extension.
    pub fn from_path(path: &Path) -> Result<Self, String> {
        let bytes = fs::read(path)
            .map_err(|err| format!("Failed to read attachment '{}': {err}", path.display()))?;
        let media_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(filename, media_type, bytes))
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }
}

fn encode_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

fn decode_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    // Upload layers hand out data URLs; accept them as well as bare base64.
    let payload = match raw.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => raw.as_str(),
    };
    STANDARD
        .decode(payload.trim())
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
    Other,
}

/// One unit of conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    #[serde(rename = "content", alias = "text", default)]
    pub text: String,
    #[serde(rename = "files", alias = "attachments", default)]
    pub attachments: Vec<Attachment>,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn kind(&self) -> TurnRole {
        match self.role.as_str() {
            "user" => TurnRole::User,
            "assistant" => TurnRole::Assistant,
            _ => TurnRole::Other,
        }
    }
}

/// A complete chat request as handed over by the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "WireChatRequest")]
pub struct ChatRequest {
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub history: Vec<ChatTurn>,
    pub system_prompt: Option<String>,
    pub model_name: String,
}

impl ChatRequest {
    pub fn new(model_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
            history: Vec::new(),
            system_prompt: None,
            model_name: model_name.into(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn has_content(&self) -> bool {
        !self.text.is_empty() || !self.attachments.is_empty()
    }
}

#[derive(Deserialize)]
struct WireChatRequest {
    message: WireUserMessage,
    #[serde(default)]
    history: Vec<ChatTurn>,
    #[serde(default = "default_system_prompt")]
    system_prompt: Option<String>,
    #[serde(default)]
    model_name: Option<String>,
}

#[derive(Deserialize)]
struct WireUserMessage {
    #[serde(default)]
    text: String,
    #[serde(default)]
    files: Vec<Attachment>,
}

fn default_system_prompt() -> Option<String> {
    Some(DEFAULT_SYSTEM_PROMPT.to_string())
}

impl From<WireChatRequest> for ChatRequest {
    fn from(wire: WireChatRequest) -> Self {
        Self {
            text: wire.message.text,
            attachments: wire.message.files,
            history: wire.history,
            system_prompt: wire.system_prompt,
            model_name: wire
                .model_name
                .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string()),
        }
    }
}
