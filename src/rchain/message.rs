use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Role of a normalized message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Where the pixels of an image part live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Inline(Vec<u8>),
    Url(String),
}

/// Image content part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub mime_type: String,
    pub source: ImageSource,
}

impl ImageRef {
    pub fn inline(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            source: ImageSource::Inline(bytes),
        }
    }

    pub fn url(mime_type: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            source: ImageSource::Url(url.into()),
        }
    }

    /// Inline images as a `data:` URL, remote images as-is.
    pub fn to_url(&self) -> String {
        match &self.source {
            ImageSource::Inline(bytes) => {
                format!("data:{};base64,{}", self.mime_type, STANDARD.encode(bytes))
            }
            ImageSource::Url(url) => url.clone(),
        }
    }
}

/// One typed fragment of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    Image(ImageRef),
}

impl Serialize for ContentPart {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match self {
            Self::Text(text) => {
                map.serialize_entry("type", "text")?;
                map.serialize_entry("text", text)?;
            }
            Self::Image(image) => {
                map.serialize_entry("type", "image")?;
                map.serialize_entry("mime_type", &image.mime_type)?;
                match &image.source {
                    ImageSource::Inline(bytes) => {
                        map.serialize_entry("data", &STANDARD.encode(bytes))?
                    }
                    ImageSource::Url(url) => map.serialize_entry("url", url)?,
                }
            }
        }
        map.end()
    }
}

/// Message payload: a bare string, or structured parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Parts view; a bare string is a single text part.
    pub fn parts(&self) -> Vec<ContentPart> {
        match self {
            Self::Text(text) => vec![ContentPart::Text(text.clone())],
            Self::Parts(parts) => parts.clone(),
        }
    }

    /// Text parts joined by blank lines, images skipped.
    pub fn joined_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text(text) => Some(text.as_str()),
                    ContentPart::Image(_) => None,
                })
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}

/// Provider-neutral chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedMessage {
    pub role: MessageRole,
    pub content: MessageContent,
}

impl NormalizedMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Builds a user message from parts, collapsing a lone text part to a
    /// bare string. Returns `None` when there are no parts.
    pub fn user_from_parts(parts: Vec<ContentPart>) -> Option<Self> {
        if let [ContentPart::Text(text)] = parts.as_slice() {
            return Some(Self::user(text.clone()));
        }
        if parts.is_empty() {
            return None;
        }
        Some(Self {
            role: MessageRole::User,
            content: MessageContent::Parts(parts),
        })
    }

    pub fn is_system(&self) -> bool {
        self.role == MessageRole::System
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_text_part_collapses_to_string() {
        let message =
            NormalizedMessage::user_from_parts(vec![ContentPart::Text("Hello".into())]).unwrap();
        assert_eq!(message.content, MessageContent::Text("Hello".into()));
    }

    #[test]
    fn lone_image_stays_structured() {
        let image = ContentPart::Image(ImageRef::inline("image/png", vec![1, 2, 3]));
        let message = NormalizedMessage::user_from_parts(vec![image.clone()]).unwrap();
        assert_eq!(message.content, MessageContent::Parts(vec![image]));
    }

    #[test]
    fn empty_parts_produce_no_message() {
        assert!(NormalizedMessage::user_from_parts(Vec::new()).is_none());
    }

    #[test]
    fn inline_image_renders_data_url() {
        let image = ImageRef::inline("image/png", b"abc".to_vec());
        assert_eq!(image.to_url(), "data:image/png;base64,YWJj");
        let remote = ImageRef::url("image/jpeg", "https://example.com/cat.jpg");
        assert_eq!(remote.to_url(), "https://example.com/cat.jpg");
    }

    #[test]
    fn serializes_bare_string_and_parts() {
        let text = NormalizedMessage::user("hi");
        assert_eq!(
            serde_json::to_value(&text).unwrap(),
            json!({"role": "user", "content": "hi"})
        );

        let parts = NormalizedMessage::user_from_parts(vec![
            ContentPart::Text("look".into()),
            ContentPart::Image(ImageRef::url("image/png", "https://x/y.png")),
        ])
        .unwrap();
        assert_eq!(
            serde_json::to_value(&parts).unwrap(),
            json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": "look"},
                    {"type": "image", "mime_type": "image/png", "url": "https://x/y.png"}
                ]
            })
        );
    }

    #[test]
    fn joined_text_skips_images() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text("a".into()),
            ContentPart::Image(ImageRef::inline("image/gif", vec![0])),
            ContentPart::Text("b".into()),
        ]);
        assert_eq!(content.joined_text(), "a\n\nb");
    }
}
