//! Image generation backends used when a model emits an image directive.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::rchain::vision::encode_image_base64_from_bytes;

pub const DEFAULT_IMAGE_MODEL: &str = "black-forest-labs/FLUX.1-schnell";
pub const PLACEHOLDER_IMAGE_URL: &str = "https://picsum.photos/512";
pub const HUGGINGFACE_API_KEY_ENV: &str = "HUGGINGFACE_API_KEY";

const HF_INFERENCE_BASE: &str = "https://api-inference.huggingface.co/models";

/// Produces a URL (or `data:` URL) for a prompt. Never fails: backends fall
/// back to a placeholder.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, model_hint: Option<&str>) -> String;
}

/// `[images]` section of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageSettings {
    pub model: String,
    pub placeholder: String,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_IMAGE_MODEL.to_string(),
            placeholder: PLACEHOLDER_IMAGE_URL.to_string(),
        }
    }
}

#[derive(Debug, Error)]
enum ImageGenError {
    #[error("{HUGGINGFACE_API_KEY_ENV} is not set")]
    MissingKey,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("inference API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("response is not an image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Always answers with the configured placeholder.
#[derive(Debug, Clone)]
pub struct PlaceholderImages {
    url: String,
}

impl PlaceholderImages {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for PlaceholderImages {
    fn default() -> Self {
        Self::new(PLACEHOLDER_IMAGE_URL)
    }
}

#[async_trait]
impl ImageGenerator for PlaceholderImages {
    async fn generate(&self, _prompt: &str, _model_hint: Option<&str>) -> String {
        self.url.clone()
    }
}

/// Text-to-image through the Hugging Face inference API.
pub struct HuggingFaceImages {
    client: reqwest::Client,
    api_key: Option<String>,
    settings: ImageSettings,
    timeout: Option<Duration>,
}

impl HuggingFaceImages {
    pub fn new(client: reqwest::Client, api_key: Option<String>, settings: ImageSettings) -> Self {
        Self {
            client,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            settings,
            timeout: None,
        }
    }

    pub fn from_env(client: reqwest::Client, settings: ImageSettings) -> Self {
        Self::new(client, std::env::var(HUGGINGFACE_API_KEY_ENV).ok(), settings)
    }

    pub fn with_timeout(mut self, timeout_secs: Option<u64>) -> Self {
        self.timeout = timeout_secs.map(Duration::from_secs);
        self
    }

    async fn request(&self, prompt: &str, model: &str) -> Result<String, ImageGenError> {
        let api_key = self.api_key.as_deref().ok_or(ImageGenError::MissingKey)?;
        let url = format!("{HF_INFERENCE_BASE}/{model}");
        debug!(model, api_key_present = true, "requesting image generation");

        let mut request = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .header("Accept", "image/png")
            .json(&serde_json::json!({ "inputs": prompt }));
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImageGenError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response.bytes().await?;
        Ok(png_data_url(&bytes)?)
    }
}

#[async_trait]
impl ImageGenerator for HuggingFaceImages {
    async fn generate(&self, prompt: &str, model_hint: Option<&str>) -> String {
        let model = model_hint
            .map(str::trim)
            .filter(|hint| !hint.is_empty())
            .unwrap_or(&self.settings.model);
        match self.request(prompt, model).await {
            Ok(url) => url,
            Err(err) => {
                warn!(model, error = %err, "image generation failed, using placeholder");
                self.settings.placeholder.clone()
            }
        }
    }
}

/// Normalizes image bytes to a PNG `data:` URL.
pub fn png_data_url(bytes: &[u8]) -> Result<String, image::ImageError> {
    Ok(format!(
        "data:image/png;base64,{}",
        encode_image_base64_from_bytes(bytes)?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageOutputFormat, Rgb};
    use std::io::Cursor;

    fn bmp() -> Vec<u8> {
        let image = ImageBuffer::from_pixel(2, 2, Rgb([200u8, 10, 10]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Bmp)
            .unwrap();
        bytes
    }

    #[test]
    fn image_bytes_become_png_data_url() {
        let url = png_data_url(&bmp()).unwrap();
        assert!(url.starts_with("data:image/png;base64,iVBORw0KGgo"), "{url}");
        assert!(png_data_url(b"{\"error\":\"loading\"}").is_err());
    }

    #[tokio::test]
    async fn placeholder_backend_ignores_prompt() {
        let images = PlaceholderImages::new("https://example.test/cat.png");
        assert_eq!(
            images.generate("a cat", Some("any")).await,
            "https://example.test/cat.png"
        );
    }

    #[tokio::test]
    async fn missing_key_falls_back_without_network() {
        let settings = ImageSettings {
            placeholder: "https://example.test/none.png".into(),
            ..ImageSettings::default()
        };
        let images = HuggingFaceImages::new(reqwest::Client::new(), Some("  ".into()), settings);
        assert_eq!(images.generate("a fox", None).await, "https://example.test/none.png");
    }

    #[test]
    fn settings_default_to_flux_and_picsum() {
        let settings: ImageSettings = toml::from_str("").unwrap();
        assert_eq!(settings.model, DEFAULT_IMAGE_MODEL);
        assert_eq!(settings.placeholder, PLACEHOLDER_IMAGE_URL);
    }
}
