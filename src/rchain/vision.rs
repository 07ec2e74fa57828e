use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageError, ImageOutputFormat};
use tracing::warn;

use crate::rchain::message::{ContentPart, ImageRef, ImageSource, MessageContent, NormalizedMessage};
use crate::rchain::provider::Provider;

/// Text sent in place of an image to models without vision.
pub const IMAGE_OMITTED_NOTICE: &str = "[Image attachment omitted: the selected model does not support image input]";

/// Image formats each provider accepts inline.
pub fn accepted_mime_types(provider: Provider) -> &'static [&'static str] {
    match provider {
        Provider::Openai | Provider::Mistral => {
            &["image/png", "image/jpeg", "image/gif", "image/webp"]
        }
        Provider::Anthropic => &["image/png", "image/jpeg", "image/gif", "image/webp"],
        Provider::Google => &[
            "image/png",
            "image/jpeg",
            "image/webp",
            "image/heic",
            "image/heif",
        ],
    }
}

/// Normalizes arbitrary image bytes to PNG.
pub fn transcode_to_png(bytes: &[u8]) -> Result<Vec<u8>, ImageError> {
    let image = image::load_from_memory(bytes)?;
    let mut buffer = Vec::new();
    image.write_to(&mut Cursor::new(&mut buffer), ImageOutputFormat::Png)?;
    Ok(buffer)
}

/// Normalizes arbitrary image bytes to PNG and returns Base64 payload.
pub fn encode_image_base64_from_bytes(bytes: &[u8]) -> Result<String, ImageError> {
    Ok(STANDARD.encode(transcode_to_png(bytes)?))
}

/// Returns an image the provider can take: inline images in a format it
/// rejects are transcoded to PNG. Undecodable images pass through unchanged.
pub fn prepare_for(provider: Provider, image: &ImageRef) -> ImageRef {
    let ImageSource::Inline(bytes) = &image.source else {
        return image.clone();
    };
    if accepted_mime_types(provider).contains(&image.mime_type.as_str()) {
        return image.clone();
    }
    match transcode_to_png(bytes) {
        Ok(png) => ImageRef::inline("image/png", png),
        Err(err) => {
            warn!(
                provider = provider.as_str(),
                mime_type = %image.mime_type,
                error = %err,
                "image transcoding failed, sending original bytes"
            );
            image.clone()
        }
    }
}

/// Rewrites the message list for a model: images are prepared for the
/// provider, or replaced by a text notice when the model lacks vision.
pub fn adapt_messages(
    provider: Provider,
    supports_vision: bool,
    messages: &[NormalizedMessage],
) -> Vec<NormalizedMessage> {
    messages
        .iter()
        .map(|message| {
            let MessageContent::Parts(parts) = &message.content else {
                return message.clone();
            };
            let parts = parts
                .iter()
                .map(|part| match part {
                    ContentPart::Image(_) if !supports_vision => {
                        ContentPart::Text(IMAGE_OMITTED_NOTICE.to_string())
                    }
                    ContentPart::Image(image) => ContentPart::Image(prepare_for(provider, image)),
                    text => text.clone(),
                })
                .collect();
            NormalizedMessage {
                role: message.role,
                content: MessageContent::Parts(parts),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn bmp_bytes() -> Vec<u8> {
        let image: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(2, 2, Rgb([200, 10, 10]));
        let mut buffer = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), ImageOutputFormat::Bmp)
            .unwrap();
        buffer
    }

    #[test]
    fn bmp_is_transcoded_to_png() {
        let image = ImageRef::inline("image/bmp", bmp_bytes());
        let prepared = prepare_for(Provider::Openai, &image);
        assert_eq!(prepared.mime_type, "image/png");
        let ImageSource::Inline(bytes) = prepared.source else {
            panic!("expected inline image");
        };
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[test]
    fn accepted_formats_and_urls_pass_through() {
        let png = ImageRef::inline("image/png", vec![1, 2, 3]);
        assert_eq!(prepare_for(Provider::Anthropic, &png), png);
        let remote = ImageRef::url("image/bmp", "https://example.com/a.bmp");
        assert_eq!(prepare_for(Provider::Google, &remote), remote);
    }

    #[test]
    fn undecodable_image_is_sent_as_is() {
        let broken = ImageRef::inline("image/tiff", vec![0, 1, 2]);
        assert_eq!(prepare_for(Provider::Openai, &broken), broken);
    }

    #[test]
    fn images_become_notice_without_vision() {
        let messages = vec![
            NormalizedMessage::system("sys"),
            NormalizedMessage::user_from_parts(vec![
                ContentPart::Text("what is this".into()),
                ContentPart::Image(ImageRef::inline("image/png", vec![1])),
            ])
            .unwrap(),
        ];
        let adapted = adapt_messages(Provider::Mistral, false, &messages);
        assert_eq!(adapted[0], messages[0]);
        assert_eq!(
            adapted[1].content,
            MessageContent::Parts(vec![
                ContentPart::Text("what is this".into()),
                ContentPart::Text(IMAGE_OMITTED_NOTICE.into()),
            ])
        );
    }

    #[test]
    fn base64_encoding_normalizes_to_png() {
        let encoded = encode_image_base64_from_bytes(&bmp_bytes()).unwrap();
        assert!(encoded.starts_with("iVBORw0KGgo"));
        assert!(encode_image_base64_from_bytes(b"not an image").is_err());
    }
}
