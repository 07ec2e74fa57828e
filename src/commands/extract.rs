use std::path::PathBuf;

use clap::Args;

use crate::extract;
use crate::rchain::human::Attachment;

#[derive(Debug, Args, Clone)]
pub struct ExtractArgs {
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<PathBuf>,
    /// Override the media type guessed from the extension.
    #[arg(long, value_name = "TYPE")]
    pub mime: Option<String>,
}

pub fn run(args: ExtractArgs) -> Result<(), String> {
    let mut sections = Vec::with_capacity(args.paths.len());
    for path in &args.paths {
        let mut attachment = Attachment::from_path(path)?;
        if let Some(mime) = &args.mime {
            attachment.media_type = mime.clone();
        }
        sections.push(render(&attachment));
    }
    println!("{}", sections.join("\n\n"));
    Ok(())
}

fn render(attachment: &Attachment) -> String {
    if attachment.is_image() {
        format!(
            "Image: {} ({}, {} bytes)",
            attachment.filename,
            attachment.media_type,
            attachment.bytes.len()
        )
    } else {
        extract::extract(attachment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn images_are_described_not_extracted() {
        let image = Attachment::new("cat.png", "image/png", vec![0; 4]);
        assert_eq!(render(&image), "Image: cat.png (image/png, 4 bytes)");
        let text = Attachment::new("a.txt", "text/plain", b"hi".to_vec());
        assert_eq!(render(&text), "Text Document: a.txt\n\nhi");
    }
}
