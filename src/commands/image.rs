use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::Args;

use super::{DEFAULT_TIMEOUT_SECS, http_client, save_output};
use crate::config;
use crate::images::{HuggingFaceImages, ImageGenerator};
use crate::logging::{self, Verbosity};

#[derive(Debug, Args, Clone)]
pub struct ImageArgs {
    pub prompt: String,
    /// Hugging Face model id; defaults to `[images] model`.
    #[arg(long, short = 'm')]
    pub model: Option<String>,
    /// Write the PNG here instead of printing the data URL.
    #[arg(long, value_name = "PATH")]
    pub save: Option<PathBuf>,
    #[arg(long)]
    pub timeout: Option<u64>,
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

pub async fn run(args: ImageArgs) -> Result<(), String> {
    logging::init(Verbosity::from_flags(args.verbose, false));
    let file = config::load_config_or_default()?;
    let images = HuggingFaceImages::from_env(http_client()?, file.images)
        .with_timeout(Some(args.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS)));
    let url = images.generate(&args.prompt, args.model.as_deref()).await;

    match (&args.save, decode_png_data_url(&url)) {
        (Some(path), Some(bytes)) => {
            save_output(path, &bytes)?;
            println!("{}", path.display());
        }
        _ => println!("{url}"),
    }
    Ok(())
}

fn decode_png_data_url(url: &str) -> Option<Vec<u8>> {
    let payload = url.strip_prefix("data:image/png;base64,")?;
    STANDARD.decode(payload).ok()
}
