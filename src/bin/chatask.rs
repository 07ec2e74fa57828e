use std::process;

use chatmux::commands::ask::{self, AskArgs};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "chatask",
    about = "Send a prompt to a model",
    disable_version_flag = true
)]
struct Cli {
    #[command(flatten)]
    ask: AskArgs,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = ask::run(cli.ask).await {
        eprintln!("{err}");
        process::exit(1);
    }
}
