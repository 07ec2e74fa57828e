use std::io;
use std::process;

use chatmux::commands::ask::{self, AskArgs};
use chatmux::commands::classify::{self, ClassifyArgs};
use chatmux::commands::config::{self, ConfigArgs};
use chatmux::commands::extract::{self, ExtractArgs};
use chatmux::commands::image::{self, ImageArgs};
use chatmux::commands::models::{self, ModelsArgs};
use chatmux::commands::search::{self, SearchArgs};
use chatmux::commands::LONG_VERSION;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, shells};

const ROOT_HELP_EXAMPLES: &str = "Examples:\n  chatmux ask --model gpt-4o-mini \"What is the capital of Peru?\"\n  echo \"Summarize this\" | chatmux ask --model claude-3-5-sonnet --attach report.pdf\n  chatmux classify --offline \"latest AAPL stock price today\"\n  chatmux models\n  chatmux completion bash > ~/.local/share/bash-completion/completions/chatmux";

const ASK_HELP_EXAMPLES: &str = "Examples:\n  chatmux ask --model gemini-2.5-flash \"weather in Delhi tomorrow\"\n  chatmux ask --model gpt-4o --attach chart.png \"Describe this chart\"\n  chatmux ask --request body.json --output events\n  chatmux ask --model mistral-large --dry-run --json \"Explain retries\"";

#[derive(Debug, Parser)]
#[command(
    name = "chatmux",
    version = LONG_VERSION,
    about = "Route chat requests to hosted LLM providers",
    after_help = ROOT_HELP_EXAMPLES
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Send a prompt to a model", after_help = ASK_HELP_EXAMPLES)]
    Ask(AskArgs),
    #[command(about = "Show the tool policy chosen for a prompt")]
    Classify(ClassifyArgs),
    #[command(about = "Print the text extracted from files")]
    Extract(ExtractArgs),
    #[command(about = "List configured models")]
    Models(ModelsArgs),
    #[command(about = "Generate an image from a prompt")]
    Image(ImageArgs),
    #[command(about = "Search the web and print result URLs")]
    Search(SearchArgs),
    #[command(about = "Manage local config")]
    Config(ConfigArgs),
    #[command(about = "Generate shell completion script")]
    Completion {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

fn print_completion(shell: CompletionShell) {
    let mut cmd = Cli::command();
    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, "chatmux", &mut io::stdout()),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, "chatmux", &mut io::stdout()),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, "chatmux", &mut io::stdout()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Ask(args) => ask::run(args).await,
        Commands::Classify(args) => classify::run(args).await,
        Commands::Extract(args) => extract::run(args),
        Commands::Models(args) => models::run(args),
        Commands::Image(args) => image::run(args).await,
        Commands::Search(args) => search::run(args).await,
        Commands::Config(args) => config::run(args),
        Commands::Completion { shell } => {
            print_completion(shell);
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("{err}");
        process::exit(1);
    }
}
