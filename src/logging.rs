use std::io::{self, IsTerminal};

use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_ENV: &str = "CM_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    /// `--quiet` wins over `--verbose`.
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            Self::Quiet
        } else if verbose {
            Self::Verbose
        } else {
            Self::Normal
        }
    }

    fn default_directive(self) -> &'static str {
        match self {
            Self::Verbose => "chatmux=debug",
            _ => "chatmux=warn",
        }
    }
}

/// Installs the stderr subscriber. `CM_LOG` overrides the default filter
/// unless `--verbose` was given; `Quiet` installs nothing.
pub fn init(verbosity: Verbosity) {
    if verbosity == Verbosity::Quiet {
        return;
    }
    let filter = match verbosity {
        Verbosity::Verbose => EnvFilter::new(verbosity.default_directive()),
        _ => EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(verbosity.default_directive())),
    };
    // A second init in the same process keeps the first subscriber.
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(false)
        .without_time()
        .try_init();
}
