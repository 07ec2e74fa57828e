use clap::Args;

use crate::logging::{self, Verbosity};
use crate::search::WebSearch;

#[derive(Debug, Args, Clone)]
pub struct SearchArgs {
    pub query: String,
    #[arg(long, short = 'n', default_value_t = 5)]
    pub num_results: usize,
    #[arg(long, default_value_t = 15)]
    pub timeout: u64,
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

pub async fn run(args: SearchArgs) -> Result<(), String> {
    logging::init(Verbosity::from_flags(args.verbose, false));
    let search = WebSearch::new(args.timeout).map_err(|err| err.to_string())?;
    let urls = search
        .search(&args.query, args.num_results)
        .await
        .map_err(|err| err.to_string())?;
    if urls.is_empty() {
        eprintln!("no results for '{}'", args.query);
    }
    for url in urls {
        println!("{url}");
    }
    Ok(())
}
