use anyhow::Result;
use clap::Parser; // needed for Cli::parse()
use tokio::runtime::Runtime;

use risevocab_app::cli::commands::run_cli;
use risevocab_app::cli::opts::Cli;
use risevocab_app::logging::init_tracing;

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level, args.log_json);

    let rt = Runtime::new()?;
    rt.block_on(run_cli(args))
}
