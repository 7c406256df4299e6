use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = performance_tracker_cli::Cli::parse();
    performance_tracker_cli::init_logging(cli.verbosity());
    performance_tracker_cli::run_cli(cli)
}
