use anyhow::Result;
use clap::Parser;
use staged_noise::cli::{synthesize, Cli, Commands};

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Synthesize(args) => {
            synthesize::run(args)?;
        }
    }

    Ok(())
}
