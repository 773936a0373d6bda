pub mod synthesize;

use clap::{Parser, Subcommand};

pub use synthesize::SynthesizeArgs;

#[derive(Parser)]
#[command(name = "staged-noise")]
#[command(about = "Structured noise synthesis for staged-injection sampling")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synthesize a structured noise field from a random image batch
    Synthesize(SynthesizeArgs),
}
