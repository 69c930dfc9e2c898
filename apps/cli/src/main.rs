//! probs-runner CLI: run PRObs RDFox pipelines from the command line.
//!
//! Converts datasources into PRObs RDF, validates and enhances it, and
//! serves the result as a SPARQL endpoint for querying and inspection.

mod commands;
mod inspect;

use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
