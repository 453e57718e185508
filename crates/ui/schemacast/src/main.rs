use clap::Parser;
use color_eyre::Result;
use schemacast::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    schemacast::run(Cli::parse()).await
}
