use anyhow::Result;
use clap::Parser;
use ledgerbank::cli::Cli;
use ledgerbank::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.verbose);
    cli.run().await
}
